//! ESP32 "AirLift" co-processor running the NINA SPI firmware.
//!
//! [`frame`] and [`select`] build everywhere; the driver and socket
//! transport need the RP2040 peripherals.

pub mod frame;
pub mod select;

#[cfg(target_os = "none")]
mod nina;
#[cfg(target_os = "none")]
mod socket;

#[cfg(target_os = "none")]
pub use nina::{Nina, RadioError};
#[cfg(target_os = "none")]
pub use socket::{NinaSocket, SharedRadio};
