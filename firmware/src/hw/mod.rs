//! RP2040 board adapters for the collaborator traits in `airlift-core`.

mod clock;
mod panel;
mod sensors;

pub use clock::RtcClock;
pub use panel::BoardPanel;
pub use sensors::BoardSensors;

use airlift_core::log::LogSink;

/// Sends formatted log lines to the RTT channel.
pub struct DefmtSink;

impl LogSink for DefmtSink {
    fn write_line(&mut self, line: &str) {
        defmt::println!("{=str}", line);
    }
}
