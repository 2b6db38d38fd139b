//! Sensor snapshot and publish payload formatting.
//!
//! A [`TelemetrySample`] is captured fresh from a [`TelemetryProvider`] every
//! publish cycle and rendered into the short text payloads sent on each feed.

use core::fmt::{self, Write};

use heapless::String;

use crate::battery::{MAINS_PERCENTAGE, calculate_percentage};

/// Capacity of a rendered feed payload.
pub const PAYLOAD_CAPACITY: usize = 24;

/// Text payload published on a feed.
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Sensor capability consumed by the recovery loop.
pub trait TelemetryProvider {
    /// Returns the measured system voltage in volts.
    fn read_voltage(&mut self) -> f32;

    /// Returns `true` when no external power is present.
    fn is_on_battery(&mut self) -> bool;

    /// Returns the CPU die temperature in °C.
    fn read_cpu_temperature(&mut self) -> f32;
}

/// Immutable snapshot published on each telemetry cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetrySample {
    pub voltage: f32,
    pub on_battery: bool,
    pub percentage: f32,
    pub cpu_temp: f32,
}

impl TelemetrySample {
    /// Reads every sensor once and derives the battery percentage.
    pub fn capture<P>(provider: &mut P) -> Self
    where
        P: TelemetryProvider + ?Sized,
    {
        let cpu_temp = provider.read_cpu_temperature();
        let voltage = provider.read_voltage();
        let on_battery = provider.is_on_battery();
        let percentage = if on_battery {
            calculate_percentage(voltage)
        } else {
            MAINS_PERCENTAGE
        };

        Self {
            voltage,
            on_battery,
            percentage,
            cpu_temp,
        }
    }

    /// CPU temperature truncated to two decimals, e.g. `27.12`.
    ///
    /// Every payload method fails with [`fmt::Error`] when the rendered
    /// value does not fit in [`PAYLOAD_CAPACITY`] bytes.
    pub fn temperature_payload(&self) -> Result<Payload, fmt::Error> {
        let truncated = libm::truncf(self.cpu_temp * 100.0) / 100.0;
        render(format_args!("{truncated:.2}"))
    }

    /// Measured voltage in its natural float form.
    pub fn voltage_payload(&self) -> Result<Payload, fmt::Error> {
        render(format_args!("{}", self.voltage))
    }

    /// Battery percentage; exactly `100` on mains power.
    pub fn battery_payload(&self) -> Result<Payload, fmt::Error> {
        if self.on_battery {
            render(format_args!("{}", self.percentage))
        } else {
            render(format_args!("100"))
        }
    }
}

fn render(args: fmt::Arguments<'_>) -> Result<Payload, fmt::Error> {
    let mut payload = Payload::new();
    payload.write_fmt(args)?;
    Ok(payload)
}
