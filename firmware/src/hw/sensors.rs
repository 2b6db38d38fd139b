use airlift_core::battery::{cpu_temperature_from_raw, measure_voltage, widen_adc_sample};
use airlift_core::telemetry::TelemetryProvider;
use embassy_rp::adc::{self, Adc};
use embassy_rp::gpio::Input;

/// VSYS divider on ADC3, VBUS sense on GP24, on-die temperature sensor.
pub struct BoardSensors {
    adc: Adc<'static, adc::Blocking>,
    vsys: adc::Channel<'static>,
    temperature: adc::Channel<'static>,
    vbus: Input<'static>,
    last_voltage: f32,
    last_temperature: f32,
}

impl BoardSensors {
    pub fn new(
        adc: Adc<'static, adc::Blocking>,
        vsys: adc::Channel<'static>,
        temperature: adc::Channel<'static>,
        vbus: Input<'static>,
    ) -> Self {
        Self {
            adc,
            vsys,
            temperature,
            vbus,
            last_voltage: 0.0,
            last_temperature: 0.0,
        }
    }
}

impl TelemetryProvider for BoardSensors {
    fn read_voltage(&mut self) -> f32 {
        match self.adc.blocking_read(&mut self.vsys) {
            Ok(raw) => self.last_voltage = measure_voltage(widen_adc_sample(raw)),
            Err(_) => defmt::warn!("vsys sample failed, reusing last reading"),
        }
        self.last_voltage
    }

    fn is_on_battery(&mut self) -> bool {
        self.vbus.is_low()
    }

    fn read_cpu_temperature(&mut self) -> f32 {
        match self.adc.blocking_read(&mut self.temperature) {
            Ok(raw) => self.last_temperature = cpu_temperature_from_raw(raw),
            Err(_) => defmt::warn!("temperature sample failed, reusing last reading"),
        }
        self.last_temperature
    }
}
