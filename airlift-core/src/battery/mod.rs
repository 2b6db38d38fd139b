//! LiPo battery and on-die sensor conversions.
//!
//! The board measures VSYS through a 3:1 divider on an ADC pin and detects
//! mains power on a VBUS sense pin. Conversions here are pure so the
//! firmware, the emulator and the tests agree on every published number.

/// Cell voltage of a fully charged LiPo.
pub const FULL_BATTERY: f32 = 4.2;
/// Nominal LiPo cell voltage; the midpoint of the discharge curve.
pub const NOMINAL_BATTERY: f32 = 3.7;
/// Cell voltage treated as empty.
pub const EMPTY_BATTERY: f32 = 3.2;

/// Percentage reported whenever the board runs from mains power.
pub const MAINS_PERCENTAGE: f32 = 100.0;

/// ADC reference voltage.
pub const ADC_REFERENCE_VOLTS: f32 = 3.3;
/// VSYS divider ratio on the LiPo board.
pub const VSYS_DIVIDER: f32 = 3.0;
/// Full scale of a 16-bit ADC sample.
pub const ADC_FULL_SCALE: f32 = 65_535.0;

const RP2040_ADC_BITS_SCALE: f32 = 4_096.0;
const TEMP_SENSOR_REFERENCE_VOLTS: f32 = 0.706;
const TEMP_SENSOR_SLOPE: f32 = 0.001_721;
const TEMP_SENSOR_REFERENCE_CELSIUS: f32 = 27.0;

/// Widens a 12-bit RP2040 ADC sample to the 16-bit range the voltage
/// formula expects, replicating the top bits into the low nibble.
#[must_use]
pub const fn widen_adc_sample(raw12: u16) -> u16 {
    let raw12 = raw12 & 0x0FFF;
    (raw12 << 4) | (raw12 >> 8)
}

/// Converts a 16-bit VSYS sample into volts.
#[must_use]
pub fn measure_voltage(raw: u16) -> f32 {
    (f32::from(raw) * VSYS_DIVIDER * ADC_REFERENCE_VOLTS) / ADC_FULL_SCALE
}

/// Estimates the remaining charge of a LiPo cell from its voltage.
///
/// Sigmoid fit `123 - 123 / (1 + (v / 3.7)^80)^0.165`, saturating near 0 %
/// below [`EMPTY_BATTERY`] and near 100 % at [`FULL_BATTERY`].
#[must_use]
pub fn calculate_percentage(volts: f32) -> f32 {
    let ratio = libm::powf(volts / NOMINAL_BATTERY, 80.0);
    123.0 - 123.0 / libm::powf(1.0 + ratio, 0.165)
}

/// Converts a raw 12-bit reading of the RP2040 temperature sensor to °C.
#[must_use]
pub fn cpu_temperature_from_raw(raw12: u16) -> f32 {
    let sense_volts = f32::from(raw12 & 0x0FFF) * ADC_REFERENCE_VOLTS / RP2040_ADC_BITS_SCALE;
    TEMP_SENSOR_REFERENCE_CELSIUS - (sense_volts - TEMP_SENSOR_REFERENCE_VOLTS) / TEMP_SENSOR_SLOPE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f32, expected: f32, tolerance: f32) -> bool {
        libm::fabsf(actual - expected) <= tolerance
    }

    #[test]
    fn voltage_scale_endpoints() {
        assert_eq!(measure_voltage(0), 0.0);
        assert!(close(measure_voltage(u16::MAX), 9.9, 1e-4));
    }

    #[test]
    fn widening_covers_full_range() {
        assert_eq!(widen_adc_sample(0), 0);
        assert_eq!(widen_adc_sample(0x0FFF), u16::MAX);
        assert_eq!(widen_adc_sample(0x0800), 0x8008);
    }

    #[test]
    fn percentage_follows_discharge_curve() {
        assert!(close(calculate_percentage(NOMINAL_BATTERY), 13.2928, 0.01));
        assert!(close(calculate_percentage(3.9), 61.756, 0.05));
        assert!(close(calculate_percentage(FULL_BATTERY), 99.918, 0.05));
        assert!(calculate_percentage(EMPTY_BATTERY) < 0.01);
    }

    #[test]
    fn percentage_is_monotonic_across_cell_range() {
        let mut previous = calculate_percentage(EMPTY_BATTERY);
        let mut millivolts = 3_200_u16;
        while millivolts <= 4_200 {
            let current = calculate_percentage(f32::from(millivolts) / 1_000.0);
            assert!(
                current >= previous,
                "percentage dropped at {millivolts} mV: {current} < {previous}"
            );
            previous = current;
            millivolts += 10;
        }
    }

    #[test]
    fn temperature_sensor_reference_point() {
        // 0.706 V on the sensor is 27 °C; 876 counts is the closest 12-bit sample.
        assert!(close(cpu_temperature_from_raw(876), 27.0, 0.5));
        assert!(cpu_temperature_from_raw(800) > cpu_temperature_from_raw(900));
    }
}
