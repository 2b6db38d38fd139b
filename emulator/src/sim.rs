use std::cell::Cell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

use airlift_core::panel::{Color, PanelHardware};
use airlift_core::telemetry::TelemetryProvider;
use airlift_core::time::{DateTime, MonotonicInstant, TimeSource};
use rand::Rng;
use rand::rngs::StdRng;

use crate::console;

/// Virtual microsecond counter shared by every simulated component.
#[derive(Clone, Debug, Default)]
pub struct VirtualTime(Rc<Cell<u64>>);

impl VirtualTime {
    pub fn now_us(&self) -> u64 {
        self.0.get()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us())
    }

    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(micros));
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(u64);

impl MonotonicInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Clock driven by [`VirtualTime`]; sleeping advances it instantly.
pub struct SimClock {
    time: VirtualTime,
    wall_base: DateTime,
    wall_set_at: u64,
}

impl SimClock {
    pub fn new(time: VirtualTime) -> Self {
        let wall_set_at = time.now_us();
        Self {
            time,
            wall_base: DateTime::EPOCH,
            wall_set_at,
        }
    }
}

impl TimeSource for SimClock {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.time.now_us())
    }

    fn wall_clock(&self) -> DateTime {
        let since_set = self.time.now_us().saturating_sub(self.wall_set_at) / 1_000_000;
        let since_set = i64::try_from(since_set).unwrap_or(i64::MAX);
        DateTime::from_unix(self.wall_base.to_unix().saturating_add(since_set))
    }

    fn set_wall_clock(&mut self, at: DateTime) {
        self.wall_base = at;
        self.wall_set_at = self.time.now_us();
    }

    async fn sleep(&mut self, duration: Duration) {
        self.time.advance(duration);
    }
}

const DISCHARGE_VOLTS_PER_HOUR: f32 = 0.15;

/// LiPo that discharges linearly from full, or a board on USB power.
pub struct SimSensors {
    time: VirtualTime,
    on_battery: bool,
    rng: StdRng,
}

impl SimSensors {
    pub fn new(time: VirtualTime, on_battery: bool, rng: StdRng) -> Self {
        Self {
            time,
            on_battery,
            rng,
        }
    }
}

impl TelemetryProvider for SimSensors {
    fn read_voltage(&mut self) -> f32 {
        if !self.on_battery {
            return 5.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let hours = self.time.elapsed().as_secs_f32() / 3_600.0;
        (airlift_core::battery::FULL_BATTERY - hours * DISCHARGE_VOLTS_PER_HOUR)
            .max(airlift_core::battery::EMPTY_BATTERY)
    }

    fn is_on_battery(&mut self) -> bool {
        self.on_battery
    }

    fn read_cpu_temperature(&mut self) -> f32 {
        self.rng.gen_range(25.0..32.0)
    }
}

/// Button held for one second out of every `BUTTON_PERIOD_SECS`.
const BUTTON_PERIOD_SECS: u64 = 45;

/// Status LED, button and LED ring of the simulated board.
pub struct SimBoard {
    time: VirtualTime,
    led: bool,
    show_ring: bool,
    frames: usize,
}

impl SimBoard {
    pub fn new(time: VirtualTime, show_ring: bool) -> Self {
        Self {
            time,
            led: false,
            show_ring,
            frames: 0,
        }
    }

    pub fn led(&self) -> bool {
        self.led
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl PanelHardware for SimBoard {
    fn write_status_led(&mut self, on: bool) {
        self.led = on;
    }

    fn button_pressed(&mut self) -> bool {
        let seconds = self.time.elapsed().as_secs();
        seconds > 0 && seconds % BUTTON_PERIOD_SECS == 0
    }

    async fn write_pixels(&mut self, pixels: &[Color]) {
        self.frames += 1;
        if self.show_ring {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if console::render_ring(&mut out, pixels, self.led).is_err() {
                self.show_ring = false;
            }
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use rand::SeedableRng;

    #[test]
    fn wall_clock_follows_virtual_time() {
        let time = VirtualTime::default();
        let mut clock = SimClock::new(time.clone());
        clock.set_wall_clock(DateTime::new(2024, 6, 1, 12, 0, 0));

        time.advance(Duration::from_secs(90));
        assert_eq!(clock.wall_clock(), DateTime::new(2024, 6, 1, 12, 1, 30));

        block_on(clock.sleep(Duration::from_secs(30)));
        assert_eq!(clock.wall_clock(), DateTime::new(2024, 6, 1, 12, 2, 0));
        assert_eq!(time.elapsed(), Duration::from_secs(120));
    }

    #[test]
    fn battery_discharges_and_mains_holds_steady() {
        let time = VirtualTime::default();
        let mut battery = SimSensors::new(time.clone(), true, StdRng::seed_from_u64(7));
        let mut mains = SimSensors::new(time.clone(), false, StdRng::seed_from_u64(7));

        let fresh = battery.read_voltage();
        time.advance(Duration::from_secs(3_600));
        assert!(battery.read_voltage() < fresh);
        assert!((mains.read_voltage() - 5.0).abs() < f32::EPSILON);

        time.advance(Duration::from_secs(100 * 3_600));
        assert!(
            (battery.read_voltage() - airlift_core::battery::EMPTY_BATTERY).abs() < f32::EPSILON
        );
    }

    #[test]
    fn button_is_pressed_once_per_period() {
        let time = VirtualTime::default();
        let mut board = SimBoard::new(time.clone(), false);
        assert!(!board.button_pressed());

        time.advance(Duration::from_secs(BUTTON_PERIOD_SECS));
        assert!(board.button_pressed());

        time.advance(Duration::from_secs(1));
        assert!(!board.button_pressed());
    }
}
