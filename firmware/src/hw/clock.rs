use core::time::Duration;

use airlift_core::time::{DateTime, MonotonicInstant, TimeSource, Weekday};
use embassy_rp::peripherals::RTC;
use embassy_rp::rtc::{self, DayOfWeek, Rtc};
use embassy_time::{Instant, Timer};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct BoardInstant(Instant);

impl MonotonicInstant for BoardInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Embassy timer for scheduling, RP2040 RTC for the wall clock.
///
/// Until the RTC is set the wall clock reads as uptime since the epoch.
pub struct RtcClock {
    rtc: Rtc<'static, RTC>,
}

impl RtcClock {
    pub fn new(rtc: Rtc<'static, RTC>) -> Self {
        Self { rtc }
    }
}

impl TimeSource for RtcClock {
    type Instant = BoardInstant;

    fn now(&self) -> BoardInstant {
        BoardInstant(Instant::now())
    }

    fn wall_clock(&self) -> DateTime {
        match self.rtc.now() {
            Ok(now) => DateTime::new(now.year, now.month, now.day, now.hour, now.minute, now.second),
            Err(_) => {
                let uptime = i64::try_from(Instant::now().as_secs()).unwrap_or(i64::MAX);
                DateTime::from_unix(uptime)
            }
        }
    }

    fn set_wall_clock(&mut self, at: DateTime) {
        let value = rtc::DateTime {
            year: at.year,
            month: at.month,
            day: at.day,
            day_of_week: day_of_week(at.weekday()),
            hour: at.hour,
            minute: at.minute,
            second: at.second,
        };
        if self.rtc.set_datetime(value).is_err() {
            defmt::warn!("rtc rejected {=u16}-{=u8}-{=u8}", at.year, at.month, at.day);
        }
    }

    async fn sleep(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Timer::after(embassy_time::Duration::from_micros(micros)).await;
    }
}

fn day_of_week(weekday: Weekday) -> DayOfWeek {
    match weekday {
        Weekday::Sunday => DayOfWeek::Sunday,
        Weekday::Monday => DayOfWeek::Monday,
        Weekday::Tuesday => DayOfWeek::Tuesday,
        Weekday::Wednesday => DayOfWeek::Wednesday,
        Weekday::Thursday => DayOfWeek::Thursday,
        Weekday::Friday => DayOfWeek::Friday,
        Weekday::Saturday => DayOfWeek::Saturday,
    }
}
