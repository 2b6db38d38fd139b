//! Clock abstractions shared by firmware and host targets.
//!
//! The recovery loop needs two notions of time: a monotonic instant for
//! interval scheduling and a wall-clock [`DateTime`] for log timestamps. The
//! wall clock may be wrong (or never set) without affecting scheduling, so the
//! two are kept separate behind [`TimeSource`].

use core::fmt;
use core::time::Duration;

/// Seconds in one hour, used when applying fixed timezone offsets.
pub const SECONDS_PER_HOUR: i64 = 60 * 60;

const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Trait implemented by monotonic instant wrappers used for interval timing.
pub trait MonotonicInstant: Copy + Ord {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Clock capability consumed by the recovery loop.
pub trait TimeSource {
    /// Monotonic timestamp type.
    type Instant: MonotonicInstant;

    /// Returns the current monotonic instant.
    fn now(&self) -> Self::Instant;

    /// Returns the current wall-clock reading.
    fn wall_clock(&self) -> DateTime;

    /// Replaces the wall-clock reading.
    fn set_wall_clock(&mut self, at: DateTime);

    /// Suspends the caller for at least `duration`.
    async fn sleep(&mut self, duration: Duration);
}

/// Day of week, Sunday first to match the RP2040 RTC numbering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    const fn from_index(index: i64) -> Self {
        match index {
            0 => Weekday::Sunday,
            1 => Weekday::Monday,
            2 => Weekday::Tuesday,
            3 => Weekday::Wednesday,
            4 => Weekday::Thursday,
            5 => Weekday::Friday,
            _ => Weekday::Saturday,
        }
    }
}

/// Broken-down civil time with one-second resolution.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// The Unix epoch, used as the wall clock before any synchronization.
    pub const EPOCH: Self = Self::new(1970, 1, 1, 0, 0, 0);

    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Converts Unix seconds into civil time.
    ///
    /// Times before the epoch clamp to [`DateTime::EPOCH`].
    #[must_use]
    pub fn from_unix(seconds: i64) -> Self {
        if seconds <= 0 {
            return Self::EPOCH;
        }

        let days = seconds.div_euclid(SECONDS_PER_DAY);
        let remainder = seconds.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);

        Self {
            year: u16::try_from(year).unwrap_or(u16::MAX),
            month,
            day,
            hour: (remainder / SECONDS_PER_HOUR) as u8,
            minute: ((remainder % SECONDS_PER_HOUR) / 60) as u8,
            second: (remainder % 60) as u8,
        }
    }

    /// Converts Unix seconds shifted by a whole-hour timezone offset.
    #[must_use]
    pub fn from_unix_with_offset(seconds: i64, utc_offset_hours: i8) -> Self {
        Self::from_unix(seconds.saturating_add(i64::from(utc_offset_hours) * SECONDS_PER_HOUR))
    }

    /// Returns the number of seconds since the Unix epoch.
    #[must_use]
    pub fn to_unix(&self) -> i64 {
        let days = days_from_civil(i64::from(self.year), self.month, self.day);
        days * SECONDS_PER_DAY
            + i64::from(self.hour) * SECONDS_PER_HOUR
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// Returns the day of the week.
    #[must_use]
    pub fn weekday(&self) -> Weekday {
        let days = days_from_civil(i64::from(self.year), self.month, self.day);
        // 1970-01-01 was a Thursday.
        Weekday::from_index((days + 4).rem_euclid(7))
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

// Howard Hinnant's days_from_civil / civil_from_days.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let year = year - i64::from(month <= 2);
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use heapless::String;

    #[test]
    fn epoch_and_known_instants_convert() {
        assert_eq!(DateTime::from_unix(0), DateTime::EPOCH);
        assert_eq!(
            DateTime::from_unix(951_782_400),
            DateTime::new(2000, 2, 29, 0, 0, 0)
        );
        assert_eq!(
            DateTime::from_unix(1_700_000_000),
            DateTime::new(2023, 11, 14, 22, 13, 20)
        );
    }

    #[test]
    fn unix_round_trip_preserves_leap_day() {
        let leap = DateTime::new(2024, 2, 29, 23, 59, 59);
        assert_eq!(DateTime::from_unix(leap.to_unix()), leap);
    }

    #[test]
    fn offset_moves_across_midnight() {
        // 2023-11-15 03:00:00 UTC is 2023-11-14 20:00:00 at UTC-7.
        let local = DateTime::from_unix_with_offset(1_700_017_200, -7);
        assert_eq!(local, DateTime::new(2023, 11, 14, 20, 0, 0));
    }

    #[test]
    fn weekday_matches_calendar() {
        assert_eq!(DateTime::EPOCH.weekday(), Weekday::Thursday);
        assert_eq!(DateTime::new(2026, 10, 18, 0, 0, 0).weekday(), Weekday::Sunday);
    }

    #[test]
    fn display_is_zero_padded() {
        let mut rendered: String<32> = String::new();
        write!(rendered, "{}", DateTime::new(2024, 3, 7, 5, 4, 9)).unwrap();
        assert_eq!(rendered.as_str(), "2024-03-07 05:04:09");
    }
}
