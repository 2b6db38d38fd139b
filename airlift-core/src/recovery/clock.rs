//! Startup wall-clock synchronization from network time.

use crate::link::CloudLink;
use crate::log::{Level, LogSink};
use crate::panel::ActuatorPanel;
use crate::telemetry::TelemetryProvider;
use crate::time::{DateTime, TimeSource};

use super::RecoveryLoop;

/// Outcome of [`RecoveryLoop::init_clock`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockSync {
    /// Wall clock set to the contained local time.
    Synced(DateTime),
    /// Every attempt failed; the wall clock was left untouched.
    Failed { attempts: u8 },
}

impl<T, P, A, L, S> RecoveryLoop<T, P, A, L, S>
where
    T: TimeSource,
    P: TelemetryProvider,
    A: ActuatorPanel,
    L: CloudLink,
    S: LogSink,
{
    /// Sets the wall clock from network time shifted by the configured
    /// timezone offset.
    ///
    /// Makes up to `clock_sync_attempts` requests. A failed attempt that is
    /// followed by another waits `backoff * 2^(attempt - 1)` first; no sleep
    /// follows the last attempt, so three attempts wait 1 and 2 backoff
    /// units and never reach the 4-unit step. Failure is never fatal.
    pub async fn init_clock(&mut self) -> ClockSync {
        let attempts = self.config.clock_sync_attempts.max(1);

        for attempt in 1..=attempts {
            match self.link.network_time().await {
                Ok(seconds) => {
                    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
                    let local = DateTime::from_unix_with_offset(seconds, self.config.utc_offset_hours);
                    self.time.set_wall_clock(local);
                    self.log(Level::Info, "clock", format_args!("Current time: {local}"));
                    return ClockSync::Synced(local);
                }
                Err(error) => {
                    self.log(
                        Level::Warning,
                        "clock",
                        format_args!("Error getting current time ({attempt}/{attempts}): {error}"),
                    );
                    if attempt < attempts {
                        let delay = self.config.clock_sync_delay(attempt);
                        self.time.sleep(delay).await;
                    }
                }
            }
        }

        let kept = self.time.wall_clock();
        self.log(
            Level::Warning,
            "clock",
            format_args!("Clock not synchronized, keeping {kept}"),
        );
        ClockSync::Failed { attempts }
    }
}
