//! Loop cadence, policies and provisioning data.
//!
//! Everything here is plain data with `const` defaults so firmware can build
//! its configuration at compile time and the emulator can override single
//! fields from the command line.

use core::fmt;
use core::time::Duration;

/// Interval between telemetry publish cycles.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(30);
/// Interval between status LED heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// How long the status LED stays toggled during a heartbeat.
pub const DEFAULT_HEARTBEAT_PULSE: Duration = Duration::from_millis(500);
/// Off and on hold used when announcing a fresh subscription.
pub const DEFAULT_SUBSCRIBE_BLINK: Duration = Duration::from_millis(100);
/// Number of network time requests made at startup.
pub const DEFAULT_CLOCK_SYNC_ATTEMPTS: u8 = 3;
/// Base of the exponential clock-sync backoff.
pub const DEFAULT_CLOCK_SYNC_BACKOFF: Duration = Duration::from_secs(1);
/// Fixed offset applied to network time before setting the wall clock.
pub const DEFAULT_UTC_OFFSET_HOURS: i8 = -7;
/// Default MQTT broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Behavior when a resynchronization attempt itself fails.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResyncPolicy {
    /// Abort the loop with a fatal error.
    #[default]
    FailFast,
    /// Stay disconnected and resync again on the next iteration.
    Retry,
}

impl ResyncPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            ResyncPolicy::FailFast => "fail-fast",
            ResyncPolicy::Retry => "retry",
        }
    }
}

impl fmt::Display for ResyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a held button toggles the animation mode.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ButtonPolicy {
    /// Toggle on every iteration the button reads pressed.
    #[default]
    Level,
    /// Toggle once per press.
    Edge,
}

impl ButtonPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            ButtonPolicy::Level => "level",
            ButtonPolicy::Edge => "edge",
        }
    }
}

impl fmt::Display for ButtonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the loop idles between iterations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PowerProfile {
    /// Run iterations back to back; the link poll timeout paces the loop.
    #[default]
    Active,
    /// Sleep after each iteration until the next deadline, capped at `max_idle`.
    LowPower { max_idle: Duration },
}

/// Cadence and policy knobs for the recovery loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    pub telemetry_interval: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_pulse: Duration,
    pub subscribe_blink: Duration,
    pub clock_sync_attempts: u8,
    pub clock_sync_backoff: Duration,
    pub utc_offset_hours: i8,
    pub resync_policy: ResyncPolicy,
    pub button_policy: ButtonPolicy,
    pub power_profile: PowerProfile,
}

impl LoopConfig {
    pub const fn new() -> Self {
        Self {
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_pulse: DEFAULT_HEARTBEAT_PULSE,
            subscribe_blink: DEFAULT_SUBSCRIBE_BLINK,
            clock_sync_attempts: DEFAULT_CLOCK_SYNC_ATTEMPTS,
            clock_sync_backoff: DEFAULT_CLOCK_SYNC_BACKOFF,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            resync_policy: ResyncPolicy::FailFast,
            button_policy: ButtonPolicy::Level,
            power_profile: PowerProfile::Active,
        }
    }

    #[must_use]
    pub const fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_pulse(mut self, pulse: Duration) -> Self {
        self.heartbeat_pulse = pulse;
        self
    }

    #[must_use]
    pub const fn with_clock_sync(mut self, attempts: u8, backoff: Duration) -> Self {
        self.clock_sync_attempts = attempts;
        self.clock_sync_backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_utc_offset(mut self, hours: i8) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    #[must_use]
    pub const fn with_resync_policy(mut self, policy: ResyncPolicy) -> Self {
        self.resync_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_button_policy(mut self, policy: ButtonPolicy) -> Self {
        self.button_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_power_profile(mut self, profile: PowerProfile) -> Self {
        self.power_profile = profile;
        self
    }

    /// Delay before the clock-sync attempt following failed attempt `attempt`
    /// (1-based): `backoff * 2^(attempt - 1)`.
    pub fn clock_sync_delay(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(16);
        self.clock_sync_backoff.saturating_mul(1 << shift)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised while validating provisioning data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// A required field was empty.
    MissingField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingField(field) => write!(f, "missing {field}"),
        }
    }
}

/// Pre-provisioned WiFi and cloud-service secrets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Credentials<'a> {
    pub wifi_ssid: &'a str,
    pub wifi_password: &'a str,
    pub io_username: &'a str,
    pub io_key: &'a str,
}

impl<'a> Credentials<'a> {
    pub const fn new(
        wifi_ssid: &'a str,
        wifi_password: &'a str,
        io_username: &'a str,
        io_key: &'a str,
    ) -> Self {
        Self {
            wifi_ssid,
            wifi_password,
            io_username,
            io_key,
        }
    }

    /// Ensures every field is populated. The WiFi password may be empty for
    /// open networks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi_ssid.is_empty() {
            return Err(ConfigError::MissingField("wifi ssid"));
        }
        if self.io_username.is_empty() {
            return Err(ConfigError::MissingField("io username"));
        }
        if self.io_key.is_empty() {
            return Err(ConfigError::MissingField("io key"));
        }
        Ok(())
    }
}

/// MQTT broker endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
}

impl<'a> BrokerConfig<'a> {
    pub const fn new(host: &'a str, client_id: &'a str) -> Self {
        Self {
            host,
            port: DEFAULT_BROKER_PORT,
            client_id,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("broker host"));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField("client id"));
        }
        Ok(())
    }
}
