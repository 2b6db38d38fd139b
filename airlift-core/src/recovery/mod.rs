//! Connection-recovery loop and periodic telemetry scheduler.
//!
//! [`RecoveryLoop`] owns every collaborator and all mutable loop state. Each
//! [`RecoveryLoop::tick`] runs one iteration:
//!
//! 1. poll the link for inbound messages,
//! 2. advance and render the LED animation, honoring the button,
//! 3. fire the heartbeat and telemetry actions whose intervals elapsed.
//!
//! A recoverable link failure at any point ends the iteration with a resync
//! (reset transport, reconnect transport, reconnect session) and leaves the
//! interval timers untouched.

mod clock;

pub use clock::ClockSync;

use core::convert::Infallible;
use core::fmt;
use core::time::Duration;

use crate::config::{ButtonPolicy, ConfigError, LoopConfig, PowerProfile, ResyncPolicy};
use crate::link::{CloudLink, Feed, InboundMessage, LedCommand, LinkError, LinkFault};
use crate::log::{Level, LogSink, Logger};
use crate::panel::ActuatorPanel;
use crate::telemetry::{TelemetryProvider, TelemetrySample};
use crate::time::{MonotonicInstant, TimeSource};

/// Extra idle time past a deadline so the strict interval checks fire.
const IDLE_MARGIN: Duration = Duration::from_millis(1);

/// Observable link state of the loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Interval timers; both only ever move forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoopState<I> {
    pub last_telemetry: I,
    pub last_blink: I,
}

impl<I: MonotonicInstant> LoopState<I> {
    pub const fn new(now: I) -> Self {
        Self {
            last_telemetry: now,
            last_blink: now,
        }
    }
}

/// In-memory counters, reset only by a reboot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LoopStats {
    pub iterations: u32,
    pub publishes: u32,
    pub telemetry_cycles: u32,
    pub heartbeats: u32,
    pub inbound_messages: u32,
    pub recoverable_errors: u32,
    pub resyncs: u32,
    pub resync_failures: u32,
}

/// What happened during one iteration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    pub messages: usize,
    pub mode_toggled: bool,
    pub heartbeat: bool,
    pub telemetry: bool,
    pub resynced: bool,
    pub error: Option<LinkError>,
}

/// Reason the loop stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunError {
    /// Provisioning data was incomplete.
    Config(ConfigError),
    /// The initial connection could not be established.
    Startup(LinkError),
    /// A link call failed with a fatal error.
    Link(LinkError),
    /// Resynchronization failed under [`ResyncPolicy::FailFast`].
    ResyncFailed(LinkError),
}

impl From<ConfigError> for RunError {
    fn from(error: ConfigError) -> Self {
        RunError::Config(error)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(error) => write!(f, "configuration error: {error}"),
            RunError::Startup(error) => write!(f, "startup failed: {error}"),
            RunError::Link(error) => write!(f, "link failed: {error}"),
            RunError::ResyncFailed(error) => write!(f, "resync failed: {error}"),
        }
    }
}

/// The long-running control loop.
pub struct RecoveryLoop<T, P, A, L, S>
where
    T: TimeSource,
{
    time: T,
    sensors: P,
    panel: A,
    link: L,
    logger: Logger<S>,
    config: LoopConfig,
    state: LoopState<T::Instant>,
    connection: ConnectionState,
    stats: LoopStats,
    button_was_pressed: bool,
}

impl<T, P, A, L, S> RecoveryLoop<T, P, A, L, S>
where
    T: TimeSource,
    P: TelemetryProvider,
    A: ActuatorPanel,
    L: CloudLink,
    S: LogSink,
{
    pub fn new(time: T, sensors: P, panel: A, link: L, logger: Logger<S>, config: LoopConfig) -> Self {
        let state = LoopState::new(time.now());
        Self {
            time,
            sensors,
            panel,
            link,
            logger,
            config,
            state,
            connection: ConnectionState::Disconnected,
            stats: LoopStats::default(),
            button_was_pressed: false,
        }
    }

    /// Connects transport and session, announces the node and resets the
    /// interval timers to now.
    pub async fn start(&mut self) -> Result<(), RunError> {
        self.connection = ConnectionState::Connecting;

        self.log(Level::Info, "net", format_args!("Connecting to WiFi..."));
        if let Err(error) = self.link.connect_transport().await {
            return Err(self.startup_failed(error));
        }
        self.log(Level::Info, "net", format_args!("Connecting to broker..."));
        if let Err(error) = self.link.connect_session().await {
            return Err(self.startup_failed(error));
        }
        self.connection = ConnectionState::Connected;
        self.log(Level::Info, "net", format_args!("Connected"));

        if let Err(error) = self.announce().await {
            return Err(self.startup_failed(error));
        }

        self.state = LoopState::new(self.time.now());
        Ok(())
    }

    /// Runs one loop iteration.
    ///
    /// Recoverable link errors are absorbed by a resync and reported in the
    /// returned [`TickReport`]; only fatal conditions surface as `Err`.
    pub async fn tick(&mut self) -> Result<TickReport, RunError> {
        self.stats.iterations = self.stats.iterations.wrapping_add(1);
        let mut report = TickReport::default();

        if self.connection != ConnectionState::Connected {
            self.resync_with_policy().await?;
            report.resynced = self.connection == ConnectionState::Connected;
            return Ok(report);
        }

        match self.link.poll().await {
            Ok(inbox) => {
                report.messages = inbox.len();
                for message in &inbox {
                    self.handle_message(message);
                }
            }
            Err(error) => return self.recover("poll", error, report).await,
        }

        report.mode_toggled = self.animate().await;

        let now = self.time.now();
        if now.saturating_duration_since(self.state.last_blink) > self.config.heartbeat_interval {
            self.heartbeat().await;
            self.state.last_blink = now;
            report.heartbeat = true;
        }

        if now.saturating_duration_since(self.state.last_telemetry) > self.config.telemetry_interval {
            if let Err(error) = self.publish_telemetry().await {
                return self.recover("publish", error, report).await;
            }
            self.state.last_telemetry = self.time.now();
            report.telemetry = true;
        }

        Ok(report)
    }

    /// Resets the transport, reconnects transport and session, then
    /// republishes `connect` and requests the last `led` value.
    pub async fn resync(&mut self) -> Result<(), LinkError> {
        self.connection = ConnectionState::Connecting;
        self.stats.resyncs = self.stats.resyncs.wrapping_add(1);

        match self.reconnect().await {
            Ok(()) => {
                self.connection = ConnectionState::Connected;
                self.log(Level::Info, "net", format_args!("Reconnected"));
                Ok(())
            }
            Err(error) => {
                self.connection = ConnectionState::Disconnected;
                self.stats.resync_failures = self.stats.resync_failures.wrapping_add(1);
                Err(error)
            }
        }
    }

    /// The session restores its own subscriptions, so only the `connect`
    /// publish and the `led` replay are repeated.
    async fn reconnect(&mut self) -> Result<(), LinkError> {
        self.link.reset_transport().await?;
        self.link.connect_transport().await?;
        self.link.connect_session().await?;
        self.link.publish(Feed::Connect, "1").await?;
        self.replay_led().await
    }

    /// Starts the loop and runs it until a fatal error.
    pub async fn run(&mut self) -> Result<Infallible, RunError> {
        self.start().await?;
        self.init_clock().await;
        loop {
            self.tick().await?;
            if let Some(idle) = self.idle_budget() {
                self.time.sleep(idle).await;
            }
        }
    }

    /// Time to sleep after an iteration under [`PowerProfile::LowPower`].
    ///
    /// Returns the time until the nearer interval deadline, capped at
    /// `max_idle`. Always `None` for [`PowerProfile::Active`].
    pub fn idle_budget(&self) -> Option<Duration> {
        let PowerProfile::LowPower { max_idle } = self.config.power_profile else {
            return None;
        };

        let now = self.time.now();
        let until = |last: T::Instant, interval: Duration| {
            interval
                .saturating_sub(now.saturating_duration_since(last))
                .saturating_add(IDLE_MARGIN)
        };
        let heartbeat = until(self.state.last_blink, self.config.heartbeat_interval);
        let telemetry = until(self.state.last_telemetry, self.config.telemetry_interval);

        Some(heartbeat.min(telemetry).min(max_idle))
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn state(&self) -> &LoopState<T::Instant> {
        &self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn time(&self) -> &T {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut T {
        &mut self.time
    }

    pub fn sensors_mut(&mut self) -> &mut P {
        &mut self.sensors
    }

    pub fn panel(&self) -> &A {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut A {
        &mut self.panel
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn logger(&self) -> &Logger<S> {
        &self.logger
    }

    /// Publishes `connect`, subscribes to `led`, blinks the status LED and
    /// asks the broker to replay the last `led` value.
    async fn announce(&mut self) -> Result<(), LinkError> {
        self.link.publish(Feed::Connect, "1").await?;
        self.link.subscribe(Feed::Led).await?;
        self.log(Level::Info, "net", format_args!("Subscribed to {}", Feed::Led));
        self.replay_led().await
    }

    async fn replay_led(&mut self) -> Result<(), LinkError> {
        let blink = self.config.subscribe_blink;
        self.panel.set_status_led(false);
        self.time.sleep(blink).await;
        self.panel.set_status_led(true);
        self.time.sleep(blink).await;

        self.link.publish(Feed::LedGet, "").await
    }

    async fn resync_with_policy(&mut self) -> Result<(), RunError> {
        let Err(error) = self.resync().await else {
            return Ok(());
        };

        if !error.is_recoverable() {
            self.log(Level::Error, "net", format_args!("Resync aborted: {error}"));
            return Err(RunError::Link(error));
        }

        match self.config.resync_policy {
            ResyncPolicy::FailFast => {
                self.log(Level::Error, "net", format_args!("Resync failed: {error}"));
                Err(RunError::ResyncFailed(error))
            }
            ResyncPolicy::Retry => {
                self.log(
                    Level::Warning,
                    "net",
                    format_args!("Resync failed, retrying next iteration: {error}"),
                );
                Ok(())
            }
        }
    }

    async fn recover(
        &mut self,
        operation: &str,
        error: LinkError,
        mut report: TickReport,
    ) -> Result<TickReport, RunError> {
        report.error = Some(error);
        if !error.is_recoverable() {
            self.connection = ConnectionState::Disconnected;
            self.log(Level::Error, "loop", format_args!("{operation} failed: {error}"));
            return Err(RunError::Link(error));
        }

        self.stats.recoverable_errors = self.stats.recoverable_errors.wrapping_add(1);
        self.log(
            Level::Warning,
            "loop",
            format_args!("{operation} failed, resyncing: {error}"),
        );
        self.resync_with_policy().await?;
        report.resynced = self.connection == ConnectionState::Connected;
        Ok(report)
    }

    fn startup_failed(&mut self, error: LinkError) -> RunError {
        self.connection = ConnectionState::Disconnected;
        self.log(Level::Error, "net", format_args!("Startup failed: {error}"));
        RunError::Startup(error)
    }

    fn handle_message(&mut self, message: &InboundMessage) {
        self.stats.inbound_messages = self.stats.inbound_messages.wrapping_add(1);
        let payload = message.payload.as_str();
        self.log(
            Level::Info,
            "net",
            format_args!("New message on {}: {payload}", message.feed),
        );

        if message.feed != Feed::Led {
            return;
        }
        match LedCommand::parse(payload) {
            Some(command) => self.panel.set_status_led(command.is_on()),
            None => self.log(
                Level::Warning,
                "net",
                format_args!("Unexpected message on {} feed: {payload}", Feed::Led),
            ),
        }
    }

    async fn animate(&mut self) -> bool {
        self.panel.advance_animation();

        let pressed = self.panel.read_button();
        let toggle = match self.config.button_policy {
            ButtonPolicy::Level => pressed,
            ButtonPolicy::Edge => pressed && !self.button_was_pressed,
        };
        self.button_was_pressed = pressed;

        if toggle {
            let mode = self.panel.toggle_animation_mode();
            self.log(
                Level::Info,
                "panel",
                format_args!("Animation mode: {}", mode.label()),
            );
        }

        self.panel.render().await;
        toggle
    }

    async fn heartbeat(&mut self) {
        self.log(Level::Debug, "loop", format_args!("."));
        let lit = self.panel.status_led();
        self.panel.set_status_led(!lit);
        self.time.sleep(self.config.heartbeat_pulse).await;
        self.panel.set_status_led(lit);
        self.stats.heartbeats = self.stats.heartbeats.wrapping_add(1);
    }

    async fn publish_telemetry(&mut self) -> Result<(), LinkError> {
        let sample = TelemetrySample::capture(&mut self.sensors);
        let unrenderable = |_| LinkError::Fatal(LinkFault::Misconfigured);
        let temperature = sample.temperature_payload().map_err(unrenderable)?;
        let voltage = sample.voltage_payload().map_err(unrenderable)?;
        let battery = sample.battery_payload().map_err(unrenderable)?;

        self.log(
            Level::Info,
            "telemetry",
            format_args!("CPU temperature is {temperature} degrees C"),
        );

        for (feed, payload) in [
            (Feed::Temperature, &temperature),
            (Feed::Voltage, &voltage),
            (Feed::Battery, &battery),
        ] {
            self.link.publish(feed, payload).await?;
            self.stats.publishes = self.stats.publishes.wrapping_add(1);
        }

        self.stats.telemetry_cycles = self.stats.telemetry_cycles.wrapping_add(1);
        self.log(
            Level::Info,
            "telemetry",
            format_args!("Published voltage {voltage} V, battery {battery}"),
        );
        Ok(())
    }

    fn log(&mut self, level: Level, component: &str, message: fmt::Arguments<'_>) {
        let at = self.time.wall_clock();
        self.logger.log(at, level, component, message);
    }
}
