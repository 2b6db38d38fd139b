//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use airlift_core::config::LoopConfig;
use airlift_core::link::{CloudLink, Feed, InboundMessage, Inbox, LinkError, LinkFault};
use airlift_core::log::{LogSink, Logger};
use airlift_core::panel::{Color, PanelHardware, RingPanel};
use airlift_core::recovery::RecoveryLoop;
use airlift_core::telemetry::TelemetryProvider;
use airlift_core::time::{DateTime, MonotonicInstant, TimeSource};
use rand::rngs::mock::StepRng;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockInstant(pub u64);

impl MonotonicInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Clock that only moves when a test advances it or the loop sleeps.
#[derive(Debug)]
pub struct ManualClock {
    now_us: u64,
    wall: DateTime,
    pub sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(wall: DateTime) -> Self {
        Self {
            now_us: 0,
            wall,
            sleeps: Vec::new(),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now_us += u64::try_from(by.as_micros()).expect("duration fits in u64");
    }
}

impl TimeSource for ManualClock {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        MockInstant(self.now_us)
    }

    fn wall_clock(&self) -> DateTime {
        self.wall
    }

    fn set_wall_clock(&mut self, at: DateTime) {
        self.wall = at;
    }

    async fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.advance(duration);
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FixedSensors {
    pub voltage: f32,
    pub on_battery: bool,
    pub temperature: f32,
}

impl Default for FixedSensors {
    fn default() -> Self {
        Self {
            voltage: 4.0,
            on_battery: true,
            temperature: 27.129,
        }
    }
}

impl TelemetryProvider for FixedSensors {
    fn read_voltage(&mut self) -> f32 {
        self.voltage
    }

    fn is_on_battery(&mut self) -> bool {
        self.on_battery
    }

    fn read_cpu_temperature(&mut self) -> f32 {
        self.temperature
    }
}

/// Panel hardware that records every status LED write and rendered frame.
#[derive(Debug, Default)]
pub struct RecordingHardware {
    pub led_writes: Vec<bool>,
    pub pressed: bool,
    pub frames: Vec<Vec<Color>>,
}

impl PanelHardware for RecordingHardware {
    fn write_status_led(&mut self, on: bool) {
        self.led_writes.push(on);
    }

    fn button_pressed(&mut self) -> bool {
        self.pressed
    }

    async fn write_pixels(&mut self, pixels: &[Color]) {
        self.frames.push(pixels.to_vec());
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    ConnectTransport,
    ConnectSession,
    ResetTransport,
    Poll,
    Publish(Feed),
    Subscribe(Feed),
    NetworkTime,
}

/// Link whose failures are queued up front; every call is logged.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    pub calls: Vec<Call>,
    pub published: Vec<(Feed, String)>,
    pub polls: VecDeque<Result<Inbox, LinkError>>,
    pub connect_transport_errors: VecDeque<LinkError>,
    pub connect_session_errors: VecDeque<LinkError>,
    pub reset_errors: VecDeque<LinkError>,
    pub publish_errors: VecDeque<LinkError>,
    pub times: VecDeque<Result<u64, LinkError>>,
}

impl ScriptedLink {
    pub fn fail_next_poll(&mut self, error: LinkError) {
        self.polls.push_back(Err(error));
    }

    pub fn deliver(&mut self, feed: Feed, payload: &str) {
        let mut inbox = Inbox::new();
        inbox
            .push(InboundMessage::new(feed, payload))
            .expect("inbox has room");
        self.polls.push_back(Ok(inbox));
    }

    pub fn published_feeds(&self) -> Vec<Feed> {
        self.published.iter().map(|(feed, _)| *feed).collect()
    }

    pub fn payload_for(&self, feed: Feed) -> Option<&str> {
        self.published
            .iter()
            .rev()
            .find(|(published, _)| *published == feed)
            .map(|(_, payload)| payload.as_str())
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|seen| **seen == call).count()
    }
}

fn pop_error(queue: &mut VecDeque<LinkError>) -> Result<(), LinkError> {
    match queue.pop_front() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

impl CloudLink for ScriptedLink {
    async fn connect_transport(&mut self) -> Result<(), LinkError> {
        self.calls.push(Call::ConnectTransport);
        pop_error(&mut self.connect_transport_errors)
    }

    async fn connect_session(&mut self) -> Result<(), LinkError> {
        self.calls.push(Call::ConnectSession);
        pop_error(&mut self.connect_session_errors)
    }

    async fn reset_transport(&mut self) -> Result<(), LinkError> {
        self.calls.push(Call::ResetTransport);
        pop_error(&mut self.reset_errors)
    }

    async fn poll(&mut self) -> Result<Inbox, LinkError> {
        self.calls.push(Call::Poll);
        self.polls.pop_front().unwrap_or_else(|| Ok(Inbox::new()))
    }

    async fn publish(&mut self, feed: Feed, payload: &str) -> Result<(), LinkError> {
        self.calls.push(Call::Publish(feed));
        pop_error(&mut self.publish_errors)?;
        self.published.push((feed, payload.to_owned()));
        Ok(())
    }

    async fn subscribe(&mut self, feed: Feed) -> Result<(), LinkError> {
        self.calls.push(Call::Subscribe(feed));
        Ok(())
    }

    async fn network_time(&mut self) -> Result<u64, LinkError> {
        self.calls.push(Call::NetworkTime);
        self.times
            .pop_front()
            .unwrap_or(Err(LinkError::Recoverable(LinkFault::Timeout)))
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl MemorySink {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

pub const START_WALL_CLOCK: DateTime = DateTime::new(2024, 1, 1, 0, 0, 0);

pub type TestPanel = RingPanel<RecordingHardware, StepRng, 4>;
pub type TestLoop = RecoveryLoop<ManualClock, FixedSensors, TestPanel, ScriptedLink, MemorySink>;

pub fn build_loop(config: LoopConfig, sensors: FixedSensors) -> TestLoop {
    RecoveryLoop::new(
        ManualClock::new(START_WALL_CLOCK),
        sensors,
        RingPanel::new(RecordingHardware::default(), StepRng::new(0, 1)),
        ScriptedLink::default(),
        Logger::new(MemorySink::default()),
        config,
    )
}

/// Builds and starts a loop, then clears the startup call log and sleeps.
pub fn started_loop(config: LoopConfig, sensors: FixedSensors) -> TestLoop {
    let mut node = build_loop(config, sensors);
    embassy_futures::block_on(node.start()).expect("scripted startup succeeds");
    node.link_mut().calls.clear();
    node.link_mut().published.clear();
    node.time_mut().sleeps.clear();
    node
}
