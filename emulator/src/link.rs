use std::time::Duration;

use airlift_core::link::{CloudLink, Feed, InboundMessage, Inbox, LinkError, LinkFault};
use rand::Rng;
use rand::rngs::StdRng;

use crate::sim::VirtualTime;

/// Unix time reported by the simulated network at virtual time zero.
pub const SIM_EPOCH_SECONDS: u64 = 1_700_000_000;

/// How long a poll blocks waiting for inbound traffic.
pub const POLL_WINDOW: Duration = Duration::from_secs(1);

const LED_MESSAGE_PERIOD_SECS: u64 = 75;
const OUTAGE_START: Duration = Duration::from_secs(120);
const OUTAGE_END: Duration = Duration::from_secs(200);

/// Fault behavior of the simulated network.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultProfile {
    /// Never fails.
    Steady,
    /// Random transient failures on every call.
    Flaky,
    /// Network down for a fixed window, healthy otherwise.
    Outage,
    /// Healthy network, board powered from USB.
    Mains,
}

impl FaultProfile {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("steady") {
            Ok(Self::Steady)
        } else if tag.eq_ignore_ascii_case("flaky") {
            Ok(Self::Flaky)
        } else if tag.eq_ignore_ascii_case("outage") {
            Ok(Self::Outage)
        } else if tag.eq_ignore_ascii_case("mains") {
            Ok(Self::Mains)
        } else {
            Err(format!("Unknown fault profile `{tag}`"))
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FaultProfile::Steady => "steady",
            FaultProfile::Flaky => "flaky",
            FaultProfile::Outage => "outage",
            FaultProfile::Mains => "mains",
        }
    }

    pub fn on_battery(self) -> bool {
        self != FaultProfile::Mains
    }

    fn failure_rate(self, operation: Operation) -> f64 {
        match (self, operation) {
            (FaultProfile::Flaky, Operation::Poll) => 0.05,
            (FaultProfile::Flaky, Operation::Publish) => 0.02,
            (FaultProfile::Flaky, Operation::Connect | Operation::Time) => 0.3,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    Connect,
    Poll,
    Publish,
    Time,
}

/// In-process broker and radio with scripted faults.
pub struct SimLink {
    profile: FaultProfile,
    time: VirtualTime,
    rng: StdRng,
    transport_up: bool,
    session_up: bool,
    subscribed_led: bool,
    led_replay_pending: bool,
    next_led_message: Duration,
    led_on: bool,
    published: usize,
}

impl SimLink {
    pub fn new(profile: FaultProfile, time: VirtualTime, rng: StdRng) -> Self {
        Self {
            profile,
            time,
            rng,
            transport_up: false,
            session_up: false,
            subscribed_led: false,
            led_replay_pending: false,
            next_led_message: Duration::from_secs(LED_MESSAGE_PERIOD_SECS),
            led_on: true,
            published: 0,
        }
    }

    pub fn published(&self) -> usize {
        self.published
    }

    fn in_outage(&self) -> bool {
        self.profile == FaultProfile::Outage
            && (OUTAGE_START..OUTAGE_END).contains(&self.time.elapsed())
    }

    fn check(&mut self, operation: Operation) -> Result<(), LinkError> {
        if self.in_outage() {
            self.session_up = false;
            return Err(LinkError::Recoverable(LinkFault::NetworkDown));
        }

        let rate = self.profile.failure_rate(operation);
        if rate > 0.0 && self.rng.gen_bool(rate) {
            let fault = match operation {
                Operation::Connect => LinkFault::NetworkDown,
                Operation::Poll => LinkFault::Timeout,
                Operation::Publish => LinkFault::Protocol,
                Operation::Time => LinkFault::MalformedResponse,
            };
            self.session_up = false;
            return Err(LinkError::Recoverable(fault));
        }
        Ok(())
    }

    fn require_session(&self) -> Result<(), LinkError> {
        if self.transport_up && self.session_up {
            Ok(())
        } else {
            Err(LinkError::Recoverable(LinkFault::NetworkDown))
        }
    }

    fn scheduled_led_message(&mut self) -> Option<InboundMessage> {
        if !self.subscribed_led {
            return None;
        }
        if self.led_replay_pending {
            self.led_replay_pending = false;
            return Some(InboundMessage::new(Feed::Led, led_payload(self.led_on)));
        }
        if self.time.elapsed() < self.next_led_message {
            return None;
        }

        self.next_led_message += Duration::from_secs(LED_MESSAGE_PERIOD_SECS);
        // Every fourth message is garbage to exercise the unexpected-payload path.
        if self.rng.gen_ratio(1, 4) {
            return Some(InboundMessage::new(Feed::Led, "TOGGLE"));
        }
        self.led_on = !self.led_on;
        Some(InboundMessage::new(Feed::Led, led_payload(self.led_on)))
    }
}

fn led_payload(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

impl CloudLink for SimLink {
    async fn connect_transport(&mut self) -> Result<(), LinkError> {
        self.time.advance(Duration::from_millis(1_500));
        self.check(Operation::Connect)?;
        self.transport_up = true;
        Ok(())
    }

    async fn connect_session(&mut self) -> Result<(), LinkError> {
        if !self.transport_up {
            return Err(LinkError::Recoverable(LinkFault::NetworkDown));
        }
        self.time.advance(Duration::from_millis(300));
        self.check(Operation::Connect)?;
        self.session_up = true;
        Ok(())
    }

    async fn reset_transport(&mut self) -> Result<(), LinkError> {
        self.transport_up = false;
        self.session_up = false;
        self.time.advance(Duration::from_millis(760));
        Ok(())
    }

    async fn poll(&mut self) -> Result<Inbox, LinkError> {
        self.time.advance(POLL_WINDOW);
        self.require_session()?;
        self.check(Operation::Poll)?;

        let mut inbox = Inbox::new();
        if let Some(message) = self.scheduled_led_message() {
            let _ = inbox.push(message);
        }
        Ok(inbox)
    }

    async fn publish(&mut self, feed: Feed, _payload: &str) -> Result<(), LinkError> {
        self.require_session()?;
        self.check(Operation::Publish)?;
        if feed == Feed::LedGet {
            self.led_replay_pending = true;
        }
        self.published += 1;
        Ok(())
    }

    async fn subscribe(&mut self, feed: Feed) -> Result<(), LinkError> {
        self.require_session()?;
        if feed == Feed::Led {
            self.subscribed_led = true;
        }
        Ok(())
    }

    async fn network_time(&mut self) -> Result<u64, LinkError> {
        self.check(Operation::Time)?;
        Ok(SIM_EPOCH_SECONDS + self.time.elapsed().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use rand::SeedableRng;

    fn connected(profile: FaultProfile, time: &VirtualTime) -> SimLink {
        let mut link = SimLink::new(profile, time.clone(), StdRng::seed_from_u64(1));
        block_on(link.connect_transport()).unwrap();
        block_on(link.connect_session()).unwrap();
        link
    }

    #[test]
    fn profiles_parse_case_insensitively() {
        assert_eq!(FaultProfile::from_tag("Flaky"), Ok(FaultProfile::Flaky));
        assert_eq!(FaultProfile::from_tag("mains"), Ok(FaultProfile::Mains));
        assert!(FaultProfile::from_tag("storm").is_err());
    }

    #[test]
    fn outage_window_drops_the_session() {
        let time = VirtualTime::default();
        let mut link = connected(FaultProfile::Outage, &time);
        assert!(block_on(link.poll()).is_ok());

        time.advance(OUTAGE_START);
        assert_eq!(
            block_on(link.poll()),
            Err(LinkError::Recoverable(LinkFault::NetworkDown))
        );
        assert!(block_on(link.connect_transport()).is_err());

        time.advance(OUTAGE_END);
        block_on(link.reset_transport()).unwrap();
        block_on(link.connect_transport()).unwrap();
        block_on(link.connect_session()).unwrap();
        assert!(block_on(link.poll()).is_ok());
    }

    #[test]
    fn led_get_replays_current_value() {
        let time = VirtualTime::default();
        let mut link = connected(FaultProfile::Steady, &time);
        block_on(link.subscribe(Feed::Led)).unwrap();
        block_on(link.publish(Feed::LedGet, "")).unwrap();

        let inbox = block_on(link.poll()).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].feed, Feed::Led);
        assert_eq!(inbox[0].payload.as_str(), "ON");
    }

    #[test]
    fn session_requires_transport() {
        let time = VirtualTime::default();
        let mut link = SimLink::new(FaultProfile::Steady, time, StdRng::seed_from_u64(1));
        assert!(block_on(link.connect_session()).is_err());
        assert!(block_on(link.publish(Feed::Connect, "1")).is_err());
    }

    #[test]
    fn network_time_tracks_virtual_clock() {
        let time = VirtualTime::default();
        let mut link = connected(FaultProfile::Steady, &time);
        let first = block_on(link.network_time()).unwrap();
        time.advance(Duration::from_secs(10));
        assert_eq!(block_on(link.network_time()).unwrap(), first + 10);
    }
}
