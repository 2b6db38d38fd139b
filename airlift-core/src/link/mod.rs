//! Cloud pub/sub capability and its error taxonomy.
//!
//! [`CloudLink`] hides the radio, the TCP socket and the MQTT session behind
//! a handful of async calls. Every call reports failures as a [`LinkError`];
//! the recovery loop resynchronizes on [`LinkError::Recoverable`] and stops
//! on [`LinkError::Fatal`].

use core::fmt::{self, Write};

use heapless::{String, Vec};

/// Capacity of a full MQTT topic such as `user/feeds/led/get`.
pub const TOPIC_CAPACITY: usize = 64;
/// Capacity of an inbound message payload.
pub const INBOUND_PAYLOAD_CAPACITY: usize = 32;
/// Maximum messages drained by a single poll.
pub const INBOX_CAPACITY: usize = 4;

/// Named feeds the node publishes or subscribes to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Feed {
    Connect,
    Temperature,
    Voltage,
    Battery,
    LedGet,
    Led,
}

impl Feed {
    pub const fn as_str(self) -> &'static str {
        match self {
            Feed::Connect => "connect",
            Feed::Temperature => "temperature",
            Feed::Voltage => "voltage",
            Feed::Battery => "battery",
            Feed::LedGet => "led/get",
            Feed::Led => "led",
        }
    }

    /// Resolves a feed from its name.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Feed::Connect,
            Feed::Temperature,
            Feed::Voltage,
            Feed::Battery,
            Feed::LedGet,
            Feed::Led,
        ]
        .into_iter()
        .find(|feed| feed.as_str() == name)
    }

    /// Resolves a feed from a full `<username>/feeds/<feed>` topic.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let (_, name) = topic.split_once("/feeds/")?;
        Self::from_name(name)
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the MQTT topic for `feed` owned by `username`.
pub fn feed_topic(username: &str, feed: Feed) -> Result<String<TOPIC_CAPACITY>, LinkError> {
    let mut topic = String::new();
    write!(topic, "{username}/feeds/{}", feed.as_str())
        .map_err(|_| LinkError::Fatal(LinkFault::Misconfigured))?;
    Ok(topic)
}

/// Underlying cause of a link failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkFault {
    NetworkDown,
    Timeout,
    Protocol,
    MalformedResponse,
    BrokerRejected,
    SocketUnavailable,
    Misconfigured,
    Hardware,
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkFault::NetworkDown => "network down",
            LinkFault::Timeout => "timeout",
            LinkFault::Protocol => "protocol error",
            LinkFault::MalformedResponse => "malformed response",
            LinkFault::BrokerRejected => "broker rejected request",
            LinkFault::SocketUnavailable => "no socket available",
            LinkFault::Misconfigured => "misconfigured",
            LinkFault::Hardware => "hardware failure",
        };
        f.write_str(label)
    }
}

/// Classified failure of a [`CloudLink`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    /// Transient; the loop resets the transport and reconnects.
    Recoverable(LinkFault),
    /// Permanent; the loop stops.
    Fatal(LinkFault),
}

impl LinkError {
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, LinkError::Recoverable(_))
    }

    pub const fn fault(&self) -> LinkFault {
        match self {
            LinkError::Recoverable(fault) | LinkError::Fatal(fault) => *fault,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Recoverable(fault) => write!(f, "recoverable: {fault}"),
            LinkError::Fatal(fault) => write!(f, "fatal: {fault}"),
        }
    }
}

/// Message delivered on a subscribed feed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundMessage {
    pub feed: Feed,
    pub payload: String<INBOUND_PAYLOAD_CAPACITY>,
}

impl InboundMessage {
    /// Builds a message, truncating payloads beyond the inbound capacity.
    pub fn new(feed: Feed, payload: &str) -> Self {
        let mut text = String::new();
        for ch in payload.chars() {
            if text.push(ch).is_err() {
                break;
            }
        }
        Self {
            feed,
            payload: text,
        }
    }
}

/// Messages collected by one poll.
pub type Inbox = Vec<InboundMessage, INBOX_CAPACITY>;

/// Command carried on the `led` feed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LedCommand {
    On,
    Off,
}

impl LedCommand {
    /// Parses `ON` / `OFF`; anything else yields `None`.
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "ON" => Some(LedCommand::On),
            "OFF" => Some(LedCommand::Off),
            _ => None,
        }
    }

    pub const fn is_on(self) -> bool {
        matches!(self, LedCommand::On)
    }
}

/// Network and pub/sub capability consumed by the recovery loop.
pub trait CloudLink {
    /// Brings the network transport up (WiFi association).
    async fn connect_transport(&mut self) -> Result<(), LinkError>;

    /// Opens the pub/sub session and restores previous subscriptions.
    async fn connect_session(&mut self) -> Result<(), LinkError>;

    /// Drops the session and power-cycles the transport.
    async fn reset_transport(&mut self) -> Result<(), LinkError>;

    /// Services the session and returns any messages received.
    async fn poll(&mut self) -> Result<Inbox, LinkError>;

    async fn publish(&mut self, feed: Feed, payload: &str) -> Result<(), LinkError>;

    async fn subscribe(&mut self, feed: Feed) -> Result<(), LinkError>;

    /// Returns the current Unix time in seconds as seen by the network.
    async fn network_time(&mut self) -> Result<u64, LinkError>;
}
