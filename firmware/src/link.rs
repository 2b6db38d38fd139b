//! MQTT session over the co-processor, exposed as a [`CloudLink`].

use airlift_core::link::{
    CloudLink, Feed, InboundMessage, Inbox, LinkError, LinkFault, TOPIC_CAPACITY, feed_topic,
};
use embassy_time::{Duration, Instant, Timer};
use heapless::{String, Vec};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

use crate::config::Provisioning;
use crate::radio::frame::{FrameError, WifiStatus};
use crate::radio::{NinaSocket, RadioError, SharedRadio};

const MQTT_BUFFER: usize = 1024;
const MAX_PROPERTIES: usize = 5;
const KEEP_ALIVE_SECS: u16 = 60;

/// How long one poll waits for an inbound publish.
pub const POLL_WINDOW: Duration = Duration::from_millis(250);
/// Half the keep-alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);
const DATA_POLL: Duration = Duration::from_millis(25);

const FEEDS: [Feed; 6] = [
    Feed::Connect,
    Feed::Temperature,
    Feed::Voltage,
    Feed::Battery,
    Feed::LedGet,
    Feed::Led,
];

static mut SEND_BUFFER: [u8; MQTT_BUFFER] = [0; MQTT_BUFFER];
static mut RECV_BUFFER: [u8; MQTT_BUFFER] = [0; MQTT_BUFFER];

type Client = MqttClient<'static, NinaSocket, MAX_PROPERTIES, CountingRng>;

/// Every feed topic for one account, built once at startup.
pub struct Topics {
    topics: Vec<(Feed, String<TOPIC_CAPACITY>), 6>,
}

impl Topics {
    pub fn new(username: &str) -> Result<Self, LinkError> {
        let mut topics = Vec::new();
        for feed in FEEDS {
            let topic = feed_topic(username, feed)?;
            topics
                .push((feed, topic))
                .map_err(|_| LinkError::Fatal(LinkFault::Misconfigured))?;
        }
        Ok(Self { topics })
    }

    fn get(&self, feed: Feed) -> &str {
        self.topics
            .iter()
            .find(|(candidate, _)| *candidate == feed)
            .map_or("", |(_, topic)| topic.as_str())
    }
}

pub struct MqttLink {
    radio: &'static SharedRadio,
    provisioning: Provisioning,
    topics: &'static Topics,
    client: Option<Client>,
    socket: Option<u8>,
    subscriptions: Vec<Feed, 2>,
    last_ping: Instant,
}

impl MqttLink {
    pub fn new(radio: &'static SharedRadio, provisioning: Provisioning, topics: &'static Topics) -> Self {
        Self {
            radio,
            provisioning,
            topics,
            client: None,
            socket: None,
            subscriptions: Vec::new(),
            last_ping: Instant::now(),
        }
    }

    fn client(&mut self) -> Result<&mut Client, LinkError> {
        self.client
            .as_mut()
            .ok_or(LinkError::Recoverable(LinkFault::NetworkDown))
    }

    /// Polls the socket until bytes are buffered or [`POLL_WINDOW`] has
    /// passed. Every radio command runs to completion; only the sleeps
    /// between them bound the wait.
    async fn wait_for_data(&mut self) -> Result<bool, LinkError> {
        let socket = self
            .socket
            .ok_or(LinkError::Recoverable(LinkFault::NetworkDown))?;
        let deadline = Instant::now() + POLL_WINDOW;
        loop {
            let available = self
                .radio
                .lock()
                .await
                .available(socket)
                .await
                .map_err(radio_fault)?;
            if available > 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            Timer::after(DATA_POLL).await;
        }
    }

    async fn drop_session(&mut self) {
        self.client = None;
        if let Some(socket) = self.socket.take() {
            let _ = self.radio.lock().await.stop_client(socket).await;
        }
    }
}

impl CloudLink for MqttLink {
    async fn connect_transport(&mut self) -> Result<(), LinkError> {
        let credentials = self.provisioning.credentials;
        let mut radio = self.radio.lock().await;
        if radio.status().await.map_err(radio_fault)? == WifiStatus::Connected {
            return Ok(());
        }
        defmt::info!("joining {=str}", credentials.wifi_ssid);
        radio
            .associate(credentials.wifi_ssid, credentials.wifi_password)
            .await
            .map_err(radio_fault)
    }

    async fn connect_session(&mut self) -> Result<(), LinkError> {
        self.drop_session().await;

        let broker = self.provisioning.broker;
        let credentials = self.provisioning.credentials;
        let topics = self.topics;

        let ip = self
            .radio
            .lock()
            .await
            .host_by_name(broker.host)
            .await
            .map_err(radio_fault)?;
        let transport = NinaSocket::connect(self.radio, ip, broker.port)
            .await
            .map_err(radio_fault)?;
        self.socket = Some(transport.id());

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(0));
        config.add_client_id(broker.client_id);
        config.keep_alive = KEEP_ALIVE_SECS;
        config.add_username(credentials.io_username);
        config.add_password(credentials.io_key);

        // SAFETY: the only other borrower of the buffers is the previous
        // client, dropped by `drop_session` above.
        let (send, recv) = unsafe { (&mut SEND_BUFFER, &mut RECV_BUFFER) };
        let (send_len, recv_len) = (send.len(), recv.len());
        let mut client = MqttClient::<_, MAX_PROPERTIES, _>::new(
            transport, send, send_len, recv, recv_len, config,
        );

        client.connect_to_broker().await.map_err(mqtt_fault)?;
        for feed in &self.subscriptions {
            client
                .subscribe_to_topic(topics.get(*feed))
                .await
                .map_err(mqtt_fault)?;
        }

        defmt::info!("mqtt session open on {=str}:{=u16}", broker.host, broker.port);
        self.client = Some(client);
        self.last_ping = Instant::now();
        Ok(())
    }

    async fn reset_transport(&mut self) -> Result<(), LinkError> {
        self.client = None;
        self.socket = None;
        self.radio.lock().await.reset().await;
        Ok(())
    }

    async fn poll(&mut self) -> Result<Inbox, LinkError> {
        if self.last_ping.elapsed() >= PING_INTERVAL {
            self.client()?.send_ping().await.map_err(mqtt_fault)?;
            self.last_ping = Instant::now();
        }

        let mut inbox = Inbox::new();
        if !self.wait_for_data().await? {
            return Ok(inbox);
        }

        let (topic, payload) = self
            .client()?
            .receive_message()
            .await
            .map_err(mqtt_fault)?;
        match (Feed::from_topic(topic), core::str::from_utf8(payload)) {
            (Some(feed), Ok(text)) => {
                let _ = inbox.push(InboundMessage::new(feed, text));
            }
            _ => defmt::warn!("ignoring message on {=str}", topic),
        }
        Ok(inbox)
    }

    async fn publish(&mut self, feed: Feed, payload: &str) -> Result<(), LinkError> {
        let topics = self.topics;
        let topic = topics.get(feed);
        let client = self.client()?;
        match client
            .send_message(topic, payload.as_bytes(), QualityOfService::QoS0, false)
            .await
        {
            Ok(()) | Err(ReasonCode::NoMatchingSubscribers) => Ok(()),
            Err(code) => Err(mqtt_fault(code)),
        }
    }

    async fn subscribe(&mut self, feed: Feed) -> Result<(), LinkError> {
        let topics = self.topics;
        let topic = topics.get(feed);
        self.client()?
            .subscribe_to_topic(topic)
            .await
            .map_err(mqtt_fault)?;
        if !self.subscriptions.contains(&feed) {
            let _ = self.subscriptions.push(feed);
        }
        Ok(())
    }

    async fn network_time(&mut self) -> Result<u64, LinkError> {
        self.radio
            .lock()
            .await
            .network_time()
            .await
            .map_err(radio_fault)
    }
}

fn radio_fault(error: RadioError) -> LinkError {
    match error {
        RadioError::Frame(FrameError::ParamTooLong) => LinkError::Fatal(LinkFault::Misconfigured),
        RadioError::Frame(_) | RadioError::BadReply(_) => {
            LinkError::Recoverable(LinkFault::MalformedResponse)
        }
        RadioError::NotReady | RadioError::ConnectTimeout => {
            LinkError::Recoverable(LinkFault::Timeout)
        }
        RadioError::Bus => LinkError::Recoverable(LinkFault::Hardware),
        RadioError::NoSocket => LinkError::Recoverable(LinkFault::SocketUnavailable),
        RadioError::Rejected(_) | RadioError::Association(_) | RadioError::Closed => {
            LinkError::Recoverable(LinkFault::NetworkDown)
        }
    }
}

fn mqtt_fault(code: ReasonCode) -> LinkError {
    match code {
        ReasonCode::BadUserNameOrPassword
        | ReasonCode::NotAuthorized
        | ReasonCode::ClientIdNotValid
        | ReasonCode::Banned
        | ReasonCode::UnsupportedProtocolVersion => LinkError::Fatal(LinkFault::BrokerRejected),
        ReasonCode::ServerUnavailable | ReasonCode::ServerBusy => {
            LinkError::Recoverable(LinkFault::BrokerRejected)
        }
        ReasonCode::NetworkError => LinkError::Recoverable(LinkFault::NetworkDown),
        _ => LinkError::Recoverable(LinkFault::Protocol),
    }
}
