//! MQTT session task
//!
//! The publisher never touches the socket. It queues [`BrokerCommand`]s
//! through [`ChannelBroker`]; [`broker_task`] owns the TCP connection and the
//! `rust-mqtt` client and reports the session state back as
//! [`BrokerEvent`]s. Stop requests bypass the queue so a backlog of
//! publishes can never drop one.

use airwatch_core::config::BrokerConfig;
use airwatch_core::connectivity::BrokerEvent;
use airwatch_core::publisher::{BrokerClient, BrokerError, PAYLOAD_CAPACITY, TOPIC_CAPACITY};
use embassy_futures::select::{Either3, select3};
use embassy_net::dns::{self, DnsQueryType};
use embassy_net::tcp::{ConnectError, TcpSocket};
use embassy_net::{IpAddress, Ipv4Address, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heapless::{String, Vec};
use log::{debug, info, warn};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;
use thiserror_no_std::Error;

use crate::station::CONNECTIVITY;

const COMMAND_QUEUE_DEPTH: usize = 8;
const SOCKET_BUFFER_LEN: usize = 1024;
const MQTT_BUFFER_LEN: usize = 256;
const MQTT_MAX_PROPERTIES: usize = 5;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCommand {
    Start,
    Publish {
        topic: String<TOPIC_CAPACITY>,
        payload: Vec<u8, PAYLOAD_CAPACITY>,
    },
}

static COMMANDS: Channel<CriticalSectionRawMutex, BrokerCommand, COMMAND_QUEUE_DEPTH> =
    Channel::new();

/// Latched until the running session (or the next `Start`) consumes it.
static STOP_REQUESTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// [`BrokerClient`] that forwards every call to [`broker_task`].
///
/// Never waits: a full queue is reported as [`BrokerError::QueueFull`].
/// `stop` always lands.
#[derive(Debug, Default)]
pub struct ChannelBroker;

impl ChannelBroker {
    pub fn new() -> Self {
        Self
    }

    fn request(&self, command: BrokerCommand) -> Result<(), BrokerError> {
        COMMANDS.try_send(command).map_err(|_| BrokerError::QueueFull)
    }
}

impl BrokerClient for ChannelBroker {
    fn start(&mut self) {
        if let Err(e) = self.request(BrokerCommand::Start) {
            warn!("broker: start not queued: {}", e);
        }
    }

    fn stop(&mut self) {
        STOP_REQUESTED.signal(());
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut owned_topic = String::new();
        owned_topic
            .push_str(topic)
            .map_err(|_| BrokerError::Transport)?;
        let payload = Vec::from_slice(payload).map_err(|_| BrokerError::Transport)?;
        self.request(BrokerCommand::Publish {
            topic: owned_topic,
            payload,
        })
    }
}

#[derive(Error, Debug)]
enum SessionError {
    #[error("cannot resolve broker host: {0:?}")]
    Resolve(dns::Error),
    #[error("TCP connect failed: {0:?}")]
    Connect(ConnectError),
    #[error("MQTT error: {0:?}")]
    Mqtt(ReasonCode),
}

/// Runs one broker session per `Start` command, for ever.
#[embassy_executor::task]
pub async fn broker_task(stack: Stack<'static>, config: BrokerConfig<'static>) -> ! {
    loop {
        match COMMANDS.receive().await {
            BrokerCommand::Start => {
                // A stop that arrived with no session running is already satisfied.
                STOP_REQUESTED.reset();
                info!("broker: connecting to {}:{}", config.host, config.port);
                if let Err(e) = run_session(stack, &config).await {
                    warn!("broker: {}", e);
                    CONNECTIVITY.handle_broker_event(BrokerEvent::Error);
                }
                CONNECTIVITY.handle_broker_event(BrokerEvent::Disconnected);
                // Whatever was queued for the old session is stale.
                COMMANDS.clear();
            }
            BrokerCommand::Publish { topic, .. } => {
                debug!("broker: no session, dropping {}", topic.as_str())
            }
        }
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, SessionError> {
    if let Ok(address) = host.parse::<Ipv4Address>() {
        return Ok(IpAddress::Ipv4(address));
    }
    let addresses = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(SessionError::Resolve)?;
    addresses
        .first()
        .copied()
        .ok_or(SessionError::Resolve(dns::Error::Failed))
}

async fn run_session(stack: Stack<'static>, config: &BrokerConfig<'_>) -> Result<(), SessionError> {
    let address = resolve(stack, config.host).await?;

    let mut rx_buffer = [0u8; SOCKET_BUFFER_LEN];
    let mut tx_buffer = [0u8; SOCKET_BUFFER_LEN];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(SOCKET_TIMEOUT));
    socket
        .connect((address, config.port))
        .await
        .map_err(SessionError::Connect)?;

    let mut client_config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
    client_config.add_max_subscribe_qos(QualityOfService::QoS0);
    client_config.add_client_id(config.client_id);
    if let Some(username) = config.username {
        client_config.add_username(username);
    }
    if let Some(password) = config.password {
        client_config.add_password(password);
    }
    client_config.keep_alive = config.keep_alive_secs;
    client_config.max_packet_size = MQTT_BUFFER_LEN as u32;

    let mut write_buffer = [0u8; MQTT_BUFFER_LEN];
    let mut recv_buffer = [0u8; MQTT_BUFFER_LEN];
    let mut client = MqttClient::<_, MQTT_MAX_PROPERTIES, _>::new(
        socket,
        &mut write_buffer,
        MQTT_BUFFER_LEN,
        &mut recv_buffer,
        MQTT_BUFFER_LEN,
        client_config,
    );

    client.connect_to_broker().await.map_err(SessionError::Mqtt)?;
    CONNECTIVITY.handle_broker_event(BrokerEvent::Connected);

    let ping_every = Duration::from_secs(u64::from(config.keep_alive_secs / 2).max(1));
    let mut sent: u16 = 0;
    loop {
        match select3(
            STOP_REQUESTED.wait(),
            COMMANDS.receive(),
            Timer::after(ping_every),
        )
        .await
        {
            Either3::First(()) => {
                if let Err(e) = client.disconnect().await {
                    debug!("broker: disconnect: {:?}", e);
                }
                return Ok(());
            }
            Either3::Second(BrokerCommand::Publish { topic, payload }) => {
                client
                    .send_message(&topic, &payload, QualityOfService::QoS0, false)
                    .await
                    .map_err(SessionError::Mqtt)?;
                sent = sent.wrapping_add(1);
                CONNECTIVITY.handle_broker_event(BrokerEvent::Published { id: sent });
            }
            // The publisher only asks while it believes the broker is down.
            Either3::Second(BrokerCommand::Start) => {
                debug!("broker: session already up");
                CONNECTIVITY.handle_broker_event(BrokerEvent::Connected);
            }
            Either3::Third(()) => client.send_ping().await.map_err(SessionError::Mqtt)?,
        }
    }
}
