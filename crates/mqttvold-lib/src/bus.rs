//! MQTT transport: connect, (re)subscribe, forward publishes to the consumer.
//!
//! The transport runs on its own thread and is the only producer on the
//! channel; the daemon's main loop is the only consumer, so rotary events
//! reach the volume engine strictly one at a time and in order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::Sender;
use rumqttc::{
    Client, Connection, ConnectionError, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet,
    QoS, SubscribeFilter,
};

use crate::config::Config;
use crate::reconnect::ReconnectState;

/// Capacity of the request channel between [`Client`] and the event loop.
const REQUEST_CAPACITY: usize = 10;

/// Granularity at which sleeping loops check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum BusError {
    /// The client could not queue a request to the event loop.
    Client(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Client(e) => write!(f, "MQTT client error: {e}"),
        }
    }
}

impl std::error::Error for BusError {}

pub type Result<T> = std::result::Result<T, BusError>;

/// A publish received on one of the subscribed topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Subscribes topics on the live connection.
///
/// Called from the event-loop thread itself, so it must never wait for the
/// request queue to drain.
pub trait Subscriber {
    fn subscribe_topics(&mut self, topics: &[String]) -> Result<()>;
}

impl Subscriber for Client {
    fn subscribe_topics(&mut self, topics: &[String]) -> Result<()> {
        let filters = topics
            .iter()
            .map(|t| SubscribeFilter::new(t.clone(), QoS::AtMostOnce));
        self.try_subscribe_many(filters)
            .map_err(|e| BusError::Client(e.to_string()))
    }
}

/// Build broker options from config.
pub fn mqtt_options(config: &Config) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.effective_client_id(),
        config.mqtt_server.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    // Subscriptions do not survive a reconnect; they are re-sent on every ConnAck.
    options.set_clean_session(true);
    options
}

/// Create the client/connection pair. No network I/O happens until the
/// connection is polled.
pub fn connect(config: &Config) -> (Client, Connection) {
    Client::new(mqtt_options(config), REQUEST_CAPACITY)
}

/// Result of handling one event-loop notification.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// A publish to hand to the consumer.
    Message(Inbound),
    /// Nothing for the consumer.
    Continue,
    /// The connection failed; wait this long before polling again.
    Backoff(Duration),
}

/// Connection bookkeeping between event-loop notifications.
pub struct Transport<S: Subscriber> {
    subscriber: S,
    topics: Vec<String>,
    reconnect: ReconnectState,
    connected: bool,
}

impl<S: Subscriber> Transport<S> {
    pub fn new(subscriber: S, topics: Vec<String>, reconnect_delay: Duration) -> Self {
        Self {
            subscriber,
            topics,
            reconnect: ReconnectState::new(reconnect_delay),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.reconnect.consecutive_failures()
    }

    /// Handle one notification from the event loop.
    pub fn handle(&mut self, notification: std::result::Result<Event, ConnectionError>) -> Step {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    log::error!("on_connect: failed to connect to mqtt server: {:?}", ack.code);
                    return self.fail();
                }
                log::info!("connected to mqtt server");
                self.connected = true;
                self.reconnect.record_success();
                self.subscribe_all();
                Step::Continue
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Step::Message(Inbound {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                log::debug!("on_subscribe: {}", ack.pkid);
                Step::Continue
            }
            // Pings and outgoing traffic.
            Ok(_) => Step::Continue,
            Err(e) => {
                log::error!("mqtt connection error: {e}");
                self.fail()
            }
        }
    }

    fn fail(&mut self) -> Step {
        self.connected = false;
        self.reconnect.record_failure();
        let delay = self.reconnect.current_delay();
        log::warn!(
            "reconnecting to mqtt server in {:.0}s (attempt {})",
            delay.as_secs_f64(),
            self.reconnect.consecutive_failures()
        );
        Step::Backoff(delay)
    }

    fn subscribe_all(&mut self) {
        if self.topics.is_empty() {
            return;
        }
        log::debug!("subscribing to mqtt topics: {}", self.topics.join(", "));
        if let Err(e) = self.subscriber.subscribe_topics(&self.topics) {
            log::error!("subscribe failed: {e}");
        }
    }
}

/// Whether a notification seen after shutdown ends the event loop: the
/// DISCONNECT packet went out, or the connection is gone anyway.
pub fn disconnect_flushed(notification: &std::result::Result<Event, ConnectionError>) -> bool {
    matches!(notification, Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_))
}

/// Drive the event loop until shutdown, forwarding publishes to `tx`.
///
/// Polling the connection after an error makes it reconnect, so failures
/// only cost the backoff delay. Once `running` is cleared the loop keeps
/// polling, without forwarding, until the client's disconnect request has
/// been written out (see [`disconnect_flushed`]). Also returns when the
/// receiving side of `tx` is dropped.
pub fn run_transport<S: Subscriber>(
    mut connection: Connection,
    mut transport: Transport<S>,
    tx: Sender<Inbound>,
    running: &AtomicBool,
) {
    for notification in connection.iter() {
        if !running.load(Ordering::SeqCst) {
            if disconnect_flushed(&notification) {
                break;
            }
            continue;
        }
        match transport.handle(notification) {
            Step::Message(msg) => {
                if tx.send(msg).is_err() {
                    log::debug!("consumer gone, stopping transport");
                    break;
                }
            }
            Step::Continue => {}
            Step::Backoff(delay) => sleep_while_running(running, delay),
        }
    }
    log::debug!("mqtt transport stopped");
}

/// Sleep for `total`, waking early once `running` is cleared.
pub fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let mut left = total;
    while !left.is_zero() && running.load(Ordering::SeqCst) {
        let chunk = left.min(SHUTDOWN_POLL);
        std::thread::sleep(chunk);
        left -= chunk;
    }
}
