//! MQTT bridge.
//!
//! Topic layout under the configured prefix:
//!   `<prefix>/state/{presence,brightness,current_app,presence_detection,availability}`
//!   `<prefix>/command/{brightness,screen,switch_app,presence_detection}`
//!
//! The network loop runs as its own tokio task. Inbound commands go onto the
//! coordinator's event queue; outbound state is published with `try_publish`
//! and dropped while the broker is unreachable.

use crate::coordinator::Event;
use crate::state::SharedState;
use rand::Rng;
use rumqttc::{
    AsyncClient, Event as MqttEvent, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablet_core::config::MqttConfig;
use tablet_core::{AppSelection, Command, CommandError, CommandKind, Presence};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const AVAILABILITY_ONLINE: &str = "online";
pub const AVAILABILITY_OFFLINE: &str = "offline";

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 32;
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DISCOVERY_PREFIX: &str = "homeassistant";

#[derive(Error, Debug)]
pub enum InboundError {
    #[error("{0} is not a command topic")]
    NotCommand(String),
    #[error("payload is not UTF-8")]
    NotUtf8,
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Topic names under one prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn state(&self, name: &str) -> String {
        format!("{}/state/{name}", self.prefix)
    }

    pub fn command(&self, kind: CommandKind) -> String {
        format!("{}/command/{}", self.prefix, kind.as_str())
    }

    pub fn availability(&self) -> String {
        self.state("availability")
    }

    /// Last segment of a `<prefix>/command/<kind>` topic.
    pub fn command_kind<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix("/command/")
            .filter(|kind| !kind.is_empty() && !kind.contains('/'))
    }

    /// Prefix flattened into an identifier for discovery unique ids.
    fn node_id(&self) -> String {
        self.prefix.replace('/', "_")
    }
}

/// Decode a publish received on a command topic.
pub fn decode_command(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Command, InboundError> {
    let kind = topics
        .command_kind(topic)
        .ok_or_else(|| InboundError::NotCommand(topic.to_string()))?;
    let kind = CommandKind::from_name(kind)?;
    let text = std::str::from_utf8(payload).map_err(|_| InboundError::NotUtf8)?;
    Ok(Command::parse(kind, text)?)
}

/// A state topic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    Presence(Presence),
    Brightness(u8),
    CurrentApp(AppSelection),
    PresenceDetection(bool),
}

impl StateUpdate {
    pub fn topic_name(&self) -> &'static str {
        match self {
            StateUpdate::Presence(_) => "presence",
            StateUpdate::Brightness(_) => "brightness",
            StateUpdate::CurrentApp(_) => "current_app",
            StateUpdate::PresenceDetection(_) => "presence_detection",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            StateUpdate::Presence(p) => p.as_payload().to_string(),
            StateUpdate::Brightness(level) => level.to_string(),
            StateUpdate::CurrentApp(app) => app.as_str().to_string(),
            StateUpdate::PresenceDetection(true) => "on".to_string(),
            StateUpdate::PresenceDetection(false) => "off".to_string(),
        }
    }
}

/// Sink for state updates.
pub trait StatePublisher {
    fn publish(&self, update: StateUpdate);
}

/// MQTT disabled: nothing is published.
impl<P: StatePublisher> StatePublisher for Option<P> {
    fn publish(&self, update: StateUpdate) {
        if let Some(publisher) = self {
            publisher.publish(update);
        }
    }
}

/// Clone-safe publisher bound to a running bridge.
#[derive(Clone)]
pub struct BridgePublisher {
    client: AsyncClient,
    topics: Arc<Topics>,
    connected: Arc<AtomicBool>,
}

impl StatePublisher for BridgePublisher {
    fn publish(&self, update: StateUpdate) {
        if !self.connected.load(Ordering::Acquire) {
            tracing::debug!(topic = update.topic_name(), "MQTT offline; state update dropped");
            return;
        }
        publish_state(&self.client, &self.topics, update);
    }
}

fn publish_state(client: &AsyncClient, topics: &Topics, update: StateUpdate) {
    let topic = topics.state(update.topic_name());
    if let Err(err) = client.try_publish(&topic, QoS::AtLeastOnce, true, update.payload()) {
        tracing::warn!(error = %err, topic = %topic, "state publish failed");
    }
}

/// Home Assistant MQTT discovery entries as `(topic, json)` pairs.
pub fn discovery_messages(topics: &Topics) -> Vec<(String, String)> {
    let node = topics.node_id();
    let device = json!({
        "identifiers": [format!("{node}_tablet_ha")],
        "name": "Tablet HA",
        "model": "Kiosk tablet",
        "manufacturer": "Custom",
        "sw_version": env!("CARGO_PKG_VERSION"),
    });
    let availability = topics.availability();

    let presence = json!({
        "name": "Tablet Presence",
        "state_topic": topics.state("presence"),
        "payload_on": Presence::Present.as_payload(),
        "payload_off": Presence::Absent.as_payload(),
        "device_class": "occupancy",
        "availability_topic": availability,
        "device": device,
        "unique_id": format!("{node}_presence"),
    });
    let brightness = json!({
        "name": "Tablet Brightness",
        "state_topic": topics.state("brightness"),
        "command_topic": topics.command(CommandKind::Brightness),
        "min": 0,
        "max": 100,
        "unit_of_measurement": "%",
        "availability_topic": availability,
        "device": device,
        "unique_id": format!("{node}_brightness"),
    });
    let app = json!({
        "name": "Tablet App",
        "state_topic": topics.state("current_app"),
        "command_topic": topics.command(CommandKind::SwitchApp),
        "options": [AppSelection::HomeAssistant.as_str(), AppSelection::Cookbook.as_str()],
        "availability_topic": availability,
        "device": device,
        "unique_id": format!("{node}_current_app"),
    });

    vec![
        (
            format!("{DISCOVERY_PREFIX}/binary_sensor/{node}/presence/config"),
            presence.to_string(),
        ),
        (
            format!("{DISCOVERY_PREFIX}/number/{node}/brightness/config"),
            brightness.to_string(),
        ),
        (
            format!("{DISCOVERY_PREFIX}/select/{node}/current_app/config"),
            app.to_string(),
        ),
    ]
}

/// Exponential reconnect delay, doubling from `min` up to `max`.
#[derive(Debug)]
struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, next: min }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.min;
    }
}

/// Spread reconnects over [delay/2, delay].
fn jittered(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
}

/// Everything the network loop needs besides the event loop itself.
struct LoopContext {
    client: AsyncClient,
    topics: Arc<Topics>,
    connected: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    state: SharedState,
    events: mpsc::Sender<Event>,
    discovery: bool,
}

impl LoopContext {
    fn on_connected(&self) {
        for kind in CommandKind::ALL {
            let topic = self.topics.command(kind);
            if let Err(err) = self.client.try_subscribe(&topic, QoS::AtLeastOnce) {
                tracing::warn!(error = %err, topic = %topic, "subscribe failed");
            }
        }

        if let Err(err) = self.client.try_publish(
            self.topics.availability(),
            QoS::AtLeastOnce,
            true,
            AVAILABILITY_ONLINE,
        ) {
            tracing::warn!(error = %err, "availability publish failed");
        }

        if self.discovery {
            for (topic, payload) in discovery_messages(&self.topics) {
                if let Err(err) = self.client.try_publish(&topic, QoS::AtLeastOnce, true, payload) {
                    tracing::warn!(error = %err, topic = %topic, "discovery publish failed");
                }
            }
        }

        // Retained state may be stale after an outage; send the current values.
        let snap = self.state.snapshot();
        for update in [
            StateUpdate::Presence(snap.presence),
            StateUpdate::Brightness(snap.display.brightness),
            StateUpdate::CurrentApp(snap.app),
            StateUpdate::PresenceDetection(snap.detection_enabled),
        ] {
            publish_state(&self.client, &self.topics, update);
        }
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let command = match decode_command(&self.topics, topic, payload) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(topic, error = %err, "ignoring malformed command");
                return;
            }
        };
        let kind = command.kind().as_str();
        tracing::info!(kind, ?command, "command received");
        if self.events.try_send(Event::Remote(command)).is_err() {
            tracing::warn!(kind, "event queue unavailable; command dropped");
        }
    }
}

async fn run_event_loop(mut eventloop: EventLoop, ctx: LoopContext) {
    let mut backoff = Backoff::new(BACKOFF_MIN, BACKOFF_MAX);
    loop {
        match eventloop.poll().await {
            Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("connected to MQTT broker");
                backoff.reset();
                ctx.connected.store(true, Ordering::Release);
                ctx.on_connected();
            }
            Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                ctx.dispatch(&publish.topic, &publish.payload);
            }
            Ok(MqttEvent::Outgoing(Outgoing::Disconnect)) => {
                ctx.connected.store(false, Ordering::Release);
                tracing::info!("MQTT disconnected");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                ctx.connected.store(false, Ordering::Release);
                if ctx.shutting_down.load(Ordering::Acquire) {
                    break;
                }
                let delay = jittered(backoff.next_delay());
                tracing::warn!(
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "MQTT connection error; will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A running MQTT bridge.
pub struct Bridge {
    client: AsyncClient,
    topics: Arc<Topics>,
    connected: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Start the bridge. Never fails: an unreachable broker is retried in the
/// background while the rest of the kiosk keeps running.
pub fn spawn_bridge(config: &MqttConfig, state: SharedState, events: mpsc::Sender<Event>) -> Bridge {
    let topics = Arc::new(Topics::new(&config.topic_prefix));

    let mut options = MqttOptions::new(config.client_id.as_str(), config.broker.as_str(), config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_last_will(LastWill::new(
        topics.availability(),
        AVAILABILITY_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if let Some((username, password)) = config.credentials() {
        options.set_credentials(username, password);
    }

    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let connected = Arc::new(AtomicBool::new(false));
    let shutting_down = Arc::new(AtomicBool::new(false));

    tracing::info!(
        broker = %config.broker,
        port = config.port,
        prefix = %config.topic_prefix,
        "starting MQTT bridge"
    );

    let ctx = LoopContext {
        client: client.clone(),
        topics: topics.clone(),
        connected: connected.clone(),
        shutting_down: shutting_down.clone(),
        state,
        events,
        discovery: config.discovery,
    };
    let task = tokio::spawn(run_event_loop(eventloop, ctx));

    Bridge {
        client,
        topics,
        connected,
        shutting_down,
        task,
    }
}

impl Bridge {
    pub fn publisher(&self) -> BridgePublisher {
        BridgePublisher {
            client: self.client.clone(),
            topics: self.topics.clone(),
            connected: self.connected.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Publish `offline` (retained) and disconnect cleanly.
    pub async fn shutdown(self) {
        self.shutting_down.store(true, Ordering::Release);

        if !self.is_connected() {
            self.task.abort();
            let _ = self.task.await;
            return;
        }

        if let Err(err) = self
            .client
            .publish(
                self.topics.availability(),
                QoS::AtLeastOnce,
                true,
                AVAILABILITY_OFFLINE,
            )
            .await
        {
            tracing::warn!(error = %err, "offline publish failed");
        }
        if let Err(err) = self.client.disconnect().await {
            tracing::warn!(error = %err, "MQTT disconnect failed");
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            tracing::warn!("MQTT bridge did not stop in time");
        }
    }
}
