//! MQTT transport adapter.
//!
//! The broker connection lives in one pump task driving rumqttc's event
//! loop. Every CONNACK renews the control-topic subscription and re-announces
//! the node, so a broker restart never leaves the node silently deaf.
//! Outbound messages go through [`MqttSink`], which queues without blocking;
//! it is called from the interrupt callback path.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tripwire_core::config::BrokerConfig;
use tripwire_core::transport::{EventSink, Outbound, TransportError};

/// Buffered stream of raw inbound control payloads.
pub type ControlReceiver = mpsc::Receiver<String>;

const CHANNEL_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connect to the broker and start the event-loop pump.
///
/// Returns the outbound sink, the inbound control stream, and the pump task
/// handle. The connection itself is established lazily by the pump; messages
/// published before the first CONNACK are queued.
pub fn connect(config: &BrokerConfig) -> (MqttSink, ControlReceiver, JoinHandle<()>) {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.host.clone(),
        config.port,
    );
    options.set_keep_alive(KEEP_ALIVE);

    let (client, event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let sink = MqttSink {
        client: client.clone(),
        topic: config.message_topic.clone(),
    };
    let pump = tokio::spawn(pump(
        event_loop,
        client,
        config.control_topic.clone(),
        config.message_topic.clone(),
        inbound_tx,
    ));

    (sink, inbound_rx, pump)
}

async fn pump(
    mut event_loop: EventLoop,
    client: AsyncClient,
    control_topic: String,
    message_topic: String,
    inbound: mpsc::Sender<String>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("connected to broker");
                if let Err(error) = client.subscribe(control_topic.clone(), QoS::AtLeastOnce).await
                {
                    error!(%error, topic = %control_topic, "failed to subscribe to control topic");
                }
                if let Err(error) = client
                    .publish(
                        message_topic.clone(),
                        QoS::AtLeastOnce,
                        true,
                        Outbound::Online.to_string(),
                    )
                    .await
                {
                    warn!(%error, "failed to announce node online");
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                debug!(topic = %publish.topic, payload = %payload, "control message received");
                if inbound.send(payload).await.is_err() {
                    break; // dispatcher gone, the node is shutting down
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "broker connection lost, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!("transport pump stopped");
}

/// Outbound sink over the shared MQTT client.
///
/// Publishes with QoS 1 and the retain flag, so a controller that connects
/// late still sees the node's last state echo.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl EventSink for MqttSink {
    fn publish(&self, message: &Outbound) -> Result<(), TransportError> {
        self.client
            .try_publish(
                self.topic.clone(),
                QoS::AtLeastOnce,
                true,
                message.to_string(),
            )
            .map_err(|error| TransportError::Publish(error.to_string()))
    }
}
