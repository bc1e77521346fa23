//! MQTT transport - subscribes to the console topic and forwards payloads

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Inbound;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Broker subscription for one console
pub struct MqttTransport {
    options: MqttOptions,
    broker: String,
    port: u16,
    topic: String,
}

impl MqttTransport {
    pub fn new(client_id: impl Into<String>, broker: &str, port: u16, topic: impl Into<String>) -> Self {
        let mut options = MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(KEEP_ALIVE);
        Self {
            options,
            broker: broker.to_string(),
            port,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run the client until shutdown or until the server stops listening
    pub fn spawn(self, tx: mpsc::Sender<Inbound>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, shutdown))
    }

    async fn run(self, tx: mpsc::Sender<Inbound>, mut shutdown: watch::Receiver<bool>) {
        info!("Connecting to MQTT broker at {}:{}", self.broker, self.port);
        let (client, mut eventloop) = AsyncClient::new(self.options, 64);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("MQTT transport stopping");
                    if let Err(e) = client.disconnect().await {
                        debug!("MQTT disconnect: {}", e);
                    }
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker, subscribing to {}", self.topic);
                        // Subscribe on every connect: the broker forgets clean sessions
                        if let Err(e) = client.subscribe(self.topic.clone(), QoS::AtMostOnce).await {
                            warn!("Failed to subscribe to {}: {}", self.topic, e);
                        }
                        if tx.send(Inbound::Connection(true)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match std::str::from_utf8(&publish.payload) {
                            Ok(text) => {
                                if tx.send(Inbound::Payload(text.to_string())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Ignoring non-UTF-8 payload on {}: {}", publish.topic, e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {} (reconnecting)", e);
                        if tx.send(Inbound::Connection(false)).await.is_err() {
                            break;
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    }
}
