//! Transport adapter between the game and a pub/sub bus.
//!
//! The session core never talks to the broker directly: inbound traffic is
//! decoded off the wire by a pump task and queued into a bounded channel
//! consumed by the dispatcher, outbound traffic goes through the [`Channel`]
//! trait. The MQTT implementation relies on retained messages so a peer that
//! subscribes late still sees the `game-start` advertisement.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::protocol::Envelope;

pub const INBOUND_QUEUE_DEPTH: usize = 32;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish an envelope to the game topic.
    async fn publish(&self, msg: &Envelope) -> Result<(), SessionError>;

    /// Publish an envelope retained, so that peers subscribing later
    /// still receive it.
    async fn publish_retained(&self, msg: &Envelope) -> Result<(), SessionError>;

    /// Durably clear the retained payload by publishing an empty one.
    async fn clear_retained(&self) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;
}

pub struct MqttChannel {
    client: AsyncClient,
    topic: String,
    _pump: JoinHandle<()>,
}

impl MqttChannel {
    /// Connect to the broker and subscribe to the game topic. Returns the
    /// channel and the receiving end of the inbound queue; the queue closes
    /// when the connection is lost.
    pub async fn connect(
        host: &str,
        port: u16,
        topic: &str,
        client_id: &str,
        token: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Envelope>), SessionError> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, event_loop) = AsyncClient::new(options, 10);
        client.subscribe(topic, QoS::AtLeastOnce).await?;

        let (sender, receiver) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let pump = tokio::spawn(pump_events(event_loop, sender, token));

        Ok((
            Self {
                client,
                topic: topic.to_string(),
                _pump: pump,
            },
            receiver,
        ))
    }
}

async fn pump_events(
    mut event_loop: rumqttc::EventLoop,
    sender: mpsc::Sender<Envelope>,
    token: CancellationToken,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                // an empty payload is a retained-message clear, not a game message
                if publish.payload.is_empty() {
                    continue;
                }
                match Envelope::decode(&publish.payload) {
                    Ok(msg) => {
                        tracing::debug!(topic = %publish.topic, ?msg, "inbound message");
                        if sender.send(msg).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(topic = %publish.topic, %err, "dropping undecodable payload");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                if token.is_cancelled() {
                    tracing::debug!(%err, "event loop stopped after shutdown");
                } else {
                    tracing::error!(%err, "mqtt connection lost");
                }
                return;
            }
        }
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, msg: &Envelope) -> Result<(), SessionError> {
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, msg.encode()?)
            .await?;
        Ok(())
    }

    async fn publish_retained(&self, msg: &Envelope) -> Result<(), SessionError> {
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, true, msg.encode()?)
            .await?;
        Ok(())
    }

    async fn clear_retained(&self) -> Result<(), SessionError> {
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, true, Vec::new())
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.client.disconnect().await?;
        Ok(())
    }
}
