use crate::config::MqttConfig;
use crate::error::{Result, SentryError};
use crate::router::CommandRouter;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outbound side of the cloud message channel. Publishes are best-effort;
/// callers log failures and move on, nothing retries inline.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// `MessageChannel` over a live rumqttc client.
pub struct MqttChannel {
    client: AsyncClient,
}

#[async_trait]
impl MessageChannel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| SentryError::channel(format!("publish to {topic} failed: {e}")))
    }
}

/// Connection to the broker, built in two phases so the publish side can be
/// wired into the node before the inbound router exists.
pub struct MqttLink {
    channel: Arc<MqttChannel>,
    client: AsyncClient,
    event_loop: EventLoop,
    control_feeds: Vec<String>,
    host: String,
}

impl MqttLink {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.api_key);
        }

        let (client, event_loop) = AsyncClient::new(options, 20);
        Self {
            channel: Arc::new(MqttChannel {
                client: client.clone(),
            }),
            client,
            event_loop,
            control_feeds: config.feeds.control_feeds(),
            host: config.host.clone(),
        }
    }

    /// Publish-capable handle; valid before the event loop starts, though
    /// messages only flow once it runs.
    pub fn channel(&self) -> Arc<MqttChannel> {
        Arc::clone(&self.channel)
    }

    /// Start the network event loop. Re-subscribes every control feed on
    /// each (re)connect and hands inbound publishes to the command router on
    /// the network task, mirroring a broker-thread callback.
    pub fn start(self, router: Arc<CommandRouter>, token: CancellationToken) -> JoinHandle<()> {
        let MqttLink {
            client,
            mut event_loop,
            control_feeds,
            host,
            ..
        } = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("mqtt loop stopping");
                        let _ = client.disconnect().await;
                        break;
                    }
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(host = %host, "connected to mqtt broker");
                            // Re-subscribe on every (re)connect; the broker
                            // may have dropped the session.
                            for feed in &control_feeds {
                                if let Err(e) = client.subscribe(feed, QoS::AtLeastOnce).await {
                                    error!(feed = %feed, "subscribe failed: {e}");
                                } else {
                                    info!(feed = %feed, "subscribed to control feed");
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let payload = String::from_utf8_lossy(&publish.payload);
                            debug!(topic = %publish.topic, payload = %payload, "inbound message");
                            router.handle(&publish.topic, &payload);
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            warn!("mqtt broker disconnected");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("mqtt connection error: {e}");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    },
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MessageChannel;
    use crate::error::{Result, SentryError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Channel that records every publish for assertions.
    pub struct RecordingChannel {
        pub published: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl RecordingChannel {
        pub fn new() -> (Arc<Self>, Arc<Mutex<Vec<(String, String)>>>) {
            let published = Arc::new(Mutex::new(Vec::new()));
            (
                Arc::new(Self {
                    published: Arc::clone(&published),
                }),
                published,
            )
        }
    }

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
            self.published
                .lock()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    /// Channel whose every publish fails.
    pub struct FailingChannel;

    #[async_trait]
    impl MessageChannel for FailingChannel {
        async fn publish(&self, topic: &str, _payload: &str) -> Result<()> {
            Err(SentryError::channel(format!("broker unreachable: {topic}")))
        }
    }
}
