//! Pub/sub seam for the realtime channel.
//!
//! The synchronization core talks to [`PubSubConnector`] /
//! [`PubSubConnection`] only; the wire protocol lives inside the redis
//! client crate. Tests substitute in-memory fakes for both traits.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{ClientError, RealtimeBootstrap};

const EVENT_BUFFER: usize = 256;

/// An event delivered on a subscribed channel.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Creates realtime connections from bootstrap config.
#[async_trait]
pub trait PubSubConnector: Send + Sync {
    async fn connect(
        &self,
        bootstrap: &RealtimeBootstrap,
    ) -> Result<Box<dyn PubSubConnection>, ClientError>;
}

/// One live pub/sub connection.
#[async_trait]
pub trait PubSubConnection: Send {
    /// Subscribe to a channel. Subscribing to an already-subscribed
    /// channel must be a no-op.
    async fn subscribe(&mut self, channel: &str) -> Result<(), ClientError>;

    /// Unsubscribe from a channel. Unsubscribing from an absent channel
    /// must be a no-op.
    async fn unsubscribe(&mut self, channel: &str) -> Result<(), ClientError>;

    /// Take the inbound event stream. Yields `None` after the first call.
    fn events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>>;

    /// Close the connection. Must be called before the handle is
    /// discarded so the server can release its subscriptions.
    async fn disconnect(&mut self) -> Result<(), ClientError>;
}

/// Connector backed by the redis async pub/sub client.
pub struct RedisConnector;

#[async_trait]
impl PubSubConnector for RedisConnector {
    async fn connect(
        &self,
        bootstrap: &RealtimeBootstrap,
    ) -> Result<Box<dyn PubSubConnection>, ClientError> {
        let url = connection_url(bootstrap);
        tracing::info!(host = %bootstrap.host, port = bootstrap.port, tls = bootstrap.force_tls,
            "connecting to realtime channel");

        let client = redis::Client::open(url.as_str())?;
        let pubsub = client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let pump = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let body: String = match msg.get_payload() {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(channel, error = %e, "dropping non-text realtime payload");
                        continue;
                    }
                };
                if let Some(event) = parse_envelope(&channel, &body) {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("realtime message stream ended");
        });

        Ok(Box::new(RedisConnection {
            sink,
            events: Some(event_rx),
            pump,
        }))
    }
}

struct RedisConnection {
    sink: redis::aio::PubSubSink,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    pump: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl PubSubConnection for RedisConnection {
    async fn subscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.sink.subscribe(channel).await?;
        Ok(())
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.sink.unsubscribe(channel).await?;
        Ok(())
    }

    fn events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events.take()
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        // UNSUBSCRIBE with no channels: the server drops all state for
        // this connection before the handle goes away.
        self.sink.unsubscribe(Vec::<String>::new()).await?;
        self.pump.abort();
        Ok(())
    }
}

fn connection_url(bootstrap: &RealtimeBootstrap) -> String {
    let scheme = if bootstrap.force_tls { "rediss" } else { "redis" };
    if bootstrap.key.is_empty() {
        format!("{scheme}://{}:{}/", bootstrap.host, bootstrap.port)
    } else {
        format!(
            "{scheme}://:{}@{}:{}/",
            bootstrap.key, bootstrap.host, bootstrap.port
        )
    }
}

/// Parse the `{"event": ..., "data": ...}` envelope published on a
/// channel. Malformed envelopes are logged and dropped.
fn parse_envelope(channel: &str, body: &str) -> Option<ChannelEvent> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(channel, error = %e, "dropping malformed realtime payload");
            return None;
        }
    };

    let Some(event) = value.get("event").and_then(Value::as_str) else {
        tracing::warn!(channel, "dropping realtime payload without event name");
        return None;
    };

    Some(ChannelEvent {
        channel: channel.to_string(),
        event: event.to_string(),
        payload: value.get("data").cloned().unwrap_or(Value::Null),
    })
}
