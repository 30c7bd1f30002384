use chatcore_common::{ChatCoreError, ErrorKind, Result};
use chatcore_protocol::{PUBSUB_CHANNEL_CAPACITY, RedisEvent};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

/// A live subscription on one or more pub/sub channels. The background task
/// that decodes incoming messages is aborted when this is dropped.
pub struct Subscription {
    pub rx: mpsc::Receiver<RedisEvent>,
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bridges the in-process hub to Redis pub/sub: one shared connection for
/// publishing, and a fresh dedicated connection per subscription (Redis
/// pub/sub connections can't issue other commands once subscribed).
#[derive(Clone)]
pub struct PubSubTransport {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl PubSubTransport {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "invalid redis url", e))?;
        let publish_conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "redis connect failed", e))?;
        Ok(Self { client, publish_conn })
    }

    /// Publishes a pre-built envelope to `channel`. Best-effort: a publish
    /// failure is reported to the caller but never poisons the transport.
    pub async fn publish(&self, channel: &str, envelope: &RedisEvent) -> Result<()> {
        let payload = serde_json::to_string(envelope)
            .map_err(|e| ChatCoreError::with_source(ErrorKind::Internal, "failed to encode pub/sub envelope", e))?;
        let mut conn = self.publish_conn.clone();
        redis::AsyncCommands::publish::<_, _, i64>(&mut conn, channel, payload)
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "redis publish failed", e))?;
        Ok(())
    }

    /// Subscribes to `channels` on a dedicated connection and decodes every
    /// incoming message into a `RedisEvent`. Messages that fail to parse are
    /// logged and dropped rather than surfaced — a malformed message on the
    /// wire must never take the whole bridge down.
    pub async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "redis pubsub connect failed", e))?;
        for channel in channels {
            pubsub
                .subscribe(*channel)
                .await
                .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "redis subscribe failed", e))?;
        }

        let (tx, rx) = mpsc::channel(PUBSUB_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(%err, "pub/sub message payload was not a valid string");
                        continue;
                    },
                };
                match serde_json::from_str::<RedisEvent>(&payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break; // receiver dropped
                        }
                    },
                    Err(err) => warn!(%err, "dropping malformed pub/sub envelope"),
                }
            }
        });

        Ok(Subscription { rx, task })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chatcore_protocol::{CHANNEL_CHAT_DIRECT, RedisEvent};

    #[test]
    fn envelope_round_trips_through_json() {
        let event = RedisEvent::new(CHANNEL_CHAT_DIRECT, "instance-a", serde_json::json!({"to_user_id": 7}));
        let encoded = serde_json::to_string(&event).expect("encode");
        let decoded: RedisEvent = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.instance_id, "instance-a");
        assert!(decoded.is_from("instance-a"));
        assert!(!decoded.is_from("instance-b"));
    }
}
