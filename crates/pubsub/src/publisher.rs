use async_trait::async_trait;
use chatcore_common::Result;
use chatcore_protocol::RedisEvent;

use crate::transport::PubSubTransport;

/// The publish half of C4's contract, pulled out as a trait so callers that
/// only need to *emit* cross-instance chat events (the router's handlers)
/// depend on a narrow interface instead of the concrete Redis transport —
/// and so their tests can swap in an in-process recorder.
#[async_trait]
pub trait ChatPublisher: Send + Sync {
    async fn publish(&self, channel: &str, envelope: &RedisEvent) -> Result<()>;
}

#[async_trait]
impl ChatPublisher for PubSubTransport {
    async fn publish(&self, channel: &str, envelope: &RedisEvent) -> Result<()> {
        PubSubTransport::publish(self, channel, envelope).await
    }
}

/// Records every publish in-memory instead of touching a broker. Used by
/// router/hub tests that exercise the publish side of a handler without a
/// live Redis.
#[derive(Default)]
pub struct RecordingPublisher {
    published: tokio::sync::Mutex<Vec<(String, RedisEvent)>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, RedisEvent)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl ChatPublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, envelope: &RedisEvent) -> Result<()> {
        self.published.lock().await.push((channel.to_string(), envelope.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_publisher_captures_every_call() {
        let publisher = RecordingPublisher::new();
        let envelope = RedisEvent::new("direct", "instance-a", serde_json::json!({"to_user_id": 1}));
        publisher.publish("chat.direct", &envelope).await.unwrap();
        let published = publisher.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "chat.direct");
    }
}
