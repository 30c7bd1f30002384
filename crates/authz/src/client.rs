use async_trait::async_trait;
use chatcore_common::{ChatCoreError, ErrorKind, Result};
use tonic::transport::Channel;
use tracing::warn;

use crate::proto::{CanSendDirectRequest, authorization_client::AuthorizationClient};

/// The outcome of a direct-message authorization check: whether the send is
/// allowed and, if not, why — the rejection reason the sender needs to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectMessageDecision {
    Allowed,
    Blocked,
    NotFriends,
}

impl DirectMessageDecision {
    #[must_use]
    pub fn allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The reason string carried on a rejection frame: `"blocked"` or
    /// `"not_friends"`, matching §4.8's `reason` enum.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Allowed => "ok",
            Self::Blocked => "blocked",
            Self::NotFriends => "not_friends",
        }
    }

    fn from_response(allowed: bool, reason: &str) -> Self {
        if allowed {
            return Self::Allowed;
        }
        match reason {
            "blocked" => Self::Blocked,
            _ => Self::NotFriends,
        }
    }
}

/// The decision the session hub needs before forwarding a direct message:
/// is `from_user_id` allowed to message `to_user_id`?
#[async_trait]
pub trait CanSendDirect: Send + Sync {
    async fn can_send_direct(&self, from_user_id: i64, to_user_id: i64) -> Result<DirectMessageDecision>;
}

/// Never blocks a direct message. Useful for local development or tests
/// that don't exercise the authz gate.
pub struct AlwaysAllow;

#[async_trait]
impl CanSendDirect for AlwaysAllow {
    async fn can_send_direct(&self, _from_user_id: i64, _to_user_id: i64) -> Result<DirectMessageDecision> {
        Ok(DirectMessageDecision::Allowed)
    }
}

/// gRPC-backed authz gate against the profile service's `Authorization`
/// service. Cheap to clone — `tonic::transport::Channel` multiplexes
/// requests over a single connection.
#[derive(Clone)]
pub struct GrpcAuthzClient {
    inner: AuthorizationClient<Channel>,
}

impl GrpcAuthzClient {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let endpoint = tonic::transport::Endpoint::from_shared(addr.into())
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "invalid profile grpc address", e))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "profile grpc connect failed", e))?;
        Ok(Self { inner: AuthorizationClient::new(channel) })
    }
}

#[async_trait]
impl CanSendDirect for GrpcAuthzClient {
    async fn can_send_direct(&self, from_user_id: i64, to_user_id: i64) -> Result<DirectMessageDecision> {
        // A user may always message themselves; no need to round-trip to the
        // profile service for a rule this core already knows.
        if from_user_id == to_user_id {
            return Ok(DirectMessageDecision::Allowed);
        }
        let mut client = self.inner.clone();
        let request = tonic::Request::new(CanSendDirectRequest { from_user_id, to_user_id });
        let response = client.can_send_direct(request).await.map_err(|status| {
            warn!(from_user_id, to_user_id, %status, "authz gate rpc failed");
            ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "can_send_direct rpc failed", status)
        })?;
        let inner = response.into_inner();
        Ok(DirectMessageDecision::from_response(inner.allowed, &inner.reason))
    }
}
