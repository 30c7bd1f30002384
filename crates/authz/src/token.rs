use async_trait::async_trait;
use chatcore_common::{ChatCoreError, ErrorKind, Result};
use tonic::transport::Channel;
use tracing::warn;

use crate::proto_auth::{ValidateTokenRequest, auth_client::AuthClient};

/// Validates the bearer token presented on the `/ws` upgrade and resolves it
/// to a user id. Registration/login/token minting live in the profile
/// service and are out of scope here — this is the thin contract the
/// gateway consumes.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// `Ok(None)` means the token was well-formed but rejected (expired,
    /// revoked, unknown); the caller maps that to a 401.
    async fn validate_token(&self, token: &str) -> Result<Option<i64>>;
}

/// Accepts any non-empty token and resolves it to a fixed user id. Useful
/// for local development or tests that don't exercise the profile service.
pub struct AllowAllValidator {
    pub user_id: i64,
}

#[async_trait]
impl TokenValidator for AllowAllValidator {
    async fn validate_token(&self, token: &str) -> Result<Option<i64>> {
        Ok(if token.is_empty() { None } else { Some(self.user_id) })
    }
}

/// gRPC-backed validator against the profile service's `Auth.ValidateToken`.
#[derive(Clone)]
pub struct GrpcTokenValidator {
    inner: AuthClient<Channel>,
}

impl GrpcTokenValidator {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let endpoint = tonic::transport::Endpoint::from_shared(addr.into())
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "invalid profile grpc address", e))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "profile grpc connect failed", e))?;
        Ok(Self { inner: AuthClient::new(channel) })
    }
}

#[async_trait]
impl TokenValidator for GrpcTokenValidator {
    async fn validate_token(&self, token: &str) -> Result<Option<i64>> {
        let mut client = self.inner.clone();
        let request = tonic::Request::new(ValidateTokenRequest { token: token.to_string() });
        let response = client.validate_token(request).await.map_err(|status| {
            warn!(%status, "validate_token rpc failed");
            ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "validate_token rpc failed", status)
        })?;
        let inner = response.into_inner();
        Ok(if inner.valid { Some(inner.user_id) } else { None })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_rejects_empty_token() {
        let v = AllowAllValidator { user_id: 42 };
        assert_eq!(v.validate_token("").await.unwrap(), None);
        assert_eq!(v.validate_token("anything").await.unwrap(), Some(42));
    }
}
