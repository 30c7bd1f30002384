use async_trait::async_trait;
use chatcore_common::{ChatCoreError, ErrorKind, Result};
use chatcore_presence::ProfileDirectory;
use tonic::transport::Channel;
use tracing::warn;

use crate::proto_directory::{UserExistsRequest, user_directory_client::UserDirectoryClient};

/// gRPC-backed [`ProfileDirectory`] against the profile service's
/// `UserDirectory.UserExists`, consulted by `PresenceService::on_connect`
/// before admitting a presence record for a user id this core has never
/// itself validated.
#[derive(Clone)]
pub struct GrpcUserDirectory {
    inner: UserDirectoryClient<Channel>,
}

impl GrpcUserDirectory {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let endpoint = tonic::transport::Endpoint::from_shared(addr.into())
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "invalid profile grpc address", e))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "profile grpc connect failed", e))?;
        Ok(Self { inner: UserDirectoryClient::new(channel) })
    }
}

#[async_trait]
impl ProfileDirectory for GrpcUserDirectory {
    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let mut client = self.inner.clone();
        let request = tonic::Request::new(UserExistsRequest { user_id });
        let response = client.user_exists(request).await.map_err(|status| {
            warn!(user_id, %status, "user_exists rpc failed");
            ChatCoreError::with_source(ErrorKind::ServiceUnavailable, "user_exists rpc failed", status)
        })?;
        Ok(response.into_inner().exists)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_fails_fast_on_an_invalid_address() {
        let err = GrpcUserDirectory::connect("not a valid uri").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    }
}
