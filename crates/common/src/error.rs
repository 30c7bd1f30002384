use thiserror::Error;

/// Error kinds preserved across in-process calls and mapped to HTTP/gRPC
/// status codes at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUserId,
    InvalidConnId,
    InvalidDeviceType,
    InvalidTimestamp,
    UserNotFound,
    ConnectionNotFound,
    AlreadyOnline,
    AlreadyOffline,
    RateLimitExceeded,
    ServiceUnavailable,
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to at a REST boundary.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidUserId
            | Self::InvalidConnId
            | Self::InvalidDeviceType
            | Self::InvalidTimestamp => 400,
            Self::UserNotFound | Self::ConnectionNotFound => 404,
            Self::AlreadyOnline | Self::AlreadyOffline => 409,
            Self::RateLimitExceeded => 429,
            Self::ServiceUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// The gRPC status name this kind maps to at an RPC boundary.
    #[must_use]
    pub fn grpc_status(self) -> &'static str {
        match self {
            Self::InvalidUserId
            | Self::InvalidConnId
            | Self::InvalidDeviceType
            | Self::InvalidTimestamp => "InvalidArgument",
            Self::UserNotFound | Self::ConnectionNotFound => "NotFound",
            Self::AlreadyOnline | Self::AlreadyOffline => "FailedPrecondition",
            Self::RateLimitExceeded => "ResourceExhausted",
            Self::ServiceUnavailable => "Unavailable",
            Self::Internal => "Internal",
        }
    }
}

#[derive(Error, Debug)]
#[error("{kind:?}: {message}")]
pub struct ChatCoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ChatCoreError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }
}

pub type Result<T> = std::result::Result<T, ChatCoreError>;

/// `.context()`/`.with_context()` on `Result`/`Option`, wrapping the
/// underlying error as [`ErrorKind::Internal`] while preserving the
/// original cause via `#[source]`.
pub trait Context<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: std::error::Error + Send + Sync + 'static> Context<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| ChatCoreError::with_source(ErrorKind::Internal, context.into(), source))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| ChatCoreError::with_source(ErrorKind::Internal, f().into(), source))
    }
}

impl<T> Context<T> for Option<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ChatCoreError::internal(context.into()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| ChatCoreError::internal(f().into()))
    }
}
