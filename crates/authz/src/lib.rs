//! Thin gRPC-backed contracts the gateway consumes from the profile
//! service: `Authorization.CanSendDirect` (the direct-message authz gate),
//! `Auth.ValidateToken` (bearer-token validation on the `/ws` upgrade), and
//! `UserDirectory.UserExists` (the identity check on presence connect). All
//! three are exposed as traits so the hub/router/gateway/presence service
//! depend only on the contract, never the transport, and can be driven by
//! an in-process fake in tests.

mod client;
mod directory;
mod token;

pub mod proto {
    tonic::include_proto!("chatcore.authz");
}

pub mod proto_auth {
    tonic::include_proto!("chatcore.auth");
}

pub mod proto_directory {
    tonic::include_proto!("chatcore.userdirectory");
}

pub use client::{AlwaysAllow, CanSendDirect, DirectMessageDecision, GrpcAuthzClient};
pub use directory::GrpcUserDirectory;
pub use token::{AllowAllValidator, GrpcTokenValidator, TokenValidator};
