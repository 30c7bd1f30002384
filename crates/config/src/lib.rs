//! Environment-driven configuration for the chat gateway binary.
//!
//! Room/member CRUD, registration/login, and the broader config-file
//! cascade belong to the profile/chat services and aren't this binary's
//! concern. What the gateway itself needs to boot — the Redis URL, its
//! own instance id, bind address, and the presence timing knobs — is
//! loaded the way the rest of this codebase's ambient stack loads
//! config: `clap` derive with `env` fallbacks, `.env` picked up via
//! `dotenvy`.

use std::time::Duration;

use chatcore_common::{ChatCoreError, ErrorKind};
use clap::Parser;

/// `chatcore-gateway` boot configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "chatcore-gateway", about = "Realtime chat session hub")]
pub struct GatewayConfig {
    /// Address the `/ws` HTTP upgrade endpoint binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Redis connection string used for the presence store and pub/sub transport.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// This process's instance id, used for cross-instance origin suppression
    /// on the pub/sub bus. Defaults to the hostname if unset.
    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: Option<String>,

    /// Seconds of inactivity after which an online user is reported idle.
    #[arg(long, env = "IDLE_THRESHOLD_SECS", default_value_t = 120)]
    pub idle_threshold_secs: u64,

    /// Additional grace appended to the idle threshold to form the
    /// connection-record TTL, kept distinct from the idle boundary so a
    /// connection isn't evicted from presence the instant it goes idle.
    #[arg(long, env = "CONN_TTL_GRACE_SECS", default_value_t = 30)]
    pub conn_ttl_grace_secs: u64,

    /// gRPC address of the profile service's `Authorization`/`UserDirectory`/`Auth` services.
    #[arg(long, env = "PROFILE_GRPC_ADDR", default_value = "http://127.0.0.1:50051")]
    pub profile_grpc_addr: String,

    /// Log level passed to `RUST_LOG` if that env var is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long, env = "JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl GatewayConfig {
    /// Load `.env` (if present) then parse from `std::env::args()` + process env.
    #[must_use]
    pub fn load() -> Self {
        // Missing .env is not an error; only propagate genuine I/O failures.
        if let Err(err) = dotenvy::dotenv() {
            if !matches!(err, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound) {
                tracing::warn!(%err, "failed to load .env");
            }
        }
        Self::parse()
    }

    /// Resolve the effective instance id: explicit config wins, else hostname,
    /// else a fixed fallback (never fails startup over this).
    #[must_use]
    pub fn resolve_instance_id(&self) -> String {
        self.instance_id.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "chatcore-instance".to_string())
        })
    }

    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// Connection-record TTL: idle threshold plus grace.
    #[must_use]
    pub fn conn_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs + self.conn_ttl_grace_secs)
    }

    /// Fail fast on an obviously broken configuration rather than booting
    /// into a gateway that can never satisfy the TTL discipline.
    pub fn validate(&self) -> chatcore_common::Result<()> {
        if self.idle_threshold_secs == 0 {
            return Err(ChatCoreError::new(
                ErrorKind::Internal,
                "IDLE_THRESHOLD_SECS must be greater than zero",
            ));
        }
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ChatCoreError::new(
                ErrorKind::Internal,
                format!("invalid BIND_ADDR: {}", self.bind_addr),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_ttl_is_idle_threshold_plus_grace() {
        let cfg = GatewayConfig::parse_from([
            "chatcore-gateway",
            "--idle-threshold-secs",
            "120",
            "--conn-ttl-grace-secs",
            "30",
        ]);
        assert_eq!(cfg.conn_ttl(), Duration::from_secs(150));
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_zero_idle_threshold() {
        let cfg = GatewayConfig::parse_from(["chatcore-gateway", "--idle-threshold-secs", "0"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_bind_addr() {
        let cfg = GatewayConfig::parse_from(["chatcore-gateway", "--bind-addr", "not-an-addr"]);
        assert!(cfg.validate().is_err());
    }
}
