//! `chatcore-gateway`: the chat instance's HTTP/WS front door. Wires the
//! presence store, presence service, session hub, pub/sub bridges, and
//! authz/token clients together, serves `GET /ws` and `GET /healthz`, and
//! carries out the shutdown sequence from §5 on SIGINT/SIGTERM.

mod health;
mod state;
mod ws_handler;

use std::{process::ExitCode, sync::Arc};

use axum::{Router, routing::get};
use chatcore_authz::{CanSendDirect, GrpcAuthzClient, GrpcTokenValidator, GrpcUserDirectory, TokenValidator};
use chatcore_config::GatewayConfig;
use chatcore_hub::Hub;
use chatcore_presence::{PresenceEventBus, PresenceService, ProfileDirectory};
use chatcore_presence_store::PresenceStore;
use chatcore_pubsub::PubSubTransport;
use chatcore_router::{ChatContext, PresenceContext, RouterContext};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let config = GatewayConfig::load();
    chatcore_common::logging::init_tracing(&config.log_level, config.json_logs);

    if let Err(err) = config.validate() {
        error!(%err, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let instance_id = config.resolve_instance_id();
    info!(instance_id, bind_addr = %config.bind_addr, "starting chatcore-gateway");

    let store = match PresenceStore::connect(&config.redis_url, config.conn_ttl()).await {
        Ok(store) => store,
        Err(err) => {
            error!(%err, "failed to connect presence store");
            return ExitCode::FAILURE;
        },
    };

    let pubsub = match PubSubTransport::connect(&config.redis_url).await {
        Ok(transport) => transport,
        Err(err) => {
            error!(%err, "failed to connect pub/sub transport");
            return ExitCode::FAILURE;
        },
    };

    let directory: Arc<dyn ProfileDirectory> = match GrpcUserDirectory::connect(config.profile_grpc_addr.clone()).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(%err, "failed to connect to profile service (UserDirectory)");
            return ExitCode::FAILURE;
        },
    };

    let authz: Arc<dyn CanSendDirect> = match GrpcAuthzClient::connect(config.profile_grpc_addr.clone()).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(%err, "failed to connect to profile service (Authorization)");
            return ExitCode::FAILURE;
        },
    };

    let token_validator: Arc<dyn TokenValidator> =
        match GrpcTokenValidator::connect(config.profile_grpc_addr.clone()).await {
            Ok(client) => Arc::new(client),
            Err(err) => {
                error!(%err, "failed to connect to profile service (Auth)");
                return ExitCode::FAILURE;
            },
        };

    let bus = PresenceEventBus::new();
    let presence = Arc::new(PresenceService::new(store, bus.clone(), config.idle_threshold(), directory));

    let hub = Arc::new(Hub::new(instance_id));
    let presence_sub = bus.subscribe().await;
    hub.spawn_presence_bridge(presence_sub);
    if let Err(err) = hub.spawn_pubsub_bridges(&pubsub).await {
        error!(%err, "failed to subscribe to cross-instance pub/sub channels");
        return ExitCode::FAILURE;
    }

    let router_ctx = RouterContext {
        chat: ChatContext {
            hub: Arc::clone(&hub),
            authz,
            pubsub: Arc::new(pubsub) as Arc<dyn chatcore_pubsub::ChatPublisher>,
            instance_id: hub.instance_id().to_string(),
        },
        presence: PresenceContext { presence: Arc::clone(&presence) as Arc<dyn chatcore_presence::PresenceQuery> },
    };

    let state = AppState { hub: Arc::clone(&hub), presence, token_validator, router_ctx };

    let app = Router::new()
        .route("/ws", get(ws_handler::upgrade))
        .route("/healthz", get(health::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, bind_addr = %config.bind_addr, "failed to bind listening socket");
            return ExitCode::FAILURE;
        },
    };

    let result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;

    // §5 shutdown sequence: HTTP upgrades have already stopped (graceful
    // shutdown above), so cancel the hub next. The gRPC/Redis clients all
    // close implicitly as their last `Arc` drops at the end of `main`.
    hub.shutdown();

    if let Err(err) = result {
        error!(%err, "gateway server exited with error");
        return ExitCode::FAILURE;
    }

    info!("gateway shut down cleanly");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(err) => error!(%err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
