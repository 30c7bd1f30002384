use std::sync::Arc;

use chatcore_authz::TokenValidator;
use chatcore_hub::Hub;
use chatcore_presence::PresenceService;
use chatcore_router::RouterContext;

/// Everything the `/ws` upgrade handler and the health endpoint need,
/// assembled once at startup and cloned (cheaply — every field is an `Arc`)
/// into each request.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub presence: Arc<PresenceService>,
    pub token_validator: Arc<dyn TokenValidator>,
    pub router_ctx: RouterContext,
}
