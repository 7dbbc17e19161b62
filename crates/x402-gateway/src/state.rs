use std::sync::Arc;

use x402_proto::Facilitator;

use crate::config::PaymentConfig;
use crate::events::EventBus;
use crate::rate_limit::RateLimiter;
use crate::routes::well_known::DiscoveryDocument;

/// Shared application state, constructed once in `main` and injected into
/// every handler. Lives until process exit.
pub struct AppState {
    pub payment: PaymentConfig,
    pub facilitator: Arc<dyn Facilitator>,
    pub events: EventBus,
    pub limiter: RateLimiter,
    /// Discovery document, built once at startup.
    pub discovery: DiscoveryDocument,
    /// Bearer token for the `/metrics` endpoint.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}
