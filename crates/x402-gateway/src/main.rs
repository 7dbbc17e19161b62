use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use x402_proto::{Facilitator, FacilitatorClient};

use x402_gateway::config::GatewayConfig;
use x402_gateway::events::EventBus;
use x402_gateway::identity::FacilitatorIdentity;
use x402_gateway::rate_limit::{LimiterMode, MemoryCounterStore, RateLimiter, RestCounterStore};
use x402_gateway::routes;
use x402_gateway::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allow_any_header()
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method().allow_any_header().max_age(3600)
    }
}

fn build_limiter(config: &GatewayConfig) -> RateLimiter {
    if let (Some(url), Some(token)) = (&config.kv_rest_api_url, &config.kv_rest_api_token) {
        match RestCounterStore::new(url, token) {
            Ok(store) => return RateLimiter::new(Arc::new(store), LimiterMode::Rest),
            Err(e) => {
                tracing::warn!(error = %e, "counter store init failed; rate limiting disabled");
                return RateLimiter::disabled();
            }
        }
    }
    if config.rate_limit_memory {
        return RateLimiter::new(Arc::new(MemoryCounterStore::new()), LimiterMode::Memory);
    }
    tracing::warn!("KV_REST_API_URL/KV_REST_API_TOKEN not set; rate limiting disabled");
    RateLimiter::disabled()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env();

    let identity = config.facilitator_key.as_deref().map(|key| {
        match FacilitatorIdentity::from_key(key) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(error = %e, "invalid FACILITATOR_PRIVATE_KEY");
                std::process::exit(1);
            }
        }
    });

    let payment = config.resolve_payment(identity.as_ref());

    let facilitator: Arc<dyn Facilitator> = match FacilitatorClient::new(&config.facilitator_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "could not construct facilitator client");
            std::process::exit(1);
        }
    };

    let limiter = build_limiter(&config);
    let discovery = routes::well_known::build_document(&config.site_url, identity.as_ref());

    let state = web::Data::new(AppState {
        payment,
        facilitator,
        events: EventBus::new(),
        limiter,
        discovery,
        metrics_token: config.metrics_token.clone(),
        public_metrics: config.public_metrics,
    });

    tracing::info!("x402 gateway listening at http://localhost:{}", config.port);
    tracing::info!("Paid endpoints: GET /api/cowsays, GET /api/quote (0.001 USDC each)");
    tracing::info!("Live feed: GET /api/events · discovery: GET /.well-known/x402");
    tracing::info!("Rate limiter: {}", state.limiter.mode_label());
    tracing::info!("Paying to: {}", state.payment.pay_to);

    let cors_origins = config.allowed_origins.clone();
    let port = config.port;

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .app_data(state.clone())
            .service(routes::cowsay::cowsays)
            .service(routes::quote::quote)
            .service(routes::events::events)
            .service(routes::well_known::well_known)
            .service(routes::health::health)
            .service(routes::metrics::metrics_endpoint)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
