use actix_web::{get, web, HttpResponse};

use crate::state::AppState;

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.facilitator.supported().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "x402-gateway",
            "rateLimiter": state.limiter.mode_label(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check: facilitator unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-gateway",
                "rateLimiter": state.limiter.mode_label(),
            }))
        }
    }
}
