use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Gateway failure taxonomy. Every variant maps to one HTTP status and a
/// short human-readable body; internal causes stay in the logs.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client input could not be decoded. Retrying the same bytes will fail
    /// the same way.
    #[error("{0}")]
    MalformedHeader(String),

    /// The facilitator judged the payment invalid; the client must submit a
    /// new payment, not retry this one.
    #[error("{0}")]
    VerificationRejected(String),

    /// The facilitator attempted settlement and failed; same non-retry rule.
    #[error("{0}")]
    SettlementFailed(String),

    /// Transport or configuration error calling the facilitator. The client
    /// may retry after backoff.
    #[error("payment processing failed")]
    FacilitatorUnavailable(String),

    /// Admission denied by the rate limiter.
    #[error("Too Many Requests")]
    RateLimited { retry_after: u64 },

    /// Live-feed subscriber cap reached.
    #[error("event stream at capacity")]
    CapacityExceeded { retry_after: u64 },

    #[error("internal error")]
    Internal(String),
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({ "error": self.to_string() });
        match self {
            GatewayError::MalformedHeader(_) => HttpResponse::BadRequest().json(body),
            GatewayError::VerificationRejected(_) | GatewayError::SettlementFailed(_) => {
                HttpResponse::PaymentRequired().json(body)
            }
            GatewayError::FacilitatorUnavailable(detail) => {
                tracing::error!(detail = %detail, "facilitator unavailable");
                HttpResponse::InternalServerError().json(body)
            }
            GatewayError::RateLimited { retry_after } => HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(body),
            GatewayError::CapacityExceeded { retry_after } => HttpResponse::ServiceUnavailable()
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(body),
            GatewayError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}
