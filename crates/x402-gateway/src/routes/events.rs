use actix_web::{get, web, HttpRequest, HttpResponse};

use crate::error::GatewayError;
use crate::events::MAX_LISTENERS;
use crate::rate_limit;
use crate::sse::EventStream;
use crate::state::AppState;

/// Hint for clients to retry after a capacity rejection.
const RETRY_AFTER_SECS: u64 = 10;

#[get("/api/events")]
pub async fn events(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    rate_limit::enforce(&req, "/api/events", &state.limiter).await?;

    // Reject before committing to a stream that cannot get a slot.
    if state.events.listener_count() >= MAX_LISTENERS {
        return Err(GatewayError::CapacityExceeded {
            retry_after: RETRY_AFTER_SECS,
        });
    }

    let sub = match state.events.subscribe() {
        Ok(sub) => sub,
        // Lost the pre-check race to a concurrent connect.
        Err(_) => {
            return Err(GatewayError::CapacityExceeded {
                retry_after: RETRY_AFTER_SECS,
            })
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache, no-transform"))
        // Tell nginx and friends not to buffer the stream.
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(EventStream::new(sub)))
}
