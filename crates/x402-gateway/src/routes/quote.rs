use actix_web::{get, web, HttpRequest, HttpResponse};
use x402_proto::header;

use crate::error::GatewayError;
use crate::gate::{self, GateOutcome, ProtectedResource};
use crate::rate_limit;
use crate::state::AppState;

const RESOURCE: ProtectedResource = ProtectedResource {
    route: "/api/quote",
    description: "Random inspirational quote",
    mime_type: "application/json",
    // 0.001 USDC (6 decimals)
    amount: "1000",
};

#[get("/api/quote")]
pub async fn quote(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    rate_limit::enforce(&req, RESOURCE.route, &state.limiter).await?;

    match gate::require_payment(&req, &RESOURCE, &state).await? {
        GateOutcome::Challenge(challenge) => gate::challenge_response(&challenge),
        GateOutcome::Paid { settlement, .. } => {
            let receipt = header::encode_payment_response(&settlement)
                .map_err(|e| GatewayError::Internal(e.to_string()))?;

            Ok(HttpResponse::Ok()
                .insert_header((header::PAYMENT_RESPONSE, receipt))
                .json(serde_json::json!({
                    "quote": super::pick_quote(),
                    "tx": settlement.transaction,
                    "network": settlement.network,
                })))
        }
    }
}
