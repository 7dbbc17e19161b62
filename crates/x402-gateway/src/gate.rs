//! The per-resource payment gate.
//!
//! Classifies each request (probe, authenticated, or malformed) and drives it
//! through verify and settle to a terminal outcome. Verify and settle are
//! strictly sequential and each runs at most once per request: settlement
//! moves real funds, so a failed attempt is never retried here; the client
//! must submit a freshly signed payload instead.

use actix_web::{HttpRequest, HttpResponse};
use alloy::primitives::Address;
use x402_proto::{
    header, PaymentPayload, PaymentRequiredChallenge, PaymentRequirements, ResourceInfo, Scheme,
    SchemeExtra, SettleResponse, X402_VERSION,
};

use crate::config::PaymentConfig;
use crate::error::GatewayError;
use crate::events::RequestEvent;
use crate::metrics::{EVENTS_EMITTED, PAYMENT_ATTEMPTS, REQUESTS};
use crate::state::AppState;

/// Static description of one paid route.
#[derive(Debug, Clone, Copy)]
pub struct ProtectedResource {
    pub route: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
    /// Price in the asset's smallest unit.
    pub amount: &'static str,
}

/// Terminal outcomes the handler acts on. Failure edges surface as
/// [`GatewayError`] instead.
pub enum GateOutcome {
    /// No payment proof was presented; answer 402 with this challenge.
    Challenge(PaymentRequiredChallenge),
    /// Payment verified and settled; release the resource.
    Paid {
        settlement: SettleResponse,
        payer: Address,
    },
}

/// Requirements are constructed fresh per request from static route config
/// and the startup-resolved payment config; nothing is persisted.
pub fn requirements_for(
    resource: &ProtectedResource,
    payment: &PaymentConfig,
) -> PaymentRequirements {
    PaymentRequirements {
        scheme: Scheme::Exact,
        network: payment.network.clone(),
        asset: payment.asset,
        amount: resource.amount.to_string(),
        pay_to: payment.pay_to,
        max_timeout_seconds: payment.max_timeout_seconds,
        extra: SchemeExtra::ExactEvm(payment.eip712_domain.clone()),
    }
}

fn challenge_for(
    resource: &ProtectedResource,
    requirements: PaymentRequirements,
) -> PaymentRequiredChallenge {
    PaymentRequiredChallenge {
        x402_version: X402_VERSION,
        resource: ResourceInfo {
            url: resource.route.to_string(),
            description: resource.description.to_string(),
            mime_type: resource.mime_type.to_string(),
        },
        accepts: vec![requirements],
    }
}

fn emit(state: &AppState, event: RequestEvent) {
    EVENTS_EMITTED
        .with_label_values(&[match event.kind {
            crate::events::EventKind::Probe => "probe",
            crate::events::EventKind::Paid => "paid",
            crate::events::EventKind::Failed => "failed",
        }])
        .inc();
    state.events.emit(event);
}

/// Drive one request through the payment state machine.
pub async fn require_payment(
    req: &HttpRequest,
    resource: &ProtectedResource,
    state: &AppState,
) -> Result<GateOutcome, GatewayError> {
    let requirements = requirements_for(resource, &state.payment);

    let Some(header_value) = req
        .headers()
        .get(header::PAYMENT_SIGNATURE)
        .and_then(|v| v.to_str().ok())
    else {
        emit(state, RequestEvent::probe());
        REQUESTS.with_label_values(&[resource.route, "402"]).inc();
        return Ok(GateOutcome::Challenge(challenge_for(resource, requirements)));
    };

    let payload: PaymentPayload = match header::decode_payment_signature(header_value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, route = resource.route, "invalid payment header");
            emit(state, RequestEvent::failed("invalid PAYMENT-SIGNATURE header"));
            REQUESTS.with_label_values(&[resource.route, "400"]).inc();
            return Err(GatewayError::MalformedHeader(
                "invalid PAYMENT-SIGNATURE header".to_string(),
            ));
        }
    };

    let verification = match state.facilitator.verify(&payload, &requirements).await {
        Ok(verification) => verification,
        Err(e) => {
            PAYMENT_ATTEMPTS.with_label_values(&["error"]).inc();
            emit(state, RequestEvent::failed("payment verification unavailable"));
            REQUESTS.with_label_values(&[resource.route, "500"]).inc();
            return Err(GatewayError::FacilitatorUnavailable(e.to_string()));
        }
    };

    if !verification.is_valid {
        let reason = verification
            .invalid_reason
            .unwrap_or_else(|| "payment verification failed".to_string());
        tracing::warn!(reason = %reason, route = resource.route, "payment rejected");
        PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
        emit(state, RequestEvent::failed(reason.clone()));
        REQUESTS.with_label_values(&[resource.route, "402"]).inc();
        return Err(GatewayError::VerificationRejected(reason));
    }

    let settlement = match state.facilitator.settle(&payload, &requirements).await {
        Ok(settlement) => settlement,
        Err(e) => {
            PAYMENT_ATTEMPTS.with_label_values(&["error"]).inc();
            emit(state, RequestEvent::failed("payment settlement unavailable"));
            REQUESTS.with_label_values(&[resource.route, "500"]).inc();
            return Err(GatewayError::FacilitatorUnavailable(e.to_string()));
        }
    };

    if !settlement.success {
        let reason = settlement
            .error_reason
            .clone()
            .unwrap_or_else(|| "payment settlement failed".to_string());
        tracing::warn!(reason = %reason, route = resource.route, "settlement rejected");
        PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
        emit(state, RequestEvent::failed(reason.clone()));
        REQUESTS.with_label_values(&[resource.route, "402"]).inc();
        return Err(GatewayError::SettlementFailed(reason));
    }

    let payer = payload.payload.authorization.from;
    tracing::info!(
        payer = %payer,
        tx = ?settlement.transaction,
        route = resource.route,
        "payment settled"
    );
    PAYMENT_ATTEMPTS.with_label_values(&["success"]).inc();
    emit(state, RequestEvent::paid(payer, settlement.transaction.clone()));
    REQUESTS.with_label_values(&[resource.route, "200"]).inc();

    Ok(GateOutcome::Paid { settlement, payer })
}

/// 402 challenge response: encoded challenge in the `PAYMENT-REQUIRED`
/// header, empty body.
pub fn challenge_response(
    challenge: &PaymentRequiredChallenge,
) -> Result<HttpResponse, GatewayError> {
    let encoded = header::encode_payment_required(challenge)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(HttpResponse::PaymentRequired()
        .insert_header((header::PAYMENT_REQUIRED, encoded))
        .finish())
}
