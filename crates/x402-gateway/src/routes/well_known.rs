use actix_web::{get, web, HttpRequest, HttpResponse};
use alloy::primitives::Address;
use serde::Serialize;

use crate::config::NETWORK;
use crate::error::GatewayError;
use crate::identity::FacilitatorIdentity;
use crate::rate_limit;
use crate::state::AppState;

/// Discovery document served at `/.well-known/x402`, built once at startup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    pub version: u32,
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership_proofs: Option<Vec<OwnershipProof>>,
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipProof {
    pub address: Address,
    pub signature: String,
    pub chain: String,
}

pub fn build_document(
    site_url: &str,
    identity: Option<&FacilitatorIdentity>,
) -> DiscoveryDocument {
    let origin = url::Url::parse(site_url)
        .ok()
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|| site_url.trim_end_matches('/').to_string());

    // Signing the origin with the payment key proves control of the address
    // to discovery platforms like x402scan. Non-fatal when absent.
    let ownership_proofs = identity.and_then(|id| match id.sign_origin(&origin) {
        Ok(signature) => Some(vec![OwnershipProof {
            address: id.address(),
            signature,
            chain: NETWORK.to_string(),
        }]),
        Err(e) => {
            tracing::warn!(error = %e, "could not produce ownership proof");
            None
        }
    });

    DiscoveryDocument {
        version: 1,
        resources: vec![
            format!("{origin}/api/cowsays"),
            format!("{origin}/api/quote"),
        ],
        ownership_proofs,
        instructions: "## x402 demo · Base Sepolia\n\n\
            Pay 0.001 USDC per request to `/api/cowsays` or `/api/quote`.\n\n\
            Requirements: MetaMask on Base Sepolia + test USDC from https://faucet.circle.com"
            .to_string(),
    }
}

#[get("/.well-known/x402")]
pub async fn well_known(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    rate_limit::enforce(&req, "/.well-known/x402", &state.limiter).await?;

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "public, max-age=3600"))
        .json(&state.discovery))
}
