//! Facilitator contract and HTTP client.
//!
//! The facilitator is the trusted party that verifies a payment
//! authorization and submits the on-chain settlement transaction. Its signer
//! and chain client live in a separate service; this module defines the
//! contract the gateway consumes and a reqwest-backed implementation of it.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProtocolError;
use crate::types::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse, VerifyResponse,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Verifies and settles payments against a blockchain-backed scheme.
///
/// Implementations must never cache results: settlement is a side effect an
/// idempotent retry cannot roll back, so the gateway calls `verify` at most
/// once and, only on a valid result, `settle` at most once per request.
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// Check a payment authorization against the requirements. Read-only.
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, ProtocolError>;

    /// Execute the on-chain transfer for a previously verified payment.
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, ProtocolError>;

    /// Schemes and networks this facilitator can settle on.
    async fn supported(&self) -> Result<SupportedResponse, ProtocolError>;
}

#[derive(Serialize)]
struct FacilitatorRequest<'a> {
    payload: &'a PaymentPayload,
    requirements: &'a PaymentRequirements,
}

/// Client for a remote facilitator service exposing `/verify`, `/settle`
/// and `/supported`.
#[derive(Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl FacilitatorClient {
    pub fn new(base_url: &str) -> Result<Self, ProtocolError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProtocolError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<T, ProtocolError> {
        let url = format!("{}{path}", self.base_url);
        let body = FacilitatorRequest {
            payload,
            requirements,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProtocolError::Http(format!("{path} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, path, body = %body, "facilitator returned non-success response");
            return Err(ProtocolError::Facilitator(format!(
                "{path} returned {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProtocolError::Facilitator(format!("{path} response parse failed: {e}")))
    }
}

#[async_trait]
impl Facilitator for FacilitatorClient {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, ProtocolError> {
        let result: VerifyResponse = self.post("/verify", payload, requirements).await?;

        if result.is_valid {
            tracing::debug!(payer = ?result.payer, "payment verified");
        } else {
            tracing::warn!(reason = ?result.invalid_reason, "payment verification rejected");
        }
        Ok(result)
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, ProtocolError> {
        let result: SettleResponse = self.post("/settle", payload, requirements).await?;

        if result.success {
            tracing::info!(tx = ?result.transaction, "settlement completed");
        } else {
            tracing::warn!(reason = ?result.error_reason, "settlement rejected");
        }
        Ok(result)
    }

    async fn supported(&self) -> Result<SupportedResponse, ProtocolError> {
        let url = format!("{}/supported", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProtocolError::Http(format!("/supported request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::Facilitator(format!(
                "/supported returned {status}"
            )));
        }

        response
            .json::<SupportedResponse>()
            .await
            .map_err(|e| ProtocolError::Facilitator(format!("/supported response parse failed: {e}")))
    }
}
