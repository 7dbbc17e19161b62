use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version spoken by this crate.
pub const X402_VERSION: u32 = 2;

/// Named payment scheme. Adding a payment method means adding a variant
/// here together with its [`SchemeExtra`] parameters and payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Exact-amount EIP-3009 transfer-with-authorization on an EVM chain.
    Exact,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// EIP-712 signing domain of the asset contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
}

/// Scheme-specific parameters carried in the `extra` field of
/// [`PaymentRequirements`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemeExtra {
    /// Signing domain the "exact" EVM scheme needs to build the
    /// TransferWithAuthorization typed data.
    ExactEvm(Eip712Domain),
}

/// What a resource costs and how to pay it. Built fresh per request from
/// server configuration, transmitted inside the 402 challenge, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    /// CAIP-2 chain identifier, e.g. `eip155:84532`.
    pub network: String,
    /// Token contract address.
    pub asset: Address,
    /// Price in the asset's smallest unit, as a decimal string.
    pub amount: String,
    pub pay_to: Address,
    /// Validity window offered to the payer, in seconds.
    pub max_timeout_seconds: u64,
    pub extra: SchemeExtra,
}

/// Descriptor of the protected resource inside a 402 challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub url: String,
    pub description: String,
    pub mime_type: String,
}

/// The 402 challenge body, sent base64-encoded in the `PAYMENT-REQUIRED`
/// header. The server offers one or more acceptable ways to pay; the client
/// picks the first it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredChallenge {
    pub x402_version: u32,
    pub resource: ResourceInfo,
    pub accepts: Vec<PaymentRequirements>,
}

/// EIP-3009 transfer authorization as the exact EVM scheme puts it on the
/// wire: timestamps are decimal-string seconds, the nonce is 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    pub nonce: String,
}

/// Signed payload for the exact EVM scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: String,
    pub authorization: ExactEvmAuthorization,
}

/// Client-submitted payment proof, sent base64-encoded in the
/// `PAYMENT-SIGNATURE` header. Received once per request; the gateway never
/// caches or retries it; replay protection lives in the authorization nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: Scheme,
    pub network: String,
    pub payload: ExactEvmPayload,
}

/// Facilitator's answer to a `verify` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

/// Facilitator's answer to a `settle` call, echoed to the client in the
/// `PAYMENT-RESPONSE` header on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    /// Transaction hash, if settlement succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

/// One scheme/network pair a facilitator can settle on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: u32,
    pub scheme: Scheme,
    pub network: String,
}

/// Response from the facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
}
