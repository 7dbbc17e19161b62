//! Payment header codec.
//!
//! The three protocol headers carry structured JSON values base64-encoded so
//! they survive transit as single ASCII header values. Pure structural
//! (de)serialization; no network or cryptographic work happens here.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProtocolError;
use crate::types::{PaymentPayload, PaymentRequiredChallenge, SettleResponse};

/// Carries the 402 challenge from server to client.
pub const PAYMENT_REQUIRED: &str = "PAYMENT-REQUIRED";
/// Carries the signed payment payload from client to server.
pub const PAYMENT_SIGNATURE: &str = "PAYMENT-SIGNATURE";
/// Carries the settlement receipt back to the client on success.
pub const PAYMENT_RESPONSE: &str = "PAYMENT-RESPONSE";

fn encode<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_vec(value)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn decode<T: DeserializeOwned>(header: &str) -> Result<T, ProtocolError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header)
        .map_err(|e| ProtocolError::MalformedHeader(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProtocolError::MalformedHeader(format!("invalid JSON payload: {e}")))
}

/// Encode a 402 challenge for the `PAYMENT-REQUIRED` header.
pub fn encode_payment_required(
    challenge: &PaymentRequiredChallenge,
) -> Result<String, ProtocolError> {
    encode(challenge)
}

/// Decode a `PAYMENT-REQUIRED` header value.
pub fn decode_payment_required(header: &str) -> Result<PaymentRequiredChallenge, ProtocolError> {
    decode(header)
}

/// Encode a signed payment payload for the `PAYMENT-SIGNATURE` header.
pub fn encode_payment_signature(payload: &PaymentPayload) -> Result<String, ProtocolError> {
    encode(payload)
}

/// Decode a `PAYMENT-SIGNATURE` header value.
pub fn decode_payment_signature(header: &str) -> Result<PaymentPayload, ProtocolError> {
    decode(header)
}

/// Encode a settlement receipt for the `PAYMENT-RESPONSE` header.
pub fn encode_payment_response(settlement: &SettleResponse) -> Result<String, ProtocolError> {
    encode(settlement)
}

/// Decode a `PAYMENT-RESPONSE` header value.
pub fn decode_payment_response(header: &str) -> Result<SettleResponse, ProtocolError> {
    decode(header)
}
