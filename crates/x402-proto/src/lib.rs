//! x402 pay-per-request protocol: wire types, header codec, facilitator
//! contract.
//!
//! HTTP 402 challenge/response: a client probes a priced endpoint, receives
//! machine-readable [`PaymentRequirements`] in a `PAYMENT-REQUIRED` header,
//! signs an off-chain authorization, and retries with a `PAYMENT-SIGNATURE`
//! header that a facilitator verifies and settles on-chain before the
//! resource is released.
//!
//! # Modules
//!
//! - [`types`]: wire types for the "exact" EVM transfer-with-authorization
//!   scheme (x402 version 2)
//! - [`header`]: base64/JSON codec for the three payment headers
//! - [`facilitator`]: the [`Facilitator`] contract and its HTTP client

pub mod error;
pub mod facilitator;
pub mod header;
pub mod types;

pub use error::ProtocolError;
pub use facilitator::{Facilitator, FacilitatorClient};
pub use types::*;
