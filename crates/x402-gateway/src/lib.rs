//! Pay-per-request demo gateway for the x402 protocol.
//!
//! Serves priced endpoints behind HTTP 402 challenges on Base Sepolia,
//! delegating verification and settlement to a remote facilitator, and
//! streams a live feed of request outcomes over SSE.
//!
//! # Modules
//!
//! - [`gate`]: the probe/challenge/verify/settle state machine
//! - [`events`]: bounded in-process event bus behind the live feed
//! - [`sse`]: server-sent-event transport over a bus subscription
//! - [`rate_limit`]: sliding-window admission control with swappable
//!   counter stores
//! - [`routes`]: HTTP surface: paid resources, feed, discovery, health,
//!   metrics
//! - [`config`] / [`state`]: startup configuration and the injected
//!   application state

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod identity;
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod security;
pub mod sse;
pub mod state;

pub use error::GatewayError;
pub use state::AppState;
