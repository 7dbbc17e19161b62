//! Environment-driven configuration, resolved once at startup.

use alloy::primitives::Address;
use x402_proto::Eip712Domain;

use crate::identity::FacilitatorIdentity;

/// CAIP-2 identifier for Base Sepolia.
pub const NETWORK: &str = "eip155:84532";

/// USDC on Base Sepolia (0x036CbD53842c5426634e7929541eC2318f3dCF7e).
pub const USDC_BASE_SEPOLIA: Address = Address::new([
    0x03, 0x6c, 0xbd, 0x53, 0x84, 0x2c, 0x54, 0x26, 0x63, 0x4e, 0x79, 0x29, 0x54, 0x1e, 0xc2, 0x31,
    0x8f, 0x3d, 0xcf, 0x7e,
]);

/// EIP-712 domain of the USDC contract, required by the exact EVM scheme to
/// construct the TransferWithAuthorization typed data.
pub const USDC_DOMAIN_NAME: &str = "USDC";
pub const USDC_DOMAIN_VERSION: &str = "2";

/// Validity window offered to payers, in seconds.
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Raw environment configuration for the gateway binary.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub site_url: String,
    pub facilitator_url: String,
    pub pay_to: Option<Address>,
    pub facilitator_key: Option<String>,
    pub kv_rest_api_url: Option<String>,
    pub kv_rest_api_token: Option<String>,
    /// `RATE_LIMIT_STORE=memory` opts into the in-process counter store.
    pub rate_limit_memory: bool,
    pub allowed_origins: Vec<String>,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl GatewayConfig {
    /// Read configuration from the environment. Exits the process when a
    /// required variable is missing or unparseable.
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4021);

        let site_url = std::env::var("SITE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let facilitator_url = match std::env::var("FACILITATOR_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => {
                tracing::error!(
                    "FACILITATOR_URL is required. \
                     Point it at a facilitator service exposing /verify and /settle."
                );
                std::process::exit(1);
            }
        };

        let pay_to = std::env::var("PAYTO_ADDRESS")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<Address>() {
                Ok(address) => address,
                Err(e) => {
                    tracing::error!(error = %e, "invalid PAYTO_ADDRESS");
                    std::process::exit(1);
                }
            });

        let facilitator_key = std::env::var("FACILITATOR_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let rate_limit_memory = std::env::var("RATE_LIMIT_STORE")
            .map(|v| v == "memory")
            .unwrap_or(false);

        let allowed_origins: Vec<String> = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let metrics_token = std::env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        let public_metrics = std::env::var("X402_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            port,
            site_url,
            facilitator_url,
            pay_to,
            facilitator_key,
            kv_rest_api_url: std::env::var("KV_REST_API_URL").ok().filter(|s| !s.is_empty()),
            kv_rest_api_token: std::env::var("KV_REST_API_TOKEN").ok().filter(|s| !s.is_empty()),
            rate_limit_memory,
            allowed_origins,
            metrics_token,
            public_metrics,
        }
    }

    /// Resolve the payment parameters every priced route shares. The pay-to
    /// address is validated here, once, so request handlers never have to
    /// derive addresses or discover missing configuration mid-flight. Exits
    /// when neither `PAYTO_ADDRESS` nor an identity key is available.
    pub fn resolve_payment(&self, identity: Option<&FacilitatorIdentity>) -> PaymentConfig {
        let pay_to = match self.pay_to.or_else(|| identity.map(|id| id.address())) {
            Some(address) => address,
            None => {
                tracing::error!(
                    "no payment address: set PAYTO_ADDRESS, or FACILITATOR_PRIVATE_KEY \
                     to default to the facilitator's own address"
                );
                std::process::exit(1);
            }
        };

        PaymentConfig {
            network: NETWORK.to_string(),
            asset: USDC_BASE_SEPOLIA,
            pay_to,
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            eip712_domain: Eip712Domain {
                name: USDC_DOMAIN_NAME.to_string(),
                version: USDC_DOMAIN_VERSION.to_string(),
            },
        }
    }
}

/// Payment parameters resolved at startup and shared by every priced route.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub network: String,
    pub asset: Address,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub eip712_domain: Eip712Domain,
}
