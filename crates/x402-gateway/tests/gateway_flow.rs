//! End-to-end tests for the payment gate, driven through the actix service
//! with a programmable facilitator double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{test, web, App};
use alloy::primitives::Address;
use async_trait::async_trait;

use x402_gateway::config::{self, PaymentConfig};
use x402_gateway::events::{EventBus, EventKind, RequestEvent, Subscription};
use x402_gateway::rate_limit::{LimiterMode, MemoryCounterStore, RateLimiter};
use x402_gateway::routes;
use x402_gateway::state::AppState;
use x402_proto::{
    header, Eip712Domain, ExactEvmAuthorization, ExactEvmPayload, Facilitator, PaymentPayload,
    PaymentRequirements, ProtocolError, Scheme, SettleResponse, SupportedKind, SupportedResponse,
    VerifyResponse, X402_VERSION,
};

const PAYER: Address = Address::new([0x11; 20]);
const PAY_TO: Address = Address::new([0xab; 20]);

/// Programmable facilitator double with call counters.
struct MockFacilitator {
    verify_response: VerifyResponse,
    settle_response: SettleResponse,
    verify_error: bool,
    settle_error: bool,
    supported_error: bool,
    verify_calls: AtomicUsize,
    settle_calls: AtomicUsize,
}

impl MockFacilitator {
    fn new(verify_response: VerifyResponse, settle_response: SettleResponse) -> Self {
        Self {
            verify_response,
            settle_response,
            verify_error: false,
            settle_error: false,
            supported_error: false,
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
        }
    }

    fn approving(tx: &str) -> Self {
        Self::new(
            VerifyResponse {
                is_valid: true,
                invalid_reason: None,
                payer: Some(PAYER),
            },
            SettleResponse {
                success: true,
                transaction: Some(tx.to_string()),
                network: Some(config::NETWORK.to_string()),
                error_reason: None,
                payer: Some(PAYER),
            },
        )
    }

    fn rejecting_verify(reason: &str) -> Self {
        Self::new(
            VerifyResponse {
                is_valid: false,
                invalid_reason: Some(reason.to_string()),
                payer: None,
            },
            SettleResponse::default(),
        )
    }

    fn rejecting_settle(reason: &str) -> Self {
        let mut mock = Self::approving("unused");
        mock.settle_response = SettleResponse {
            success: false,
            error_reason: Some(reason.to_string()),
            ..SettleResponse::default()
        };
        mock
    }

    fn verify_unreachable() -> Self {
        let mut mock = Self::approving("unused");
        mock.verify_error = true;
        mock
    }

    fn facilitator_down() -> Self {
        let mut mock = Self::approving("unused");
        mock.verify_error = true;
        mock.settle_error = true;
        mock.supported_error = true;
        mock
    }
}

#[async_trait]
impl Facilitator for MockFacilitator {
    async fn verify(
        &self,
        _payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, ProtocolError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.verify_error {
            return Err(ProtocolError::Http("connection refused".to_string()));
        }
        Ok(self.verify_response.clone())
    }

    async fn settle(
        &self,
        _payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, ProtocolError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        if self.settle_error {
            return Err(ProtocolError::Http("connection refused".to_string()));
        }
        Ok(self.settle_response.clone())
    }

    async fn supported(&self) -> Result<SupportedResponse, ProtocolError> {
        if self.supported_error {
            return Err(ProtocolError::Http("connection refused".to_string()));
        }
        Ok(SupportedResponse {
            kinds: vec![SupportedKind {
                x402_version: X402_VERSION,
                scheme: Scheme::Exact,
                network: config::NETWORK.to_string(),
            }],
        })
    }
}

fn test_payment() -> PaymentConfig {
    PaymentConfig {
        network: config::NETWORK.to_string(),
        asset: config::USDC_BASE_SEPOLIA,
        pay_to: PAY_TO,
        max_timeout_seconds: config::MAX_TIMEOUT_SECONDS,
        eip712_domain: Eip712Domain {
            name: config::USDC_DOMAIN_NAME.to_string(),
            version: config::USDC_DOMAIN_VERSION.to_string(),
        },
    }
}

struct Harness {
    mock: Arc<MockFacilitator>,
    bus: EventBus,
    state: web::Data<AppState>,
}

fn harness(mock: MockFacilitator) -> Harness {
    harness_with_limiter(mock, RateLimiter::disabled())
}

fn harness_with_limiter(mock: MockFacilitator, limiter: RateLimiter) -> Harness {
    let mock = Arc::new(mock);
    let bus = EventBus::new();
    let facilitator: Arc<dyn Facilitator> = mock.clone();

    let state = web::Data::new(AppState {
        payment: test_payment(),
        facilitator,
        events: bus.clone(),
        limiter,
        discovery: routes::well_known::build_document("http://localhost:4021", None),
        metrics_token: None,
        public_metrics: false,
    });

    Harness { mock, bus, state }
}

macro_rules! init_app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data($h.state.clone())
                .service(routes::cowsay::cowsays)
                .service(routes::quote::quote)
                .service(routes::events::events)
                .service(routes::well_known::well_known)
                .service(routes::health::health),
        )
        .await
    };
}

fn signed_payload() -> String {
    let payload = PaymentPayload {
        x402_version: X402_VERSION,
        scheme: Scheme::Exact,
        network: config::NETWORK.to_string(),
        payload: ExactEvmPayload {
            signature: "0xdeadbeef".to_string(),
            authorization: ExactEvmAuthorization {
                from: PAYER,
                to: PAY_TO,
                value: "1000".to_string(),
                valid_after: "0".to_string(),
                valid_before: "9999999999".to_string(),
                nonce: format!("0x{}", "42".repeat(32)),
            },
        },
    };
    header::encode_payment_signature(&payload).unwrap()
}

fn drain(sub: &mut Subscription) -> Vec<RequestEvent> {
    let mut out = Vec::new();
    while let Ok(event) = sub.try_recv() {
        out.push(event);
    }
    out
}

fn events_of_kind(bus: &EventBus, kind: EventKind) -> Vec<RequestEvent> {
    let mut sub = bus.subscribe().unwrap();
    drain(&mut sub)
        .into_iter()
        .filter(|e| e.kind == kind)
        .collect()
}

#[actix_rt::test]
async fn test_probe_yields_challenge_without_touching_facilitator() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/cowsays").to_request(),
    )
    .await;

    assert_eq!(resp.status(), 402);
    let encoded = resp
        .headers()
        .get(header::PAYMENT_REQUIRED)
        .expect("challenge header")
        .to_str()
        .unwrap();
    let challenge = header::decode_payment_required(encoded).unwrap();
    assert_eq!(challenge.x402_version, X402_VERSION);
    assert_eq!(challenge.resource.url, "/api/cowsays");
    assert_eq!(challenge.accepts.len(), 1);
    let req = &challenge.accepts[0];
    assert_eq!(req.scheme, Scheme::Exact);
    assert_eq!(req.network, "eip155:84532");
    assert_eq!(req.amount, "1000");
    assert_eq!(req.pay_to, PAY_TO);

    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 0);
    assert_eq!(events_of_kind(&h.bus, EventKind::Probe).len(), 1);
}

#[actix_rt::test]
async fn test_malformed_header_yields_400_without_verify() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, "not-valid-base64!!!"))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid PAYMENT-SIGNATURE header");

    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 0);
    assert_eq!(events_of_kind(&h.bus, EventKind::Failed).len(), 1);
}

#[actix_rt::test]
async fn test_invalid_verification_yields_402_without_settle() {
    let h = harness(MockFacilitator::rejecting_verify("insufficient funds"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 402);
    // Policy 402, not a challenge: no PAYMENT-REQUIRED header.
    assert!(resp.headers().get(header::PAYMENT_REQUIRED).is_none());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "insufficient funds");

    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 0);

    let failed = events_of_kind(&h.bus, EventKind::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error.as_deref(), Some("insufficient funds"));
}

#[actix_rt::test]
async fn test_failed_settlement_yields_402_and_is_not_deduped() {
    let h = harness(MockFacilitator::rejecting_settle("authorization expired"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 402);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authorization expired");
    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(events_of_kind(&h.bus, EventKind::Failed).len(), 1);

    // An identical resubmission re-runs verify and settle independently.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 402);
    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 2);
    assert_eq!(events_of_kind(&h.bus, EventKind::Failed).len(), 2);
}

#[actix_rt::test]
async fn test_facilitator_outage_yields_500() {
    let h = harness(MockFacilitator::verify_unreachable());
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    // Internal detail never leaks into the response.
    assert_eq!(body["error"], "payment processing failed");
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 0);
    assert_eq!(events_of_kind(&h.bus, EventKind::Failed).len(), 1);
}

#[actix_rt::test]
async fn test_paid_flow_end_to_end() {
    let tx = "0xdeadbeef00000000000000000000000000000000000000000000000000000000";
    let h = harness(MockFacilitator::approving(tx));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let receipt = resp
        .headers()
        .get(header::PAYMENT_RESPONSE)
        .expect("settlement header")
        .to_str()
        .unwrap()
        .to_string();
    let settlement = header::decode_payment_response(&receipt).unwrap();
    assert!(settlement.success);
    assert_eq!(settlement.transaction.as_deref(), Some(tx));
    assert_eq!(settlement.network.as_deref(), Some("eip155:84532"));

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["cowsay"].as_str().unwrap().contains("(oo)"));
    assert_eq!(body["tx"], tx);
    assert_eq!(body["network"], "eip155:84532");

    assert_eq!(h.mock.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.mock.settle_calls.load(Ordering::SeqCst), 1);

    let paid = events_of_kind(&h.bus, EventKind::Paid);
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].tx.as_deref(), Some(tx));
    assert_eq!(paid[0].from, Some(PAYER));
}

#[actix_rt::test]
async fn test_quote_route_uses_same_gate() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/quote").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 402);
    assert!(resp.headers().get(header::PAYMENT_REQUIRED).is_some());

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/quote")
            .insert_header((header::PAYMENT_SIGNATURE, signed_payload()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(!body["quote"].as_str().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_event_stream_rejects_at_capacity() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let _slots: Vec<_> = (0..100).map(|_| h.bus.subscribe().unwrap()).collect();

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/events").to_request(),
    )
    .await;

    assert_eq!(resp.status(), 503);
    assert_eq!(resp.headers().get("Retry-After").unwrap(), "10");
}

#[actix_rt::test]
async fn test_rate_limit_denies_after_tier_budget() {
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        LimiterMode::Memory,
    );
    let h = harness_with_limiter(MockFacilitator::approving("0xfeed"), limiter);
    let app = init_app!(h);

    for _ in 0..10 {
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/cowsays")
                .insert_header(("x-forwarded-for", "1.2.3.4"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 402);
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header(("x-forwarded-for", "1.2.3.4"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().get("Retry-After").is_some());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Too Many Requests");

    // A different client still gets through.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/cowsays")
            .insert_header(("x-forwarded-for", "5.6.7.8"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 402);

    // Shedding happens before the gate: only the admitted probes emitted.
    assert_eq!(events_of_kind(&h.bus, EventKind::Probe).len(), 11);
}

#[actix_rt::test]
async fn test_well_known_discovery_document() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/.well-known/x402").to_request(),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("Cache-Control").unwrap(),
        "public, max-age=3600"
    );
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["version"], 1);
    assert_eq!(body["resources"][0], "http://localhost:4021/api/cowsays");
    assert!(body["instructions"].as_str().unwrap().contains("Base Sepolia"));
    assert!(body.get("ownershipProofs").is_none());
}

#[actix_rt::test]
async fn test_health_reports_limiter_mode_and_facilitator() {
    let h = harness(MockFacilitator::approving("0xfeed"));
    let app = init_app!(h);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rateLimiter"], "disabled");

    let h = harness(MockFacilitator::facilitator_down());
    let app = init_app!(h);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "degraded");
}
