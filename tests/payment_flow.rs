//! End-to-end payment flow tests against a mock resource server and
//! facilitator, with a scripted in-memory chain client.

use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use x402_starknet::chain::{Call, ChainClient, ChainError, InvokeResult};
use x402_starknet::typed_data::TypedData;
use x402_starknet::types::Signature;
use x402_starknet::{
    FacilitatorClient, Felt, PaymentFlow, PaymentFlowError, TokenAmount,
};

const APPROVE_TX_HASH: u64 = 0x7a;

/// Scripted chain client: records every interaction, answers allowance reads
/// from a configured value, and signs with a hash of the typed data.
struct MockChain {
    allowance: TokenAmount,
    confirmation_times_out: bool,
    calls: Mutex<Vec<(Felt, String, Vec<Felt>)>>,
    executed: Mutex<Vec<Vec<Call>>>,
    waited: Mutex<Vec<Felt>>,
}

impl MockChain {
    fn new() -> Self {
        Self {
            allowance: TokenAmount::from(0u64),
            confirmation_times_out: false,
            calls: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
        }
    }

    fn with_allowance(mut self, amount: u64) -> Self {
        self.allowance = TokenAmount::from(amount);
        self
    }

    fn with_confirmation_timeout(mut self) -> Self {
        self.confirmation_times_out = true;
        self
    }

    fn approvals_submitted(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn address(&self) -> Felt {
        Felt::from(0xa11ce_u64)
    }

    async fn call_contract(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<Vec<Felt>, ChainError> {
        self.calls
            .lock()
            .unwrap()
            .push((contract, entrypoint.to_string(), calldata.to_vec()));
        // allowance reads return the (low, high) limb pair
        let low = Felt::new(self.allowance.0).expect("test allowance fits a limb");
        Ok(vec![low, Felt::ZERO])
    }

    async fn execute(&self, calls: &[Call]) -> Result<InvokeResult, ChainError> {
        self.executed.lock().unwrap().push(calls.to_vec());
        Ok(InvokeResult {
            transaction_hash: Felt::from(APPROVE_TX_HASH),
        })
    }

    async fn wait_for_transaction(
        &self,
        transaction_hash: Felt,
        _timeout: Duration,
    ) -> Result<(), ChainError> {
        self.waited.lock().unwrap().push(transaction_hash);
        if self.confirmation_times_out {
            Err(ChainError::ConfirmationTimeout { transaction_hash })
        } else {
            Ok(())
        }
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature, ChainError> {
        let json = serde_json::to_string(typed_data)
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        let r = Felt::from(hasher.finish());
        json.len().hash(&mut hasher);
        let s = Felt::from(hasher.finish());
        Ok(Signature { r, s })
    }
}

fn challenge_body() -> serde_json::Value {
    serde_json::json!({
        "x402Version": 1,
        "accepts": [{
            "scheme": "exact",
            "network": "starknet-sepolia",
            "maxAmountRequired": "1000",
            "asset": "0x70ce",
            "payTo": "0xbee",
        }],
    })
}

/// Mounts a resource that answers 402 until the payment header shows up.
async fn mount_paid_resource(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resource"))
        .and(header_exists("X-PAYMENT"))
        .respond_with(ResponseTemplate::new(200).set_body_string("paid content"))
        .with_priority(1)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
        .with_priority(5)
        .expect(1)
        .mount(server)
        .await;
}

fn get_request(server: &MockServer) -> reqwest::Request {
    reqwest::Client::new()
        .get(format!("{}/resource", server.uri()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn pays_a_402_challenge_and_retries_with_the_payment_header() {
    let server = MockServer::start().await;
    mount_paid_resource(&server).await;

    let chain = Arc::new(MockChain::new());
    let flow = PaymentFlow::new(chain.clone());
    let outcome = flow.fetch(get_request(&server)).await.unwrap();

    assert_eq!(outcome.response.status(), 200);
    assert_eq!(outcome.response.text().await.unwrap(), "paid content");

    let payment = outcome.payment_header.unwrap().decode().unwrap();
    assert_eq!(payment.payload.amount, TokenAmount::from(1000u64));
    assert_eq!(payment.payload.to, "0xbee".parse().unwrap());
    assert_eq!(payment.payload.token, "0x70ce".parse().unwrap());
    assert_eq!(payment.payload.from, chain.address());
    assert!(outcome.settlement.is_none());
    assert!(outcome.approve_tx_hash.is_none());
    // no allowance management without auto-approve
    assert_eq!(chain.approvals_submitted(), 0);
}

#[tokio::test]
async fn empty_accepts_fails_without_further_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
            "x402Version": 1,
            "accepts": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chain = Arc::new(MockChain::new());
    let flow = PaymentFlow::new(chain.clone());
    let err = flow.fetch(get_request(&server)).await.unwrap_err();

    assert!(matches!(err, PaymentFlowError::MissingRequirements));
    assert_eq!(chain.approvals_submitted(), 0);
    assert!(chain.calls.lock().unwrap().is_empty());
    // the expect(1) on the mock verifies no retry was attempted
}

#[tokio::test]
async fn non_402_responses_pass_through_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let flow = PaymentFlow::new(Arc::new(MockChain::new()));
    let outcome = flow.fetch(get_request(&server)).await.unwrap();

    assert_eq!(outcome.response.status(), 403);
    assert!(outcome.payment_header.is_none());
    assert!(outcome.requirements.is_none());
}

#[tokio::test]
async fn sufficient_allowance_submits_no_approval() {
    let server = MockServer::start().await;
    mount_paid_resource(&server).await;

    let chain = Arc::new(MockChain::new().with_allowance(2000));
    let flow = PaymentFlow::new(chain.clone())
        .auto_approve(true)
        .with_spender("0xfac".parse().unwrap());
    let outcome = flow.fetch(get_request(&server)).await.unwrap();

    assert_eq!(outcome.response.status(), 200);
    assert!(outcome.approve_tx_hash.is_none());
    assert_eq!(chain.approvals_submitted(), 0);
    // the allowance was re-checked, not assumed
    let calls = chain.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "allowance");
}

#[tokio::test]
async fn insufficient_allowance_approves_and_waits_for_confirmation() {
    let server = MockServer::start().await;
    mount_paid_resource(&server).await;

    let chain = Arc::new(MockChain::new().with_allowance(10));
    let flow = PaymentFlow::new(chain.clone())
        .auto_approve(true)
        .with_spender("0xfac".parse().unwrap());
    let outcome = flow.fetch(get_request(&server)).await.unwrap();

    assert_eq!(outcome.approve_tx_hash, Some(Felt::from(APPROVE_TX_HASH)));
    assert_eq!(chain.approvals_submitted(), 1);
    assert_eq!(
        chain.waited.lock().unwrap().as_slice(),
        &[Felt::from(APPROVE_TX_HASH)]
    );
}

#[tokio::test]
async fn auto_approve_without_spender_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
        .expect(1)
        .mount(&server)
        .await;

    let chain = Arc::new(MockChain::new());
    let flow = PaymentFlow::new(chain.clone()).auto_approve(true);
    let err = flow.fetch(get_request(&server)).await.unwrap_err();

    assert!(matches!(err, PaymentFlowError::MissingSpender));
    assert!(chain.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unconfirmed_approval_surfaces_a_distinct_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
        .expect(1)
        .mount(&server)
        .await;

    let chain = Arc::new(MockChain::new().with_confirmation_timeout());
    let flow = PaymentFlow::new(chain.clone())
        .auto_approve(true)
        .with_spender("0xfac".parse().unwrap())
        .with_approval_timeout(Duration::from_millis(10));
    let err = flow.fetch(get_request(&server)).await.unwrap_err();

    match err {
        PaymentFlowError::ApprovalTimeout { tx_hash } => {
            assert_eq!(tx_hash, Felt::from(APPROVE_TX_HASH));
        }
        other => panic!("expected ApprovalTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_verification_never_settles() {
    let resource = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
        .expect(1)
        .mount(&resource)
        .await;

    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isValid": false,
            "invalidReason": "bad-signature",
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&facilitator)
        .await;

    let flow = PaymentFlow::new(Arc::new(MockChain::new()))
        .with_facilitator(FacilitatorClient::try_from(facilitator.uri()).unwrap());
    let err = flow.fetch(get_request(&resource)).await.unwrap_err();

    match err {
        PaymentFlowError::VerificationRejected { reason, .. } => {
            assert_eq!(reason, "bad-signature");
        }
        other => panic!("expected VerificationRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_settlement_keeps_the_approval_hash_for_reconciliation() {
    let resource = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body()))
        .expect(1)
        .mount(&resource)
        .await;

    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isValid": true,
        })))
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "transfer reverted",
        })))
        .mount(&facilitator)
        .await;

    let chain = Arc::new(MockChain::new());
    let flow = PaymentFlow::new(chain.clone())
        .auto_approve(true)
        .with_spender("0xfac".parse().unwrap())
        .with_facilitator(FacilitatorClient::try_from(facilitator.uri()).unwrap());
    let err = flow.fetch(get_request(&resource)).await.unwrap_err();

    match err {
        PaymentFlowError::SettlementFailed {
            reason,
            approve_tx_hash,
        } => {
            assert_eq!(reason, "transfer reverted");
            assert_eq!(approve_tx_hash, Some(Felt::from(APPROVE_TX_HASH)));
        }
        other => panic!("expected SettlementFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn settles_through_the_facilitator_before_retrying() {
    let resource = MockServer::start().await;
    mount_paid_resource(&resource).await;

    let facilitator = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(body_partial_json(serde_json::json!({"x402Version": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isValid": true,
        })))
        .expect(1)
        .mount(&facilitator)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "txHash": "0x5e771e",
        })))
        .expect(1)
        .mount(&facilitator)
        .await;

    let flow = PaymentFlow::new(Arc::new(MockChain::new()))
        .with_facilitator(FacilitatorClient::try_from(facilitator.uri()).unwrap());
    let outcome = flow.fetch(get_request(&resource)).await.unwrap();

    assert_eq!(outcome.response.status(), 200);
    let settlement = outcome.settlement.unwrap();
    assert!(settlement.success);
    assert_eq!(settlement.tx_hash.as_deref(), Some("0x5e771e"));
}

#[tokio::test]
async fn amount_override_takes_precedence_over_the_challenge() {
    let server = MockServer::start().await;
    mount_paid_resource(&server).await;

    let flow = PaymentFlow::new(Arc::new(MockChain::new()))
        .with_amount(TokenAmount::from(500u64));
    let outcome = flow.fetch(get_request(&server)).await.unwrap();

    let payment = outcome.payment_header.unwrap().decode().unwrap();
    assert_eq!(payment.payload.amount, TokenAmount::from(500u64));
}
