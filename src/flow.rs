//! The end-to-end payment flow.
//!
//! [`PaymentFlow::fetch`] drives the challenge/response protocol: issue the
//! request as given, detect 402, extract the requirements, raise the token
//! allowance when asked to, sign the payment, optionally verify and settle it
//! through a facilitator, and retry the original request with proof of
//! payment attached. Each stage either advances the flow or terminates it
//! with a typed error; there is no compensating logic, and no retry beyond
//! the single second attempt.

use http::header::{HeaderValue, InvalidHeaderValue};
use reqwest::{Request, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::allowance::{AllowanceError, allowance, approve};
use crate::chain::{ChainClient, ChainError};
use crate::facilitator_client::{
    FacilitatorClient, FacilitatorClientError, FacilitatorRequest, SettleResponse,
};
use crate::felt::Felt;
use crate::network::Network;
use crate::sign::{PaymentParams, SignError, sign_payment};
use crate::types::{
    PaymentHeader, PaymentRequiredResponse, PaymentRequirements, TokenAmount, X402Version,
};

/// Header carrying the base64 payment payload on the retried request.
pub const PAYMENT_HEADER_NAME: &str = "X-PAYMENT";

/// Default bound on the approval confirmation wait.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can terminate a payment flow. Every stage fails the whole
/// flow; partial progress (a mined approval) rides along where it exists so
/// a human can reconcile manually.
#[derive(Debug, thiserror::Error)]
pub enum PaymentFlowError {
    /// The 402 response carried an empty `accepts` list.
    #[error("402 response carried no payment requirements")]
    MissingRequirements,
    /// Auto-approve was requested without a configured spender.
    #[error("auto-approve requested but no spender is configured")]
    MissingSpender,
    /// The account has no active signing capability.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    /// The facilitator rejected the payment at the verify step.
    #[error("facilitator rejected the payment: {reason}")]
    VerificationRejected {
        reason: String,
        approve_tx_hash: Option<Felt>,
    },
    /// The facilitator failed to settle a verified payment.
    #[error("settlement failed: {reason}")]
    SettlementFailed {
        reason: String,
        approve_tx_hash: Option<Felt>,
    },
    /// The approval transaction was not confirmed within the configured
    /// timeout. Settlement must not proceed on an unconfirmed allowance.
    #[error("timed out waiting for approval transaction {tx_hash}")]
    ApprovalTimeout { tx_hash: Felt },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Allowance(#[from] AllowanceError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The 402 body was not a parseable challenge.
    #[error("failed to parse 402 challenge body: {0}")]
    InvalidChallenge(#[source] reqwest::Error),
    /// The original request could not be cloned for the retry.
    /// Streaming bodies are not reusable.
    #[error("request object is not cloneable; streaming bodies cannot be retried")]
    RequestNotCloneable,
    #[error(transparent)]
    Facilitator(#[from] FacilitatorClientError),
    #[error(transparent)]
    Sign(SignError),
    #[error("payment header is not a valid HTTP header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
}

/// What the flow hands back to the caller for presentation.
#[derive(Debug)]
pub struct PaymentFlowOutcome {
    /// The final response: either the original non-402 response, or the
    /// response to the retried request.
    pub response: reqwest::Response,
    /// The payment header attached to the retry, when a payment was made.
    pub payment_header: Option<PaymentHeader>,
    /// The requirements the payment was signed against.
    pub requirements: Option<PaymentRequirements>,
    /// The facilitator's settlement receipt, when one was configured.
    pub settlement: Option<SettleResponse>,
    /// Hash of the approval transaction, when one was submitted.
    pub approve_tx_hash: Option<Felt>,
}

/// Drives x402 payment flows for one signing account.
///
/// One flow instance is reusable across requests; each [`PaymentFlow::fetch`]
/// call is an independent payment attempt with its own nonce.
pub struct PaymentFlow<C> {
    chain: C,
    http: reqwest::Client,
    facilitator: Option<FacilitatorClient>,
    auto_approve: bool,
    spender: Option<Felt>,
    amount_override: Option<TokenAmount>,
    approval_timeout: Duration,
}

impl<C: ChainClient> PaymentFlow<C> {
    pub fn new(chain: C) -> Self {
        Self {
            chain,
            http: reqwest::Client::new(),
            facilitator: None,
            auto_approve: false,
            spender: None,
            amount_override: None,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    /// Uses the given HTTP client for the challenge and retry requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Routes the signed payment through a facilitator: verify, then settle,
    /// before the retried request.
    pub fn with_facilitator(mut self, facilitator: FacilitatorClient) -> Self {
        self.facilitator = Some(facilitator);
        self
    }

    /// Uses the default facilitator for `network`.
    pub fn with_default_facilitator(self, network: Network) -> Self {
        let facilitator = FacilitatorClient::try_new(network.default_facilitator_url())
            .expect("default facilitator url is valid");
        self.with_facilitator(facilitator)
    }

    /// Raises the token allowance for the configured spender before signing,
    /// when the current allowance is insufficient.
    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = enabled;
        self
    }

    /// The address allowed to move funds on the payer's behalf (typically
    /// the facilitator's settlement account).
    pub fn with_spender(mut self, spender: Felt) -> Self {
        self.spender = Some(spender);
        self
    }

    /// Pays `amount` instead of the challenge's `maxAmountRequired`.
    pub fn with_amount(mut self, amount: TokenAmount) -> Self {
        self.amount_override = Some(amount);
        self
    }

    /// Bounds the approval confirmation wait.
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Performs `request`, answering a 402 challenge with a signed payment.
    ///
    /// Non-402 responses pass through untouched. A 402 triggers the payment
    /// pipeline; the retried response is returned as-is, even if the server
    /// rejects the payment, so a misbehaving server cannot trap the client
    /// in a request loop.
    #[instrument(name = "x402.fetch", skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn fetch(&self, request: Request) -> Result<PaymentFlowOutcome, PaymentFlowError> {
        let retry_request = request.try_clone(); // for retrying with payment later
        let response = self.http.execute(request).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            debug!(status = %response.status(), "no payment required, passing response through");
            return Ok(PaymentFlowOutcome {
                response,
                payment_header: None,
                requirements: None,
                settlement: None,
                approve_tx_hash: None,
            });
        }

        let challenge: PaymentRequiredResponse = response
            .json()
            .await
            .map_err(PaymentFlowError::InvalidChallenge)?;
        let requirements = challenge
            .accepts
            .into_iter()
            .next()
            .ok_or(PaymentFlowError::MissingRequirements)?;
        let amount = self
            .amount_override
            .unwrap_or(requirements.max_amount_required);
        debug!(
            network = %requirements.network,
            asset = %requirements.asset,
            %amount,
            "received payment challenge"
        );

        let approve_tx_hash = if self.auto_approve {
            self.ensure_allowance(&requirements, amount).await?
        } else {
            None
        };

        let signed = sign_payment(
            &self.chain,
            PaymentParams {
                network: requirements.network,
                to: requirements.pay_to,
                token: requirements.asset,
                amount,
                nonce: None,
                deadline: None,
            },
        )
        .await
        .map_err(|e| match e {
            SignError::SignerUnavailable(reason) => PaymentFlowError::SignerUnavailable(reason),
            other => PaymentFlowError::Sign(other),
        })?;

        let mut settlement = None;
        if let Some(facilitator) = &self.facilitator {
            let facilitator_request = FacilitatorRequest {
                x402_version: X402Version::V1,
                payment_header: signed.header.clone(),
                payment_requirements: requirements.clone(),
            };
            let verification = facilitator.verify(&facilitator_request).await?;
            if !verification.is_valid {
                return Err(PaymentFlowError::VerificationRejected {
                    reason: verification
                        .invalid_reason
                        .unwrap_or_else(|| "unspecified".to_string()),
                    approve_tx_hash,
                });
            }
            let settled = facilitator.settle(&facilitator_request).await?;
            if !settled.success {
                return Err(PaymentFlowError::SettlementFailed {
                    reason: settled.error.unwrap_or_else(|| "unspecified".to_string()),
                    approve_tx_hash,
                });
            }
            info!(tx_hash = ?settled.tx_hash, "payment settled by facilitator");
            settlement = Some(settled);
        }

        let mut retry_request = retry_request.ok_or(PaymentFlowError::RequestNotCloneable)?;
        retry_request.headers_mut().insert(
            PAYMENT_HEADER_NAME,
            HeaderValue::from_str(signed.header.as_str())?,
        );
        let response = self.http.execute(retry_request).await?;
        debug!(status = %response.status(), "retried request with payment attached");
        Ok(PaymentFlowOutcome {
            response,
            payment_header: Some(signed.header),
            requirements: Some(requirements),
            settlement,
            approve_tx_hash,
        })
    }

    /// Checks the spender's current allowance on the payment token and, only
    /// if it falls short of `amount`, submits an exact-amount approval and
    /// blocks until the chain confirms it. Settlement must never race an
    /// unconfirmed allowance.
    async fn ensure_allowance(
        &self,
        requirements: &PaymentRequirements,
        amount: TokenAmount,
    ) -> Result<Option<Felt>, PaymentFlowError> {
        let spender = self.spender.ok_or(PaymentFlowError::MissingSpender)?;
        let owner = self.chain.address();
        let current = allowance(&self.chain, requirements.asset, owner, spender).await?;
        if current >= amount {
            debug!(%current, required = %amount, "existing allowance is sufficient");
            return Ok(None);
        }
        let submitted = approve(&self.chain, requirements.asset, spender, amount).await?;
        let tx_hash = submitted.transaction_hash;
        info!(%tx_hash, "approval submitted, waiting for confirmation");
        self.chain
            .wait_for_transaction(tx_hash, self.approval_timeout)
            .await
            .map_err(|e| match e {
                ChainError::ConfirmationTimeout { .. } => {
                    PaymentFlowError::ApprovalTimeout { tx_hash }
                }
                other => PaymentFlowError::Chain(other),
            })?;
        Ok(Some(tx_hash))
    }
}
