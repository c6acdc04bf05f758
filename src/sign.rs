//! Payment signing.
//!
//! Turns one payment intent into a signed [`PaymentPayload`] and its base64
//! transport header. Nonce and deadline defaults live here; the anti-replay
//! contract (never reuse a `{from, nonce}` pair for different `amount`/`to`
//! combinations) is the caller's to uphold, since the signer keeps no state.

use rand::{Rng, rng};
use tracing::{debug, instrument};

use crate::chain::{ChainClient, ChainError};
use crate::felt::Felt;
use crate::network::Network;
use crate::timestamp::{ClockError, UnixTimestamp};
use crate::typed_data::{PaymentMessage, TypedData, payment_typed_data};
use crate::types::{
    ExactPaymentPayload, PaymentHeader, PaymentPayload, Scheme, TokenAmount, X402Version,
};

/// Default payment validity window when the caller pins no deadline.
pub const DEFAULT_DEADLINE_SECS: u64 = 300;

/// Nonce width in bytes. One byte below the field width: a full 32-byte
/// nonce could reach the modulus, and the signing scheme interprets the
/// nonce as a field element.
pub const NONCE_BYTES: usize = 31;

/// Inputs for one payment signature.
#[derive(Debug, Clone)]
pub struct PaymentParams {
    pub network: Network,
    /// Payee address.
    pub to: Felt,
    /// Token contract address.
    pub token: Felt,
    pub amount: TokenAmount,
    /// Single-use value; generated randomly when absent.
    pub nonce: Option<Felt>,
    /// Expiry; defaults to now + [`DEFAULT_DEADLINE_SECS`] when absent.
    pub deadline: Option<UnixTimestamp>,
}

/// A signed payment: the payload, its transport header, and the typed data
/// that was signed (useful for audit and tests; never persisted).
#[derive(Debug, Clone)]
pub struct SignedPayment {
    pub payment: PaymentPayload,
    pub header: PaymentHeader,
    pub typed_data: TypedData,
}

/// Errors produced while constructing or signing a payment.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The account has no active signing capability.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error(transparent)]
    Chain(ChainError),
    /// The requested amount does not fit the signing field.
    #[error("amount does not fit the signing field: {0}")]
    AmountNotFieldElement(TokenAmount),
    #[error(transparent)]
    Clock(#[from] ClockError),
    /// The payment payload could not be serialized to JSON.
    /// Should be an extremely rare occurrence.
    #[error("failed to encode payment payload: {0}")]
    JsonEncode(#[from] serde_json::Error),
}

/// Generates a fresh random nonce of [`NONCE_BYTES`] bytes.
pub fn random_nonce() -> Felt {
    let bytes: [u8; NONCE_BYTES] = rng().random();
    Felt::from_be_bytes(&bytes).expect("31-byte nonce fits the field")
}

/// Builds the typed payment message, obtains an `(r, s)` signature from the
/// account, and packages payload plus signature into the transport header.
#[instrument(name = "x402.sign_payment", skip(chain, params), fields(
    network = %params.network,
    to = %params.to,
    amount = %params.amount,
))]
pub async fn sign_payment<C: ChainClient + ?Sized>(
    chain: &C,
    params: PaymentParams,
) -> Result<SignedPayment, SignError> {
    // maxAmountRequired is server-controlled input; reject anything the
    // signing field cannot represent instead of truncating.
    Felt::new(params.amount.0).map_err(|_| SignError::AmountNotFieldElement(params.amount))?;

    let nonce = params.nonce.unwrap_or_else(random_nonce);
    let deadline = match params.deadline {
        Some(deadline) => deadline,
        None => UnixTimestamp::now()? + DEFAULT_DEADLINE_SECS,
    };
    let message = PaymentMessage {
        from: chain.address(),
        to: params.to,
        token: params.token,
        amount: params.amount,
        nonce,
        deadline,
    };
    let typed_data = payment_typed_data(params.network, message);
    let signature = chain
        .sign_typed_data(&typed_data)
        .await
        .map_err(|e| match e {
            ChainError::SignerUnavailable(reason) => SignError::SignerUnavailable(reason),
            other => SignError::Chain(other),
        })?;
    debug!(%nonce, %deadline, "payment signed");

    let payment = PaymentPayload {
        x402_version: X402Version::V1,
        scheme: Scheme::Exact,
        network: params.network,
        payload: ExactPaymentPayload {
            from: message.from,
            to: message.to,
            token: message.token,
            amount: message.amount,
            nonce,
            deadline,
            signature,
        },
    };
    let header = PaymentHeader::encode(&payment)?;
    Ok(SignedPayment {
        payment,
        header,
        typed_data,
    })
}
