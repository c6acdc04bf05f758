//! The chain read/write boundary.
//!
//! The payment flow depends on four operations of an account-capable chain
//! client: a read-only contract call, an invoke transaction, a confirmation
//! wait, and typed-data signing. Their implementation (RPC transport, fee
//! estimation, key management) is an external concern; everything in this
//! crate is written against the [`ChainClient`] trait and treats it as
//! opaque.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::felt::Felt;
use crate::typed_data::TypedData;
use crate::types::Signature;

/// One entrypoint invocation inside an invoke transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Contract address.
    pub to: Felt,
    /// Entrypoint name, e.g. `"approve"`.
    pub entrypoint: String,
    pub calldata: Vec<Felt>,
}

/// Normalized result of a submitted invoke transaction.
///
/// Chain client libraries disagree on the field casing of their transaction
/// responses; the adaptation happens once here, not per call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    #[serde(alias = "transaction_hash")]
    pub transaction_hash: Felt,
}

/// Errors surfaced by a chain client.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The account has no active signing capability.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    /// The account cannot cover the transaction fee.
    #[error("insufficient signer funds: {0}")]
    InsufficientFunds(String),
    /// The chain rejected the call or transaction.
    #[error("chain rejected: {0}")]
    Rejected(String),
    /// The confirmation wait elapsed before the transaction was included.
    #[error("timed out waiting for transaction {transaction_hash}")]
    ConfirmationTimeout { transaction_hash: Felt },
    /// Network-level failure talking to the chain.
    #[error("chain transport error: {0}")]
    Transport(String),
}

/// Asynchronous interface to an account-capable chain client.
///
/// `execute` and `sign_typed_data` act on behalf of the account returned by
/// [`ChainClient::address`]; `call_contract` and `wait_for_transaction` are
/// read-only.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> Felt;

    /// Read-only contract call, returning the raw felt words of the result.
    async fn call_contract(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<Vec<Felt>, ChainError>;

    /// Submits an invoke transaction from the signing account.
    async fn execute(&self, calls: &[Call]) -> Result<InvokeResult, ChainError>;

    /// Blocks until the chain reports inclusion of `transaction_hash`, or
    /// `timeout` elapses ([`ChainError::ConfirmationTimeout`]).
    async fn wait_for_transaction(
        &self,
        transaction_hash: Felt,
        timeout: Duration,
    ) -> Result<(), ChainError>;

    /// Signs domain-separated typed data with the account key.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature, ChainError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    fn address(&self) -> Felt {
        self.as_ref().address()
    }

    async fn call_contract(
        &self,
        contract: Felt,
        entrypoint: &str,
        calldata: &[Felt],
    ) -> Result<Vec<Felt>, ChainError> {
        self.as_ref().call_contract(contract, entrypoint, calldata).await
    }

    async fn execute(&self, calls: &[Call]) -> Result<InvokeResult, ChainError> {
        self.as_ref().execute(calls).await
    }

    async fn wait_for_transaction(
        &self,
        transaction_hash: Felt,
        timeout: Duration,
    ) -> Result<(), ChainError> {
        self.as_ref().wait_for_transaction(transaction_hash, timeout).await
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature, ChainError> {
        self.as_ref().sign_typed_data(typed_data).await
    }
}
