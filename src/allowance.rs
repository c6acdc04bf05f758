//! Spending-authorization reads and writes on a fungible-token contract.
//!
//! Token contracts on this chain expose amounts as a 128+128-bit split-limb
//! pair `(low, high)`. Reads decode the pair into one [`TokenAmount`]; the
//! approval write submits an exact-amount authorization, never an unbounded
//! one.

use alloy_primitives::U256;
use tracing::debug;

use crate::chain::{Call, ChainClient, ChainError, InvokeResult};
use crate::felt::Felt;
use crate::types::TokenAmount;

const ALLOWANCE_ENTRYPOINT: &str = "allowance";
const APPROVE_ENTRYPOINT: &str = "approve";

/// 2^128, the limb boundary of on-chain unsigned integers.
const LIMB_BOUND: U256 = U256::from_limbs([0, 0, 1, 0]);

/// Errors produced while reading or raising an allowance.
#[derive(Debug, thiserror::Error)]
pub enum AllowanceError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The contract returned the wrong number of result words.
    #[error("unexpected allowance response: expected 2 felts, got {0}")]
    UnexpectedResponse(usize),
    /// A returned limb does not fit 128 bits.
    #[error("allowance limb out of range: {0}")]
    LimbOutOfRange(Felt),
}

/// Reads the current spending authorization `owner` has granted to `spender`
/// on `token`, via a read-only chain call.
pub async fn allowance<C: ChainClient + ?Sized>(
    chain: &C,
    token: Felt,
    owner: Felt,
    spender: Felt,
) -> Result<TokenAmount, AllowanceError> {
    let words = chain
        .call_contract(token, ALLOWANCE_ENTRYPOINT, &[owner, spender])
        .await?;
    let amount = combine_limbs(&words)?;
    debug!(%token, %owner, %spender, %amount, "read allowance");
    Ok(amount)
}

/// Submits a transaction setting the authorization of `spender` on `token`
/// to exactly `amount`. Returns the submitted transaction; confirmation is
/// the caller's responsibility.
pub async fn approve<C: ChainClient + ?Sized>(
    chain: &C,
    token: Felt,
    spender: Felt,
    amount: TokenAmount,
) -> Result<InvokeResult, AllowanceError> {
    let (low, high) = split_limbs(amount);
    let call = Call {
        to: token,
        entrypoint: APPROVE_ENTRYPOINT.to_string(),
        calldata: vec![spender, low, high],
    };
    let result = chain.execute(&[call]).await?;
    debug!(%token, %spender, %amount, transaction_hash = %result.transaction_hash, "submitted approval");
    Ok(result)
}

/// Decodes a `(low, high)` split-limb pair into a single amount.
fn combine_limbs(words: &[Felt]) -> Result<TokenAmount, AllowanceError> {
    let [low, high]: [Felt; 2] = words
        .try_into()
        .map_err(|_| AllowanceError::UnexpectedResponse(words.len()))?;
    for limb in [low, high] {
        if limb.as_u256() >= LIMB_BOUND {
            return Err(AllowanceError::LimbOutOfRange(limb));
        }
    }
    Ok(TokenAmount(low.as_u256() | (high.as_u256() << 128)))
}

/// Splits an amount into the `(low, high)` calldata pair.
fn split_limbs(amount: TokenAmount) -> (Felt, Felt) {
    let low = amount.0 & (LIMB_BOUND - U256::from(1u8));
    let high = amount.0 >> 128;
    // 128-bit limbs always fit the field.
    let low = Felt::new(low).expect("low limb fits the field");
    let high = Felt::new(high).expect("high limb fits the field");
    (low, high)
}
