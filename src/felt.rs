//! Field elements of the Stark prime field.
//!
//! Addresses, token amounts, nonces, transaction hashes, and typed-data
//! constants on Starknet-style chains are all scalars modulo the Stark prime.
//! [`Felt`] wraps a [`U256`] and guarantees the bound at construction time,
//! so every other module can rely on values being valid field elements.

use alloy_primitives::U256;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;

/// The Stark prime, `2^251 + 17 * 2^192 + 1`.
pub const STARK_PRIME: U256 = U256::from_limbs([1, 0, 0, 0x0800000000000011]);

/// A field element: an unsigned integer strictly below [`STARK_PRIME`].
///
/// Serialized as a minimal `0x`-prefixed lowercase hex string.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Felt(U256);

/// Errors produced when a value does not fit the field.
#[derive(Debug, thiserror::Error)]
pub enum FeltError {
    #[error("value does not fit the field: {0} >= Stark prime")]
    NotInField(U256),
    #[error("invalid felt string: {0:?}")]
    InvalidFormat(String),
    #[error("byte string longer than 32 bytes: {0}")]
    TooManyBytes(usize),
    #[error("short string must be at most 31 ASCII bytes: {0:?}")]
    InvalidShortString(String),
}

impl Felt {
    pub const ZERO: Felt = Felt(U256::ZERO);

    /// Checks the field bound and wraps the value.
    pub fn new(value: U256) -> Result<Self, FeltError> {
        if value < STARK_PRIME {
            Ok(Felt(value))
        } else {
            Err(FeltError::NotInField(value))
        }
    }

    /// Interprets up to 32 big-endian bytes as a field element.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, FeltError> {
        if bytes.len() > 32 {
            return Err(FeltError::TooManyBytes(bytes.len()));
        }
        Self::new(U256::from_be_slice(bytes))
    }

    /// Encodes an ASCII string of at most 31 bytes as a single felt,
    /// big-endian. This is how chain ids and typed-data domain constants
    /// are represented on-chain.
    pub fn short_string(s: &str) -> Result<Self, FeltError> {
        if !s.is_ascii() || s.len() > 31 {
            return Err(FeltError::InvalidShortString(s.to_string()));
        }
        // 31 bytes never reach 2^248, so the field bound holds by construction.
        Ok(Felt(U256::from_be_slice(s.as_bytes())))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        Felt(U256::from(value))
    }
}

impl From<Felt> for U256 {
    fn from(value: Felt) -> Self {
        value.0
    }
}

impl Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt({:#x})", self.0)
    }
}

impl FromStr for Felt {
    type Err = FeltError;

    /// Parses a `0x`-prefixed hex string or a plain decimal string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static HEX_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{1,64}$").expect("invalid felt hex regex"));
        static DEC_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[0-9]{1,78}$").expect("invalid felt decimal regex"));

        let value = if let Some(hex_digits) = s.strip_prefix("0x") {
            if !HEX_REGEX.is_match(s) {
                return Err(FeltError::InvalidFormat(s.to_string()));
            }
            U256::from_str_radix(hex_digits, 16)
                .map_err(|_| FeltError::InvalidFormat(s.to_string()))?
        } else {
            if !DEC_REGEX.is_match(s) {
                return Err(FeltError::InvalidFormat(s.to_string()));
            }
            U256::from_str_radix(s, 10).map_err(|_| FeltError::InvalidFormat(s.to_string()))?
        };
        Self::new(value)
    }
}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Felt::from_str(&s).map_err(serde::de::Error::custom)
    }
}
