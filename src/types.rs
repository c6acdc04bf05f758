//! Wire types for the x402 protocol.
//!
//! The key objects are [`PaymentRequirements`] and [`PaymentRequiredResponse`]
//! (produced by a payment-gated resource server inside a 402 response), and
//! [`PaymentPayload`] with its base64 transport form [`PaymentHeader`]
//! (produced by this client and attached to the retried request).

use alloy_primitives::U256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use url::Url;

use crate::felt::Felt;
use crate::network::Network;
use crate::timestamp::UnixTimestamp;

/// Represents the protocol version. Currently only version 1 is supported.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum X402Version {
    /// Version `1`.
    #[default]
    V1,
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            X402Version::V1 => serializer.serialize_u8(1),
        }
    }
}

impl Display for X402Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X402Version::V1 => write!(f, "1"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported x402Version: {0}")]
pub struct X402VersionError(pub u8);

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            _ => Err(X402VersionError(value)),
        }
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        X402Version::try_from(num).map_err(serde::de::Error::custom)
    }
}

/// Enumerates payment schemes. Only "exact" is supported: the transferred
/// amount must match the signed amount exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// A precise on-chain token amount in base units.
///
/// Represented as a stringified non-negative integer in JSON to prevent
/// precision loss in consumers that parse JSON numbers as floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

#[derive(Debug, thiserror::Error)]
#[error("invalid token amount: {0:?}")]
pub struct TokenAmountParseError(pub String);

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static AMOUNT_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[0-9]{1,78}$").expect("invalid token amount regex"));
        if !AMOUNT_REGEX.is_match(s) {
            return Err(TokenAmountParseError(s.to_string()));
        }
        let value =
            U256::from_str_radix(s, 10).map_err(|_| TokenAmountParseError(s.to_string()))?;
        Ok(TokenAmount(value))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TokenAmount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An ECDSA signature over the Stark curve: the `(r, s)` pair of felts
/// returned by the account's typed-data signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: Felt,
    pub s: Felt,
}

/// Requirements set by the payment-gated endpoint for an acceptable payment.
/// Received inside a 402 response body and treated as immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    pub max_amount_required: TokenAmount,
    pub asset: Felt,
    pub pay_to: Felt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// HTTP 402 Payment Required response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub x402_version: X402Version,
    /// List of acceptable payment methods. The client reads the first entry.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The signed payment intent carried inside a [`PaymentPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPaymentPayload {
    pub from: Felt,
    pub to: Felt,
    pub token: Felt,
    pub amount: TokenAmount,
    pub nonce: Felt,
    pub deadline: UnixTimestamp,
    pub signature: Signature,
}

/// Describes a signed authorization to transfer a specific amount on-chain.
/// Created once per payment attempt and never reused: the nonce makes each
/// payload a distinct, non-replayable authorization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: ExactPaymentPayload,
}

/// The transport form of a [`PaymentPayload`]: `base64(JSON(payload))`,
/// carried in the `X-PAYMENT` request header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentHeader(String);

/// Error returned when decoding a [`PaymentHeader`] fails.
#[derive(Debug, thiserror::Error)]
pub enum PaymentHeaderDecodingError {
    /// The input bytes were not valid base64.
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    /// The JSON structure was invalid or did not conform to [`PaymentPayload`].
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentHeader {
    /// Serializes the payload to JSON and base64-encodes it.
    pub fn encode(payload: &PaymentPayload) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(payload)?;
        Ok(PaymentHeader(b64.encode(json)))
    }

    /// Decodes the header back into a [`PaymentPayload`].
    pub fn decode(&self) -> Result<PaymentPayload, PaymentHeaderDecodingError> {
        let bytes = b64.decode(&self.0)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PaymentHeader {
    fn from(value: String) -> Self {
        PaymentHeader(value)
    }
}
