//! Typed-data construction for payment authorizations.
//!
//! A payment intent is signed as domain-separated structured data: the domain
//! binds the application name, version, and chain id, so a signature can never
//! be replayed against another application or network. The structure built
//! here is the exact JSON the account signer consumes; it is ephemeral and
//! never persisted.

use serde::Serialize;

use crate::felt::Felt;
use crate::network::Network;
use crate::timestamp::UnixTimestamp;
use crate::types::TokenAmount;

/// Application name bound into every payment domain.
pub const DOMAIN_NAME: &str = "x402 Payment";
/// Domain version bound into every payment domain.
pub const DOMAIN_VERSION: &str = "1";

/// One field declaration inside a typed-data schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldType {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub r#type: &'static str,
}

/// The schema section: field layouts for the domain and the payment record.
/// Field order is part of the signed encoding and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDefinitions {
    #[serde(rename = "StarkNetDomain")]
    pub stark_net_domain: Vec<FieldType>,
    #[serde(rename = "Payment")]
    pub payment: Vec<FieldType>,
}

/// The domain separator: application name, version, and chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub name: &'static str,
    pub version: &'static str,
    pub chain_id: Felt,
}

/// The payment record that gets signed: one payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMessage {
    pub from: Felt,
    pub to: Felt,
    pub token: Felt,
    pub amount: TokenAmount,
    pub nonce: Felt,
    pub deadline: UnixTimestamp,
}

/// A complete typed-data structure ready for [`ChainClient::sign_typed_data`].
///
/// [`ChainClient::sign_typed_data`]: crate::chain::ChainClient::sign_typed_data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub types: TypeDefinitions,
    pub primary_type: &'static str,
    pub domain: Domain,
    pub message: PaymentMessage,
}

/// Builds the typed-data structure for one payment intent on `network`.
///
/// Pure and deterministic: identical inputs always yield identical
/// structures, which is what makes signatures reproducible under a pinned
/// nonce and deadline. `network` must already be resolved; there is no
/// failure path here.
pub fn payment_typed_data(network: Network, message: PaymentMessage) -> TypedData {
    TypedData {
        types: TypeDefinitions {
            stark_net_domain: vec![
                FieldType { name: "name", r#type: "felt" },
                FieldType { name: "version", r#type: "felt" },
                FieldType { name: "chainId", r#type: "felt" },
            ],
            payment: vec![
                FieldType { name: "from", r#type: "felt" },
                FieldType { name: "to", r#type: "felt" },
                FieldType { name: "token", r#type: "felt" },
                FieldType { name: "amount", r#type: "felt" },
                FieldType { name: "nonce", r#type: "felt" },
                FieldType { name: "deadline", r#type: "felt" },
            ],
        },
        primary_type: "Payment",
        domain: Domain {
            name: DOMAIN_NAME,
            version: DOMAIN_VERSION,
            chain_id: network.chain_id(),
        },
        message,
    }
}
