//! x402 payments on Starknet-style chains.
//!
//! This crate turns an HTTP `402 Payment Required` response into a signed,
//! chain-bound payment authorization, optionally settles it through a remote
//! facilitator, and retries the original request with an `X-PAYMENT` header
//! attached.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use x402_starknet::{FacilitatorClient, Network, PaymentFlow};
//!
//! // `account` is any implementation of `ChainClient`, typically an adapter
//! // over your chain SDK's account object.
//! let flow = PaymentFlow::new(account)
//!     .with_default_facilitator(Network::StarknetSepolia)
//!     .auto_approve(true)
//!     .with_spender("0xfacade".parse()?);
//!
//! let request = reqwest::Client::new()
//!     .get("https://api.example.com/protected")
//!     .build()?;
//! let outcome = flow.fetch(request).await?;
//! println!("{}", outcome.response.status());
//! ```
//!
//! ## Structure
//!
//! - [`flow`]: the challenge/response orchestrator
//! - [`sign`]: payment signing (nonce, deadline, typed-data signature)
//! - [`typed_data`]: domain-separated message construction
//! - [`allowance`]: token spending-authorization reads and writes
//! - [`facilitator_client`]: the remote verify/settle exchange
//! - [`chain`]: the opaque boundary to an account-capable chain client
//!
//! The chain itself (transport, fee estimation, key management) is an
//! external collaborator behind the [`chain::ChainClient`] trait.

pub mod allowance;
pub mod chain;
pub mod facilitator_client;
pub mod felt;
pub mod flow;
pub mod network;
pub mod sign;
pub mod timestamp;
pub mod typed_data;
pub mod types;

pub use chain::{Call, ChainClient, ChainError, InvokeResult};
pub use facilitator_client::{
    FacilitatorClient, FacilitatorClientError, FacilitatorRequest, SettleResponse, VerifyResponse,
};
pub use felt::Felt;
pub use flow::{PAYMENT_HEADER_NAME, PaymentFlow, PaymentFlowError, PaymentFlowOutcome};
pub use network::Network;
pub use sign::{PaymentParams, SignedPayment, sign_payment};
pub use timestamp::UnixTimestamp;
pub use types::{
    PaymentHeader, PaymentPayload, PaymentRequiredResponse, PaymentRequirements, Scheme,
    TokenAmount, X402Version,
};
