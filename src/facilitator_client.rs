//! A client for the two-phase verify/settle exchange with a remote
//! facilitator.
//!
//! Both operations are single-shot `POST`s with a JSON body
//! `{x402Version, paymentHeader, paymentRequirements}`; retry policy belongs
//! to the flow orchestrator, not here. Responses are pass-through structures
//! from the facilitator: only the fields the orchestrator inspects are
//! modeled, and an absent `isValid`/`success` flag deserializes as `false`,
//! so an ambiguous response never counts as approval.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::types::{PaymentHeader, PaymentRequirements, X402Version};

/// Request body shared by `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub x402_version: X402Version,
    pub payment_header: PaymentHeader,
    pub payment_requirements: PaymentRequirements,
}

/// Result of `POST /verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

/// Result of `POST /settle`. A `success: true` response is trusted as-is;
/// the facilitator's word is the only finality signal available here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// A client for a remote facilitator's `/verify` and `/settle` endpoints.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`).
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    client: Client,
    /// Optional custom headers sent with each request.
    headers: HeaderMap,
    /// Optional per-request timeout.
    timeout: Option<Duration>,
}

impl FacilitatorClient {
    /// Constructs a client from a base URL, precomputing the `./verify` and
    /// `./settle` endpoint URLs.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "failed to construct ./settle URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            verify_url,
            settle_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends a `POST /verify` request to the facilitator.
    #[instrument(name = "x402.facilitator.verify", skip_all, err)]
    pub async fn verify(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator. Call only after a
    /// successful `verify`; settlement moves funds on the facilitator side.
    #[instrument(name = "x402.facilitator.settle", skip_all, err)]
    pub async fn settle(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Generic POST helper handling JSON serialization, status checking,
    /// timeout application, and error mapping.
    ///
    /// `context` is a human-readable identifier used in error messages
    /// (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

/// Converts a string URL into a [`FacilitatorClient`], normalizing trailing
/// slashes so relative joins behave.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}
