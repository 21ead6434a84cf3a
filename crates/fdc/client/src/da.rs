//! Client for the data-availability layer's raw proof endpoint.

use alloy::primitives::{
    B256,
    Bytes,
};
use async_trait::async_trait;
use fdc_core::{
    EncodedRequest,
    Proof,
};
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use std::str::FromStr;
use tracing::trace;
use url::Url;

use crate::{
    api_key_headers,
    config::{
        DEFAULT_PROOF_PATH,
        DaConfig,
    },
    endpoint,
};

#[derive(Debug, thiserror::Error)]
pub enum DaClientError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("URL {0} cannot be used as a DA base")]
    InvalidBaseUrl(String),
    #[error("API key is not a valid header value")]
    InvalidApiKey,
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },
}

impl DaClientError {
    /// Whether the same request may succeed when retried.
    ///
    /// Transport failures and non-2xx statuses are transient. A 2xx body that
    /// does not parse will not parse on the next attempt either.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Reqwest(_) | Self::HttpStatus { .. })
    }
}

/// Looks up the proof of an encoded request in a finalized round.
///
/// `Ok(None)` means the DA layer has not materialized the proof yet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProofSource: Send + Sync {
    async fn fetch_proof(
        &self,
        round_id: u64,
        request: &EncodedRequest,
    ) -> Result<Option<Proof>, DaClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest {
    voting_round_id: u64,
    request_bytes: String,
}

/// Body of a 2xx proof response. While the proof is still pending the fields
/// are absent or `response_hex` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DaProofResponse {
    #[serde(default, alias = "responseHex")]
    pub response_hex: Option<String>,
    #[serde(default)]
    pub proof: Option<Vec<String>>,
}

impl DaProofResponse {
    /// `None` until both a non-empty response and the Merkle path are present.
    pub fn into_proof(self) -> Result<Option<Proof>, DaClientError> {
        let response_hex = self
            .response_hex
            .filter(|hex| !hex.trim().trim_start_matches("0x").is_empty());
        let (Some(response_hex), Some(path)) = (response_hex, self.proof) else {
            return Ok(None);
        };

        let response_bytes = Bytes::from_str(&response_hex).map_err(|err| {
            DaClientError::InvalidHex {
                field: "response_hex",
                reason: err.to_string(),
            }
        })?;
        let merkle_path = path
            .iter()
            .map(|node| B256::from_str(node))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                DaClientError::InvalidHex {
                    field: "proof",
                    reason: err.to_string(),
                }
            })?;

        Ok(Some(Proof::new(merkle_path, response_bytes)))
    }
}

/// HTTP client for the DA layer's `proof-by-request-round-raw` endpoint.
#[derive(Debug, Clone)]
pub struct DaClient {
    client: Client,
    proof_url: Url,
}

impl DaClient {
    pub fn new(da_url: &str) -> Result<Self, DaClientError> {
        Self::build(da_url, DEFAULT_PROOF_PATH, Client::builder().build()?)
    }

    /// Sends `api_key` as `X-API-KEY` on every request.
    pub fn new_with_api_key(da_url: &str, api_key: &str) -> Result<Self, DaClientError> {
        let headers = api_key_headers(api_key).map_err(|_| DaClientError::InvalidApiKey)?;
        let client = Client::builder().default_headers(headers).build()?;
        Self::build(da_url, DEFAULT_PROOF_PATH, client)
    }

    pub fn from_config(config: &DaConfig) -> Result<Self, DaClientError> {
        let client = match &config.api_key {
            Some(key) => {
                let headers =
                    api_key_headers(key).map_err(|_| DaClientError::InvalidApiKey)?;
                Client::builder().default_headers(headers).build()?
            }
            None => Client::builder().build()?,
        };
        Self::build(&config.base_url, &config.proof_path, client)
    }

    fn build(da_url: &str, proof_path: &str, client: Client) -> Result<Self, DaClientError> {
        let base = Url::parse(da_url)?;
        let segments: Vec<&str> = proof_path.split('/').filter(|s| !s.is_empty()).collect();
        let proof_url = endpoint(&base, &segments)
            .ok_or_else(|| DaClientError::InvalidBaseUrl(base.to_string()))?;
        Ok(Self { client, proof_url })
    }
}

#[async_trait]
impl ProofSource for DaClient {
    async fn fetch_proof(
        &self,
        round_id: u64,
        request: &EncodedRequest,
    ) -> Result<Option<Proof>, DaClientError> {
        let body = ProofRequest {
            voting_round_id: round_id,
            request_bytes: request.to_string(),
        };

        let response = self
            .client
            .post(self.proof_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DaClientError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        trace!(round_id, body = %text, "DA proof response");
        serde_json::from_str::<DaProofResponse>(&text)?.into_proof()
    }
}
