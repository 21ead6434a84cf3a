//! Client for the verifiers' `prepareRequest` endpoint, which turns a typed
//! attestation request into the ABI-encoded bytes the hub accepts.

use alloy::hex::FromHexError;
use async_trait::async_trait;
use fdc_core::{
    AttestationRequest,
    EncodedRequest,
};
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::{
    api_key_headers,
    config::VerifierConfig,
    endpoint,
};

const VALID_STATUS: &str = "VALID";

#[derive(Debug, thiserror::Error)]
pub enum VerifierClientError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("URL {0} cannot be used as a verifier base")]
    InvalidBaseUrl(String),
    #[error("API key is not a valid header value")]
    InvalidApiKey,
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("verifier rejected the request with status {0:?}")]
    Rejected(String),
    #[error("verifier response has no encoded request")]
    MissingEncodedRequest,
    #[error("encoded request is not valid hex: {0}")]
    InvalidHex(#[from] FromHexError),
}

/// Produces the ABI-encoded form of an attestation request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestPreparer: Send + Sync {
    async fn prepare_request(
        &self,
        request: &AttestationRequest,
    ) -> Result<EncodedRequest, VerifierClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequestBody<'a> {
    attestation_type: String,
    source_id: String,
    request_body: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequestResponse {
    status: String,
    #[serde(default)]
    abi_encoded_request: Option<String>,
}

/// HTTP client for one or more verifier servers.
///
/// Requests go to `<base>/<AttestationType>/prepareRequest`, where the base
/// is picked by source id and falls back to the default base.
#[derive(Debug, Clone)]
pub struct VerifierClient {
    client: Client,
    default_base: Url,
    source_bases: HashMap<String, Url>,
}

impl VerifierClient {
    pub fn new(base_url: &str) -> Result<Self, VerifierClientError> {
        Ok(Self {
            client: Client::builder().build()?,
            default_base: Url::parse(base_url)?,
            source_bases: HashMap::new(),
        })
    }

    /// Sends `api_key` as `X-API-KEY` on every request.
    pub fn new_with_api_key(base_url: &str, api_key: &str) -> Result<Self, VerifierClientError> {
        let headers = api_key_headers(api_key).map_err(|_| VerifierClientError::InvalidApiKey)?;
        Ok(Self {
            client: Client::builder().default_headers(headers).build()?,
            default_base: Url::parse(base_url)?,
            source_bases: HashMap::new(),
        })
    }

    pub fn from_config(config: &VerifierConfig) -> Result<Self, VerifierClientError> {
        let mut client = match &config.api_key {
            Some(key) => Self::new_with_api_key(&config.base_url, key)?,
            None => Self::new(&config.base_url)?,
        };
        for (source_id, url) in &config.source_urls {
            client = client.with_source_url(source_id, url)?;
        }
        Ok(client)
    }

    pub fn with_source_url(
        mut self,
        source_id: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, VerifierClientError> {
        self.source_bases
            .insert(source_id.into(), Url::parse(base_url)?);
        Ok(self)
    }

    fn prepare_url(&self, request: &AttestationRequest) -> Result<Url, VerifierClientError> {
        let base = self
            .source_bases
            .get(request.source_id())
            .unwrap_or(&self.default_base);
        endpoint(base, &[request.attestation_type(), "prepareRequest"])
            .ok_or_else(|| VerifierClientError::InvalidBaseUrl(base.to_string()))
    }
}

#[async_trait]
impl RequestPreparer for VerifierClient {
    async fn prepare_request(
        &self,
        request: &AttestationRequest,
    ) -> Result<EncodedRequest, VerifierClientError> {
        let url = self.prepare_url(request)?;
        let body = PrepareRequestBody {
            attestation_type: request.attestation_type_tag().to_string(),
            source_id: request.source_id_tag().to_string(),
            request_body: request.body(),
        };

        debug!(
            %url,
            attestation_type = request.attestation_type(),
            source_id = request.source_id(),
            "Preparing attestation request"
        );

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(VerifierClientError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let prepared: PrepareRequestResponse = serde_json::from_str(&text)?;
        if prepared.status != VALID_STATUS {
            return Err(VerifierClientError::Rejected(prepared.status));
        }

        let encoded = prepared
            .abi_encoded_request
            .as_deref()
            .map(EncodedRequest::from_hex)
            .transpose()?
            .filter(|encoded| !encoded.is_empty())
            .ok_or(VerifierClientError::MissingEncodedRequest)?;

        debug!(len = encoded.len(), "Verifier accepted attestation request");
        Ok(encoded)
    }
}
