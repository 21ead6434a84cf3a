//! Configuration for the attestation client

use alloy::{
    primitives::{
        Address,
        address,
    },
    signers::local::PrivateKeySigner,
};
use fdc_core::FDC_PROTOCOL_ID;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    fmt,
    time::Duration,
};
use url::Url;

/// Flare contract registry, deployed at the same address on every network.
pub const DEFAULT_CONTRACT_REGISTRY: Address =
    address!("0xaD67FE66660Fb8dFE9d6b1b4240d8650e30F6019");

/// Path of the raw proof endpoint, relative to the DA base URL.
pub const DEFAULT_PROOF_PATH: &str = "proof-by-request-round-raw";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is not a valid URL: {reason}")]
    InvalidUrl { field: String, reason: String },
    #[error("{0} cannot be empty or whitespace")]
    EmptyValue(&'static str),
    #[error("private key is invalid: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid polling configuration: {0}")]
    InvalidPolling(String),
}

/// Everything one attestation client needs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// HTTP JSON-RPC endpoint of the chain hosting the hub
    pub rpc_url: String,
    /// Hex signer key; required to submit requests
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_contract_registry")]
    pub contract_registry: Address,
    #[serde(default)]
    pub contracts: ContractOverrides,
    #[serde(default = "default_protocol_id")]
    pub protocol_id: u64,
    pub verifier: VerifierConfig,
    pub da: DaConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("contract_registry", &self.contract_registry)
            .field("contracts", &self.contracts)
            .field("protocol_id", &self.protocol_id)
            .field("verifier", &self.verifier)
            .field("da", &self.da)
            .field("polling", &self.polling)
            .finish()
    }
}

fn default_contract_registry() -> Address {
    DEFAULT_CONTRACT_REGISTRY
}

fn default_protocol_id() -> u64 {
    FDC_PROTOCOL_ID
}

impl ClientConfig {
    pub fn new(
        rpc_url: impl Into<String>,
        verifier_url: impl Into<String>,
        da_url: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            private_key: None,
            contract_registry: DEFAULT_CONTRACT_REGISTRY,
            contracts: ContractOverrides::default(),
            protocol_id: FDC_PROTOCOL_ID,
            verifier: VerifierConfig::new(verifier_url),
            da: DaConfig::new(da_url),
            polling: PollingConfig::default(),
        }
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Check URLs, keys and polling bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("rpc_url", &self.rpc_url)?;

        if let Some(key) = &self.private_key {
            if key.trim().is_empty() {
                return Err(ConfigError::EmptyValue("private_key"));
            }
            key.trim()
                .parse::<PrivateKeySigner>()
                .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?;
        }

        self.verifier.validate()?;
        self.da.validate()?;
        self.polling.validate()
    }
}

/// Explicit contract addresses. Unset entries are resolved through the
/// contract registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractOverrides {
    pub fdc_hub: Option<Address>,
    pub fee_configurations: Option<Address>,
    pub relay: Option<Address>,
    pub systems_manager: Option<Address>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Used for every source without an entry in `source_urls`
    pub base_url: String,
    /// Source id (e.g. `testBTC`) to verifier base URL
    #[serde(default)]
    pub source_urls: HashMap<String, String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("base_url", &self.base_url)
            .field("source_urls", &self.source_urls)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl VerifierConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            source_urls: HashMap::new(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_source_url(mut self, source_id: impl Into<String>, url: impl Into<String>) -> Self {
        self.source_urls.insert(source_id.into(), url.into());
        self
    }

    pub fn base_url_for(&self, source_id: &str) -> &str {
        self.source_urls
            .get(source_id)
            .map_or(self.base_url.as_str(), String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url("verifier.base_url", &self.base_url)?;
        for (source, url) in &self.source_urls {
            parse_http_url(&format!("verifier.source_urls.{source}"), url)?;
        }
        check_api_key("verifier.api_key", self.api_key.as_deref())
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DaConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_proof_path")]
    pub proof_path: String,
}

impl fmt::Debug for DaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("proof_path", &self.proof_path)
            .finish()
    }
}

fn default_proof_path() -> String {
    DEFAULT_PROOF_PATH.to_string()
}

impl DaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            proof_path: default_proof_path(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url("da.base_url", &self.base_url)?;
        if self.proof_path.trim_matches('/').is_empty() {
            return Err(ConfigError::EmptyValue("da.proof_path"));
        }
        check_api_key("da.api_key", self.api_key.as_deref())
    }
}

/// Intervals and bounds of the two waits.
///
/// Proof retrieval retries hard failures (transport errors, non-2xx) with an
/// exponential backoff from `proof_backoff_initial_secs` capped at
/// `proof_backoff_max_secs`, for at most `proof_max_attempts` attempts. A
/// proof that is not ready yet is polled every `proof_pending_interval_secs`,
/// at most `proof_max_pending_polls` times, without consuming attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub finalization_interval_secs: u64,
    /// `None` waits for finalization until cancelled
    pub finalization_timeout_secs: Option<u64>,
    pub proof_max_attempts: u32,
    pub proof_backoff_initial_secs: u64,
    pub proof_backoff_max_secs: u64,
    pub proof_pending_interval_secs: u64,
    pub proof_max_pending_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            finalization_interval_secs: 30,
            finalization_timeout_secs: Some(15 * 60),
            proof_max_attempts: 5,
            proof_backoff_initial_secs: 10,
            proof_backoff_max_secs: 80,
            proof_pending_interval_secs: 10,
            proof_max_pending_polls: 90,
        }
    }
}

impl PollingConfig {
    pub const fn finalization_interval(&self) -> Duration {
        Duration::from_secs(self.finalization_interval_secs)
    }

    pub fn finalization_timeout(&self) -> Option<Duration> {
        self.finalization_timeout_secs.map(Duration::from_secs)
    }

    pub const fn proof_backoff_initial(&self) -> Duration {
        Duration::from_secs(self.proof_backoff_initial_secs)
    }

    pub const fn proof_backoff_max(&self) -> Duration {
        Duration::from_secs(self.proof_backoff_max_secs)
    }

    pub const fn proof_pending_interval(&self) -> Duration {
        Duration::from_secs(self.proof_pending_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.finalization_interval_secs == 0 {
            return Err(ConfigError::InvalidPolling(
                "finalization interval must be positive".to_string(),
            ));
        }
        if self.finalization_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidPolling(
                "finalization timeout must be positive".to_string(),
            ));
        }
        if self.proof_max_attempts == 0 {
            return Err(ConfigError::InvalidPolling(
                "proof retrieval needs at least one attempt".to_string(),
            ));
        }
        if self.proof_backoff_initial_secs > self.proof_backoff_max_secs {
            return Err(ConfigError::InvalidPolling(format!(
                "initial backoff {}s exceeds maximum backoff {}s",
                self.proof_backoff_initial_secs, self.proof_backoff_max_secs
            )));
        }
        if self.proof_pending_interval_secs == 0 {
            return Err(ConfigError::InvalidPolling(
                "pending proof interval must be positive".to_string(),
            ));
        }
        if self.proof_max_pending_polls == 0 {
            return Err(ConfigError::InvalidPolling(
                "proof retrieval needs at least one pending poll".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }
    Url::parse(value).map_err(|err| {
        ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: err.to_string(),
        }
    })
}

fn parse_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = parse_url(field, value)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: "URL must start with http:// or https://".to_string(),
        });
    }
    Ok(url)
}

fn check_api_key(field: &'static str, key: Option<&str>) -> Result<(), ConfigError> {
    match key {
        Some(key) if key.trim().is_empty() => Err(ConfigError::EmptyValue(field)),
        _ => Ok(()),
    }
}
