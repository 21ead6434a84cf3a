//! Client side of the FDC attestation workflow.
//!
//! ```no_run
//! use fdc_client::{AttestationPipeline, ClientConfig};
//! use fdc_core::AttestationRequest;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::new(
//!         "https://coston2-api.flare.network/ext/C/rpc",
//!         "https://fdc-verifiers-testnet.flare.network/verifier/btc",
//!         "https://ctn2-data-availability.flare.network/api/v1/fdc",
//!     )
//!     .with_private_key("0x...");
//!
//!     let pipeline = AttestationPipeline::connect(&config).await.unwrap();
//!     let request = AttestationRequest::new(
//!         "AddressValidity",
//!         "testBTC",
//!         json!({ "addressStr": "mg9P9f4wr9w7c1sgFeiTC5oMLYXCc2c7hs" }),
//!     )
//!     .unwrap();
//!     let outcome = pipeline.run(&request, &CancellationToken::new()).await.unwrap();
//!     println!("round {}", outcome.round_id());
//! }
//! ```
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

use reqwest::header::{
    HeaderMap,
    HeaderValue,
    InvalidHeaderValue,
};
use url::Url;

pub mod chain;
pub mod config;
pub mod da;
pub mod error;
pub mod finalization;
pub mod pipeline;
pub mod poll;
pub mod proof;
pub mod verifier;

pub use config::{
    ClientConfig,
    ConfigError,
    DaConfig,
    PollingConfig,
    VerifierConfig,
};
pub use error::{
    AttestationError,
    ConnectError,
    PipelineError,
    Stage,
};
pub use finalization::FinalizationWaiter;
pub use pipeline::{
    AttestationOutcome,
    AttestationPipeline,
    Collaborators,
};
pub use proof::ProofRetriever;

pub(crate) const API_KEY_HEADER: &str = "x-api-key";

pub(crate) fn api_key_headers(api_key: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, HeaderValue::from_str(api_key.trim())?);
    Ok(headers)
}

/// `base` with `segments` appended to its path. `None` for URLs that cannot
/// carry a path, such as `mailto:`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(segments);
    Some(url)
}
