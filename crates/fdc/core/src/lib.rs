//! Core types for the FDC attestation workflow.
//!
//! Everything in this crate is pure: request tags, the opaque encoded request,
//! voting-round arithmetic, the proof record returned by the DA layer and the
//! per-attestation-type response schemas. All I/O lives in `fdc-client`.
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod proof;
pub mod request;
pub mod round;
pub mod schema;
pub mod tag;

pub use proof::{
    Proof,
    VerifiableProof,
};
pub use request::{
    AttestationRequest,
    EncodedRequest,
};
pub use round::{
    EpochConfig,
    FinalizationStatus,
    RoundError,
    VotingRound,
};
pub use schema::{
    DecodeError,
    DecodedResponse,
    SchemaRegistry,
};
pub use tag::{
    AttestationType,
    TAG_WIDTH,
    TagError,
    decode_tag,
    encode_tag,
};

/// Relay protocol id under which FDC voting rounds are finalized.
pub const FDC_PROTOCOL_ID: u64 = 200;
