//! Fixed-width `bytes32` tags for attestation types and source ids.

use alloy_primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Width in bytes of an encoded tag.
pub const TAG_WIDTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag {tag:?} is {len} bytes long, tags hold at most {TAG_WIDTH} bytes")]
    TooLong { tag: String, len: usize },
    #[error("tag bytes are not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown attestation type {0:?}")]
    UnknownAttestationType(String),
}

/// Encode `tag` as its UTF-8 bytes right-padded with zeros to 32 bytes.
pub fn encode_tag(tag: &str) -> Result<B256, TagError> {
    let bytes = tag.as_bytes();
    if bytes.len() > TAG_WIDTH {
        return Err(TagError::TooLong {
            tag: tag.to_string(),
            len: bytes.len(),
        });
    }
    Ok(B256::right_padding_from(bytes))
}

/// Inverse of [`encode_tag`]: strips the trailing zero padding.
pub fn decode_tag(tag: &B256) -> Result<String, TagError> {
    let end = tag.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8(tag[..end].to_vec()).map_err(|_| TagError::InvalidUtf8)
}

/// Attestation types with a registered response schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttestationType {
    AddressValidity,
    BalanceDecreasingTransaction,
    ConfirmedBlockHeightExists,
    #[serde(rename = "EVMTransaction")]
    EvmTransaction,
    Payment,
    ReferencedPaymentNonexistence,
    Web2Json,
}

impl AttestationType {
    pub const ALL: [Self; 7] = [
        Self::AddressValidity,
        Self::BalanceDecreasingTransaction,
        Self::ConfirmedBlockHeightExists,
        Self::EvmTransaction,
        Self::Payment,
        Self::ReferencedPaymentNonexistence,
        Self::Web2Json,
    ];

    /// Canonical name, as used in verifier URLs and in the `bytes32` tag.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddressValidity => "AddressValidity",
            Self::BalanceDecreasingTransaction => "BalanceDecreasingTransaction",
            Self::ConfirmedBlockHeightExists => "ConfirmedBlockHeightExists",
            Self::EvmTransaction => "EVMTransaction",
            Self::Payment => "Payment",
            Self::ReferencedPaymentNonexistence => "ReferencedPaymentNonexistence",
            Self::Web2Json => "Web2Json",
        }
    }

    pub fn tag(&self) -> B256 {
        B256::right_padding_from(self.name().as_bytes())
    }

    pub fn from_tag(tag: &B256) -> Result<Self, TagError> {
        decode_tag(tag)?.parse()
    }
}

impl FromStr for AttestationType {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| TagError::UnknownAttestationType(s.to_string()))
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
