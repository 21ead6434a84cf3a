use alloy_primitives::{
    B256,
    Bytes,
    hex,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::fmt;

use crate::tag::{
    TagError,
    encode_tag,
};

/// A typed attestation request before it has been ABI-encoded by a verifier.
///
/// The body is the attestation-type-specific JSON record and is passed to the
/// verifier untouched. Both tags are validated against the 32 byte tag width
/// on construction, so a built request always encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAttestationRequest")]
pub struct AttestationRequest {
    attestation_type: String,
    source_id: String,
    #[serde(rename = "requestBody")]
    body: Value,
}

impl AttestationRequest {
    pub fn new(
        attestation_type: impl Into<String>,
        source_id: impl Into<String>,
        body: Value,
    ) -> Result<Self, TagError> {
        let attestation_type = attestation_type.into();
        let source_id = source_id.into();
        encode_tag(&attestation_type)?;
        encode_tag(&source_id)?;
        Ok(Self {
            attestation_type,
            source_id,
            body,
        })
    }

    pub fn attestation_type(&self) -> &str {
        &self.attestation_type
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn attestation_type_tag(&self) -> B256 {
        B256::right_padding_from(self.attestation_type.as_bytes())
    }

    pub fn source_id_tag(&self) -> B256 {
        B256::right_padding_from(self.source_id.as_bytes())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttestationRequest {
    attestation_type: String,
    source_id: String,
    request_body: Value,
}

impl TryFrom<RawAttestationRequest> for AttestationRequest {
    type Error = TagError;

    fn try_from(raw: RawAttestationRequest) -> Result<Self, Self::Error> {
        Self::new(raw.attestation_type, raw.source_id, raw.request_body)
    }
}

/// ABI-encoded attestation request as returned by a verifier's
/// `prepareRequest` endpoint.
///
/// Opaque to every stage of the workflow: it is the key for the fee lookup,
/// the hub submission and the DA proof lookup, and is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedRequest(Bytes);

impl EncodedRequest {
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Parse a hex string, with or without the `0x` prefix.
    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(value.trim()).map(|bytes| Self(bytes.into()))
    }

    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Bytes> for EncodedRequest {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for EncodedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn builds_address_validity_request() {
        let request = AttestationRequest::new(
            "AddressValidity",
            "testBTC",
            json!({ "addressStr": "mg9P9f4wr9w7c1sgFeiTC5oMLYXCc2c7hs" }),
        )
        .unwrap();

        assert_eq!(request.attestation_type(), "AddressValidity");
        assert_eq!(request.source_id(), "testBTC");
        assert_eq!(
            request.source_id_tag(),
            encode_tag("testBTC").unwrap(),
        );
    }

    #[test]
    fn rejects_oversized_source_id() {
        let source = "x".repeat(40);
        assert_matches!(
            AttestationRequest::new("Payment", source, json!({})),
            Err(TagError::TooLong { len: 40, .. })
        );
    }

    #[test]
    fn serializes_with_verifier_field_names() {
        let request = AttestationRequest::new("Payment", "testXRP", json!({ "inUtxo": "0" })).unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "attestationType": "Payment",
                "sourceId": "testXRP",
                "requestBody": { "inUtxo": "0" },
            })
        );
    }

    #[test]
    fn deserialization_validates_tags() {
        let oversized = json!({
            "attestationType": "Payment",
            "sourceId": "y".repeat(33),
            "requestBody": {},
        });
        assert!(serde_json::from_value::<AttestationRequest>(oversized).is_err());
    }

    #[test]
    fn encoded_request_parses_prefixed_and_bare_hex() {
        let prefixed = EncodedRequest::from_hex("0xdeadbeef").unwrap();
        let bare = EncodedRequest::from_hex("deadbeef").unwrap();
        assert_eq!(prefixed, bare);
        assert_eq!(prefixed.len(), 4);
        assert_eq!(prefixed.to_string(), "0xdeadbeef");
    }

    #[test]
    fn encoded_request_rejects_invalid_hex() {
        assert!(EncodedRequest::from_hex("0xzz").is_err());
    }
}
