use alloy_primitives::{
    B256,
    Bytes,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::schema::{
    DecodeError,
    DecodedResponse,
    SchemaRegistry,
};

/// Merkle inclusion proof and raw response bytes for one attestation request,
/// as served by the DA layer once its round is finalized.
///
/// The Merkle path may be empty when the round tree has a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub merkle_path: Vec<B256>,
    pub response_bytes: Bytes,
}

impl Proof {
    pub fn new(merkle_path: Vec<B256>, response_bytes: Bytes) -> Self {
        Self {
            merkle_path,
            response_bytes,
        }
    }

    /// Decode the response bytes with the schema of `attestation_type`.
    pub fn decode(
        &self,
        registry: &SchemaRegistry,
        attestation_type: &str,
    ) -> Result<VerifiableProof, DecodeError> {
        let data = registry.decode(attestation_type, &self.response_bytes)?;
        Ok(VerifiableProof {
            merkle_proof: self.merkle_path.clone(),
            data,
        })
    }
}

/// A proof paired with its decoded response, shaped like the `Proof` struct
/// consumer contracts verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiableProof {
    pub merkle_proof: Vec<B256>,
    pub data: DecodedResponse,
}

impl VerifiableProof {
    /// ABI-encoded contract argument.
    pub fn abi_encode(&self) -> Vec<u8> {
        self.data.encode_proof(self.merkle_proof.clone())
    }
}
