//! ABI schemas of the attestation responses, and the registry that decodes
//! raw response bytes into them.
//!
//! Every attestation type shares the same response envelope
//! (`attestationType`, `sourceId`, `votingRound`, `lowestUsedTimestamp`,
//! `requestBody`, `responseBody`) and differs only in the request and response
//! bodies. The proof struct a consumer contract accepts is the Merkle path
//! followed by that response.

use alloy_primitives::B256;
use alloy_sol_types::{
    SolValue,
    sol,
};
use std::collections::HashMap;

use crate::tag::{
    AttestationType,
    decode_tag,
};

sol! {
    #[derive(Debug, Default, PartialEq, Eq)]
    interface IAddressValidity {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            string addressStr;
        }

        struct ResponseBody {
            bool isValid;
            string standardAddress;
            bytes32 standardAddressHash;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IBalanceDecreasingTransaction {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            bytes32 transactionId;
            bytes32 sourceAddressIndicator;
        }

        struct ResponseBody {
            uint64 blockNumber;
            uint64 blockTimestamp;
            bytes32 sourceAddressHash;
            int256 spentAmount;
            bytes32 standardPaymentReference;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IConfirmedBlockHeightExists {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            uint64 blockNumber;
            uint64 queryWindow;
        }

        struct ResponseBody {
            uint64 blockTimestamp;
            uint64 numberOfConfirmations;
            uint64 lowestQueryWindowBlockNumber;
            uint64 lowestQueryWindowBlockTimestamp;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IEVMTransaction {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            bytes32 transactionHash;
            uint16 requiredConfirmations;
            bool provideInput;
            bool listEvents;
            uint32[] logIndices;
        }

        struct ResponseBody {
            uint64 blockNumber;
            uint64 timestamp;
            address sourceAddress;
            bool isDeployment;
            address receivingAddress;
            uint256 value;
            bytes input;
            uint8 status;
            Event[] events;
        }

        struct Event {
            uint32 logIndex;
            address emitterAddress;
            bytes32[] topics;
            bytes data;
            bool removed;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IPayment {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            bytes32 transactionId;
            uint256 inUtxo;
            uint256 utxo;
        }

        struct ResponseBody {
            uint64 blockNumber;
            uint64 blockTimestamp;
            bytes32 sourceAddressHash;
            bytes32 sourceAddressesRoot;
            bytes32 receivingAddressHash;
            bytes32 intendedReceivingAddressHash;
            int256 spentAmount;
            int256 intendedSpentAmount;
            int256 receivedAmount;
            int256 intendedReceivedAmount;
            bytes32 standardPaymentReference;
            bool oneToOne;
            uint8 status;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IReferencedPaymentNonexistence {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            uint64 minimalBlockNumber;
            uint64 deadlineBlockNumber;
            uint64 deadlineTimestamp;
            bytes32 destinationAddressHash;
            uint256 amount;
            bytes32 standardPaymentReference;
            bool checkSourceAddresses;
            bytes32 sourceAddressesRoot;
        }

        struct ResponseBody {
            uint64 minimalBlockTimestamp;
            uint64 firstOverflowBlockNumber;
            uint64 firstOverflowBlockTimestamp;
        }
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    interface IWeb2Json {
        struct Request {
            bytes32 attestationType;
            bytes32 sourceId;
            bytes32 messageIntegrityCode;
            RequestBody requestBody;
        }

        struct Response {
            bytes32 attestationType;
            bytes32 sourceId;
            uint64 votingRound;
            uint64 lowestUsedTimestamp;
            RequestBody requestBody;
            ResponseBody responseBody;
        }

        struct Proof {
            bytes32[] merkleProof;
            Response data;
        }

        struct RequestBody {
            string url;
            string httpMethod;
            string headers;
            string queryParams;
            string body;
            string postProcessJq;
            string abiSignature;
        }

        struct ResponseBody {
            bytes abiEncodedData;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("no response schema registered for attestation type {0:?}")]
    UnknownAttestationType(String),
    #[error("malformed {attestation_type} response: {reason}")]
    MalformedResponse {
        attestation_type: AttestationType,
        reason: String,
    },
}

/// Decoder from raw ABI bytes to a typed response.
pub type DecodeFn = fn(&[u8]) -> Result<DecodedResponse, alloy_sol_types::Error>;

macro_rules! decoded_responses {
    ($($variant:ident => $iface:ident),+ $(,)?) => {
        /// An attestation response decoded with its type's schema.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum DecodedResponse {
            $($variant($iface::Response),)+
        }

        impl DecodedResponse {
            pub const fn attestation_type(&self) -> AttestationType {
                match self {
                    $(Self::$variant(_) => AttestationType::$variant,)+
                }
            }

            /// The `attestationType` tag carried inside the response itself.
            pub const fn attestation_type_tag(&self) -> B256 {
                match self {
                    $(Self::$variant(response) => response.attestationType,)+
                }
            }

            pub const fn source_id_tag(&self) -> B256 {
                match self {
                    $(Self::$variant(response) => response.sourceId,)+
                }
            }

            pub const fn voting_round(&self) -> u64 {
                match self {
                    $(Self::$variant(response) => response.votingRound,)+
                }
            }

            pub const fn lowest_used_timestamp(&self) -> u64 {
                match self {
                    $(Self::$variant(response) => response.lowestUsedTimestamp,)+
                }
            }

            pub fn abi_encode(&self) -> Vec<u8> {
                match self {
                    $(Self::$variant(response) => response.abi_encode(),)+
                }
            }

            /// ABI-encode the type's `Proof` struct, the argument a consumer
            /// contract verifies.
            pub fn encode_proof(&self, merkle_proof: Vec<B256>) -> Vec<u8> {
                match self {
                    $(Self::$variant(response) => $iface::Proof {
                        merkleProof: merkle_proof,
                        data: response.clone(),
                    }
                    .abi_encode(),)+
                }
            }
        }

        $(
            impl From<$iface::Response> for DecodedResponse {
                fn from(response: $iface::Response) -> Self {
                    Self::$variant(response)
                }
            }
        )+

        fn builtin_decoders() -> Vec<(AttestationType, DecodeFn)> {
            vec![
                $((
                    AttestationType::$variant,
                    (|bytes: &[u8]| {
                        <$iface::Response as SolValue>::abi_decode(bytes)
                            .map(DecodedResponse::$variant)
                    }) as DecodeFn,
                ),)+
            ]
        }
    };
}

decoded_responses! {
    AddressValidity => IAddressValidity,
    BalanceDecreasingTransaction => IBalanceDecreasingTransaction,
    ConfirmedBlockHeightExists => IConfirmedBlockHeightExists,
    EvmTransaction => IEVMTransaction,
    Payment => IPayment,
    ReferencedPaymentNonexistence => IReferencedPaymentNonexistence,
    Web2Json => IWeb2Json,
}

/// Maps attestation types to their response decoders.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    decoders: HashMap<AttestationType, DecodeFn>,
}

impl SchemaRegistry {
    /// Registry holding every built-in attestation type.
    pub fn builtin() -> Self {
        Self {
            decoders: builtin_decoders().into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Replaces any decoder already registered for `attestation_type`.
    pub fn register(&mut self, attestation_type: AttestationType, decode: DecodeFn) {
        self.decoders.insert(attestation_type, decode);
    }

    pub fn contains(&self, attestation_type: AttestationType) -> bool {
        self.decoders.contains_key(&attestation_type)
    }

    pub fn types(&self) -> Vec<AttestationType> {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort();
        types
    }

    /// The registered type named `attestation_type`.
    pub fn resolve(&self, attestation_type: &str) -> Result<AttestationType, DecodeError> {
        attestation_type
            .parse::<AttestationType>()
            .ok()
            .filter(|ty| self.contains(*ty))
            .ok_or_else(|| DecodeError::UnknownAttestationType(attestation_type.to_string()))
    }

    /// Decode `bytes` with the schema registered for `attestation_type`.
    ///
    /// The `attestationType` tag inside the decoded response must match the
    /// requested type.
    pub fn decode(
        &self,
        attestation_type: &str,
        bytes: &[u8],
    ) -> Result<DecodedResponse, DecodeError> {
        let ty = self.resolve(attestation_type)?;
        let decode = self
            .decoders
            .get(&ty)
            .ok_or_else(|| DecodeError::UnknownAttestationType(attestation_type.to_string()))?;

        let decoded = decode(bytes).map_err(|err| {
            DecodeError::MalformedResponse {
                attestation_type: ty,
                reason: err.to_string(),
            }
        })?;

        if decoded.attestation_type_tag() != ty.tag() {
            let found = decode_tag(&decoded.attestation_type_tag())
                .unwrap_or_else(|_| decoded.attestation_type_tag().to_string());
            return Err(DecodeError::MalformedResponse {
                attestation_type: ty,
                reason: format!("response carries attestation type {found:?}"),
            });
        }

        Ok(decoded)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
