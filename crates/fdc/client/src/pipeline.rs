//! The attestation workflow, start to finish: prepare, pay, submit, wait for
//! finalization, fetch the proof and decode it.

use alloy::primitives::U256;
use fdc_core::{
    AttestationRequest,
    DecodedResponse,
    EncodedRequest,
    Proof,
    SchemaRegistry,
    VerifiableProof,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    chain::{
        AttestationHub,
        EpochSource,
        FdcContracts,
        FeeResolver,
        FinalityOracle,
        FlareContractRegistry,
        RequestSubmitter,
        SubmittedRequest,
        connect_provider,
        resolve_contracts,
    },
    config::{
        ClientConfig,
        PollingConfig,
    },
    da::{
        DaClient,
        ProofSource,
    },
    error::{
        AtStage,
        AttestationError,
        ConnectError,
        PipelineError,
        Stage,
    },
    finalization::FinalizationWaiter,
    poll::{
        Sleeper,
        TokioSleeper,
    },
    proof::ProofRetriever,
    verifier::{
        RequestPreparer,
        VerifierClient,
    },
};

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub preparer: Arc<dyn RequestPreparer>,
    pub fees: Arc<dyn FeeResolver>,
    pub hub: Arc<dyn AttestationHub>,
    pub epochs: Arc<dyn EpochSource>,
    pub relay: Arc<dyn FinalityOracle>,
    pub proofs: Arc<dyn ProofSource>,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationOutcome {
    pub request: EncodedRequest,
    pub fee: U256,
    pub submission: SubmittedRequest,
    pub proof: Proof,
    pub response: DecodedResponse,
}

impl AttestationOutcome {
    pub fn round_id(&self) -> u64 {
        self.submission.round_id()
    }

    /// The proof in the shape consumer contracts verify.
    pub fn verifiable_proof(&self) -> VerifiableProof {
        VerifiableProof {
            merkle_proof: self.proof.merkle_path.clone(),
            data: self.response.clone(),
        }
    }
}

/// Runs attestation requests through every stage in order.
///
/// Holds no per-request state, so one pipeline can be shared behind an `Arc`
/// and run for independent requests concurrently. A failed run is not
/// resumable; start again from [`run`](Self::run).
#[derive(Clone)]
pub struct AttestationPipeline {
    preparer: Arc<dyn RequestPreparer>,
    fees: Arc<dyn FeeResolver>,
    submitter: RequestSubmitter,
    finalization: FinalizationWaiter,
    retriever: ProofRetriever,
    schemas: SchemaRegistry,
    protocol_id: u64,
}

impl AttestationPipeline {
    pub fn new(collaborators: Collaborators, protocol_id: u64, polling: &PollingConfig) -> Self {
        Self::with_sleeper(collaborators, protocol_id, polling, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        collaborators: Collaborators,
        protocol_id: u64,
        polling: &PollingConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let Collaborators {
            preparer,
            fees,
            hub,
            epochs,
            relay,
            proofs,
        } = collaborators;

        Self {
            preparer,
            fees,
            submitter: RequestSubmitter::new(hub, epochs),
            finalization: FinalizationWaiter::new(relay, polling.finalization_interval())
                .with_timeout(polling.finalization_timeout())
                .with_sleeper(sleeper.clone()),
            retriever: ProofRetriever::new(proofs, polling).with_sleeper(sleeper),
            schemas: SchemaRegistry::builtin(),
            protocol_id,
        }
    }

    /// Replace the decode registry.
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Build a pipeline against live services: validates `config`, connects
    /// the provider and resolves the contract addresses.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ConnectError> {
        config.validate()?;

        let provider = connect_provider(&config.rpc_url, config.private_key.as_deref())?;
        let registry = FlareContractRegistry::new(provider.clone(), config.contract_registry);
        let addresses = resolve_contracts(&registry, &config.contracts).await?;
        info!(
            fdc_hub = %addresses.fdc_hub,
            relay = %addresses.relay,
            systems_manager = %addresses.systems_manager,
            "Resolved attestation contracts"
        );

        let contracts = Arc::new(FdcContracts::new(provider, addresses));
        let collaborators = Collaborators {
            preparer: Arc::new(VerifierClient::from_config(&config.verifier)?),
            fees: contracts.clone(),
            hub: contracts.clone(),
            epochs: contracts.clone(),
            relay: contracts,
            proofs: Arc::new(DaClient::from_config(&config.da)?),
        };

        Ok(Self::new(collaborators, config.protocol_id, &config.polling))
    }

    pub fn protocol_id(&self) -> u64 {
        self.protocol_id
    }

    /// Run one request through every stage.
    pub async fn run(
        &self,
        request: &AttestationRequest,
        cancel: &CancellationToken,
    ) -> Result<AttestationOutcome, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::new(Stage::Prepare, AttestationError::Cancelled));
        }

        info!(
            attestation_type = request.attestation_type(),
            source_id = request.source_id(),
            "Starting attestation"
        );

        // Nothing is paid for a response that could never be decoded.
        self.schemas
            .resolve(request.attestation_type())
            .at(Stage::Prepare)?;

        let encoded = self
            .preparer
            .prepare_request(request)
            .await
            .map_err(AttestationError::InvalidRequest)
            .at(Stage::Prepare)?;

        let fee = self
            .fees
            .request_fee(&encoded)
            .await
            .map_err(AttestationError::FeeLookupFailed)
            .at(Stage::Fee)?;

        let submission = self.submitter.submit(&encoded, fee).await.at(Stage::Submit)?;

        let (proof, verifiable) = self
            .fetch_verified(request.attestation_type(), &encoded, submission.round_id(), cancel)
            .await?;

        Ok(AttestationOutcome {
            request: encoded,
            fee,
            submission,
            proof,
            response: verifiable.data,
        })
    }

    /// Wait for `round_id` to finalize, then fetch and decode the proof of a
    /// request that was already submitted.
    pub async fn retrieve(
        &self,
        attestation_type: &str,
        request: &EncodedRequest,
        round_id: u64,
        cancel: &CancellationToken,
    ) -> Result<VerifiableProof, PipelineError> {
        self.schemas.resolve(attestation_type).at(Stage::Decode)?;
        self.fetch_verified(attestation_type, request, round_id, cancel)
            .await
            .map(|(_, verifiable)| verifiable)
    }

    async fn fetch_verified(
        &self,
        attestation_type: &str,
        request: &EncodedRequest,
        round_id: u64,
        cancel: &CancellationToken,
    ) -> Result<(Proof, VerifiableProof), PipelineError> {
        self.finalization
            .await_finalization(self.protocol_id, round_id, cancel)
            .await
            .at(Stage::Finalization)?;

        let proof = self
            .retriever
            .retrieve_proof(request, round_id, cancel)
            .await
            .at(Stage::Proof)?;

        let verifiable = proof
            .decode(&self.schemas, attestation_type)
            .at(Stage::Decode)?;
        if verifiable.data.voting_round() != round_id {
            return Err(PipelineError::new(
                Stage::Decode,
                AttestationError::MalformedResponse(format!(
                    "response is for voting round {}, expected {round_id}",
                    verifiable.data.voting_round()
                )),
            ));
        }

        info!(round_id, attestation_type, "Attestation proof ready");
        Ok((proof, verifiable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::{
            ChainError,
            HubReceipt,
            MockAttestationHub,
            MockEpochSource,
            MockFeeResolver,
            MockFinalityOracle,
        },
        da::MockProofSource,
        poll::testing::RecordingSleeper,
        verifier::MockRequestPreparer,
    };
    use alloy::{
        primitives::{
            B256,
            TxHash,
        },
        sol_types::SolValue,
    };
    use assert_matches::assert_matches;
    use fdc_core::{
        AttestationType,
        EpochConfig,
        encode_tag,
        schema::IAddressValidity,
    };
    use mockall::Sequence;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            body_partial_json,
            method,
            path,
        },
    };

    const ENCODED_REQUEST: &str = "0x4164647265737356616c69646974790000000000000000000000000000000000";
    const ADDRESS: &str = "mg9P9f4wr9w7c1sgFeiTC5oMLYXCc2c7hs";

    fn btc_request() -> AttestationRequest {
        AttestationRequest::new("AddressValidity", "testBTC", json!({ "addressStr": ADDRESS }))
            .unwrap()
    }

    fn response(voting_round: u64) -> IAddressValidity::Response {
        IAddressValidity::Response {
            attestationType: AttestationType::AddressValidity.tag(),
            sourceId: encode_tag("testBTC").unwrap(),
            votingRound: voting_round,
            lowestUsedTimestamp: 0xffff_ffff_ffff_ffff,
            requestBody: IAddressValidity::RequestBody {
                addressStr: ADDRESS.into(),
            },
            responseBody: IAddressValidity::ResponseBody {
                isValid: true,
                standardAddress: ADDRESS.into(),
                standardAddressHash: B256::repeat_byte(0x5a),
            },
        }
    }

    fn fees(fee: u64) -> MockFeeResolver {
        let mut fees = MockFeeResolver::new();
        fees.expect_request_fee()
            .returning(move |_| Ok(U256::from(fee)));
        fees
    }

    fn hub() -> MockAttestationHub {
        let mut hub = MockAttestationHub::new();
        hub.expect_request_attestation()
            .withf(|request, fee| request.to_string() == ENCODED_REQUEST && *fee == U256::from(100))
            .returning(|_, _| {
                Ok(HubReceipt {
                    tx_hash: TxHash::repeat_byte(0x01),
                    block_number: 1_234,
                    block_timestamp: 900,
                })
            });
        hub
    }

    fn epochs() -> MockEpochSource {
        let mut epochs = MockEpochSource::new();
        epochs
            .expect_epoch_config()
            .returning(|| Ok(EpochConfig::new(0, 90)));
        epochs.expect_current_voting_epoch_id().returning(|| Ok(10));
        epochs
    }

    fn finalized_relay() -> MockFinalityOracle {
        let mut relay = MockFinalityOracle::new();
        relay
            .expect_is_finalized()
            .withf(|protocol_id, round_id| *protocol_id == 200 && *round_id == 10)
            .returning(|_, _| Ok(true));
        relay
    }

    fn prepared() -> MockRequestPreparer {
        let mut preparer = MockRequestPreparer::new();
        preparer
            .expect_prepare_request()
            .returning(|_| Ok(EncodedRequest::from_hex(ENCODED_REQUEST).unwrap()));
        preparer
    }

    fn proofs(voting_round: u64) -> MockProofSource {
        let mut proofs = MockProofSource::new();
        proofs.expect_fetch_proof().returning(move |_, _| {
            Ok(Some(Proof::new(
                vec![B256::repeat_byte(0x0f)],
                response(voting_round).abi_encode().into(),
            )))
        });
        proofs
    }

    fn pipeline(collaborators: Collaborators) -> AttestationPipeline {
        AttestationPipeline::with_sleeper(
            collaborators,
            200,
            &PollingConfig::default(),
            Arc::new(RecordingSleeper::new()),
        )
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            preparer: Arc::new(prepared()),
            fees: Arc::new(fees(100)),
            hub: Arc::new(hub()),
            epochs: Arc::new(epochs()),
            relay: Arc::new(finalized_relay()),
            proofs: Arc::new(proofs(10)),
        }
    }

    #[tokio::test]
    async fn address_validity_end_to_end() {
        let verifier = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verifier/btc/AddressValidity/prepareRequest"))
            .and(body_partial_json(json!({
                "requestBody": { "addressStr": ADDRESS },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "VALID",
                "abiEncodedRequest": ENCODED_REQUEST,
            })))
            .expect(1)
            .mount(&verifier)
            .await;

        let da = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/fdc/proof-by-request-round-raw"))
            .and(body_partial_json(json!({ "votingRoundId": 10 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response_hex": alloy::hex::encode_prefixed(response(10).abi_encode()),
                "proof": [B256::repeat_byte(0x0f).to_string()],
            })))
            .expect(1)
            .mount(&da)
            .await;

        let mut relay = MockFinalityOracle::new();
        let mut seq = Sequence::new();
        for finalized in [false, false, true] {
            relay
                .expect_is_finalized()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| Ok(finalized));
        }

        let sleeper = Arc::new(RecordingSleeper::new());
        let pipeline = AttestationPipeline::with_sleeper(
            Collaborators {
                preparer: Arc::new(
                    VerifierClient::new(&format!("{}/verifier/btc", verifier.uri())).unwrap(),
                ),
                fees: Arc::new(fees(100)),
                hub: Arc::new(hub()),
                epochs: Arc::new(epochs()),
                relay: Arc::new(relay),
                proofs: Arc::new(DaClient::new(&format!("{}/api/v1/fdc", da.uri())).unwrap()),
            },
            200,
            &PollingConfig::default(),
            sleeper.clone(),
        );

        let outcome = pipeline
            .run(&btc_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.request.is_empty());
        assert_eq!(outcome.fee, U256::from(100));
        assert_eq!(outcome.round_id(), 10);
        assert_eq!(outcome.response, DecodedResponse::from(response(10)));
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(30); 2]);

        let contract_arg =
            <IAddressValidity::Proof as SolValue>::abi_decode(&outcome.verifiable_proof().abi_encode())
                .unwrap();
        assert_eq!(contract_arg.merkleProof, vec![B256::repeat_byte(0x0f)]);
        assert!(contract_arg.data.responseBody.isValid);

        verifier.verify().await;
        da.verify().await;
    }

    #[tokio::test]
    async fn rejected_request_stops_at_prepare() {
        let mut preparer = MockRequestPreparer::new();
        preparer.expect_prepare_request().returning(|_| {
            Err(crate::verifier::VerifierClientError::Rejected("INVALID".into()))
        });
        let mut fees = MockFeeResolver::new();
        fees.expect_request_fee().never();

        let err = pipeline(Collaborators {
            preparer: Arc::new(preparer),
            fees: Arc::new(fees),
            ..collaborators()
        })
        .run(&btc_request(), &CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Prepare);
        assert_matches!(err.source, AttestationError::InvalidRequest(_));
    }

    #[tokio::test]
    async fn fee_failure_never_submits() {
        let mut fees = MockFeeResolver::new();
        fees.expect_request_fee()
            .times(1)
            .returning(|_| Err(ChainError::UnknownContract("FdcRequestFeeConfigurations".into())));
        let mut hub = MockAttestationHub::new();
        hub.expect_request_attestation().never();

        let err = pipeline(Collaborators {
            fees: Arc::new(fees),
            hub: Arc::new(hub),
            ..collaborators()
        })
        .run(&btc_request(), &CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Fee);
        assert_matches!(err.source, AttestationError::FeeLookupFailed(_));
    }

    #[tokio::test]
    async fn relay_failure_is_reported_at_finalization() {
        let mut relay = MockFinalityOracle::new();
        relay
            .expect_is_finalized()
            .returning(|_, _| Err(ChainError::UnknownContract("Relay".into())));
        let mut proofs = MockProofSource::new();
        proofs.expect_fetch_proof().never();

        let err = pipeline(Collaborators {
            relay: Arc::new(relay),
            proofs: Arc::new(proofs),
            ..collaborators()
        })
        .run(&btc_request(), &CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Finalization);
        assert_matches!(
            err.source,
            AttestationError::FinalityQueryFailed { round_id: 10, .. }
        );
    }

    #[tokio::test]
    async fn proof_for_other_round_is_rejected() {
        let err = pipeline(Collaborators {
            proofs: Arc::new(proofs(11)),
            ..collaborators()
        })
        .run(&btc_request(), &CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Decode);
        assert_matches!(err.source, AttestationError::MalformedResponse(msg) if msg.contains("round 11"));
    }

    #[tokio::test]
    async fn unknown_attestation_type_fails_before_payment() {
        let mut preparer = MockRequestPreparer::new();
        preparer.expect_prepare_request().never();
        let mut hub = MockAttestationHub::new();
        hub.expect_request_attestation().never();

        let request = AttestationRequest::new("JsonApi", "WEB2", json!({})).unwrap();
        let err = pipeline(Collaborators {
            preparer: Arc::new(preparer),
            hub: Arc::new(hub),
            ..collaborators()
        })
        .run(&request, &CancellationToken::new())
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Prepare);
        assert_matches!(err.source, AttestationError::UnknownAttestationType(name) if name == "JsonApi");
    }

    #[tokio::test]
    async fn unregistered_type_is_not_retrieved() {
        let mut relay = MockFinalityOracle::new();
        relay.expect_is_finalized().never();

        let err = pipeline(Collaborators {
            relay: Arc::new(relay),
            ..collaborators()
        })
        .with_schemas(SchemaRegistry::empty())
        .retrieve(
            "AddressValidity",
            &EncodedRequest::from_hex(ENCODED_REQUEST).unwrap(),
            10,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.stage, Stage::Decode);
        assert_matches!(err.source, AttestationError::UnknownAttestationType(_));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut preparer = MockRequestPreparer::new();
        preparer.expect_prepare_request().never();

        let err = pipeline(Collaborators {
            preparer: Arc::new(preparer),
            ..collaborators()
        })
        .run(&btc_request(), &cancel)
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.stage, Stage::Prepare);
    }

    #[tokio::test]
    async fn retrieve_skips_submission() {
        let mut hub = MockAttestationHub::new();
        hub.expect_request_attestation().never();

        let verifiable = pipeline(Collaborators {
            hub: Arc::new(hub),
            ..collaborators()
        })
        .retrieve(
            "AddressValidity",
            &EncodedRequest::from_hex(ENCODED_REQUEST).unwrap(),
            10,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(verifiable.merkle_proof, vec![B256::repeat_byte(0x0f)]);
        assert_eq!(verifiable.data.voting_round(), 10);
    }

    #[tokio::test]
    async fn shared_pipeline_runs_requests_concurrently() {
        let mut fees = MockFeeResolver::new();
        fees.expect_request_fee()
            .times(2)
            .returning(|_| Ok(U256::from(100)));
        let mut hub = MockAttestationHub::new();
        hub.expect_request_attestation().times(2).returning(|_, _| {
            Ok(HubReceipt {
                tx_hash: TxHash::repeat_byte(0x02),
                block_number: 1,
                block_timestamp: 905,
            })
        });

        let pipeline = Arc::new(pipeline(Collaborators {
            fees: Arc::new(fees),
            hub: Arc::new(hub),
            ..collaborators()
        }));
        let cancel = CancellationToken::new();
        let request = btc_request();

        let (first, second) = tokio::join!(
            pipeline.run(&request, &cancel),
            pipeline.run(&request, &cancel)
        );
        assert_eq!(first.unwrap().round_id(), 10);
        assert_eq!(second.unwrap().round_id(), 10);
    }
}
