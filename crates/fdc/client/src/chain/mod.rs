//! On-chain collaborators: the attestation hub, the fee configuration, the
//! relay and the systems manager.
//!
//! Each contract is reached through a narrow trait so the pipeline can run
//! against mocks. [`FdcContracts`] implements all of them over one provider.

use alloy::{
    contract,
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionError,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
    sol,
    transports::TransportError,
};
use async_trait::async_trait;
use fdc_core::{
    EncodedRequest,
    EpochConfig,
};
use tracing::{
    debug,
    info,
};
use url::Url;

pub mod registry;
pub mod submitter;

pub use registry::{
    ContractAddresses,
    resolve_contracts,
};
pub use submitter::{
    RequestSubmitter,
    SubmittedRequest,
};

sol! {
    #[sol(rpc)]
    interface IFdcHub {
        function requestAttestation(bytes calldata data) external payable;
    }

    #[sol(rpc)]
    interface IFdcRequestFeeConfigurations {
        function getRequestFee(bytes calldata data) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IRelay {
        function isFinalized(uint256 protocolId, uint256 votingRoundId) external view returns (bool);
    }

    #[sol(rpc)]
    interface IFlareSystemsManager {
        function firstVotingRoundStartTs() external view returns (uint64);
        function votingEpochDurationSeconds() external view returns (uint64);
        function getCurrentVotingEpochId() external view returns (uint32);
    }

    #[sol(rpc)]
    interface IFlareContractRegistry {
        function getContractAddressByName(string calldata name) external view returns (address);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("contract call failed: {0}")]
    Contract(#[from] contract::Error),
    #[error("RPC error: {0}")]
    Transport(#[from] TransportError),
    #[error("transaction was not confirmed: {0}")]
    PendingTransaction(#[from] PendingTransactionError),
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error("receipt of transaction {0} has no block number")]
    MissingBlock(TxHash),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("transaction {tx_hash} was mined but its block could not be read: {source}")]
    BlockUnreadable {
        tx_hash: TxHash,
        #[source]
        source: Box<ChainError>,
    },
    #[error("contract {0:?} is not registered")]
    UnknownContract(String),
    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(#[from] url::ParseError),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

impl ChainError {
    /// Hash of a transaction that was mined, and paid for, before this error.
    pub fn mined_tx(&self) -> Option<TxHash> {
        match self {
            Self::MissingBlock(tx_hash) | Self::BlockUnreadable { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Where a hub submission landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_timestamp: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeResolver: Send + Sync {
    /// Exact fee the hub charges for `request`.
    async fn request_fee(&self, request: &EncodedRequest) -> Result<U256, ChainError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttestationHub: Send + Sync {
    /// Send `requestAttestation` paying `fee` and wait for the receipt.
    async fn request_attestation(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> Result<HubReceipt, ChainError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EpochSource: Send + Sync {
    async fn epoch_config(&self) -> Result<EpochConfig, ChainError>;

    async fn current_voting_epoch_id(&self) -> Result<u64, ChainError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FinalityOracle: Send + Sync {
    async fn is_finalized(&self, protocol_id: u64, round_id: u64) -> Result<bool, ChainError>;
}

/// Connect an HTTP provider, with a local signer when a key is given.
pub fn connect_provider(rpc_url: &str, private_key: Option<&str>) -> Result<DynProvider, ChainError> {
    let url = Url::parse(rpc_url)?;
    let provider = match private_key {
        Some(key) => {
            let signer = key
                .trim()
                .parse::<PrivateKeySigner>()
                .map_err(|err| ChainError::InvalidPrivateKey(err.to_string()))?;
            info!(address = %signer.address(), "Using local signer");
            ProviderBuilder::new()
                .wallet(signer)
                .connect_http(url)
                .erased()
        }
        None => ProviderBuilder::new().connect_http(url).erased(),
    };
    Ok(provider)
}

/// The four attestation contracts behind one provider.
#[derive(Clone)]
pub struct FdcContracts {
    provider: DynProvider,
    addresses: ContractAddresses,
}

impl FdcContracts {
    pub fn new(provider: DynProvider, addresses: ContractAddresses) -> Self {
        Self {
            provider,
            addresses,
        }
    }

    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    fn hub(&self) -> IFdcHub::IFdcHubInstance<DynProvider> {
        IFdcHub::new(self.addresses.fdc_hub, self.provider.clone())
    }

    fn fee_configurations(
        &self,
    ) -> IFdcRequestFeeConfigurations::IFdcRequestFeeConfigurationsInstance<DynProvider> {
        IFdcRequestFeeConfigurations::new(self.addresses.fee_configurations, self.provider.clone())
    }

    fn relay(&self) -> IRelay::IRelayInstance<DynProvider> {
        IRelay::new(self.addresses.relay, self.provider.clone())
    }

    fn systems_manager(&self) -> IFlareSystemsManager::IFlareSystemsManagerInstance<DynProvider> {
        IFlareSystemsManager::new(self.addresses.systems_manager, self.provider.clone())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(block_number.into())
            .await?
            .ok_or(ChainError::BlockNotFound(block_number))?;
        Ok(block.header.timestamp)
    }
}

#[async_trait]
impl FeeResolver for FdcContracts {
    async fn request_fee(&self, request: &EncodedRequest) -> Result<U256, ChainError> {
        let fee = self
            .fee_configurations()
            .getRequestFee(request.as_bytes().clone())
            .call()
            .await?;
        debug!(%fee, "Resolved request fee");
        Ok(fee)
    }
}

#[async_trait]
impl AttestationHub for FdcContracts {
    async fn request_attestation(
        &self,
        request: &EncodedRequest,
        fee: U256,
    ) -> Result<HubReceipt, ChainError> {
        let pending = self
            .hub()
            .requestAttestation(request.as_bytes().clone())
            .value(fee)
            .send()
            .await?;
        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, %fee, "Attestation request sent");

        let receipt = pending.get_receipt().await?;
        if !receipt.status() {
            return Err(ChainError::Reverted(tx_hash));
        }
        let block_number = receipt
            .block_number
            .ok_or(ChainError::MissingBlock(tx_hash))?;
        let block_timestamp = self
            .block_timestamp(block_number)
            .await
            .map_err(|err| {
                ChainError::BlockUnreadable {
                    tx_hash,
                    source: Box::new(err),
                }
            })?;

        Ok(HubReceipt {
            tx_hash,
            block_number,
            block_timestamp,
        })
    }
}

#[async_trait]
impl EpochSource for FdcContracts {
    async fn epoch_config(&self) -> Result<EpochConfig, ChainError> {
        let manager = self.systems_manager();
        let first_voting_round_start_ts = manager.firstVotingRoundStartTs().call().await?;
        let voting_epoch_duration_seconds = manager.votingEpochDurationSeconds().call().await?;
        Ok(EpochConfig::new(
            first_voting_round_start_ts,
            voting_epoch_duration_seconds,
        ))
    }

    async fn current_voting_epoch_id(&self) -> Result<u64, ChainError> {
        let id = self.systems_manager().getCurrentVotingEpochId().call().await?;
        Ok(u64::from(id))
    }
}

#[async_trait]
impl FinalityOracle for FdcContracts {
    async fn is_finalized(&self, protocol_id: u64, round_id: u64) -> Result<bool, ChainError> {
        Ok(self
            .relay()
            .isFinalized(U256::from(protocol_id), U256::from(round_id))
            .call()
            .await?)
    }
}

/// Contract address lookups, used by [`resolve_contracts`].
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn address_of(&self, name: &str) -> Result<Address, ChainError>;
}

/// The on-chain `FlareContractRegistry`.
#[derive(Clone)]
pub struct FlareContractRegistry {
    provider: DynProvider,
    address: Address,
}

impl FlareContractRegistry {
    pub fn new(provider: DynProvider, address: Address) -> Self {
        Self { provider, address }
    }
}

#[async_trait]
impl ContractRegistry for FlareContractRegistry {
    async fn address_of(&self, name: &str) -> Result<Address, ChainError> {
        let registry = IFlareContractRegistry::new(self.address, self.provider.clone());
        Ok(registry
            .getContractAddressByName(name.to_string())
            .call()
            .await?)
    }
}
