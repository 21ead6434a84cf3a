use alloy::primitives::Address;
use tracing::debug;

use super::{
    ChainError,
    ContractRegistry,
};
use crate::config::ContractOverrides;

pub const FDC_HUB: &str = "FdcHub";
pub const FDC_REQUEST_FEE_CONFIGURATIONS: &str = "FdcRequestFeeConfigurations";
pub const RELAY: &str = "Relay";
pub const FLARE_SYSTEMS_MANAGER: &str = "FlareSystemsManager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub fdc_hub: Address,
    pub fee_configurations: Address,
    pub relay: Address,
    pub systems_manager: Address,
}

/// Fill every address missing from `overrides` from the contract registry.
pub async fn resolve_contracts<R>(
    registry: &R,
    overrides: &ContractOverrides,
) -> Result<ContractAddresses, ChainError>
where
    R: ContractRegistry + ?Sized,
{
    Ok(ContractAddresses {
        fdc_hub: resolve_one(registry, FDC_HUB, overrides.fdc_hub).await?,
        fee_configurations: resolve_one(
            registry,
            FDC_REQUEST_FEE_CONFIGURATIONS,
            overrides.fee_configurations,
        )
        .await?,
        relay: resolve_one(registry, RELAY, overrides.relay).await?,
        systems_manager: resolve_one(registry, FLARE_SYSTEMS_MANAGER, overrides.systems_manager)
            .await?,
    })
}

async fn resolve_one<R>(
    registry: &R,
    name: &str,
    configured: Option<Address>,
) -> Result<Address, ChainError>
where
    R: ContractRegistry + ?Sized,
{
    if let Some(address) = configured {
        return Ok(address);
    }
    let address = registry.address_of(name).await?;
    if address.is_zero() {
        return Err(ChainError::UnknownContract(name.to_string()));
    }
    debug!(contract = name, %address, "Resolved contract address");
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::Mutex,
    };

    #[derive(Default)]
    struct FakeRegistry {
        entries: HashMap<&'static str, Address>,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContractRegistry for FakeRegistry {
        async fn address_of(&self, name: &str) -> Result<Address, ChainError> {
            self.lookups.lock().unwrap().push(name.to_string());
            Ok(self.entries.get(name).copied().unwrap_or(Address::ZERO))
        }
    }

    fn full_registry() -> FakeRegistry {
        FakeRegistry {
            entries: HashMap::from([
                (FDC_HUB, address!("0x48aC463d7975828989331F4De43341627b9c5f1D")),
                (
                    FDC_REQUEST_FEE_CONFIGURATIONS,
                    address!("0x191a1282Ac700edE65c5B0AaF313BAcC3eA7fC7e"),
                ),
                (RELAY, address!("0x97702e350CaEda540935d92aAf213307e9069784")),
                (
                    FLARE_SYSTEMS_MANAGER,
                    address!("0xA90Db6D10F856799b10ef2A77EBCbF460aC71e52"),
                ),
            ]),
            lookups: Mutex::default(),
        }
    }

    #[tokio::test]
    async fn resolves_every_contract_by_name() {
        let registry = full_registry();
        let addresses = resolve_contracts(&registry, &ContractOverrides::default())
            .await
            .unwrap();

        assert_eq!(addresses.fdc_hub, registry.entries[FDC_HUB]);
        assert_eq!(addresses.relay, registry.entries[RELAY]);
        assert_eq!(registry.lookups.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn overrides_skip_lookup() {
        let registry = full_registry();
        let relay = address!("0x0000000000000000000000000000000000000042");
        let overrides = ContractOverrides {
            relay: Some(relay),
            ..ContractOverrides::default()
        };

        let addresses = resolve_contracts(&registry, &overrides).await.unwrap();
        assert_eq!(addresses.relay, relay);
        assert!(
            !registry
                .lookups
                .lock()
                .unwrap()
                .contains(&RELAY.to_string())
        );
    }

    #[tokio::test]
    async fn unregistered_contract_is_an_error() {
        let registry = FakeRegistry::default();
        assert_matches!(
            resolve_contracts(&registry, &ContractOverrides::default()).await,
            Err(ChainError::UnknownContract(name)) if name == FDC_HUB
        );
    }
}
