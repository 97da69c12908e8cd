//! Factory Registry
//!
//! Static configuration of the factory contracts whose creation events
//! enumerate protocol venues, plus the manually registered core contracts
//! (routers, lending pools, staking entrypoints) that users call directly.
//!
//! Both tables are validated once at load; anything malformed is rejected
//! with `InvalidConfig` before a single RPC call is made.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::contracts::{IBalancerVault, IUniswapV2Factory, IUniswapV3Factory};
use crate::error::{EngineError, Result};
use crate::snapshot::write_json_atomic;
use crate::types::DiscoveredContract;
use alloy::primitives::{address, keccak256, Address, B256};
use alloy::sol_types::SolEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// Where a creation event stores the child contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildSlot {
    /// Indexed parameter: `topics[i]`, i in 1..=3
    Topic(usize),
    /// Non-indexed parameter: 32-byte word `i` of the log data
    Data(usize),
}

fn default_factory_category() -> String {
    "DEX Pool".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub protocol: String,
    pub address: Address,
    pub event_topic: B256,
    /// Canonical event signature; when given it must hash to `event_topic`
    #[serde(default)]
    pub event_signature: Option<String>,
    pub child_slot: ChildSlot,
    pub deployment_block: u64,
    #[serde(default = "default_factory_category")]
    pub category: String,
}

impl FactoryConfig {
    pub fn validate(&self) -> Result<()> {
        let ctx = format!("factory {} ({})", self.protocol, self.address);
        if self.protocol.trim().is_empty() {
            return Err(EngineError::config(format!("{}: empty protocol", ctx)));
        }
        if self.category.trim().is_empty() {
            return Err(EngineError::config(format!("{}: empty category", ctx)));
        }
        if self.address == Address::ZERO {
            return Err(EngineError::config(format!("{}: zero factory address", ctx)));
        }
        if self.event_topic == B256::ZERO {
            return Err(EngineError::config(format!("{}: zero event topic", ctx)));
        }
        if let Some(sig) = &self.event_signature {
            let hashed = keccak256(sig.as_bytes());
            if hashed != self.event_topic {
                return Err(EngineError::config(format!(
                    "{}: signature '{}' hashes to {} but event_topic is {}",
                    ctx, sig, hashed, self.event_topic
                )));
            }
        }
        match self.child_slot {
            ChildSlot::Topic(0) => Err(EngineError::config(format!(
                "{}: topic 0 is the event signature, not a child slot",
                ctx
            ))),
            ChildSlot::Topic(i) if i > 3 => Err(EngineError::config(format!(
                "{}: topic index {} out of range (logs carry at most 4 topics)",
                ctx, i
            ))),
            _ => Ok(()),
        }
    }
}

/// A contract users call directly, registered by hand rather than discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreContractConfig {
    pub protocol: String,
    pub address: Address,
    pub name: String,
    #[serde(default)]
    pub contract_type: String,
    pub category: String,
}

impl CoreContractConfig {
    pub fn validate(&self) -> Result<()> {
        if self.protocol.trim().is_empty() || self.category.trim().is_empty() {
            return Err(EngineError::config(format!(
                "core contract {} ({}): protocol and category are required",
                self.name, self.address
            )));
        }
        if self.address == Address::ZERO {
            return Err(EngineError::config(format!(
                "core contract {}: zero address",
                self.name
            )));
        }
        Ok(())
    }

    pub fn to_venue(&self) -> DiscoveredContract {
        DiscoveredContract {
            address: self.address,
            protocol: self.protocol.clone(),
            category: self.category.clone(),
            source_factory: None,
            creation_block: 0,
            creation_tx: None,
            metrics: None,
        }
    }
}

// ── Defaults (Ethereum mainnet) ───────────────────────────────────────

pub fn default_factories() -> Vec<FactoryConfig> {
    vec![
        FactoryConfig {
            protocol: "Uniswap V2".into(),
            address: address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"),
            event_topic: IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            event_signature: Some(IUniswapV2Factory::PairCreated::SIGNATURE.to_string()),
            child_slot: ChildSlot::Data(0),
            deployment_block: 10_000_835,
            category: default_factory_category(),
        },
        FactoryConfig {
            protocol: "Uniswap V3".into(),
            address: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
            event_topic: IUniswapV3Factory::PoolCreated::SIGNATURE_HASH,
            event_signature: Some(IUniswapV3Factory::PoolCreated::SIGNATURE.to_string()),
            child_slot: ChildSlot::Data(1),
            deployment_block: 12_369_621,
            category: default_factory_category(),
        },
        FactoryConfig {
            protocol: "SushiSwap".into(),
            address: address!("C0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac"),
            event_topic: IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            event_signature: Some(IUniswapV2Factory::PairCreated::SIGNATURE.to_string()),
            child_slot: ChildSlot::Data(0),
            deployment_block: 10_794_229,
            category: default_factory_category(),
        },
        FactoryConfig {
            protocol: "Balancer V2".into(),
            address: address!("BA12222222228d8Ba445958a75a0704d566BF2C8"),
            event_topic: IBalancerVault::PoolRegistered::SIGNATURE_HASH,
            event_signature: Some(IBalancerVault::PoolRegistered::SIGNATURE.to_string()),
            child_slot: ChildSlot::Topic(2),
            deployment_block: 12_272_146,
            category: default_factory_category(),
        },
    ]
}

fn core(protocol: &str, address: Address, name: &str, contract_type: &str, category: &str) -> CoreContractConfig {
    CoreContractConfig {
        protocol: protocol.into(),
        address,
        name: name.into(),
        contract_type: contract_type.into(),
        category: category.into(),
    }
}

pub fn default_core_contracts() -> Vec<CoreContractConfig> {
    vec![
        core("Uniswap V2", address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"), "UniswapV2Router02", "Router", "DEX"),
        core("Uniswap V3", address!("E592427A0AEce92De3Edee1F18E0157C05861564"), "SwapRouter", "Router", "DEX"),
        core("Uniswap", address!("Ef1c6E67703c7BD7107eed8303Fbe6EC2554BF6B"), "UniversalRouter", "Universal Router", "DEX"),
        core("SushiSwap", address!("d9e1cE17f2641f24aE83637ab66a2cca9C378B9F"), "SushiSwapRouter", "Router", "DEX"),
        core("Aave V3", address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"), "Aave V3 Pool", "Pool", "Lending"),
        core("Aave V2", address!("7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9"), "Aave V2 LendingPool", "Pool", "Lending"),
        core("Compound V3", address!("c3d688B66703497DAA19211EEdff47f25384cdc3"), "Compound V3 USDC Comet", "Comet", "Lending"),
        core("Lido", address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"), "Lido stETH", "Token", "Liquid Staking"),
        core("Rocket Pool", address!("DD3f50F8A6CafbE9b31a427582963f465E745AF8"), "Rocket Pool Deposit Pool", "Deposit Pool", "Liquid Staking"),
        core("OpenSea", address!("0000000000000068F116a894984e2DB1123eB395"), "Seaport 1.6", "Marketplace", "NFT Marketplace"),
    ]
}

// ── Registry ──────────────────────────────────────────────────────────

/// Validated factory and core-contract tables.
#[derive(Debug, Clone)]
pub struct FactoryRegistry {
    factories: Vec<FactoryConfig>,
    core_contracts: Vec<CoreContractConfig>,
}

/// Per-protocol rollup used by `protocol_summary`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolSummary {
    pub factory_count: usize,
    pub core_contract_count: usize,
    pub categories: BTreeSet<String>,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Serialize)]
struct ContractListExport<'a> {
    metadata: ContractListMetadata,
    factories: &'a [FactoryConfig],
    contracts: &'a [CoreContractConfig],
}

#[derive(Debug, Serialize)]
struct ContractListMetadata {
    exported_at: String,
    total_factories: usize,
    total_contracts: usize,
    protocols: Vec<String>,
    categories: Vec<String>,
}

impl FactoryRegistry {
    /// Validate and build. Empty tables fall back to the mainnet defaults.
    pub fn new(factories: Vec<FactoryConfig>, core_contracts: Vec<CoreContractConfig>) -> Result<Self> {
        let factories = if factories.is_empty() { default_factories() } else { factories };
        let core_contracts = if core_contracts.is_empty() {
            default_core_contracts()
        } else {
            core_contracts
        };

        let mut seen_factories = HashSet::new();
        for f in &factories {
            f.validate()?;
            if !seen_factories.insert((f.address, f.event_topic)) {
                return Err(EngineError::config(format!(
                    "duplicate factory entry {} / {}",
                    f.address, f.event_topic
                )));
            }
        }

        let mut seen_core = HashSet::new();
        for c in &core_contracts {
            c.validate()?;
            if !seen_core.insert(c.address) {
                return Err(EngineError::config(format!(
                    "core contract {} registered twice",
                    c.address
                )));
            }
        }

        info!(
            "Factory registry: {} factories, {} core contracts",
            factories.len(),
            core_contracts.len()
        );
        Ok(Self { factories, core_contracts })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn factories(&self) -> &[FactoryConfig] {
        &self.factories
    }

    pub fn core_contracts(&self) -> &[CoreContractConfig] {
        &self.core_contracts
    }

    /// Core contracts as pinned venues
    pub fn core_venues(&self) -> Vec<DiscoveredContract> {
        self.core_contracts.iter().map(CoreContractConfig::to_venue).collect()
    }

    pub fn protocols(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .factories
            .iter()
            .map(|f| f.protocol.clone())
            .chain(self.core_contracts.iter().map(|c| c.protocol.clone()))
            .collect();
        set.into_iter().collect()
    }

    pub fn categories(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .factories
            .iter()
            .map(|f| f.category.clone())
            .chain(self.core_contracts.iter().map(|c| c.category.clone()))
            .collect();
        set.into_iter().collect()
    }

    pub fn core_contracts_by_protocol(&self, protocol: &str) -> Vec<&CoreContractConfig> {
        self.core_contracts.iter().filter(|c| c.protocol == protocol).collect()
    }

    pub fn core_contracts_by_category(&self, category: &str) -> Vec<&CoreContractConfig> {
        self.core_contracts.iter().filter(|c| c.category == category).collect()
    }

    pub fn protocol_summary(&self) -> BTreeMap<String, ProtocolSummary> {
        let mut summary: BTreeMap<String, ProtocolSummary> = BTreeMap::new();
        let empty = || ProtocolSummary {
            factory_count: 0,
            core_contract_count: 0,
            categories: BTreeSet::new(),
            addresses: Vec::new(),
        };
        for f in &self.factories {
            let entry = summary.entry(f.protocol.clone()).or_insert_with(empty);
            entry.factory_count += 1;
            entry.categories.insert(f.category.clone());
            entry.addresses.push(f.address);
        }
        for c in &self.core_contracts {
            let entry = summary.entry(c.protocol.clone()).or_insert_with(empty);
            entry.core_contract_count += 1;
            entry.categories.insert(c.category.clone());
            entry.addresses.push(c.address);
        }
        summary
    }

    /// Write the tracked factory and core-contract tables as JSON.
    pub fn export_contract_list<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let export = ContractListExport {
            metadata: ContractListMetadata {
                exported_at: Utc::now().to_rfc3339(),
                total_factories: self.factories.len(),
                total_contracts: self.core_contracts.len(),
                protocols: self.protocols(),
                categories: self.categories(),
            },
            factories: &self.factories,
            contracts: &self.core_contracts,
        };
        write_json_atomic(path.as_ref(), &export)?;
        info!(
            "Exported {} factories and {} core contracts to {}",
            self.factories.len(),
            self.core_contracts.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let registry = FactoryRegistry::with_defaults().unwrap();
        assert_eq!(registry.factories().len(), 4);
        assert!(registry.protocols().contains(&"Uniswap V2".to_string()));
        assert!(registry.categories().contains(&"Lending".to_string()));
        assert!(registry.core_venues().iter().all(|v| v.is_pinned()));
    }

    #[test]
    fn test_signature_must_match_topic() {
        let mut f = default_factories().remove(0);
        f.event_signature = Some("PairCreated(address,address,address)".into());
        assert!(matches!(f.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_topic_zero_is_not_a_child_slot() {
        let mut f = default_factories().remove(0);
        f.child_slot = ChildSlot::Topic(0);
        assert!(f.validate().is_err());
        f.child_slot = ChildSlot::Topic(4);
        assert!(f.validate().is_err());
        f.child_slot = ChildSlot::Topic(3);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_duplicate_core_contract_rejected() {
        let c = default_core_contracts().remove(0);
        let res = FactoryRegistry::new(Vec::new(), vec![c.clone(), c]);
        assert!(matches!(res, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_protocol_summary_counts() {
        let registry = FactoryRegistry::with_defaults().unwrap();
        let summary = registry.protocol_summary();
        let v2 = &summary["Uniswap V2"];
        assert_eq!(v2.factory_count, 1);
        assert_eq!(v2.core_contract_count, 1);
        assert_eq!(registry.core_contracts_by_protocol("Aave V3").len(), 1);
        assert_eq!(registry.core_contracts_by_category("Liquid Staking").len(), 2);
    }

    #[test]
    fn test_child_slot_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            factory: Vec<FactoryConfig>,
        }
        let toml_str = r#"
[[factory]]
protocol = "Uniswap V3"
address = "0x1F98431c8aD98523631AE4a59f267346ea31F984"
event_topic = "0x783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118"
child_slot = { data = 1 }
deployment_block = 12369621
"#;
        let parsed: Wrapper = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.factory[0].child_slot, ChildSlot::Data(1));
        assert_eq!(parsed.factory[0].category, "DEX Pool");
        assert!(parsed.factory[0].validate().is_ok());
    }
}
