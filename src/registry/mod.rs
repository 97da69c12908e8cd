//! Static registries: factory contracts, core contracts and action selectors.

pub mod factories;
pub mod selectors;

pub use factories::{
    default_core_contracts, default_factories, ChildSlot, CoreContractConfig, FactoryConfig,
    FactoryRegistry, ProtocolSummary,
};
pub use selectors::{
    selector_hex, ActionSignature, Selector, SelectorKind, SelectorRegistry, SignatureConfig,
};
