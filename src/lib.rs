//! Venue Profiler Library
//!
//! Discovers the DeFi venues that carry most of a chain's volume, decodes
//! user transactions against them into normalized actions, and folds those
//! actions into per-address behavioral profiles.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

pub mod chain;
pub mod config;
pub mod contracts;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod types;

// Re-export commonly used types
pub use chain::{ChainSource, RpcChainSource};
pub use config::EngineConfig;
pub use decoder::{DecodeOutcome, TransactionDecoder};
pub use discovery::{DiscoveryRunner, UniverseHandle, VenueUniverse};
pub use error::{EngineError, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use profile::{InMemoryProfileStore, ProfileEngine, ProfileStore, UserProfile};
pub use registry::{FactoryRegistry, SelectorRegistry};
pub use types::{ActionType, DecodedAction, DiscoveredContract};
