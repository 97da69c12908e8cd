//! Behavioral profiling: per-address counters, tag rules, scores, and the
//! store that holds them.

pub mod engine;
pub mod export;
pub mod model;
pub mod rules;
pub mod store;

pub use engine::{ActionKey, ApplyOutcome, ProfileEngine, ReplayPolicy};
pub use export::{load_profiles, save_profiles, ProfileRecord, ProfileSnapshot};
pub use model::{CategoryTag, UserProfile};
pub use rules::{risk_score, sophistication_score, Condition, RuleSet, TagRule};
pub use store::{InMemoryProfileStore, ProfileStore};
