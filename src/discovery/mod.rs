//! Venue discovery: factory log scanning (with pair-list enumeration as a
//! fallback), venue extraction, volume enrichment and coverage filtering
//! into a `VenueUniverse`, plus the summary and CSV outputs.

pub mod coverage;
pub mod enrichment;
pub mod enumeration;
pub mod extractor;
pub mod providers;
pub mod runner;
pub mod scanner;
pub mod summary;
pub mod universe;

pub use coverage::{select_coverage, CoverageReport};
pub use enrichment::{enrich_venues, EnrichmentReport, FallbackChain};
pub use enumeration::{enumerate_pairs, supports_enumeration, EnumerationReport};
pub use extractor::{extract_child, ExtractReport, VenueExtractor};
pub use providers::{build_providers, ProviderOutcome, VolumeProvider, VolumeQuote};
pub use runner::{spawn_universe_refresh, DiscoveryReport, DiscoveryRunner};
pub use scanner::{chunk_ranges, LogScanner, ScanReport};
pub use summary::{save_discovery_outputs, venues_csv, DiscoverySummary};
pub use universe::{UniverseHandle, UniverseMetadata, VenueRecord, VenueUniverse};
