//! Discovery Summary & CSV Export
//!
//! Purpose:
//!     Human-facing outputs of a discovery pass: a JSON summary (per-protocol
//!     totals, coverage metrics, top venues by volume share) and a flat CSV of
//!     the selected venues.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Notes:
//!     - Each output can also be archived as `<name>_<YYYYmmdd_HHMMSS>.<ext>`
//!       next to the latest copy
//!     - Volume shares are 0 when total volume is 0

use super::runner::DiscoveryReport;
use super::universe::VenueUniverse;
use crate::config::OutputConfig;
use crate::error::Result;
use crate::snapshot::{timestamped_path, write_json_atomic, write_text_atomic};
use crate::types::DiscoveredContract;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Venues listed in the summary's top table
pub const TOP_VENUES: usize = 20;

const CSV_HEADER: &str = "address,protocol,category,token_pair,token0_address,token1_address,\
volume_window_usd,tvl_current_usd,volume_24h_usd,volume_7d_usd,creation_block,source_factory,provider";

// ── Summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub pool_count: usize,
    pub total_volume: f64,
    pub total_tvl: f64,
    pub avg_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopVenue {
    pub rank: usize,
    pub address: String,
    pub protocol: String,
    pub token_pair: Option<String>,
    pub volume: f64,
    /// Percent of the coverage denominator
    pub volume_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub timestamp: String,
    pub processing_time_secs: f64,
    pub target_coverage: f64,
    pub actual_coverage: f64,
    /// actual / target, in percent
    pub efficiency: f64,
    pub total_volume: f64,
    pub coverage_volume: f64,
    pub volume_threshold: f64,
    pub pools_needed: usize,
    pub venues_discovered: usize,
    pub venues_enriched: usize,
    pub venues_enumerated: usize,
    pub pinned_contracts: usize,
    pub partial_scan: bool,
    pub protocols: BTreeMap<String, ProtocolStats>,
    pub top_venues: Vec<TopVenue>,
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

impl DiscoverySummary {
    pub fn build(universe: &VenueUniverse, report: &DiscoveryReport) -> Self {
        let venues = universe.sorted_venues();

        let mut protocols: BTreeMap<String, ProtocolStats> = BTreeMap::new();
        for v in &venues {
            let stats = protocols.entry(v.protocol.clone()).or_default();
            stats.pool_count += 1;
            stats.total_volume += v.volume();
            stats.total_tvl += v.metrics.as_ref().map(|m| m.tvl).unwrap_or(0.0);
        }
        for stats in protocols.values_mut() {
            stats.avg_volume = stats.total_volume / stats.pool_count as f64;
        }

        let total_volume = report.coverage.total_volume;
        let top_venues = venues
            .iter()
            .filter(|v| !v.is_pinned())
            .take(TOP_VENUES)
            .enumerate()
            .map(|(i, v)| TopVenue {
                rank: i + 1,
                address: v.address.to_string(),
                protocol: v.protocol.clone(),
                token_pair: v.token_pair(),
                volume: v.volume(),
                volume_share: percent(v.volume(), total_volume),
            })
            .collect();

        Self {
            timestamp: Utc::now().to_rfc3339(),
            processing_time_secs: report.elapsed.as_secs_f64(),
            target_coverage: report.coverage.target_coverage,
            actual_coverage: report.coverage.actual_coverage,
            efficiency: percent(report.coverage.actual_coverage, report.coverage.target_coverage),
            total_volume,
            coverage_volume: report.coverage.coverage_volume,
            volume_threshold: report.coverage.volume_threshold,
            pools_needed: report.coverage.pools_needed,
            venues_discovered: report.extract.extracted,
            venues_enriched: report.enrichment.enriched,
            venues_enumerated: report.extract.enumerated,
            pinned_contracts: report.pinned,
            partial_scan: report.scan.is_partial(),
            protocols,
            top_venues,
        }
    }

    pub fn log(&self) {
        info!("═══ Discovery summary ═══");
        info!(
            "Coverage: {:.2}% of target {:.2}% ({:.1}% efficiency), {} venues",
            self.actual_coverage * 100.0,
            self.target_coverage * 100.0,
            self.efficiency,
            self.pools_needed
        );
        info!(
            "Discovered {} ({} by enumeration), enriched {}, pinned {} in {:.1}s",
            self.venues_discovered,
            self.venues_enumerated,
            self.venues_enriched,
            self.pinned_contracts,
            self.processing_time_secs
        );
        for (protocol, stats) in &self.protocols {
            info!(
                "  {}: {} venues, ${:.0} volume, ${:.0} TVL",
                protocol, stats.pool_count, stats.total_volume, stats.total_tvl
            );
        }
        for top in self.top_venues.iter().take(5) {
            info!(
                "  #{} {} {} {}: ${:.0} ({:.2}%)",
                top.rank,
                top.protocol,
                top.token_pair.as_deref().unwrap_or("?"),
                top.address,
                top.volume,
                top.volume_share
            );
        }
    }
}

// ── CSV ─────────────────────────────────────────────────────────────────

/// Quote a field containing a comma, quote or newline
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt_to_string<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_row(v: &DiscoveredContract) -> String {
    let m = v.metrics.as_ref();
    let token_address = |t: Option<&crate::types::TokenInfo>| opt_to_string(t.and_then(|t| t.address));
    let fields = vec![
        v.address.to_string(),
        escape_csv_field(&v.protocol),
        escape_csv_field(&v.category),
        escape_csv_field(&v.token_pair().unwrap_or_default()),
        token_address(m.and_then(|m| m.token0.as_ref())),
        token_address(m.and_then(|m| m.token1.as_ref())),
        v.volume().to_string(),
        m.map(|m| m.tvl).unwrap_or(0.0).to_string(),
        opt_to_string(m.and_then(|m| m.volume_24h)),
        opt_to_string(m.and_then(|m| m.volume_7d)),
        v.creation_block.to_string(),
        opt_to_string(v.source_factory),
        escape_csv_field(m.map(|m| m.provider.as_str()).unwrap_or("")),
    ];
    fields.join(",")
}

/// Venues by descending volume, one row each, header first
pub fn venues_csv(universe: &VenueUniverse) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for v in universe.sorted_venues() {
        out.push_str(&csv_row(v));
        out.push('\n');
    }
    out
}

// ── Output ──────────────────────────────────────────────────────────────

/// Write the universe JSON, summary JSON and venue CSV, plus timestamped
/// archive copies when enabled. Returns the summary.
pub fn save_discovery_outputs(
    universe: &VenueUniverse,
    report: &DiscoveryReport,
    output: &OutputConfig,
) -> Result<DiscoverySummary> {
    let summary = DiscoverySummary::build(universe, report);
    let csv = venues_csv(universe);
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();

    universe.export_json(&output.universe_path)?;
    write_json_atomic(&output.summary_path, &summary)?;
    write_text_atomic(&output.venues_csv_path, &csv)?;

    if output.archive_timestamped {
        let export = universe.to_export();
        write_json_atomic(timestamped_path(Path::new(&output.universe_path), &stamp), &export)?;
        write_json_atomic(timestamped_path(Path::new(&output.summary_path), &stamp), &summary)?;
        write_text_atomic(timestamped_path(Path::new(&output.venues_csv_path), &stamp), &csv)?;
        info!("Archived discovery outputs with suffix _{}", stamp);
    }

    info!(
        "Saved discovery summary to {} and {} venues to {}",
        output.summary_path,
        universe.len(),
        output.venues_csv_path
    );
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::coverage::CoverageReport;
    use crate::discovery::enrichment::EnrichmentReport;
    use crate::discovery::extractor::ExtractReport;
    use crate::discovery::scanner::ScanReport;
    use crate::discovery::universe::UniverseMetadata;
    use crate::types::{TokenInfo, VenueMetrics};
    use alloy::primitives::Address;
    use std::time::Duration;

    fn venue(b: u8, protocol: &str, volume: f64) -> DiscoveredContract {
        DiscoveredContract {
            address: Address::repeat_byte(b),
            protocol: protocol.into(),
            category: "DEX Pool".into(),
            source_factory: Some(Address::repeat_byte(0xf0)),
            creation_block: 100 + b as u64,
            creation_tx: None,
            metrics: Some(VenueMetrics {
                volume_window: volume,
                tvl: volume / 10.0,
                token0: Some(TokenInfo {
                    address: Some(Address::repeat_byte(0xa0)),
                    symbol: "WETH".into(),
                    decimals: Some(18),
                }),
                token1: Some(TokenInfo { symbol: "USD,C".into(), ..Default::default() }),
                volume_24h: Some(volume / 180.0),
                volume_7d: None,
                provider: "subgraph".into(),
            }),
        }
    }

    fn pinned() -> DiscoveredContract {
        DiscoveredContract {
            address: Address::repeat_byte(0xaa),
            protocol: "Aave V3".into(),
            category: "Lending".into(),
            source_factory: None,
            creation_block: 0,
            creation_tx: None,
            metrics: None,
        }
    }

    fn fixture(total_volume: f64) -> (VenueUniverse, DiscoveryReport) {
        let venues = vec![
            venue(1, "Uniswap V2", 600.0),
            venue(2, "Uniswap V3", 300.0),
            venue(3, "Uniswap V2", 100.0),
            pinned(),
        ];
        let coverage = CoverageReport {
            pools_needed: 3,
            volume_threshold: 100.0,
            actual_coverage: 0.9,
            target_coverage: 0.9,
            total_volume,
            coverage_volume: 1000.0,
            degenerate: total_volume == 0.0,
        };
        let metadata = UniverseMetadata::from_coverage(&coverage, &venues);
        let report = DiscoveryReport {
            scan: ScanReport::default(),
            extract: ExtractReport { extracted: 3, enumerated: 1, ..Default::default() },
            enrichment: EnrichmentReport { enriched: 3, ..Default::default() },
            coverage,
            pinned: 1,
            enumerations: BTreeMap::new(),
            elapsed: Duration::from_millis(2_500),
        };
        (VenueUniverse::new(venues, metadata), report)
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(escape_csv_field("simple"), "simple");
        assert_eq!(escape_csv_field("has,comma"), "\"has,comma\"");
        assert_eq!(escape_csv_field("has\"quote"), "\"has\"\"quote\"");
    }

    #[test]
    fn test_summary_protocol_totals_and_shares() {
        let (universe, report) = fixture(1000.0);
        let summary = DiscoverySummary::build(&universe, &report);

        let v2 = &summary.protocols["Uniswap V2"];
        assert_eq!(v2.pool_count, 2);
        assert_eq!(v2.total_volume, 700.0);
        assert_eq!(v2.total_tvl, 70.0);
        assert_eq!(v2.avg_volume, 350.0);
        assert_eq!(summary.protocols["Aave V3"].pool_count, 1);

        // Pinned contracts stay out of the top table
        assert_eq!(summary.top_venues.len(), 3);
        assert_eq!(summary.top_venues[0].rank, 1);
        assert_eq!(summary.top_venues[0].address, Address::repeat_byte(1).to_string());
        assert!((summary.top_venues[0].volume_share - 60.0).abs() < 1e-9);
        assert_eq!(summary.top_venues[0].token_pair.as_deref(), Some("WETH/USD,C"));

        assert!((summary.efficiency - 100.0).abs() < 1e-9);
        assert_eq!(summary.processing_time_secs, 2.5);
        assert_eq!(summary.venues_enumerated, 1);
        assert!(!summary.partial_scan);
    }

    #[test]
    fn test_summary_zero_total_has_zero_shares() {
        let (universe, report) = fixture(0.0);
        let summary = DiscoverySummary::build(&universe, &report);
        assert!(summary.top_venues.iter().all(|t| t.volume_share == 0.0));
    }

    #[test]
    fn test_csv_rows_in_volume_order() {
        let (universe, _) = fixture(1000.0);
        let csv = venues_csv(&universe);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[0].split(',').count(), 13);
        assert!(lines[1].starts_with(&Address::repeat_byte(1).to_string()));
        assert!(lines[1].contains("\"WETH/USD,C\""));
        assert!(lines[1].contains(&Address::repeat_byte(0xa0).to_string()));
        // Pinned venue has no metrics: empty provider column
        assert!(lines[4].starts_with(&Address::repeat_byte(0xaa).to_string()));
        assert!(lines[4].ends_with(','));
    }

    #[test]
    fn test_outputs_written_with_archives() {
        let dir = std::env::temp_dir().join(format!("venue_profiler_summary_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let output = OutputConfig {
            universe_path: dir.join("venue_universe.json").display().to_string(),
            summary_path: dir.join("discovery_summary.json").display().to_string(),
            venues_csv_path: dir.join("venue_universe.csv").display().to_string(),
            archive_timestamped: true,
            ..Default::default()
        };
        let (universe, report) = fixture(1000.0);

        let summary = save_discovery_outputs(&universe, &report, &output).unwrap();
        let back: DiscoverySummary = crate::snapshot::read_json(&output.summary_path).unwrap();
        assert_eq!(back.pools_needed, summary.pools_needed);
        assert_eq!(back.protocols.len(), 3);
        assert_eq!(back.top_venues.len(), 3);
        assert!(VenueUniverse::load_json(&output.universe_path).is_ok());

        let files: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 6);
        assert!(files.iter().any(|f| f.starts_with("discovery_summary_") && f.ends_with(".json")));
        assert!(files.iter().any(|f| f.starts_with("venue_universe_") && f.ends_with(".csv")));

        std::fs::remove_dir_all(&dir).ok();
    }
}
