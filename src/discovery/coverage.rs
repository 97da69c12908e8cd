//! Coverage Filter
//!
//! Selects the smallest set of venues that together account for the target
//! share of trailing volume: sort by volume (descending, ties by address)
//! and take the shortest prefix whose cumulative volume reaches
//! `target * total`.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::config::{validate_coverage_target, CoverageConfig};
use crate::error::Result;
use crate::types::DiscoveredContract;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Relative slack on the target comparison so float summation error cannot
/// push an exact hit one venue further.
const COVERAGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub pools_needed: usize,
    /// Volume of the smallest selected venue
    pub volume_threshold: f64,
    pub actual_coverage: f64,
    pub target_coverage: f64,
    /// Denominator: sum over venues, or the configured override
    pub total_volume: f64,
    pub coverage_volume: f64,
    /// Total volume was zero; every venue was kept
    pub degenerate: bool,
}

/// Volume-descending order, ties broken by ascending address.
pub fn sort_by_volume(venues: &mut [DiscoveredContract]) {
    venues.sort_by(|a, b| {
        b.volume()
            .total_cmp(&a.volume())
            .then_with(|| a.address.cmp(&b.address))
    });
}

pub fn select_coverage(
    mut venues: Vec<DiscoveredContract>,
    config: &CoverageConfig,
) -> Result<(Vec<DiscoveredContract>, CoverageReport)> {
    validate_coverage_target(config.target)?;
    sort_by_volume(&mut venues);

    let discovered: f64 = venues.iter().map(DiscoveredContract::volume).sum();
    let total = config.total_volume_override.unwrap_or(discovered);

    if total <= 0.0 {
        warn!(
            "Total volume over {} venues is zero; keeping all of them",
            venues.len()
        );
        let report = CoverageReport {
            pools_needed: venues.len(),
            volume_threshold: 0.0,
            actual_coverage: 1.0,
            target_coverage: config.target,
            total_volume: 0.0,
            coverage_volume: 0.0,
            degenerate: true,
        };
        return Ok((venues, report));
    }

    if config.total_volume_override.is_some() {
        info!(
            "Using external total volume ${:.2}; discovered venues carry ${:.2} ({:.1}%)",
            total,
            discovered,
            discovered / total * 100.0
        );
    }

    let target_volume = config.target * total;
    let mut cumulative = 0.0;
    let mut needed = venues.len();
    for (i, venue) in venues.iter().enumerate() {
        cumulative += venue.volume();
        if cumulative >= target_volume - COVERAGE_EPSILON * total {
            needed = i + 1;
            break;
        }
    }

    if needed == venues.len() && cumulative < target_volume - COVERAGE_EPSILON * total {
        warn!(
            "Target coverage {:.1}% not reachable; all {} venues give {:.2}%",
            config.target * 100.0,
            venues.len(),
            cumulative / total * 100.0
        );
    }

    venues.truncate(needed);
    let report = CoverageReport {
        pools_needed: needed,
        volume_threshold: venues.last().map(DiscoveredContract::volume).unwrap_or(0.0),
        actual_coverage: cumulative / total,
        target_coverage: config.target,
        total_volume: total,
        coverage_volume: cumulative,
        degenerate: false,
    };
    info!(
        "Coverage: {} venues reach {:.2}% (target {:.1}%), threshold ${:.2}",
        report.pools_needed,
        report.actual_coverage * 100.0,
        report.target_coverage * 100.0,
        report.volume_threshold
    );
    Ok((venues, report))
}
