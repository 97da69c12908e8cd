//! Logging Setup
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// A bare level ("debug") gets quieter defaults for the HTTP stack; a full
/// directive string ("info,venue_profiler::decoder=trace") is used as-is.
/// `RUST_LOG` wins over both when set.
pub fn init_tracing(log_level: &str, json_format: bool) {
    let normalized = log_level.trim();
    let filter_spec = if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else {
        format!(
            "{},h2=info,hyper=info,hyper_util=info,reqwest=info,alloy_transport_http=info",
            normalized
        )
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&filter_spec))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    // try_init: tests and embedders may have installed a subscriber already
    if json_format {
        let json_layer = fmt::layer().json().with_target(true).with_current_span(false);
        let _ = subscriber.with(json_layer).try_init();
    } else {
        let fmt_layer = fmt::layer().with_target(false).compact();
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::debug!(
        "Logging initialized (filter: {}, format: {})",
        filter_spec,
        if json_format { "json" } else { "compact" }
    );
}
