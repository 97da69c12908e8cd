//! Snapshot Files
//!
//! Shared read/write helpers for the exported artifacts (venue universe,
//! discovery summary, contract list, profile snapshot). Writes go to a temp file first and are
//! renamed into place so readers never observe a half-written file.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Atomically replace `path` with `content`, creating parent directories.
pub fn write_text_atomic<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text_atomic(path, &json)
}

/// `data/summary.json` + `20261019_120000` → `data/summary_20261019_120000.json`
pub fn timestamped_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };
    path.with_file_name(name)
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("venue_profiler_snapshot_{}", std::process::id()));
        let path = dir.join("nested").join("out.json");

        let mut value = BTreeMap::new();
        value.insert("swap".to_string(), 3u64);
        write_json_atomic(&path, &value).unwrap();

        let back: BTreeMap<String, u64> = read_json(&path).unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_timestamped_path_keeps_extension() {
        let stamped = timestamped_path(Path::new("data/discovery_summary.json"), "20261019_120000");
        assert_eq!(stamped, PathBuf::from("data/discovery_summary_20261019_120000.json"));
        let bare = timestamped_path(Path::new("out"), "20261019_120000");
        assert_eq!(bare, PathBuf::from("out_20261019_120000"));
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let res: Result<BTreeMap<String, u64>> = read_json("/nonexistent/venue_profiler.json");
        assert!(matches!(res, Err(crate::error::EngineError::Io(_))));
    }
}
