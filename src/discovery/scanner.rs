//! Log Scanner
//!
//! Purpose:
//!     Pulls historical event logs for a set of emitters over a block range
//!     via eth_getLogs. The range is split into fixed-size chunks queried in
//!     parallel (bounded), each with bounded retry.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Notes:
//!     - A chunk that comes back at the provider's log cap is halved and
//!       re-queried until it fits (down to single blocks)
//!     - A chunk that still fails after retries is recorded in the report and
//!       scanning continues; the caller decides whether partial is acceptable
//!     - Output is sorted by (block_number, log_index)

use crate::chain::{ChainSource, LogQuery, RawLog};
use crate::config::ScannerConfig;
use crate::error::{EngineError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use alloy::primitives::{Address, B256};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Statistics ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub from_block: u64,
    pub to_block: u64,
    pub chunks_total: usize,
    /// Number of times a chunk was halved after hitting the log cap
    pub chunks_split: usize,
    pub logs_found: usize,
    /// Inclusive ranges that failed after all retries
    pub failed_chunks: Vec<(u64, u64)>,
}

impl ScanReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_chunks.is_empty()
    }

    /// Fold another report (e.g. a second factory's scan) into this one.
    pub fn merge(&mut self, other: &ScanReport) {
        self.chunks_total += other.chunks_total;
        self.chunks_split += other.chunks_split;
        self.logs_found += other.logs_found;
        self.failed_chunks.extend_from_slice(&other.failed_chunks);
    }
}

#[derive(Default)]
struct ChunkOutcome {
    logs: Vec<RawLog>,
    failed: Vec<(u64, u64)>,
    splits: usize,
}

// ── Scanner ─────────────────────────────────────────────────────────────

pub struct LogScanner {
    chain: Arc<dyn ChainSource>,
    config: ScannerConfig,
    retry: RetryPolicy,
}

/// Split `[from, to]` into inclusive chunks of at most `size` blocks.
pub fn chunk_ranges(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if from > to || size == 0 {
        return ranges;
    }
    let mut start = from;
    loop {
        let end = start.saturating_add(size - 1).min(to);
        ranges.push((start, end));
        if end >= to {
            break;
        }
        start = end + 1;
    }
    ranges
}

impl LogScanner {
    pub fn new(chain: Arc<dyn ChainSource>, config: ScannerConfig, retry: RetryPolicy) -> Self {
        Self { chain, config, retry }
    }

    /// Fetch every log emitted by `addresses` with topic0 in `topics` over
    /// `[from_block, to_block]`.
    pub async fn scan(
        &self,
        addresses: &[Address],
        topics: &[B256],
        from_block: u64,
        to_block: u64,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RawLog>, ScanReport)> {
        let mut report = ScanReport {
            from_block,
            to_block,
            ..Default::default()
        };
        let ranges = chunk_ranges(from_block, to_block, self.config.chunk_size);
        if ranges.is_empty() {
            return Ok((Vec::new(), report));
        }
        report.chunks_total = ranges.len();

        let total_blocks = to_block - from_block + 1;
        let start_time = Instant::now();
        info!(
            "Scanning blocks {}-{} ({} blocks, {} chunks of {})",
            from_block,
            to_block,
            total_blocks,
            ranges.len(),
            self.config.chunk_size
        );

        let mut outcomes = stream::iter(ranges)
            .map(|(a, b)| self.scan_chunk(addresses, topics, a, b, cancel))
            .buffer_unordered(self.config.concurrency.max(1));

        let mut logs = Vec::new();
        let mut blocks_done: u64 = 0;
        while let Some(outcome) = outcomes.next().await {
            let (range, outcome) = outcome?;
            blocks_done += range.1 - range.0 + 1;
            report.chunks_split += outcome.splits;
            report.failed_chunks.extend(outcome.failed);
            debug!(
                "{:5.1}% | blocks {}-{} | {} logs | {}s elapsed",
                blocks_done as f64 / total_blocks as f64 * 100.0,
                range.0,
                range.1,
                outcome.logs.len(),
                start_time.elapsed().as_secs()
            );
            logs.extend(outcome.logs);
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        logs.sort_by_key(|l| (l.block_number, l.log_index));
        report.failed_chunks.sort_unstable();
        report.logs_found = logs.len();

        if report.is_partial() {
            warn!(
                "Scan {}-{} is partial: {} chunk(s) failed after retries",
                from_block,
                to_block,
                report.failed_chunks.len()
            );
        }
        info!(
            "Scan complete: {} logs, {} chunks, {} splits, {} failed ({:.1}s)",
            report.logs_found,
            report.chunks_total,
            report.chunks_split,
            report.failed_chunks.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok((logs, report))
    }

    /// Query one chunk, halving it whenever the provider's log cap is hit.
    async fn scan_chunk(
        &self,
        addresses: &[Address],
        topics: &[B256],
        from: u64,
        to: u64,
        cancel: &CancellationToken,
    ) -> Result<((u64, u64), ChunkOutcome)> {
        let mut outcome = ChunkOutcome::default();
        // Stack of pending sub-ranges, lowest range on top
        let mut pending = vec![(from, to)];

        while let Some((a, b)) = pending.pop() {
            let query = LogQuery {
                from_block: a,
                to_block: b,
                addresses: addresses.to_vec(),
                topic0: topics.to_vec(),
            };
            let label = format!("logs {}-{}", a, b);
            let fetched = retry_with_backoff(&self.retry, cancel, &label, |_| {
                self.chain.logs(&query)
            })
            .await;

            match fetched {
                Ok(logs) if logs.len() >= self.config.max_logs_per_query && b > a => {
                    let mid = a + (b - a) / 2;
                    warn!(
                        "Hit log limit ({}) for blocks {}-{}; splitting at {}",
                        self.config.max_logs_per_query, a, b, mid
                    );
                    outcome.splits += 1;
                    pending.push((mid + 1, b));
                    pending.push((a, mid));
                }
                Ok(logs) => {
                    if logs.len() >= self.config.max_logs_per_query {
                        warn!(
                            "Block {} alone returns {} logs (limit {}); results may be truncated",
                            a,
                            logs.len(),
                            self.config.max_logs_per_query
                        );
                    }
                    outcome.logs.extend(logs);
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!("Failed to fetch logs for blocks {}-{}: {}", a, b, e);
                    outcome.failed.push((a, b));
                }
            }
        }
        Ok(((from, to), outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{log, MockChain};
    use std::sync::atomic::Ordering;
    use tokio::time::Duration;

    const TOPIC: B256 = B256::repeat_byte(0xaa);

    fn emitter() -> Address {
        Address::repeat_byte(0x01)
    }

    fn scanner(chain: MockChain, chunk_size: u64, max_logs: usize) -> LogScanner {
        let config = ScannerConfig {
            chunk_size,
            max_logs_per_query: max_logs,
            concurrency: 3,
            ..Default::default()
        };
        LogScanner::new(Arc::new(chain), config, RetryPolicy::new(2, Duration::from_millis(1)))
    }

    fn chain_with_logs(blocks: &[u64]) -> MockChain {
        let mut chain = MockChain::new(1_000);
        for (i, &b) in blocks.iter().enumerate() {
            chain.logs.push(log(emitter(), vec![TOPIC], vec![], b, i as u64));
        }
        chain
    }

    #[test]
    fn test_chunk_ranges() {
        assert_eq!(chunk_ranges(0, 9, 4), vec![(0, 3), (4, 7), (8, 9)]);
        assert_eq!(chunk_ranges(5, 5, 100), vec![(5, 5)]);
        assert!(chunk_ranges(10, 9, 4).is_empty());
    }

    #[tokio::test]
    async fn test_scan_collects_sorted_logs() {
        let chain = chain_with_logs(&[95, 3, 50, 12, 50]);
        let s = scanner(chain, 10, 10_000);
        let (logs, report) = s
            .scan(&[emitter()], &[TOPIC], 0, 99, &CancellationToken::new())
            .await
            .unwrap();

        let blocks: Vec<u64> = logs.iter().map(|l| l.block_number).collect();
        assert_eq!(blocks, vec![3, 12, 50, 50, 95]);
        assert_eq!(report.chunks_total, 10);
        assert_eq!(report.logs_found, 5);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_failed_chunk_is_reported_not_fatal() {
        let mut chain = chain_with_logs(&[5, 15, 25]);
        chain.failing_log_blocks.insert(15);
        let s = scanner(chain, 10, 10_000);
        let (logs, report) = s
            .scan(&[emitter()], &[TOPIC], 0, 29, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(logs.len(), 2);
        assert!(report.is_partial());
        assert_eq!(report.failed_chunks, vec![(10, 19)]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let chain = chain_with_logs(&[5]);
        chain.transient_log_failures.store(1, Ordering::SeqCst);
        let s = scanner(chain, 100, 10_000);
        let (logs, report) = s
            .scan(&[emitter()], &[TOPIC], 0, 9, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_log_cap_splits_chunk() {
        // 4 logs in one 8-block chunk with a cap of 3 forces a split
        let chain = chain_with_logs(&[0, 1, 6, 7]);
        let s = scanner(chain, 8, 3);
        let (logs, report) = s
            .scan(&[emitter()], &[TOPIC], 0, 7, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(logs.len(), 4);
        assert!(report.chunks_split >= 1);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_cancelled_scan_returns_cancelled() {
        let chain = chain_with_logs(&[1]);
        let s = scanner(chain, 10, 10_000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = s.scan(&[emitter()], &[TOPIC], 0, 9, &cancel).await;
        assert!(matches!(res, Err(EngineError::Cancelled)));
    }
}
