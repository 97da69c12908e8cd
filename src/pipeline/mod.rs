//! Block Pipeline
//!
//! Purpose:
//!     Drive blocks through decode and into the profile engine, either over a
//!     fixed historical range or by following the chain head.
//!
//! Author: AI-Generated
//! Created: 2026-10-19
//!
//! Per block:
//!     1. fetch the block with full transactions (retried; exhaustion is fatal)
//!     2. take one universe snapshot for the whole block
//!     3. fetch receipts of tracked transactions in parallel, keeping order
//!     4. decode, then hand the block's actions to the single profile writer
//!
//! Notes:
//!     - Cancellation stops at a block boundary; the summary reports it and
//!       everything already handed to the writer is applied.
//!     - A receipt that cannot be fetched is counted and the transaction is
//!       skipped; without its status a reverted call cannot be told apart.

use crate::chain::{ChainSource, RawReceipt, RawTransaction};
use crate::config::PipelineConfig;
use crate::decoder::{BlockContext, DecodeOutcome, TransactionDecoder};
use crate::discovery::UniverseHandle;
use crate::error::{EngineError, Result};
use crate::profile::{ApplyOutcome, ProfileEngine};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::DecodedAction;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub blocks_processed: u64,
    pub transactions_seen: u64,
    pub tracked_transactions: u64,
    pub actions_decoded: u64,
    pub actions_applied: u64,
    pub duplicates_skipped: u64,
    pub failed_transactions: u64,
    pub malformed_transactions: u64,
    pub unrecognized_transactions: u64,
    pub missing_receipts: u64,
    pub tags_assigned: u64,
    pub last_block: Option<u64>,
    pub cancelled: bool,
}

impl RunSummary {
    fn absorb_block(&mut self, stats: &BlockStats) {
        self.blocks_processed += 1;
        self.transactions_seen += stats.transactions;
        self.tracked_transactions += stats.tracked;
        self.actions_decoded += stats.actions;
        self.failed_transactions += stats.failed;
        self.malformed_transactions += stats.malformed;
        self.unrecognized_transactions += stats.unrecognized;
        self.missing_receipts += stats.missing_receipts;
        self.last_block = Some(stats.number);
    }

    fn absorb_writer(&mut self, stats: &WriterStats) {
        self.actions_applied += stats.applied;
        self.duplicates_skipped += stats.duplicates;
        self.tags_assigned += stats.tags_assigned;
    }

    pub fn log_summary(&self, elapsed: Duration) {
        info!("Pipeline run complete in {:.1}s", elapsed.as_secs_f64());
        info!("  Blocks processed:   {}", self.blocks_processed);
        info!("  Last block:         {:?}", self.last_block);
        info!("  Transactions:       {} ({} tracked)", self.transactions_seen, self.tracked_transactions);
        info!("  Actions decoded:    {}", self.actions_decoded);
        info!("  Actions applied:    {} ({} duplicates skipped)", self.actions_applied, self.duplicates_skipped);
        info!("  Tags assigned:      {}", self.tags_assigned);
        info!(
            "  Skipped txs:        {} failed, {} malformed, {} unrecognized",
            self.failed_transactions, self.malformed_transactions, self.unrecognized_transactions
        );
        if self.missing_receipts > 0 {
            warn!("  Missing receipts:   {}", self.missing_receipts);
        }
        if self.cancelled {
            warn!("  Run was cancelled before reaching its end block");
        }
    }
}

#[derive(Debug, Default)]
struct BlockStats {
    number: u64,
    transactions: u64,
    tracked: u64,
    actions: u64,
    failed: u64,
    malformed: u64,
    unrecognized: u64,
    missing_receipts: u64,
}

/// One block's actions, in transaction order
#[derive(Debug)]
struct BlockBatch {
    number: u64,
    actions: Vec<DecodedAction>,
}

// ── Profile writer ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct WriterStats {
    applied: u64,
    duplicates: u64,
    tags_assigned: u64,
}

/// The only task that mutates profiles. Exits when every sender is dropped.
fn spawn_writer(engine: Arc<ProfileEngine>, mut rx: mpsc::Receiver<BlockBatch>) -> JoinHandle<WriterStats> {
    tokio::spawn(async move {
        let mut stats = WriterStats::default();
        while let Some(batch) = rx.recv().await {
            for action in &batch.actions {
                match engine.apply(action) {
                    ApplyOutcome::Applied { new_tags } => {
                        stats.applied += 1;
                        stats.tags_assigned += new_tags.len() as u64;
                    }
                    ApplyOutcome::Duplicate => stats.duplicates += 1,
                }
            }
            debug!("Applied {} actions from block {}", batch.actions.len(), batch.number);
        }
        stats
    })
}

async fn join_writer(writer: JoinHandle<WriterStats>) -> WriterStats {
    match writer.await {
        Ok(stats) => stats,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!("Profile writer did not finish: {}", e);
            WriterStats::default()
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────

pub struct Pipeline {
    chain: Arc<dyn ChainSource>,
    universe: UniverseHandle,
    decoder: Arc<TransactionDecoder>,
    engine: Arc<ProfileEngine>,
    config: PipelineConfig,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        universe: UniverseHandle,
        decoder: Arc<TransactionDecoder>,
        engine: Arc<ProfileEngine>,
        config: PipelineConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            chain,
            universe,
            decoder,
            engine,
            config,
            retry,
        }
    }

    pub fn engine(&self) -> &Arc<ProfileEngine> {
        &self.engine
    }

    /// Process `start..=end`, then return.
    pub async fn run_historical(&self, start: u64, end: u64, cancel: &CancellationToken) -> Result<RunSummary> {
        if start > end {
            return Err(EngineError::config(format!(
                "start block {} is after end block {}",
                start, end
            )));
        }
        info!("Backfilling blocks {} - {} ({} blocks)", start, end, end - start + 1);

        let started = Instant::now();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let writer = spawn_writer(self.engine.clone(), rx);

        let mut summary = RunSummary::default();
        let mut result = Ok(());
        for number in start..=end {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.process_block(number, &tx, cancel).await {
                Ok(stats) => summary.absorb_block(&stats),
                Err(EngineError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            if (number - start + 1) % 1_000 == 0 {
                info!("Backfill progress: block {} / {}", number, end);
            }
        }

        drop(tx);
        summary.absorb_writer(&join_writer(writer).await);
        summary.log_summary(started.elapsed());
        result.map(|_| summary)
    }

    /// Follow the head, processing each block once it has `confirmations`
    /// blocks on top. Runs until cancelled. Without `start`, begins at the
    /// first confirmed block.
    pub async fn run_live(&self, start: Option<u64>, cancel: &CancellationToken) -> Result<RunSummary> {
        let confirmations = self.config.confirmations;
        let mut next = match start {
            Some(n) => n,
            None => self.confirmed_head(cancel).await?,
        };
        info!(
            "Tailing from block {} ({} confirmations, poll every {}ms)",
            next, confirmations, self.config.poll_interval_ms
        );

        let started = Instant::now();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let writer = spawn_writer(self.engine.clone(), rx);

        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = RunSummary::default();
        let result: Result<()> = 'outer: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            let safe_head = match self.confirmed_head(cancel).await {
                Ok(h) => h,
                Err(EngineError::Cancelled) => break Ok(()),
                Err(e) => break Err(e),
            };
            while next <= safe_head {
                if cancel.is_cancelled() {
                    break 'outer Ok(());
                }
                match self.process_block(next, &tx, cancel).await {
                    Ok(stats) => summary.absorb_block(&stats),
                    Err(EngineError::Cancelled) => break 'outer Ok(()),
                    Err(e) => break 'outer Err(e),
                }
                next += 1;
            }
        };
        summary.cancelled = cancel.is_cancelled();

        drop(tx);
        summary.absorb_writer(&join_writer(writer).await);
        summary.log_summary(started.elapsed());
        result.map(|_| summary)
    }

    async fn confirmed_head(&self, cancel: &CancellationToken) -> Result<u64> {
        let head = retry_with_backoff(&self.retry, cancel, "eth_blockNumber", |_| self.chain.block_number()).await?;
        Ok(head.saturating_sub(self.config.confirmations))
    }

    async fn process_block(
        &self,
        number: u64,
        sink: &mpsc::Sender<BlockBatch>,
        cancel: &CancellationToken,
    ) -> Result<BlockStats> {
        let label = format!("block {}", number);
        let block = retry_with_backoff(&self.retry, cancel, &label, move |_| async move {
            self.chain
                .block_with_transactions(number)
                .await?
                .ok_or_else(|| EngineError::Network(format!("block {} not available yet", number)))
        })
        .await?;

        // One snapshot per block; a refresh mid-block lands on the next one
        let universe = self.universe.current();
        let ctx = BlockContext {
            number: block.number,
            timestamp: block.timestamp,
        };

        let tracked: Vec<&RawTransaction> = block
            .transactions
            .iter()
            .filter(|t| t.to.is_some_and(|to| universe.contains(&to)))
            .collect();

        let mut stats = BlockStats {
            number,
            transactions: block.transactions.len() as u64,
            tracked: tracked.len() as u64,
            ..Default::default()
        };

        let receipts: Vec<(&RawTransaction, Result<Option<RawReceipt>>)> = stream::iter(tracked)
            .map(|t| async move {
                let label = format!("receipt {}", t.hash);
                let receipt = retry_with_backoff(&self.retry, cancel, &label, |_| self.chain.receipt(t.hash)).await;
                (t, receipt)
            })
            .buffered(self.config.decode_concurrency.max(1))
            .boxed()
            .collect()
            .await;

        let mut actions = Vec::new();
        for (t, receipt) in receipts {
            let receipt = match receipt {
                Ok(Some(r)) => r,
                Ok(None) => {
                    warn!("No receipt for {}, skipping", t.hash);
                    stats.missing_receipts += 1;
                    continue;
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!("Receipt for {} unavailable, skipping: {}", t.hash, e);
                    stats.missing_receipts += 1;
                    continue;
                }
            };
            match self.decoder.decode(t, &receipt, ctx, &universe) {
                DecodeOutcome::Actions(decoded) => actions.extend(decoded),
                DecodeOutcome::Failed => stats.failed += 1,
                DecodeOutcome::Malformed(reason) => {
                    debug!("Malformed tx {}: {}", t.hash, reason);
                    stats.malformed += 1;
                }
                DecodeOutcome::Unrecognized => stats.unrecognized += 1,
                DecodeOutcome::Untracked => {}
            }
        }
        stats.actions = actions.len() as u64;

        if !actions.is_empty() {
            debug!("Block {}: {} actions from {} tracked txs", number, stats.actions, stats.tracked);
        }
        sink.send(BlockBatch { number, actions })
            .await
            .map_err(|_| EngineError::Cancelled)?;
        Ok(stats)
    }
}
