//! Chunked, sequential push of an IP set to the registry.

use async_trait::async_trait;
use banshare_core::{IpSet, PushResponse, ShareError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::AgentError;

/// A request/response channel that accepts one chunk of IPs.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Submit one chunk.
    async fn push(&self, chunk: &[String]) -> Result<PushResponse, ShareError>;
}

/// Result of pushing one IP set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    /// True when every chunk was accepted.
    pub all_succeeded: bool,
    /// Items of every failed chunk.
    pub failed_items: IpSet,
    /// Chunks attempted.
    pub chunks_sent: usize,
    /// Chunks that failed.
    pub chunks_failed: usize,
    /// Sum of `accepted_count` over successful chunks.
    pub accepted: usize,
    /// Why each failed chunk failed, keyed by 1-based chunk number.
    pub errors: BTreeMap<usize, String>,
}

/// Sends IP sets in fixed-size chunks with a pause between requests.
#[derive(Debug, Clone, Copy)]
pub struct BatchTransfer {
    chunk_size: usize,
    pause: Duration,
}

impl BatchTransfer {
    /// Create a transfer; `chunk_size` must be positive.
    pub fn new(chunk_size: usize, pause: Duration) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(AgentError::Config("chunk_size must be positive".into()));
        }
        Ok(Self { chunk_size, pause })
    }

    /// IPs per request.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Push `items` chunk by chunk, in the order given.
    ///
    /// Every chunk is attempted even after an earlier one failed. A chunk
    /// fails on a transport or status error, a malformed reply, or a reply
    /// carrying an `error` field; all of its items land in `failed_items`.
    #[instrument(skip_all, fields(items = items.len(), chunk_size = self.chunk_size))]
    pub async fn send<C>(&self, items: &[String], channel: &C) -> TransferOutcome
    where
        C: PushChannel + ?Sized,
    {
        let total_chunks = items.len().div_ceil(self.chunk_size);
        let mut outcome = TransferOutcome::default();

        for (index, chunk) in items.chunks(self.chunk_size).enumerate() {
            if index > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let number = index + 1;
            outcome.chunks_sent += 1;
            let result = match channel.push(chunk).await {
                Ok(PushResponse { error: None, accepted_count }) => {
                    info!(
                        chunk = number,
                        total_chunks,
                        size = chunk.len(),
                        accepted = accepted_count,
                        "chunk pushed"
                    );
                    outcome.accepted += accepted_count;
                    Ok(())
                }
                Ok(PushResponse {
                    error: Some(message),
                    ..
                }) => Err(ShareError::Rejected(message)),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                warn!(
                    chunk = number,
                    total_chunks,
                    size = chunk.len(),
                    class = %e.class(),
                    error = %e,
                    "chunk push failed"
                );
                outcome.chunks_failed += 1;
                outcome.failed_items.extend(chunk.iter().cloned());
                outcome.errors.insert(number, e.to_string());
            }
        }

        outcome.all_succeeded = outcome.chunks_failed == 0;
        if !outcome.all_succeeded {
            warn!(
                failed = outcome.failed_items.len(),
                chunks_failed = outcome.chunks_failed,
                "push finished with failures"
            );
        }
        outcome
    }
}
