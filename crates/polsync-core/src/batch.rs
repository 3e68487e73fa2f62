// ── Batch execution ──
//
// Splits an ordered operation list into physical requests no larger than
// `max_batch_size`, submits them one after another, and maps every
// operation to exactly one result.

use std::time::Instant;

use polsync_api::Location;
use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use crate::config::BatchMode;
use crate::error::CoreError;
use crate::model::{Attributes, ObjectKind, ObjectRef};
use crate::session::DeviceSession;

// ── Operations and results ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Create,
    Update,
    Delete,
}

/// One create/update/delete in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOperation {
    /// Unique within a step; defines submission order.
    pub sequence_id: u32,
    pub verb: Verb,
    pub object: ObjectRef,
    /// Full attribute bag for creates and updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Attributes>,
    /// Device identifier of the object being updated or deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchOutcome {
    Ok,
    Failed,
    /// Never applied: rolled back with its batch, or after a failure.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub sequence_id: u32,
    pub outcome: BatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifier the device assigned to a created object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl BatchResult {
    pub fn ok(sequence_id: u32, device_id: Option<String>) -> Self {
        Self {
            sequence_id,
            outcome: BatchOutcome::Ok,
            error: None,
            device_id,
        }
    }

    pub fn failed(sequence_id: u32, error: impl Into<String>) -> Self {
        Self {
            sequence_id,
            outcome: BatchOutcome::Failed,
            error: Some(error.into()),
            device_id: None,
        }
    }

    pub fn not_attempted(sequence_id: u32) -> Self {
        Self {
            sequence_id,
            outcome: BatchOutcome::NotAttempted,
            error: None,
            device_id: None,
        }
    }
}

/// Results of one step, aligned with its operations.
#[derive(Debug)]
pub struct StepOutcome {
    pub results: Vec<BatchResult>,
    /// A failure that ended the step without per-operation detail
    /// (connectivity, authentication). The run must not continue.
    pub fatal: Option<CoreError>,
}

impl StepOutcome {
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == BatchOutcome::Failed)
            .count()
    }

    /// First failure message, for summaries.
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| r.error.as_deref())
    }
}

// ── Executor ─────────────────────────────────────────────────────────

/// Submits steps for one container. Holds the "first request of the run"
/// state used by `strict_first_batch`.
pub struct BatchExecutor<'a, S> {
    session: &'a S,
    container: Location,
    max_batch_size: usize,
    mode: BatchMode,
    strict_first_batch: bool,
    submitted: usize,
}

impl<'a, S: DeviceSession> BatchExecutor<'a, S> {
    pub fn new(
        session: &'a S,
        container: Location,
        max_batch_size: usize,
        mode: BatchMode,
        strict_first_batch: bool,
    ) -> Self {
        Self {
            session,
            container,
            max_batch_size: max_batch_size.max(1),
            mode,
            strict_first_batch,
            submitted: 0,
        }
    }

    /// Physical requests sent so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    fn next_is_atomic(&self) -> bool {
        self.mode == BatchMode::Atomic || (self.strict_first_batch && self.submitted == 0)
    }

    /// Execute one step.
    ///
    /// With `stop_on_failure` set, physical requests after the first one
    /// that reports a failed operation are not sent; their operations come
    /// back `NotAttempted`. Partial failure never triggers a retry.
    pub async fn execute(
        &mut self,
        kind: ObjectKind,
        operations: &[BatchOperation],
        stop_on_failure: bool,
    ) -> StepOutcome {
        let mut results = Vec::with_capacity(operations.len());
        let mut halted = false;
        let mut fatal = None;

        for chunk in operations.chunks(self.max_batch_size) {
            if halted {
                results.extend(chunk.iter().map(|op| BatchResult::not_attempted(op.sequence_id)));
                continue;
            }

            let atomic = self.next_is_atomic();
            debug!(%kind, ops = chunk.len(), atomic, "submitting batch");
            let started = Instant::now();
            let submitted = self.session.submit_batch(&self.container, chunk, atomic).await;
            self.submitted += 1;
            let elapsed = started.elapsed();

            match submitted {
                Ok(chunk_results) => {
                    let chunk_results = align(chunk, chunk_results);
                    let failed = chunk_results
                        .iter()
                        .filter(|r| r.outcome == BatchOutcome::Failed)
                        .count();
                    log_batch(kind, chunk.len(), failed, elapsed);
                    results.extend(chunk_results);
                    if failed > 0 && stop_on_failure {
                        halted = true;
                    }
                }
                Err(err) => {
                    warn!(%kind, ops = chunk.len(), error = %err, "batch request failed");
                    let detail = format!("outcome unknown: {err}");
                    results.extend(
                        chunk
                            .iter()
                            .map(|op| BatchResult::failed(op.sequence_id, detail.clone())),
                    );
                    fatal = Some(err);
                    halted = true;
                }
            }
        }

        StepOutcome { results, fatal }
    }
}

/// Match results to operations by sequence id; anything the device did not
/// mention was not attempted.
fn align(chunk: &[BatchOperation], mut results: Vec<BatchResult>) -> Vec<BatchResult> {
    chunk
        .iter()
        .map(|op| {
            results
                .iter()
                .position(|r| r.sequence_id == op.sequence_id)
                .map_or_else(
                    || BatchResult::not_attempted(op.sequence_id),
                    |i| results.swap_remove(i),
                )
        })
        .collect()
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn log_batch(kind: ObjectKind, ops: usize, failed: usize, elapsed: std::time::Duration) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let avg_ms = if ops == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() * 1000.0 / ops as f64
    };
    if failed == 0 {
        info!(%kind, ops, elapsed_ms, avg_ms, "batch applied");
    } else {
        warn!(%kind, ops, failed, elapsed_ms, avg_ms, "batch reported failures");
    }
}
