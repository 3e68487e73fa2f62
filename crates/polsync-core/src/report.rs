// ── Deployment report ──
//
// The one artifact that outlives a run: per-kind counts, every failure
// with its detail, identifiers of created objects, and which phases ran.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::batch::{BatchOperation, BatchOutcome, BatchResult, Verb};
use crate::delta::Dangling;
use crate::error::CoreError;
use crate::model::{DeploymentScope, ObjectKind, ObjectRef};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub not_attempted: usize,
    /// Operations never submitted because their kind was skipped.
    pub skipped: usize,
}

impl KindCounts {
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub object: ObjectRef,
    pub verb: Verb,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntry {
    pub object: ObjectRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "kind", rename_all = "kebab-case")]
pub enum Phase {
    AcquireLocks,
    Discover,
    Plan,
    Upsert(ObjectKind),
    Delete(ObjectKind),
    ReleaseLocks,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcquireLocks => f.write_str("acquire-locks"),
            Self::Discover => f.write_str("discover"),
            Self::Plan => f.write_str("plan"),
            Self::Upsert(kind) => write!(f, "upsert {kind}"),
            Self::Delete(kind) => write!(f, "delete {kind}"),
            Self::ReleaseLocks => f.write_str("release-locks"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Completed,
    Failed,
    /// Not run because something it depends on failed.
    Skipped,
    /// Not run because the run was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    #[serde(flatten)]
    pub phase: Phase,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Everything planned was applied.
    #[default]
    Success,
    /// Some operations failed or were withheld; the rest were applied.
    PartialFailure,
    /// A fatal error stopped the run.
    Aborted,
    Cancelled,
}

/// Structured summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub run_id: Uuid,
    pub scope: DeploymentScope,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: RunOutcome,
    pub per_kind: BTreeMap<ObjectKind, KindCounts>,
    pub failures: Vec<FailureEntry>,
    pub dangling: Vec<Dangling>,
    /// Objects created by this run, in creation order. Kept even when the
    /// run fails later, for rollback.
    pub created: Vec<CreatedEntry>,
    pub phases: Vec<PhaseRecord>,
}

impl DeploymentReport {
    pub fn new(run_id: Uuid, scope: DeploymentScope) -> Self {
        Self {
            run_id,
            scope,
            started_at: Utc::now(),
            elapsed_ms: 0,
            outcome: RunOutcome::Success,
            per_kind: BTreeMap::new(),
            failures: Vec::new(),
            dangling: Vec::new(),
            created: Vec::new(),
            phases: Vec::new(),
        }
    }

    pub fn record_phase(&mut self, phase: Phase, status: PhaseStatus) {
        self.phases.push(PhaseRecord { phase, status });
    }

    pub fn phase_status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .rev()
            .find(|r| r.phase == phase)
            .map(|r| r.status)
    }

    /// Fold one step's results into the counts. `operations` and `results`
    /// are aligned.
    pub fn record_results(
        &mut self,
        kind: ObjectKind,
        operations: &[BatchOperation],
        results: &[BatchResult],
    ) {
        let counts = self.per_kind.entry(kind).or_default();
        for (op, result) in operations.iter().zip(results) {
            match result.outcome {
                BatchOutcome::Ok => match op.verb {
                    Verb::Create => {
                        counts.created += 1;
                        self.created.push(CreatedEntry {
                            object: op.object.clone(),
                            device_id: result.device_id.clone().or_else(|| op.device_id.clone()),
                        });
                    }
                    Verb::Update => counts.updated += 1,
                    Verb::Delete => counts.deleted += 1,
                },
                BatchOutcome::Failed => {
                    counts.failed += 1;
                    self.failures.push(FailureEntry {
                        object: op.object.clone(),
                        verb: op.verb,
                        error: result
                            .error
                            .clone()
                            .unwrap_or_else(|| "operation failed".into()),
                    });
                }
                BatchOutcome::NotAttempted => counts.not_attempted += 1,
            }
        }
    }

    /// Count a step that was never submitted.
    pub fn record_skipped(&mut self, kind: ObjectKind, operations: usize) {
        self.per_kind.entry(kind).or_default().skipped += operations;
    }

    pub fn totals(&self) -> KindCounts {
        self.per_kind
            .values()
            .fold(KindCounts::default(), |acc, c| KindCounts {
                created: acc.created + c.created,
                updated: acc.updated + c.updated,
                deleted: acc.deleted + c.deleted,
                failed: acc.failed + c.failed,
                not_attempted: acc.not_attempted + c.not_attempted,
                skipped: acc.skipped + c.skipped,
            })
    }

    /// Settle `outcome` from what was recorded. A fatal error or
    /// cancellation, once set, is kept.
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
        if matches!(self.outcome, RunOutcome::Aborted | RunOutcome::Cancelled) {
            return;
        }
        let totals = self.totals();
        if totals.failed + totals.not_attempted + totals.skipped > 0 || !self.dangling.is_empty() {
            self.outcome = RunOutcome::PartialFailure;
        }
    }

    /// Delete operations that undo this run's creates, newest first.
    pub fn rollback_operations(&self) -> Vec<BatchOperation> {
        self.created
            .iter()
            .rev()
            .zip(0u32..)
            .map(|(entry, sequence_id)| BatchOperation {
                sequence_id,
                verb: Verb::Delete,
                object: entry.object.clone(),
                payload: None,
                device_id: entry.device_id.clone(),
            })
            .collect()
    }
}

/// A run that failed after the device was contacted. The report shows
/// exactly what was and was not applied.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct DeploymentError {
    #[source]
    pub source: CoreError,
    pub report: Box<DeploymentReport>,
}

impl DeploymentError {
    pub fn new(source: CoreError, report: DeploymentReport) -> Self {
        Self {
            source,
            report: Box::new(report),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn op(seq: u32, verb: Verb, name: &str) -> BatchOperation {
        BatchOperation {
            sequence_id: seq,
            verb,
            object: ObjectRef::new(ObjectKind::Address, name),
            payload: None,
            device_id: None,
        }
    }

    #[test]
    fn counts_and_failures_are_recorded() {
        let mut report = DeploymentReport::new(Uuid::new_v4(), DeploymentScope::firewall("vsys1"));
        let ops = [
            op(0, Verb::Create, "a"),
            op(1, Verb::Create, "b"),
            op(2, Verb::Create, "c"),
        ];
        let results = [
            BatchResult::ok(0, Some("id-a".into())),
            BatchResult::failed(1, "invalid value"),
            BatchResult::not_attempted(2),
        ];
        report.record_results(ObjectKind::Address, &ops, &results);
        report.finish(12);

        let counts = report.per_kind[&ObjectKind::Address];
        assert_eq!((counts.created, counts.failed, counts.not_attempted), (1, 1, 1));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error, "invalid value");
        assert_eq!(report.outcome, RunOutcome::PartialFailure);
    }

    #[test]
    fn rollback_deletes_newest_first() {
        let mut report = DeploymentReport::new(Uuid::new_v4(), DeploymentScope::firewall("vsys1"));
        let ops = [op(0, Verb::Create, "a"), op(1, Verb::Create, "b")];
        let results = [BatchResult::ok(0, None), BatchResult::ok(1, Some("id-b".into()))];
        report.record_results(ObjectKind::Address, &ops, &results);

        let rollback = report.rollback_operations();
        let names: Vec<_> = rollback.iter().map(|op| op.object.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(rollback.iter().all(|op| op.verb == Verb::Delete));
        assert_eq!(rollback[0].device_id.as_deref(), Some("id-b"));
    }

    #[test]
    fn aborted_outcome_is_kept() {
        let mut report = DeploymentReport::new(Uuid::new_v4(), DeploymentScope::firewall("vsys1"));
        report.outcome = RunOutcome::Aborted;
        report.finish(1);
        assert_eq!(report.outcome, RunOutcome::Aborted);
    }

    #[test]
    fn phases_serialize_with_kind() {
        let record = PhaseRecord {
            phase: Phase::Upsert(ObjectKind::AddressGroup),
            status: PhaseStatus::Completed,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({ "phase": "upsert", "kind": "address-group", "status": "completed" })
        );
    }
}
