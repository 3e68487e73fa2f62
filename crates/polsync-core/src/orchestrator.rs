// ── Orchestrator ──
//
// Drives one reconciliation run end to end:
//
//   acquire locks → discover → plan → upsert pass → delete pass → release
//
// Every step before the upsert pass is read-only, so local failures
// (cycles, dangling deletions under `DanglingPolicy::Abort`) never leave the
// device partially modified. Atomicity stops at one physical batch request:
// kinds that completed stay committed when a later kind fails.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::batch::BatchExecutor;
use crate::config::{EngineConfig, FailurePolicy};
use crate::delta::compute_deltas;
use crate::desired::DesiredState;
use crate::error::CoreError;
use crate::inspector::{Inspector, LiveState};
use crate::lock::LockManager;
use crate::model::{DeploymentScope, ObjectKind};
use crate::report::{DeploymentError, DeploymentReport, Phase, PhaseStatus, RunOutcome};
use crate::sequencer::{ExecutionPlan, Step, sequence};
use crate::session::DeviceSession;

/// Plan from already-discovered state. Pure.
pub fn plan_changes(
    desired: &DesiredState,
    live: &LiveState,
    config: &EngineConfig,
) -> Result<ExecutionPlan, CoreError> {
    let deltas = compute_deltas(desired, live, config)?;
    sequence(&deltas)
}

/// Why the remaining steps of a pass are not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    /// `FailurePolicy::AbortRun` after a failure in this kind.
    Aborted(ObjectKind),
}

/// Runs reconciliations against one device session.
pub struct Orchestrator<S: DeviceSession + 'static> {
    session: Arc<S>,
    locks: LockManager<S>,
    config: EngineConfig,
}

impl<S: DeviceSession + 'static> Orchestrator<S> {
    pub fn new(session: Arc<S>, config: EngineConfig) -> Self {
        let locks = LockManager::new(Arc::clone(&session), config.request_timeout);
        Self {
            session,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Read the current state of every kind in the scope's container.
    pub async fn discover(&self, scope: &DeploymentScope) -> Result<LiveState, CoreError> {
        Inspector::new(&*self.session, &self.config)
            .discover(&scope.container(), &ObjectKind::all())
            .await
    }

    /// Compute what a run would do, without locks and without writes.
    pub async fn plan(&self, desired: &DesiredState) -> Result<ExecutionPlan, CoreError> {
        let live = self.discover(desired.scope()).await?;
        plan_changes(desired, &live, &self.config)
    }

    /// Reconcile the device with `desired`.
    ///
    /// Returns the report when the run got as far as releasing its locks
    /// without a fatal error, including runs with failed operations (see
    /// [`RunOutcome::PartialFailure`]) and cancelled runs. Otherwise the
    /// error carries the partial report.
    pub async fn run(
        &self,
        desired: &DesiredState,
        cancel: CancellationToken,
    ) -> Result<DeploymentReport, DeploymentError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, scope = %desired.scope());
        self.run_inner(run_id, desired, &cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> Result<DeploymentReport, DeploymentError> {
        let started = Instant::now();
        let scope = desired.scope();
        let mut report = DeploymentReport::new(run_id, scope.clone());

        if cancel.is_cancelled() {
            report.record_phase(Phase::AcquireLocks, PhaseStatus::Cancelled);
            report.outcome = RunOutcome::Cancelled;
            report.finish(elapsed_ms(started));
            return Ok(report);
        }

        let comment = self
            .config
            .lock_comment
            .clone()
            .unwrap_or_else(|| format!("polsync rollout {run_id}"));
        let mut lock = match self.locks.acquire(scope, &comment).await {
            Ok(lock) => {
                report.record_phase(Phase::AcquireLocks, PhaseStatus::Completed);
                lock
            }
            Err(err) => {
                report.record_phase(Phase::AcquireLocks, PhaseStatus::Failed);
                report.outcome = RunOutcome::Aborted;
                report.finish(elapsed_ms(started));
                return Err(DeploymentError::new(err, report));
            }
        };

        let applied = self.apply(desired, &mut report, cancel).await;
        if let Err(err) = &applied {
            warn!(error = %err, "run aborted, releasing locks");
            report.outcome = RunOutcome::Aborted;
        }

        let released = lock.release().await;
        report.record_phase(
            Phase::ReleaseLocks,
            if released.is_ok() {
                PhaseStatus::Completed
            } else {
                PhaseStatus::Failed
            },
        );
        report.finish(elapsed_ms(started));

        let totals = report.totals();
        info!(
            outcome = ?report.outcome,
            created = totals.created,
            updated = totals.updated,
            deleted = totals.deleted,
            failed = totals.failed,
            elapsed_ms = report.elapsed_ms,
            "run finished"
        );

        match (applied, released) {
            (Err(err), _) | (Ok(()), Err(err)) => Err(DeploymentError::new(err, report)),
            (Ok(()), Ok(())) => Ok(report),
        }
    }

    /// Everything between lock acquisition and release.
    async fn apply(
        &self,
        desired: &DesiredState,
        report: &mut DeploymentReport,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        if cancel.is_cancelled() {
            report.record_phase(Phase::Discover, PhaseStatus::Cancelled);
            report.outcome = RunOutcome::Cancelled;
            return Ok(());
        }
        let live = match self.discover(desired.scope()).await {
            Ok(live) => live,
            Err(err) => {
                report.record_phase(Phase::Discover, PhaseStatus::Failed);
                return Err(err);
            }
        };
        report.record_phase(Phase::Discover, PhaseStatus::Completed);

        let plan = match plan_changes(desired, &live, &self.config) {
            Ok(plan) => plan,
            Err(err) => {
                report.record_phase(Phase::Plan, PhaseStatus::Failed);
                return Err(err);
            }
        };
        report.record_phase(Phase::Plan, PhaseStatus::Completed);
        report.dangling.clone_from(&plan.dangling);
        info!(
            operations = plan.len(),
            upsert_kinds = plan.upserts.len(),
            delete_kinds = plan.deletes.len(),
            withheld = plan.dangling.len(),
            "plan ready"
        );

        let mut executor = BatchExecutor::new(
            &*self.session,
            desired.scope().container(),
            self.config.max_batch_size,
            self.config.batch_mode,
            self.config.strict_first_batch,
        );
        let mut failed: BTreeSet<ObjectKind> = BTreeSet::new();
        let mut halt = None;

        for step in &plan.upserts {
            let blocked = failed.iter().any(|f| step.kind.depends_on(*f));
            self.run_step(
                &mut executor,
                step,
                Phase::Upsert(step.kind),
                blocked,
                report,
                cancel,
                &mut failed,
                &mut halt,
            )
            .await?;
        }

        for step in &plan.deletes {
            let blocked = failed
                .iter()
                .any(|f| *f == step.kind || f.depends_on(step.kind));
            self.run_step(
                &mut executor,
                step,
                Phase::Delete(step.kind),
                blocked,
                report,
                cancel,
                &mut failed,
                &mut halt,
            )
            .await?;
        }

        match halt {
            Some(Halt::Cancelled) => {
                report.outcome = RunOutcome::Cancelled;
                Ok(())
            }
            Some(Halt::Aborted(kind)) => Err(CoreError::BatchOperation {
                kind,
                failed: report.per_kind.get(&kind).map_or(0, |c| c.failed),
                message: report
                    .failures
                    .iter()
                    .find(|f| f.object.kind == kind)
                    .map_or_else(
                        || "operation failed".into(),
                        |f| format!("{}: {}", f.object, f.error),
                    ),
            }),
            None => Ok(()),
        }
    }

    /// Execute one step unless the run is halted, the step is blocked by a
    /// failed kind, or cancellation was requested. Returns `Err` only for
    /// failures that must stop the run immediately.
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        executor: &mut BatchExecutor<'_, S>,
        step: &Step,
        phase: Phase,
        blocked: bool,
        report: &mut DeploymentReport,
        cancel: &CancellationToken,
        failed: &mut BTreeSet<ObjectKind>,
        halt: &mut Option<Halt>,
    ) -> Result<(), CoreError> {
        if halt.is_none() && cancel.is_cancelled() {
            info!(%phase, "cancellation requested, skipping remaining phases");
            *halt = Some(Halt::Cancelled);
        }
        let skipped = match *halt {
            Some(Halt::Cancelled) => Some(PhaseStatus::Cancelled),
            Some(Halt::Aborted(_)) => Some(PhaseStatus::Skipped),
            None if blocked => {
                warn!(%phase, "skipped: depends on a kind that failed");
                Some(PhaseStatus::Skipped)
            }
            None => None,
        };
        if let Some(status) = skipped {
            report.record_skipped(step.kind, step.operations.len());
            report.record_phase(phase, status);
            return Ok(());
        }

        info!(%phase, operations = step.operations.len(), "phase started");
        let outcome = executor.execute(step.kind, &step.operations, true).await;
        report.record_results(step.kind, &step.operations, &outcome.results);

        if let Some(fatal) = outcome.fatal {
            report.record_phase(phase, PhaseStatus::Failed);
            return Err(fatal);
        }
        if outcome.failed_count() > 0 {
            warn!(
                %phase,
                failed = outcome.failed_count(),
                error = outcome.first_error().unwrap_or_default(),
                "phase failed"
            );
            failed.insert(step.kind);
            report.record_phase(phase, PhaseStatus::Failed);
            if self.config.failure_policy == FailurePolicy::AbortRun {
                *halt = Some(Halt::Aborted(step.kind));
            }
        } else {
            report.record_phase(phase, PhaseStatus::Completed);
        }
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
