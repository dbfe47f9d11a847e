//! Batch Executor.
//!
//! ```text
//! Idle -> Validating -> Running -> Completed
//!             |
//!             +-> Rejected
//! ```
//!
//! Targets run strictly one at a time. A failure on one target is recorded and the batch moves
//! on; only validation can stop a batch, and only before any collaborator is called. Completed
//! and Rejected end one batch; the executor then accepts the next submit.

use super::{validate, BatchOperation, BatchReport, ExecutionResult, ItemOutcome, ItemResult, OperationType};
use crate::actor::Actor;
use crate::catalog::{KindProfile, OperationCatalog};
use crate::client::ClinicalApi;
use crate::config::SyncConfig;
use crate::constants::CANCELLED_BEFORE_PROCESSING;
use crate::diff::DiffBuilder;
use crate::events::{BatchEvent, EventSink};
use crate::history::{HistoryEntry, OperationHistory};
use crate::{SyncError, SyncResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    Idle,
    Validating,
    Running,
    Completed,
    Rejected,
}

impl ExecutorState {
    fn is_busy(self) -> bool {
        matches!(self, ExecutorState::Validating | ExecutorState::Running)
    }
}

/// Items processed so far in the current batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    /// `processed / total * 100`, or 0 before a batch has targets.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs validated batch operations against a [`ClinicalApi`].
pub struct BatchExecutor {
    config: Arc<SyncConfig>,
    catalog: Arc<OperationCatalog>,
    api: Arc<dyn ClinicalApi>,
    events: Option<Arc<dyn EventSink>>,
    actor: Actor,
    diff: DiffBuilder,
    state: Mutex<ExecutorState>,
    history: Mutex<OperationHistory>,
    last_result: Mutex<Option<ExecutionResult>>,
    progress: watch::Sender<Progress>,
    cancel_requested: AtomicBool,
}

/// Returns the executor to `Idle` if a batch future is dropped mid-flight.
struct BusyGuard<'a> {
    state: &'a Mutex<ExecutorState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        if state.is_busy() {
            *state = ExecutorState::Idle;
        }
    }
}

impl BatchExecutor {
    pub fn new(
        config: Arc<SyncConfig>,
        catalog: Arc<OperationCatalog>,
        api: Arc<dyn ClinicalApi>,
        actor: Actor,
    ) -> Self {
        let history = OperationHistory::new(config.history_capacity());
        let diff = DiffBuilder::new(&config);
        let (progress, _) = watch::channel(Progress::default());
        Self {
            config,
            catalog,
            api,
            events: None,
            actor,
            diff,
            state: Mutex::new(ExecutorState::Idle),
            history: Mutex::new(history),
            last_result: Mutex::new(None),
            progress,
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Publish completion events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Continue an existing history (for example one loaded from disk).
    pub fn with_history(self, history: OperationHistory) -> Self {
        let history =
            OperationHistory::from_entries(self.config.history_capacity(), history.entries().cloned());
        *lock(&self.history) = history;
        self
    }

    pub fn state(&self) -> ExecutorState {
        *lock(&self.state)
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Snapshot of the operation history.
    pub fn history(&self) -> OperationHistory {
        lock(&self.history).clone()
    }

    /// Result set of the most recently completed batch.
    pub fn last_result(&self) -> Option<ExecutionResult> {
        lock(&self.last_result).clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Ask the running batch to stop before its next item. The item in flight completes.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, next: ExecutorState) {
        *lock(&self.state) = next;
    }

    /// Validate and run `operation` to completion.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Busy`] if another batch is validating or running
    /// - [`SyncError::UnknownResourceKind`] if the catalog has no profile for the kind
    /// - [`SyncError::Validation`] if the batch is rejected
    ///
    /// Per-item failures are not errors; they are reported in the returned [`BatchReport`].
    pub async fn submit(&self, operation: BatchOperation) -> SyncResult<BatchReport> {
        {
            let mut state = lock(&self.state);
            if state.is_busy() {
                return Err(SyncError::Busy);
            }
            *state = ExecutorState::Validating;
        }
        let _guard = BusyGuard { state: &self.state };
        self.cancel_requested.store(false, Ordering::SeqCst);

        let profile = match self.catalog.profile(operation.kind()) {
            Ok(profile) => profile,
            Err(e) => {
                self.set_state(ExecutorState::Rejected);
                return Err(e);
            }
        };
        if let Err(e) = validate(&operation, profile, &self.config) {
            tracing::warn!(
                operation = %operation.operation(),
                kind = %operation.kind(),
                error = %e,
                "batch rejected"
            );
            self.set_state(ExecutorState::Rejected);
            return Err(SyncError::Validation(e));
        }

        self.set_state(ExecutorState::Running);
        let report = self.run(&operation, profile).await;
        self.set_state(ExecutorState::Completed);

        if let Some(sink) = &self.events {
            if let Err(e) = sink.publish(BatchEvent::completed(report.entry.clone())).await {
                tracing::warn!(error = %e, "failed to publish batch completion event");
            }
        }

        Ok(report)
    }

    async fn run(&self, operation: &BatchOperation, profile: &KindProfile) -> BatchReport {
        let targets = operation.target_ids();
        let total = targets.len();
        let started = Instant::now();
        let delay = self.config.inter_item_delay();

        tracing::info!(
            operation_id = %operation.id(),
            operation = %operation.operation(),
            kind = %operation.kind(),
            targets = total,
            "batch started"
        );
        self.progress.send_replace(Progress {
            processed: 0,
            total,
        });

        let mut items = Vec::with_capacity(total);
        let mut cancelled = false;
        for (index, target_id) in targets.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.cancel_requested.load(Ordering::SeqCst) {
                cancelled = true;
                tracing::info!(remaining = total - index, "batch cancelled");
                items.extend(targets[index..].iter().map(|id| ItemResult {
                    target_id: id.clone(),
                    outcome: ItemOutcome::Failure {
                        error: CANCELLED_BEFORE_PROCESSING.to_string(),
                    },
                }));
                // Every target now has an outcome.
                self.progress.send_replace(Progress {
                    processed: total,
                    total,
                });
                break;
            }

            let outcome = self.process_item(operation, profile, target_id).await;
            match &outcome {
                ItemOutcome::Success { .. } => {
                    tracing::debug!(target_id = %target_id, "item succeeded");
                }
                ItemOutcome::Failure { error } => {
                    tracing::warn!(target_id = %target_id, error = %error, "item failed");
                }
            }
            items.push(ItemResult {
                target_id: target_id.clone(),
                outcome,
            });
            self.progress.send_replace(Progress {
                processed: index + 1,
                total,
            });
        }

        let result = ExecutionResult {
            operation_id: operation.id(),
            items,
        };
        let entry = HistoryEntry {
            operation_id: operation.id(),
            timestamp: Utc::now(),
            operation_type: operation.operation(),
            resource_kind: operation.kind(),
            total_count: result.total(),
            success_count: result.success_count(),
            failed_count: result.failed_count(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            actor: self.actor.label(),
        };
        lock(&self.history).record(entry.clone());
        *lock(&self.last_result) = Some(result.clone());

        tracing::info!(
            operation_id = %operation.id(),
            success = entry.success_count,
            failed = entry.failed_count,
            duration_ms = entry.duration_ms,
            "batch completed"
        );

        BatchReport {
            result,
            entry,
            cancelled,
        }
    }

    /// One target, isolated: every error becomes a failure outcome.
    async fn process_item(
        &self,
        operation: &BatchOperation,
        profile: &KindProfile,
        target_id: &str,
    ) -> ItemOutcome {
        let kind = operation.kind();
        if operation.operation() == OperationType::Delete {
            return match self.api.delete(kind, target_id).await {
                Ok(()) => ItemOutcome::Success { payload: None },
                Err(e) => ItemOutcome::Failure {
                    error: e.to_string(),
                },
            };
        }

        let current = match self.api.read(kind, target_id).await {
            Ok(current) => current,
            Err(e) => {
                return ItemOutcome::Failure {
                    error: e.to_string(),
                }
            }
        };
        let payload = match self.diff.build_payload(
            operation.operation(),
            profile,
            &current,
            operation.edits(),
        ) {
            Ok(Some(payload)) => payload,
            Ok(None) => return ItemOutcome::Success { payload: None },
            Err(e) => {
                return ItemOutcome::Failure {
                    error: e.to_string(),
                }
            }
        };
        match self.api.update(kind, target_id, payload.clone()).await {
            Ok(_) => ItemOutcome::Success {
                payload: Some(payload),
            },
            Err(e) => ItemOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClinicalApi;
    use crate::diff::FieldEdit;
    use crate::events::BroadcastEventSink;
    use crate::{ApiError, ValidationError};
    use async_trait::async_trait;
    use clinsync_types::ResourceKind;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn config(delay_ms: u64) -> Arc<SyncConfig> {
        Arc::new(
            SyncConfig::new(10, Duration::from_millis(delay_ms), 3, "urn:test:audit".into())
                .expect("config"),
        )
    }

    fn store(ids: &[&str]) -> Arc<InMemoryClinicalApi> {
        let api = InMemoryClinicalApi::new();
        for id in ids {
            api.insert(
                ResourceKind::Task,
                *id,
                json!({"resourceType": "Task", "id": id, "status": "requested"}),
            );
        }
        Arc::new(api)
    }

    fn executor(api: Arc<InMemoryClinicalApi>, delay_ms: u64) -> BatchExecutor {
        BatchExecutor::new(
            config(delay_ms),
            Arc::new(OperationCatalog::standard()),
            api,
            Actor::new("Nurse Patel").expect("actor"),
        )
    }

    fn task_op(op: OperationType, ids: &[&str], edits: Vec<FieldEdit>) -> BatchOperation {
        BatchOperation::new(op, ResourceKind::Task, ids.iter().copied(), edits)
    }

    #[tokio::test]
    async fn runs_every_target_and_records_history() {
        let api = store(&["t-1", "t-2"]);
        let exec = executor(api.clone(), 0);
        let mut progress = exec.subscribe_progress();

        let report = exec
            .submit(task_op(OperationType::Activate, &["t-1", "t-2"], Vec::new()))
            .await
            .expect("submit");

        assert_eq!(exec.state(), ExecutorState::Completed);
        assert_eq!(report.result.success_count(), 2);
        assert_eq!(report.entry.actor, "Nurse Patel");
        assert_eq!(
            api.get(ResourceKind::Task, "t-2").map(|t| t["status"].clone()),
            Some(json!("in-progress"))
        );
        assert_eq!(exec.history().len(), 1);
        assert_eq!(exec.last_result(), Some(report.result.clone()));

        let last = *progress.borrow_and_update();
        assert_eq!(last, Progress { processed: 2, total: 2 });
        assert_eq!(last.percent(), 100.0);
    }

    #[tokio::test]
    async fn rejection_has_no_side_effects() {
        let api = store(&["t-1"]);
        let exec = executor(api.clone(), 0);
        let err = exec
            .submit(task_op(OperationType::Update, &["t-1"], Vec::new()))
            .await
            .expect_err("rejected");
        assert!(matches!(err, SyncError::Validation(ValidationError::MissingEdits)));
        assert_eq!(exec.state(), ExecutorState::Rejected);
        assert_eq!(api.calls().reads + api.calls().mutations(), 0);
        assert!(exec.history().is_empty());

        // A rejected batch does not block the next one.
        exec.submit(task_op(OperationType::Archive, &["t-1"], Vec::new()))
            .await
            .expect("second submit");
    }

    #[tokio::test]
    async fn unknown_kind_is_fatal() {
        let exec = BatchExecutor::new(
            config(0),
            Arc::new(OperationCatalog::empty()),
            store(&[]),
            Actor::new("Nurse Patel").expect("actor"),
        );
        let err = exec
            .submit(task_op(OperationType::Archive, &["t-1"], Vec::new()))
            .await
            .expect_err("fatal");
        assert!(matches!(err, SyncError::UnknownResourceKind(ResourceKind::Task)));
    }

    #[tokio::test]
    async fn failures_are_isolated_per_item() {
        let api = store(&["t-1", "t-2", "t-3"]);
        api.fail_on(
            ResourceKind::Task,
            "t-2",
            ApiError::Conflict {
                kind: ResourceKind::Task,
                id: "t-2".into(),
                message: "version mismatch".into(),
            },
        );
        let exec = executor(api.clone(), 0);
        let report = exec
            .submit(task_op(
                OperationType::Update,
                &["t-1", "t-2", "t-3", "t-missing"],
                vec![FieldEdit::new("priority", "urgent")],
            ))
            .await
            .expect("submit");

        assert_eq!(report.result.total(), 4);
        assert_eq!(report.result.success_count(), 2);
        assert_eq!(
            report.result.outcome_for("t-2"),
            Some(&ItemOutcome::Failure {
                error: "task t-2 conflict: version mismatch".into()
            })
        );
        assert_eq!(
            report.result.outcome_for("t-missing"),
            Some(&ItemOutcome::Failure {
                error: "task t-missing not found".into()
            })
        );
        assert_eq!(report.entry.failed_count, 2);
    }

    #[tokio::test]
    async fn delete_calls_delete_only() {
        let api = store(&["t-1"]);
        let exec = executor(api.clone(), 0);
        let report = exec
            .submit(task_op(OperationType::Delete, &["t-1"], Vec::new()))
            .await
            .expect("submit");
        assert_eq!(
            report.result.outcome_for("t-1"),
            Some(&ItemOutcome::Success { payload: None })
        );
        let calls = api.calls();
        assert_eq!((calls.reads, calls.updates, calls.deletes), (0, 0, 1));
        assert_eq!(api.get(ResourceKind::Task, "t-1"), None);
    }

    #[tokio::test]
    async fn publishes_completion_event() {
        let sink = Arc::new(BroadcastEventSink::new(4));
        let mut rx = sink.subscribe();
        let exec = executor(store(&["t-1"]), 0).with_event_sink(sink);
        exec.submit(task_op(OperationType::Archive, &["t-1"], Vec::new()))
            .await
            .expect("submit");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.name, "batch-operation-completed");
        assert_eq!(event.results.success, 1);
        assert_eq!(event.operation.operation_type, OperationType::Archive);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let exec = executor(store(&["t-1"]), 0);
        for _ in 0..5 {
            exec.submit(task_op(OperationType::Archive, &["t-1"], Vec::new()))
                .await
                .expect("submit");
        }
        assert_eq!(exec.history().len(), 3);
    }

    #[tokio::test]
    async fn cancel_stops_before_next_item() {
        let ids = ["t-1", "t-2", "t-3", "t-4", "t-5"];
        let exec = Arc::new(executor(store(&ids), 20));
        let mut progress = exec.subscribe_progress();

        let handle = tokio::spawn({
            let exec = exec.clone();
            async move {
                exec.submit(task_op(OperationType::Archive, &ids, Vec::new()))
                    .await
            }
        });

        while progress.borrow_and_update().processed < 1 {
            progress.changed().await.expect("progress");
        }
        exec.request_cancel();

        let report = handle.await.expect("join").expect("submit");
        assert!(report.cancelled);
        assert_eq!(
            *progress.borrow_and_update(),
            Progress {
                processed: 5,
                total: 5
            }
        );
        assert_eq!(report.result.total(), 5);
        assert_eq!(report.result.success_count(), 1);
        assert!(report.result.failed().all(|item| item.outcome
            == ItemOutcome::Failure {
                error: CANCELLED_BEFORE_PROCESSING.into()
            }));
    }

    /// Blocks every read until released.
    struct GatedApi {
        gate: Notify,
    }

    #[async_trait]
    impl ClinicalApi for GatedApi {
        async fn read(&self, _kind: ResourceKind, id: &str) -> Result<Value, ApiError> {
            self.gate.notified().await;
            Ok(json!({"resourceType": "Task", "id": id}))
        }

        async fn update(
            &self,
            _kind: ResourceKind,
            _id: &str,
            resource: Value,
        ) -> Result<Value, ApiError> {
            Ok(resource)
        }

        async fn delete(&self, _kind: ResourceKind, _id: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_submit_while_running_is_busy() {
        let api = Arc::new(GatedApi {
            gate: Notify::new(),
        });
        let exec = Arc::new(BatchExecutor::new(
            config(0),
            Arc::new(OperationCatalog::standard()),
            api.clone(),
            Actor::new("Nurse Patel").expect("actor"),
        ));

        let handle = tokio::spawn({
            let exec = exec.clone();
            async move {
                exec.submit(task_op(OperationType::Archive, &["t-1"], Vec::new()))
                    .await
            }
        });
        while exec.state() != ExecutorState::Running {
            tokio::task::yield_now().await;
        }

        let err = exec
            .submit(task_op(OperationType::Archive, &["t-2"], Vec::new()))
            .await
            .expect_err("busy");
        assert!(matches!(err, SyncError::Busy));

        api.gate.notify_one();
        let report = handle.await.expect("join").expect("first submit");
        assert_eq!(report.result.success_count(), 1);
        assert_eq!(exec.state(), ExecutorState::Completed);
    }
}
