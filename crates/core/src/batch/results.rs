use crate::history::HistoryEntry;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// What happened to one target.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ItemOutcome {
    /// The mutation was applied. `payload` is what was sent; `None` for delete.
    Success { payload: Option<Value> },
    /// The mutation failed; `error` is the upstream or local error text.
    Failure { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub target_id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Exactly one outcome per target, in target order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub operation_id: Uuid,
    pub items: Vec<ItemResult>,
}

impl ExecutionResult {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.success_count()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|i| i.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|i| !i.outcome.is_success())
    }

    pub fn outcome_for(&self, target_id: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|i| i.target_id == target_id)
            .map(|i| &i.outcome)
    }
}

/// Everything a completed batch hands back to its caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub result: ExecutionResult,
    pub entry: HistoryEntry,
    /// Whether a cancel request stopped the batch early.
    pub cancelled: bool,
}
