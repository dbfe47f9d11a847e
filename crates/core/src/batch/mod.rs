//! Batch operations: the immutable intent, its validation gate, the sequential executor and the
//! per-target results it produces.

mod executor;
mod operation;
mod results;
mod validation;

pub use executor::{BatchExecutor, ExecutorState, Progress};
pub use operation::{BatchOperation, OperationType};
pub use results::{BatchReport, ExecutionResult, ItemOutcome, ItemResult};
pub use validation::validate;
