//! # clinsync core
//!
//! Batch mutation of clinical resources held by an upstream FHIR store.
//!
//! This crate contains the selection, validation, and execution logic:
//! - Selection tracking with page tri-state ([`selection`])
//! - The catalogue of editable fields per resource kind ([`catalog`])
//! - Payload shaping for update, archive, activate, deactivate, and delete ([`diff`])
//! - Sequential batch execution with per-item isolation and progress ([`batch`])
//! - A capped history of executed batches ([`history`])
//!
//! **No transport concerns**: the upstream store, event bus, and user identity are injected
//! through [`client::ClinicalApi`], [`events::EventSink`], and [`Actor`]. Normalising wire
//! resources into domain records lives in the `fhir` crate.

pub mod actor;
pub mod batch;
pub mod catalog;
pub mod client;
pub mod config;
pub mod constants;
pub mod diff;
mod error;
pub mod events;
pub mod history;
pub mod selection;

pub use actor::Actor;
pub use batch::{
    BatchExecutor, BatchOperation, BatchReport, ExecutionResult, ExecutorState, ItemOutcome,
    ItemResult, OperationType, Progress,
};
pub use catalog::{FieldSpec, KindProfile, OperationCatalog, ValueDomain};
pub use client::{ClinicalApi, HttpClinicalApi, InMemoryClinicalApi};
pub use config::SyncConfig;
pub use diff::{DiffBuilder, FieldEdit};
pub use error::{ApiError, DiffError, SyncError, SyncResult, ValidationError};
pub use events::{BatchEvent, BroadcastEventSink, EventSink, LogEventSink};
pub use history::{HistoryEntry, OperationHistory};
pub use selection::{PageState, SelectionSet};
