//! Constants used throughout the clinsync core crate.

/// Default upper bound on the number of targets in one batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default pause between two consecutive items of a batch, in milliseconds.
pub const DEFAULT_INTER_ITEM_DELAY_MS: u64 = 100;

/// Default number of history entries retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Default coding system of the archive audit tag.
pub const DEFAULT_ARCHIVE_TAG_SYSTEM: &str = "urn:clinsync:audit";

/// Code of the audit tag appended by `archive`.
pub const ARCHIVE_TAG_CODE: &str = "archived";

/// Display of the audit tag appended by `archive`.
pub const ARCHIVE_TAG_DISPLAY: &str = "Archived";

/// Top-level field set by `activate` and `deactivate`.
pub const STATUS_FIELD: &str = "status";

/// Separator between segments of a nested field path.
pub const PATH_SEPARATOR: char = '.';

/// Name of the event published when a batch completes.
pub const BATCH_COMPLETED_EVENT: &str = "batch-operation-completed";

/// Failure text recorded for targets skipped after a cancel request.
pub const CANCELLED_BEFORE_PROCESSING: &str = "cancelled before processing";

/// Default capacity of the in-process event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Media type used for FHIR JSON requests.
pub const FHIR_JSON_MEDIA_TYPE: &str = "application/fhir+json";
