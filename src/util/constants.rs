// logsmith - util/constants.rs
//
// Named limits and defaults shared by every layer.
// Every bound the engine enforces is declared here so it can be audited
// in one place.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "logsmith";

/// Directory name under the platform config root.
pub const APP_ID: &str = "logsmith";

/// Crate version, from Cargo.toml.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Chunked reader
// =============================================================================

/// Default read window in bytes for chunked file reads.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024; // 8 MiB

/// Smallest accepted window. A one-byte window is legal and is what the
/// boundary tests use; anything below that is meaningless.
pub const MIN_CHUNK_SIZE: usize = 1;

/// Largest configurable window.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024; // 256 MiB

/// Files above this size are always read through the windowed path.
/// Files at or below it are memory-mapped and split in one pass.
pub const DEFAULT_CHUNKED_THRESHOLD: u64 = 50 * 1024 * 1024; // 50 MiB

/// Maximum size of a single reassembled entry. Continuation text beyond
/// this is dropped and the message is marked as truncated.
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 1024 * 1024; // 1 MiB

/// Lower bound for the configurable entry cap.
pub const MIN_MAX_ENTRY_SIZE: usize = 1024;

/// Suffix appended to messages that hit `max_entry_size`.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

// =============================================================================
// Parsing
// =============================================================================

/// Level assigned when neither a field nor a marker names one.
pub const DEFAULT_LEVEL: &str = "info";

/// Levels counted as errors by analytics and the error rate.
pub const ERROR_LEVELS: &[&str] = &["emergency", "alert", "critical", "error"];

/// Number of leading lines sniffed to classify a file's format.
pub const FORMAT_DETECTION_LINES: usize = 20;

// =============================================================================
// Pagination and export
// =============================================================================

/// Page size used when the caller does not give one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on entries in one export.
pub const MAX_EXPORT_ENTRIES: usize = 5_000_000;

// =============================================================================
// Analytics
// =============================================================================

/// Number of distinct error messages reported by analytics.
pub const TOP_ERRORS_LIMIT: usize = 10;

/// Maximum number of trend buckets a single aggregation may allocate.
/// A year of minute buckets is rejected; a year of hour buckets is not.
pub const MAX_TREND_BUCKETS: usize = 100_000;

// =============================================================================
// Archive manager
// =============================================================================

/// Lines sampled by `stats` before extrapolating the line count.
pub const DEFAULT_STATS_SAMPLE_LINES: usize = 1_000;

/// Upper bound for the configurable sample size.
pub const MAX_STATS_SAMPLE_LINES: usize = 1_000_000;

/// Default cap on cross-file search hits reported per file.
pub const DEFAULT_MAX_MATCHES_PER_FILE: usize = 100;

/// Upper bound for the configurable per-file hit cap.
pub const MAX_MATCHES_PER_FILE: usize = 10_000;

/// Upper bound on context lines around a cross-file search hit.
pub const MAX_CONTEXT_LINES: usize = 50;

/// File name prefix of archives written by `archive_older_than`.
pub const ARCHIVE_PREFIX: &str = "logs-archive";

/// Extension of archives written by `archive_older_than`.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

// =============================================================================
// Migration
// =============================================================================

/// Extension given to the original file kept by a migration backup.
pub const BACKUP_EXTENSION: &str = "bak";

/// Prefix of the temp file a migration writes before the final rename.
pub const MIGRATION_TEMP_PREFIX: &str = ".logsmith-migrate-";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Bytes of a log line echoed into debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Log directory used when neither config nor CLI names one.
pub const DEFAULT_LOG_DIR: &str = "storage/logs";

/// Whitelist used when neither config nor CLI names one.
pub const DEFAULT_WHITELIST: &[&str] = &["*.log"];
