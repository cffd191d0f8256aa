// logsmith - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies. These types are the shared vocabulary across all layers and
// are all `Serialize` so a rendering layer can emit them as JSON directly.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;

// =============================================================================
// Log Entry
// =============================================================================

/// Physical shape an entry was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    /// One self-contained JSON object per line.
    Record,
    /// A `[timestamp]` block, possibly with continuation lines.
    Legacy,
    /// A stray text line with no block to belong to.
    Plain,
}

/// One logical log record, regardless of how many physical lines it spans.
///
/// Entries are built once per scan and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Best-effort timestamp in UTC. Falls back to the scan start time when
    /// the source carries no parseable timestamp.
    pub timestamp: DateTime<Utc>,

    /// Lower-cased severity token ("error", "warning", "info", ...).
    pub level: String,

    /// Message payload. Normally a string; structured records may nest an
    /// object here.
    pub message: Value,

    /// Structured context (exception class, stack frames, request ids...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,

    /// Remaining top-level record fields, or the channel of a legacy line.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,

    /// Source shape.
    pub format: EntryFormat,

    /// Physical text the entry came from. For legacy entries this is the
    /// reassembled block, continuation lines included.
    #[serde(skip)]
    pub raw: String,
}

impl LogEntry {
    /// Message rendered as text: strings verbatim, structured payloads as
    /// compact JSON.
    pub fn message_text(&self) -> Cow<'_, str> {
        match &self.message {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Context rendered as compact JSON, empty string when absent.
    pub fn context_text(&self) -> String {
        self.context
            .as_ref()
            .map(|c| Value::Object(c.clone()).to_string())
            .unwrap_or_default()
    }

    /// True for levels counted as errors by analytics.
    pub fn is_error_class(&self) -> bool {
        crate::util::constants::ERROR_LEVELS.contains(&self.level.as_str())
    }
}

/// True when a message carries nothing worth surfacing.
pub fn message_is_empty(message: &Value) -> bool {
    match message {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

// =============================================================================
// Files
// =============================================================================

/// Format classification of a whole file, from its leading lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Every sampled line is a structured record.
    Record,
    /// No sampled line is a structured record.
    Legacy,
    /// Both shapes appear (typically a partially migrated file).
    Mixed,
    /// No non-blank lines.
    Empty,
}

/// A whitelisted log file discovered at request time.
#[derive(Debug, Clone, Serialize)]
pub struct LogFile {
    /// Whitelisted file name.
    pub name: String,
    /// Resolved path.
    pub path: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Format classification.
    pub format: FileFormat,
}

/// Per-file statistics produced by the archive manager.
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Exact when the sample reached end of file, extrapolated otherwise.
    pub line_count: u64,
    pub line_count_estimated: bool,
    pub sampled_lines: usize,
    /// Share of sampled non-blank lines that are structured records (0.0-1.0).
    pub structured_ratio: f64,
    /// Level distribution among entries parsed from the sample.
    pub level_distribution: BTreeMap<String, u64>,
}

// =============================================================================
// Pagination
// =============================================================================

/// Scan order for pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the end of the file backwards.
    #[default]
    NewestFirst,
    /// From the start of the file forwards.
    OldestFirst,
}

/// A validated page request. Page and size are always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub direction: Direction,
}

impl PageRequest {
    /// Build a request, clamping page and size below 1 up to 1.
    pub fn new(page: i64, page_size: i64, direction: Direction) -> Self {
        Self {
            page: page.max(1) as usize,
            page_size: page_size.max(1) as usize,
            direction,
        }
    }

    /// Zero-based index of the first match on this page.
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(
            1,
            crate::util::constants::DEFAULT_PAGE_SIZE as i64,
            Direction::default(),
        )
    }
}

/// One page of matching entries with exact counts.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub entries: Vec<LogEntry>,
    /// Entries examined across the whole file.
    pub total: u64,
    /// Entries satisfying the query and level filter across the whole file.
    pub matched: u64,
    pub page: usize,
    pub page_size: usize,
    pub direction: Direction,
}

impl MatchResult {
    /// Number of pages needed for all matches (0 when nothing matched).
    pub fn total_pages(&self) -> u64 {
        self.matched.div_ceil(self.page_size as u64)
    }
}

// =============================================================================
// Analytics
// =============================================================================

/// Width of an analytics trend bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    /// Bucket width.
    pub fn step(&self) -> Duration {
        match self {
            Granularity::Minute => Duration::minutes(1),
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // Rounding a UTC instant down to a whole minute/hour/day cannot
        // overflow for any timestamp chrono can represent.
        ts.duration_trunc(self.step()).unwrap_or(ts)
    }

    /// Display label for a bucket start.
    pub fn label(&self, bucket: DateTime<Utc>) -> String {
        let fmt = match self {
            Granularity::Minute => "%Y-%m-%d %H:%M",
            Granularity::Hour => "%Y-%m-%d %H:00",
            Granularity::Day => "%Y-%m-%d",
        };
        bucket.format(fmt).to_string()
    }
}

/// Count of entries falling in one trend bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub bucket: DateTime<Utc>,
    pub label: String,
    pub count: u64,
}

/// A distinct error message and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub message: String,
    pub level: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Result of a time-window aggregation over one file.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub trends: Vec<TrendPoint>,
    pub level_counts: BTreeMap<String, u64>,
    pub top_errors: Vec<ErrorSummary>,
    /// Newest timestamp seen anywhere in the file.
    pub last_entry_time: Option<DateTime<Utc>>,
    /// Entries inside the window.
    pub total_entries: u64,
    pub error_count: u64,
    pub error_rate_percent: f64,
    /// Structured-looking lines that failed to decode.
    pub malformed_lines: u64,
}

// =============================================================================
// Migration and archiving
// =============================================================================

/// Outcome of a legacy-to-record migration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStats {
    /// Physical lines read.
    pub total_lines: u64,
    /// Records written from legacy blocks or stray text lines.
    pub converted_lines: u64,
    /// Structured lines copied unchanged.
    pub passthrough_lines: u64,
    /// Malformed lines (undecodable JSON, invalid UTF-8). Never fatal.
    pub errors: u64,
    pub duration_seconds: f64,
    /// Where the original was kept, when a backup was requested.
    pub backup_path: Option<PathBuf>,
}

/// Outcome of an age-based archiving run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveOutcome {
    /// Archive written, `None` when no file was old enough.
    pub archive_path: Option<PathBuf>,
    /// Names added to the archive.
    pub archived: Vec<String>,
    /// Names that could not be added, with the reason.
    pub failed: Vec<(String, String)>,
    /// True when the archived originals were deleted.
    pub originals_removed: bool,
}

// =============================================================================
// Cross-file search
// =============================================================================

/// One matching line with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// 1-based physical line number.
    pub line_number: u64,
    pub line: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Hits found in one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSearchResult {
    pub file: String,
    pub hits: Vec<SearchHit>,
    /// True when the per-file cap stopped the scan.
    pub truncated: bool,
}
