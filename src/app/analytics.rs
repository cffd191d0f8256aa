// logsmith - app/analytics.rs
//
// Runs the aggregator over one whitelisted file, oldest entry first.

use crate::app::files::LogFileSet;
use crate::app::scan::EntryStream;
use crate::core::analytics::Aggregator;
use crate::core::model::{AnalyticsSummary, Direction, Granularity};
use crate::core::parser::sniff_timestamp;
use crate::platform::config::EngineConfig;
use crate::util::error::{EngineError, Result};
use chrono::{DateTime, Utc};

/// Aggregate entries of `name` between `start` and `end` (inclusive).
///
/// The time range is validated before the file is touched.
pub fn aggregate(
    files: &LogFileSet,
    name: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    config: &EngineConfig,
) -> Result<AnalyticsSummary> {
    let mut aggregator = Aggregator::new(start, end, granularity)?;
    let path = files.resolve(name)?;

    let mut stream = EntryStream::open(&path, Direction::OldestFirst, config)?;
    for entry in stream.by_ref() {
        aggregator.observe(&entry?);
    }
    let counters = stream.counters();
    let summary = aggregator.finish(counters.malformed);

    tracing::info!(
        file = name,
        entries = summary.total_entries,
        errors = summary.error_count,
        malformed = summary.malformed_lines,
        "Analytics complete"
    );
    Ok(summary)
}

/// Parse a user-supplied time bound: any recognised timestamp format, or a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_time_bound(field: &'static str, text: &str) -> Result<DateTime<Utc>> {
    sniff_timestamp(text.trim())
        .ok_or_else(|| EngineError::invalid(field, format!("'{text}' is not a recognised time")))
}
