// logsmith - core/analytics.rs
//
// Time-window aggregation over a stream of entries: trend buckets, level
// counts, most frequent error messages, error rate.
// Core layer: entries are pushed in, nothing is read here.

use crate::core::model::{AnalyticsSummary, ErrorSummary, Granularity, LogEntry, TrendPoint};
use crate::util::constants;
use crate::util::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Accumulates one aggregation. Feed every entry of the file through
/// `observe`, then call `finish`.
#[derive(Debug)]
pub struct Aggregator {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    buckets: BTreeMap<DateTime<Utc>, u64>,
    level_counts: BTreeMap<String, u64>,
    errors: HashMap<String, ErrorSummary>,
    last_entry_time: Option<DateTime<Utc>>,
    total_entries: u64,
    error_count: u64,
}

impl Aggregator {
    /// Validate the window and pre-fill every bucket with zero.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Self> {
        if start > end {
            return Err(EngineError::invalid(
                "time range",
                format!("start {start} is after end {end}"),
            ));
        }

        let step = granularity.step();
        let first = granularity.floor(start);
        let span = end - first;
        let count = span.num_seconds() / step.num_seconds() + 1;
        if count as usize > constants::MAX_TREND_BUCKETS {
            return Err(EngineError::invalid(
                "time range",
                format!(
                    "{count} {granularity:?} buckets exceeds the maximum of {}; use a coarser granularity",
                    constants::MAX_TREND_BUCKETS
                ),
            ));
        }

        let mut buckets = BTreeMap::new();
        let mut cursor = first;
        while cursor <= end {
            buckets.insert(cursor, 0);
            cursor += step;
        }

        Ok(Self {
            start,
            end,
            granularity,
            buckets,
            level_counts: BTreeMap::new(),
            errors: HashMap::new(),
            last_entry_time: None,
            total_entries: 0,
            error_count: 0,
        })
    }

    /// Account for one entry. Entries outside the window only move
    /// `last_entry_time`.
    pub fn observe(&mut self, entry: &LogEntry) {
        if self.last_entry_time.map_or(true, |t| entry.timestamp > t) {
            self.last_entry_time = Some(entry.timestamp);
        }
        if entry.timestamp < self.start || entry.timestamp > self.end {
            return;
        }

        self.total_entries += 1;
        *self
            .buckets
            .entry(self.granularity.floor(entry.timestamp))
            .or_insert(0) += 1;
        *self.level_counts.entry(entry.level.clone()).or_insert(0) += 1;

        if entry.is_error_class() {
            self.error_count += 1;
            let text = entry.message_text();
            let key = text.lines().next().unwrap_or_default().trim().to_string();
            let summary = self
                .errors
                .entry(key.clone())
                .or_insert_with(|| ErrorSummary {
                    message: key,
                    level: entry.level.clone(),
                    count: 0,
                    last_seen: entry.timestamp,
                });
            summary.count += 1;
            if entry.timestamp >= summary.last_seen {
                summary.last_seen = entry.timestamp;
                summary.level = entry.level.clone();
            }
        }
    }

    /// Produce the summary. `malformed_lines` comes from the parser counters.
    pub fn finish(self, malformed_lines: u64) -> AnalyticsSummary {
        let granularity = self.granularity;
        let trends = self
            .buckets
            .into_iter()
            .map(|(bucket, count)| TrendPoint {
                bucket,
                label: granularity.label(bucket),
                count,
            })
            .collect();

        let mut top_errors: Vec<ErrorSummary> = self.errors.into_values().collect();
        top_errors.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.message.cmp(&b.message))
        });
        top_errors.truncate(constants::TOP_ERRORS_LIMIT);

        let error_rate_percent = if self.total_entries == 0 {
            0.0
        } else {
            let pct = self.error_count as f64 / self.total_entries as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        };

        AnalyticsSummary {
            trends,
            level_counts: self.level_counts,
            top_errors,
            last_entry_time: self.last_entry_time,
            total_entries: self.total_entries,
            error_count: self.error_count,
            error_rate_percent,
            malformed_lines,
        }
    }
}
