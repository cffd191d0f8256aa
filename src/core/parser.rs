// logsmith - core/parser.rs
//
// Line classification and entry assembly for the two on-disk formats:
//
//   - record format: one JSON object per physical line;
//   - legacy format: a line starting with a bracketed timestamp opens a
//     block, and following lines without that prefix (stack frames, wrapped
//     text) are continuation lines of the same entry.
//
// Every physical line is classified exactly once into `ClassifiedLine`.
// The assemblers turn classified lines into `LogEntry` values; the reverse
// assembler consumes lines newest-first and produces exactly the mirror of
// what the forward assembler produces for the same file.
//
// Core layer: works on `&str` lines, never touches the filesystem.

use crate::core::model::{message_is_empty, EntryFormat, LogEntry};
use crate::util::constants;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::OnceLock;

/// Configuration for parsing operations.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Bytes kept per reassembled entry before truncation.
    pub max_entry_size: usize,
    /// Timestamp given to entries that carry none. Fixed per scan so two
    /// scans of the same region yield equal entries.
    pub fallback_time: DateTime<Utc>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_entry_size: constants::DEFAULT_MAX_ENTRY_SIZE,
            fallback_time: Utc::now(),
        }
    }
}

/// Counters kept while assembling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCounters {
    /// Physical lines fed in, blank ones included.
    pub lines: u64,
    /// Structured-looking lines that failed to decode and were kept as text.
    pub malformed: u64,
}

// =============================================================================
// Classification
// =============================================================================

/// A physical line, classified once.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedLine<'a> {
    /// A decoded JSON object.
    Structured(Map<String, Value>),
    /// Anything else: a block start or free text.
    Legacy(LegacyLine<'a>),
}

/// The legacy half of `ClassifiedLine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyLine<'a> {
    /// `[stamp] rest`: opens a new block.
    Start { stamp: &'a str, rest: &'a str },
    /// A line without a bracketed timestamp. `malformed` is set when the
    /// line looked like a JSON object but did not decode.
    Text { text: &'a str, malformed: bool },
}

/// Classify one physical line. Blank lines yield `None`.
pub fn classify_line(line: &str) -> Option<ClassifiedLine<'_>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(match serde_json::from_str::<Map<String, Value>>(trimmed) {
            Ok(map) => ClassifiedLine::Structured(map),
            Err(e) => {
                tracing::trace!(error = %e, "Structured line failed to decode; treating as text");
                ClassifiedLine::Legacy(LegacyLine::Text {
                    text: line,
                    malformed: true,
                })
            }
        });
    }

    if let Some((stamp, rest)) = split_bracket_stamp(line) {
        return Some(ClassifiedLine::Legacy(LegacyLine::Start { stamp, rest }));
    }

    Some(ClassifiedLine::Legacy(LegacyLine::Text {
        text: line,
        malformed: false,
    }))
}

/// Split `[stamp] rest` when the bracket holds a recognisable timestamp.
/// Brackets such as `[0.5s]` or `[12:30]` stay continuation text.
fn split_bracket_stamp(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_prefix('[')?;
    if !body.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let close = body.find(']')?;
    let stamp = &body[..close];
    if stamp.len() > 64 {
        return None;
    }
    sniff_timestamp(stamp)?;
    Some((stamp, body[close + 1..].trim_start()))
}

// =============================================================================
// Entry construction
// =============================================================================

/// Build an entry from a decoded record. `raw` is the physical line.
pub fn entry_from_record(
    mut record: Map<String, Value>,
    raw: &str,
    config: &ParseConfig,
) -> Option<LogEntry> {
    let stamp = record
        .remove("timestamp")
        .or_else(|| record.remove("datetime"));
    let timestamp = stamp
        .as_ref()
        .and_then(timestamp_from_value)
        .unwrap_or(config.fallback_time);

    let level_name = record.remove("level_name");
    let level = level_name
        .as_ref()
        .or(record.get("level"))
        .and_then(level_from_value)
        .unwrap_or_else(|| constants::DEFAULT_LEVEL.to_string());
    record.remove("level");

    let message = record
        .remove("message")
        .or_else(|| record.remove("msg"))
        .unwrap_or(Value::Null);
    if message_is_empty(&message) {
        return None;
    }

    let context = match record.remove("context") {
        Some(Value::Object(map)) if !map.is_empty() => Some(map),
        // Monolog writes an empty array for "no context".
        Some(Value::Object(_)) => None,
        Some(Value::Array(a)) if a.is_empty() => None,
        Some(Value::Null) | None => None,
        Some(other) => {
            record.insert("context".to_string(), other);
            None
        }
    };

    Some(LogEntry {
        timestamp,
        level,
        message,
        context,
        extra: record,
        format: EntryFormat::Record,
        raw: raw.trim_end().to_string(),
    })
}

/// Build a standalone entry from a text line that belongs to no block.
pub fn entry_from_text(text: &str, config: &ParseConfig) -> Option<LogEntry> {
    let message = text.trim_end();
    if message.trim().is_empty() {
        return None;
    }
    let mut message = message.to_string();
    truncate_entry(&mut message, config.max_entry_size, false);
    Some(LogEntry {
        timestamp: sniff_timestamp(text).unwrap_or(config.fallback_time),
        level: infer_level(text).unwrap_or(constants::DEFAULT_LEVEL).to_string(),
        message: Value::String(message.clone()),
        context: None,
        extra: Map::new(),
        format: EntryFormat::Plain,
        raw: message,
    })
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => sniff_timestamp(s),
        Value::Number(n) => {
            let n = n.as_f64()?;
            // Values past 1e11 are epoch milliseconds (year 5138 in seconds).
            let (secs, nanos) = if n.abs() >= 1e11 {
                let ms = n as i64;
                (ms.div_euclid(1000), (ms.rem_euclid(1000) * 1_000_000) as u32)
            } else {
                (n.trunc() as i64, (n.fract().abs() * 1e9) as u32)
            };
            DateTime::from_timestamp(secs, nanos)
        }
        // Monolog's serialised DateTime: {"date": "...", "timezone": "..."}
        Value::Object(map) => map.get("date").and_then(timestamp_from_value),
        _ => None,
    }
}

fn level_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_lowercase()),
        // Monolog numeric levels.
        Value::Number(n) => {
            let name = match n.as_u64()? {
                600.. => "emergency",
                550.. => "alert",
                500.. => "critical",
                400.. => "error",
                300.. => "warning",
                250.. => "notice",
                200.. => "info",
                _ => "debug",
            };
            Some(name.to_string())
        }
        _ => None,
    }
}

// =============================================================================
// Legacy blocks
// =============================================================================

/// A legacy block under construction: the start line plus the continuation
/// lines kept so far.
#[derive(Debug, Clone)]
pub struct LegacyBlock {
    start_line: String,
    stamp: String,
    rest: String,
    continuation: VecDeque<String>,
    /// Bytes held in `continuation`, one newline per line included.
    continuation_bytes: usize,
    /// Continuation text was dropped to respect `max_entry_size`.
    dropped: bool,
}

impl LegacyBlock {
    /// Open a block from a classified `Start` line.
    pub fn open(start_line: &str, stamp: &str, rest: &str) -> Self {
        Self {
            start_line: start_line.trim_end().to_string(),
            stamp: stamp.to_string(),
            rest: rest.to_string(),
            continuation: VecDeque::new(),
            continuation_bytes: 0,
            dropped: false,
        }
    }

    /// Append a continuation line (forward order). Once the message already
    /// exceeds `max_entry_size`, further lines are dropped.
    pub fn push_line(&mut self, line: &str, max_entry_size: usize) {
        if self.rest.len() + self.continuation_bytes > max_entry_size {
            self.dropped = true;
            return;
        }
        self.continuation_bytes += line.len() + 1;
        self.continuation.push_back(line.to_string());
    }

    /// Whether continuation text was dropped.
    pub fn is_truncated(&self) -> bool {
        self.dropped
    }

    /// Finalise into an entry. Returns `None` when the message is empty.
    pub fn finish(self, config: &ParseConfig) -> Option<LogEntry> {
        let max = config.max_entry_size;
        let truncated = self.dropped;

        let (level, channel, first, context) = split_legacy_head(&self.rest);

        let mut message = first.to_string();
        let mut raw = self.start_line;
        for line in &self.continuation {
            message.push('\n');
            message.push_str(line);
            raw.push('\n');
            raw.push_str(line);
        }
        truncate_entry(&mut message, max, truncated);
        truncate_entry(&mut raw, max, truncated);

        if message.trim().is_empty() {
            return None;
        }

        let mut extra = Map::new();
        if let Some(channel) = channel {
            extra.insert("channel".to_string(), Value::String(channel.to_string()));
        }

        Some(LogEntry {
            timestamp: sniff_timestamp(&self.stamp).unwrap_or(config.fallback_time),
            level,
            message: Value::String(message),
            context,
            extra,
            format: EntryFormat::Legacy,
            raw,
        })
    }
}

/// Interpret the first fragment of a legacy block.
///
/// Returns (level, channel, message head, trailing JSON context). Laravel
/// style heads `local.ERROR: text {"ctx":1}` give level, channel and
/// context explicitly; anything else has its level inferred from an
/// embedded severity marker.
fn split_legacy_head(rest: &str) -> (String, Option<&str>, &str, Option<Map<String, Value>>) {
    static CHANNEL_RE: OnceLock<Regex> = OnceLock::new();
    let re = CHANNEL_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<channel>[A-Za-z0-9_\-]+)\.(?P<level>emergency|alert|critical|error|warning|notice|info|debug):\s?(?P<message>.*)$",
        )
        .expect("channel regex")
    });

    if let Some(caps) = re.captures(rest) {
        let level = caps["level"].to_lowercase();
        let channel = caps.name("channel").map(|m| m.as_str());
        let body = caps.name("message").map(|m| m.as_str()).unwrap_or("");
        let (head, context) = split_trailing_context(body);
        return (level, channel, head, context);
    }

    let level = infer_level(rest).unwrap_or(constants::DEFAULT_LEVEL);
    (level.to_string(), None, rest, None)
}

/// Split a trailing ` {...}` JSON object (or empty ` []`) off a message.
fn split_trailing_context(body: &str) -> (&str, Option<Map<String, Value>>) {
    let trimmed = body.trim_end();
    if let Some(head) = trimmed.strip_suffix(" []") {
        return (head.trim_end(), None);
    }
    if !trimmed.ends_with('}') {
        return (body, None);
    }
    // Try candidate openings from the right; a few attempts cover nested
    // objects without going quadratic on pathological lines.
    for (idx, _) in trimmed.match_indices(" {").collect::<Vec<_>>().into_iter().rev().take(8) {
        if let Ok(map) = serde_json::from_str::<Map<String, Value>>(&trimmed[idx + 1..]) {
            return (trimmed[..idx].trim_end(), Some(map));
        }
    }
    (body, None)
}

/// Infer a level from a severity marker embedded in message text, e.g.
/// `PHP Fatal error:`, `Warning:`, `RuntimeException:`.
pub fn infer_level(text: &str) -> Option<&'static str> {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    let re = MARKER_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:php\s+)?(?P<marker>catchable fatal error|fatal error|parse error|warning|notice|deprecated|error|[a-z_\\]*exception)\s*:",
        )
        .expect("marker regex")
    });

    let caps = re.captures(text)?;
    let marker = caps["marker"].to_lowercase();
    Some(match marker.as_str() {
        "warning" => "warning",
        "notice" | "deprecated" => "notice",
        _ => "error",
    })
}

/// Cap `text` at `max` bytes on a char boundary. The truncation marker is
/// appended when anything was cut or `force_marker` is set; otherwise
/// trailing whitespace is trimmed.
fn truncate_entry(text: &mut String, max: usize, force_marker: bool) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    } else if !force_marker {
        let len = text.trim_end().len();
        text.truncate(len);
        return;
    }
    let len = text.trim_end().len();
    text.truncate(len);
    text.push_str(constants::TRUNCATION_MARKER);
}

// =============================================================================
// Assemblers
// =============================================================================

/// Assembles entries from lines in forward (oldest-first) order.
#[derive(Debug)]
pub struct ForwardAssembler {
    config: ParseConfig,
    pending: Option<LegacyBlock>,
    ready: VecDeque<LogEntry>,
    counters: ParseCounters,
}

impl ForwardAssembler {
    pub fn new(config: ParseConfig) -> Self {
        Self {
            config,
            pending: None,
            ready: VecDeque::new(),
            counters: ParseCounters::default(),
        }
    }

    /// Feed the next physical line.
    pub fn push_line(&mut self, line: &str) {
        self.counters.lines += 1;
        let Some(classified) = classify_line(line) else {
            // Blank lines inside a block are kept verbatim.
            if let Some(block) = self.pending.as_mut() {
                block.push_line(line, self.config.max_entry_size);
            }
            return;
        };
        match classified {
            ClassifiedLine::Structured(record) => {
                self.flush();
                if let Some(entry) = entry_from_record(record, line, &self.config) {
                    self.ready.push_back(entry);
                }
            }
            ClassifiedLine::Legacy(LegacyLine::Start { stamp, rest }) => {
                self.flush();
                self.pending = Some(LegacyBlock::open(line, stamp, rest));
            }
            ClassifiedLine::Legacy(LegacyLine::Text { text, malformed }) => {
                if malformed {
                    self.counters.malformed += 1;
                }
                match self.pending.as_mut() {
                    Some(block) => block.push_line(text, self.config.max_entry_size),
                    None => {
                        if let Some(entry) = entry_from_text(text, &self.config) {
                            self.ready.push_back(entry);
                        }
                    }
                }
            }
        }
    }

    /// Signal end of input: the pending block is finalised.
    pub fn finish(&mut self) {
        self.flush();
    }

    /// Next completed entry, if any.
    pub fn pop(&mut self) -> Option<LogEntry> {
        self.ready.pop_front()
    }

    pub fn counters(&self) -> ParseCounters {
        self.counters
    }

    fn flush(&mut self) {
        if let Some(block) = self.pending.take() {
            if let Some(entry) = block.finish(&self.config) {
                self.ready.push_back(entry);
            }
        }
    }
}

/// Assembles entries from lines in reverse (newest-first) order.
///
/// Continuation lines arrive before the `Start` line they belong to, so
/// they are buffered until a `Start` claims them. A structured line or the
/// beginning of the file releases them as standalone text entries, exactly
/// as the forward assembler would have seen them.
///
/// Until the line preceding a run of text is seen, every line of the run may
/// still become its own entry, so the whole run is held. Memory is bounded
/// by the longest run of unbracketed lines, not by `max_entry_size`.
#[derive(Debug)]
pub struct ReverseAssembler {
    config: ParseConfig,
    /// Buffered text and blank lines in forward order (oldest at the front).
    tail: VecDeque<String>,
    ready: VecDeque<LogEntry>,
    counters: ParseCounters,
}

impl ReverseAssembler {
    pub fn new(config: ParseConfig) -> Self {
        Self {
            config,
            tail: VecDeque::new(),
            ready: VecDeque::new(),
            counters: ParseCounters::default(),
        }
    }

    /// Feed the previous physical line (moving towards the file start).
    pub fn push_line(&mut self, line: &str) {
        self.counters.lines += 1;
        let Some(classified) = classify_line(line) else {
            // Blank: part of the block above it, if any; dropped as an orphan.
            self.tail.push_front(line.to_string());
            return;
        };
        match classified {
            ClassifiedLine::Structured(record) => {
                self.release_orphans();
                if let Some(entry) = entry_from_record(record, line, &self.config) {
                    self.ready.push_back(entry);
                }
            }
            ClassifiedLine::Legacy(LegacyLine::Start { stamp, rest }) => {
                let mut block = LegacyBlock::open(line, stamp, rest);
                block.continuation = std::mem::take(&mut self.tail);
                block = self.trim_block(block);
                if let Some(entry) = block.finish(&self.config) {
                    self.ready.push_back(entry);
                }
            }
            ClassifiedLine::Legacy(LegacyLine::Text { text, malformed }) => {
                if malformed {
                    self.counters.malformed += 1;
                }
                self.tail.push_front(text.to_string());
            }
        }
    }

    /// Signal that the beginning of the file was reached.
    pub fn finish(&mut self) {
        self.release_orphans();
    }

    /// Next completed entry, newest first.
    pub fn pop(&mut self) -> Option<LogEntry> {
        self.ready.pop_front()
    }

    pub fn counters(&self) -> ParseCounters {
        self.counters
    }

    /// Make the buffered continuation agree with what forward assembly keeps:
    /// forward stops appending once the message exceeds the cap.
    fn trim_block(&self, mut block: LegacyBlock) -> LegacyBlock {
        let max = self.config.max_entry_size;
        let mut kept = VecDeque::new();
        let mut bytes = 0;
        while let Some(line) = block.continuation.pop_front() {
            if block.rest.len() + bytes > max {
                block.dropped = true;
                break;
            }
            bytes += line.len() + 1;
            kept.push_back(line);
        }
        if !block.continuation.is_empty() {
            block.dropped = true;
        }
        block.continuation = kept;
        block.continuation_bytes = bytes;
        block
    }

    fn release_orphans(&mut self) {
        // Newest first, matching the order entries leave this assembler.
        while let Some(text) = self.tail.pop_back() {
            if let Some(entry) = entry_from_text(&text, &self.config) {
                self.ready.push_back(entry);
            }
        }
    }
}

// =============================================================================
// Timestamp sniffing
// =============================================================================

/// Find and parse the first recognisable timestamp in `text`.
///
/// Used for legacy bracket stamps, record `timestamp` strings, stray text
/// lines, and user-supplied time bounds. Zone-less timestamps are taken as
/// UTC. Patterns are tried from most to least precise so a higher
/// confidence match wins on the same text.
pub fn sniff_timestamp(text: &str) -> Option<DateTime<Utc>> {
    struct Sniffer {
        re: Regex,
        parse: fn(&str) -> Option<DateTime<Utc>>,
    }

    static SNIFFERS: OnceLock<Vec<Sniffer>> = OnceLock::new();

    let sniffers = SNIFFERS.get_or_init(|| {
        fn re(pat: &str) -> Regex {
            Regex::new(pat).expect("sniff_timestamp: invalid regex")
        }

        fn naive(s: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
            formats
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|ndt| ndt.and_utc())
        }

        vec![
            // RFC 3339 / ISO 8601 with zone: 2024-01-15T14:30:22.123+05:30
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})"),
                parse: |s| {
                    let mut fixed = s.replacen(' ', "T", 1).replace(',', ".");
                    // Normalise `+0530` to `+05:30`.
                    let tail = &fixed[fixed.len().saturating_sub(5)..];
                    if (tail.starts_with('+') || tail.starts_with('-')) && !tail.contains(':') {
                        let at = fixed.len() - 2;
                        fixed.insert(at, ':');
                    }
                    DateTime::parse_from_rfc3339(&fixed).ok().map(|dt| dt.into())
                },
            },
            // ISO without zone: 2024-01-15 14:30:22[.123] / 2024-01-15T14:30
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2}(?:[.,]\d+)?)?"),
                parse: |s| {
                    let s = s.replace('T', " ").replace(',', ".");
                    naive(&s, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"])
                },
            },
            // Slash year-first: 2024/01/15 14:30:22
            Sniffer {
                re: re(r"\d{4}/\d{2}/\d{2}[ T]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?"),
                parse: |s| {
                    let s = s.replace('/', "-").replace('T', " ");
                    naive(&s, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"])
                },
            },
            // PHP error_log: 15-Jan-2024 14:30:22 (zone name ignored)
            Sniffer {
                re: re(r"\d{2}-[A-Za-z]{3}-\d{4} \d{2}:\d{2}:\d{2}"),
                parse: |s| naive(s, &["%d-%b-%Y %H:%M:%S"]),
            },
            // Dot day-first: 15.01.2024 14:30:22[.123]
            Sniffer {
                re: re(r"\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?"),
                parse: |s| {
                    naive(s, &["%d.%m.%Y %H:%M:%S%.f", "%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"])
                },
            },
            // Slash-delimited: MM/DD/YYYY or DD/MM/YYYY, seconds optional.
            //   first field > 12  -> day-first
            //   second field > 12 -> month-first
            //   both <= 12        -> month-first, day-first as fallback
            Sniffer {
                re: re(r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}(?::\d{2})?"),
                parse: |s| {
                    let mut parts = s.splitn(3, '/');
                    let first = parts.next()?.parse::<u32>().ok()?;
                    let second = parts.next()?.parse::<u32>().ok()?;
                    let us = ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
                    let gb = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
                    if first > 12 {
                        naive(s, &gb)
                    } else if second > 12 {
                        naive(s, &us)
                    } else {
                        naive(s, &us).or_else(|| naive(s, &gb))
                    }
                },
            },
            // Compact ISO: 20240115T143022
            Sniffer {
                re: re(r"\d{8}T\d{6}"),
                parse: |s| naive(s, &["%Y%m%dT%H%M%S"]),
            },
            // Date only: 2024-01-15 (midnight UTC)
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}"),
                parse: |s| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|ndt| ndt.and_utc())
                },
            },
        ]
    });

    sniffers.iter().find_map(|sniffer| {
        sniffer
            .re
            .find(text)
            .and_then(|m| (sniffer.parse)(m.as_str()))
    })
}
