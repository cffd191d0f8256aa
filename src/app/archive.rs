// logsmith - app/archive.rs
//
// File-level maintenance: sampled statistics, truncation, age-based
// archiving into a tar.gz, and line-oriented search across files.
//
// `clear` truncates in place and is not coordinated with writers: a line
// written between a writer's seek and the truncation may survive or be lost.

use crate::core::model::{ArchiveOutcome, FileSearchResult, FileStats, SearchHit};
use crate::core::parser::{classify_line, ClassifiedLine, ForwardAssembler, ParseConfig};
use crate::platform::config::EngineConfig;
use crate::platform::fs;
use crate::platform::reader::{ChunkedLines, ReadDirection, ReaderOptions};
use crate::util::constants;
use crate::util::error::{EngineError, Result};
use chrono::{Duration, Utc};
use flate2::{write::GzEncoder, Compression};
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Window used for sampling and line search; both usually stop early.
const SCAN_WINDOW: usize = 64 * 1024;

fn scan_options() -> ReaderOptions {
    ReaderOptions {
        chunk_size: SCAN_WINDOW,
        chunked_threshold: 0,
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Stats
// =============================================================================

/// Size, line count and level mix of `path`, from the first
/// `config.sample_lines` lines.
///
/// When the sample stops short of EOF the line count is extrapolated from
/// the sample's bytes per line.
pub fn stats(path: &Path, config: &EngineConfig) -> Result<FileStats> {
    let metadata = std::fs::metadata(path).map_err(EngineError::io(path, "stat"))?;
    let size_bytes = metadata.len();

    let mut lines = ChunkedLines::open(path, ReadDirection::Forward, scan_options())
        .map_err(EngineError::io(path, "open"))?;
    let mut assembler = ForwardAssembler::new(ParseConfig {
        max_entry_size: config.max_entry_size,
        ..ParseConfig::default()
    });

    let mut sampled_lines = 0usize;
    let mut sampled_bytes = 0u64;
    let mut non_blank = 0u64;
    let mut structured = 0u64;
    let mut reached_eof = true;

    for line in lines.by_ref() {
        if sampled_lines == config.sample_lines {
            reached_eof = false;
            break;
        }
        let line = line.map_err(EngineError::io(path, "read"))?;
        sampled_lines += 1;
        sampled_bytes += line.len() as u64 + 1;
        match classify_line(&line) {
            Some(ClassifiedLine::Structured(_)) => {
                non_blank += 1;
                structured += 1;
            }
            Some(ClassifiedLine::Legacy(_)) => non_blank += 1,
            None => {}
        }
        assembler.push_line(&line);
    }
    assembler.finish();

    let mut level_distribution = BTreeMap::new();
    while let Some(entry) = assembler.pop() {
        *level_distribution.entry(entry.level).or_insert(0u64) += 1;
    }

    let line_count = if reached_eof || sampled_bytes == 0 {
        sampled_lines as u64
    } else {
        (size_bytes as f64 * sampled_lines as f64 / sampled_bytes as f64).round() as u64
    };

    let structured_ratio = if non_blank == 0 {
        0.0
    } else {
        structured as f64 / non_blank as f64
    };

    tracing::debug!(
        file = %path.display(),
        size_bytes,
        sampled_lines,
        line_count,
        estimated = !reached_eof,
        "Stats computed"
    );

    Ok(FileStats {
        name: file_name_of(path),
        size_bytes,
        modified: fs::modified_utc(&metadata),
        line_count,
        line_count_estimated: !reached_eof,
        sampled_lines,
        structured_ratio,
        level_distribution,
    })
}

// =============================================================================
// Clear
// =============================================================================

/// Truncate every file to zero bytes. Returns how many were cleared; stops
/// at the first failure.
pub fn clear(paths: &[PathBuf]) -> Result<usize> {
    for (done, path) in paths.iter().enumerate() {
        if let Err(e) = fs::truncate_file(path) {
            tracing::warn!(file = %path.display(), cleared = done, error = %e, "Clear failed");
            return Err(EngineError::io(path, "truncate")(e));
        }
        tracing::info!(file = %path.display(), "Cleared");
    }
    Ok(paths.len())
}

// =============================================================================
// Archive
// =============================================================================

/// Move files last modified more than `days` days ago into one
/// `logs-archive-<YYYYmmdd-HHMMSS>.tar.gz` under `archive_dir`.
///
/// Originals are deleted only when every selected file went into the
/// archive. With no candidates nothing is written.
pub fn archive_older_than(paths: &[PathBuf], days: i64, archive_dir: &Path) -> Result<ArchiveOutcome> {
    if days < 0 {
        return Err(EngineError::invalid("days", format!("{days} must be zero or more")));
    }
    let age = Duration::try_days(days)
        .ok_or_else(|| EngineError::invalid("days", format!("{days} is too large")))?;
    let now = Utc::now();
    let cutoff = now - age;

    let mut candidates = Vec::new();
    for path in paths {
        let metadata = std::fs::metadata(path).map_err(EngineError::io(path, "stat"))?;
        match fs::modified_utc(&metadata) {
            Some(mtime) if mtime < cutoff => candidates.push(path),
            Some(_) => {}
            None => tracing::debug!(file = %path.display(), "No modification time; not archived"),
        }
    }

    if candidates.is_empty() {
        tracing::info!(days, "No files old enough to archive");
        return Ok(ArchiveOutcome::default());
    }

    std::fs::create_dir_all(archive_dir).map_err(EngineError::io(archive_dir, "create directory"))?;
    let archive_path = archive_dir.join(format!(
        "{}-{}.{}",
        constants::ARCHIVE_PREFIX,
        now.format("%Y%m%d-%H%M%S"),
        constants::ARCHIVE_EXTENSION
    ));
    let file = File::create(&archive_path).map_err(EngineError::io(&archive_path, "create archive"))?;
    let mut tar = tar::Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));

    let mut outcome = ArchiveOutcome {
        archive_path: Some(archive_path.clone()),
        ..ArchiveOutcome::default()
    };
    for path in &candidates {
        let name = file_name_of(path);
        match File::open(path).and_then(|mut file| tar.append_file(&name, &mut file)) {
            Ok(()) => outcome.archived.push(name),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Could not add file to archive");
                outcome.failed.push((name, e.to_string()));
            }
        }
    }

    let encoder = tar
        .into_inner()
        .map_err(EngineError::io(&archive_path, "write archive"))?;
    let mut writer = encoder
        .finish()
        .map_err(EngineError::io(&archive_path, "write archive"))?;
    std::io::Write::flush(&mut writer).map_err(EngineError::io(&archive_path, "write archive"))?;

    if outcome.failed.is_empty() {
        let mut all_removed = true;
        for path in &candidates {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(file = %path.display(), error = %e, "Archived but could not delete original");
                outcome
                    .failed
                    .push((file_name_of(path), format!("archived but not deleted: {e}")));
                all_removed = false;
            }
        }
        outcome.originals_removed = all_removed;
    } else {
        tracing::warn!(
            failed = outcome.failed.len(),
            "Some files could not be archived; originals kept"
        );
    }

    tracing::info!(
        archive = %archive_path.display(),
        archived = outcome.archived.len(),
        removed = outcome.originals_removed,
        "Archive written"
    );
    Ok(outcome)
}

// =============================================================================
// Cross-file search
// =============================================================================

/// Line search over several files with surrounding context.
///
/// `context_lines` is capped at `MAX_CONTEXT_LINES`. Each file stops after
/// `max_matches_per_file` hits once the last hit's trailing context is
/// complete.
pub fn search_across_files(
    text: &str,
    paths: &[PathBuf],
    context_lines: usize,
    case_sensitive: bool,
    max_matches_per_file: usize,
) -> Result<Vec<FileSearchResult>> {
    if text.is_empty() {
        return Err(EngineError::invalid("search", "search text must not be empty"));
    }
    let context = context_lines.min(constants::MAX_CONTEXT_LINES);
    let cap = max_matches_per_file.clamp(1, constants::MAX_MATCHES_PER_FILE);
    let needle = if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    };

    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let result = search_file(path, &needle, case_sensitive, context, cap)?;
        tracing::debug!(file = %path.display(), hits = result.hits.len(), truncated = result.truncated, "Searched");
        results.push(result);
    }
    Ok(results)
}

fn search_file(
    path: &Path,
    needle: &str,
    case_sensitive: bool,
    context: usize,
    cap: usize,
) -> Result<FileSearchResult> {
    let lines = ChunkedLines::open(path, ReadDirection::Forward, scan_options())
        .map_err(EngineError::io(path, "open"))?;

    let mut hits: Vec<SearchHit> = Vec::new();
    let mut before: VecDeque<String> = VecDeque::with_capacity(context + 1);
    // Index of the first hit whose trailing context is still filling.
    let mut open_from = 0;
    let mut truncated = false;

    for (idx, line) in lines.enumerate() {
        let line = line.map_err(EngineError::io(path, "read"))?;

        if hits.len() == cap && open_from == hits.len() {
            truncated = true;
            break;
        }

        for hit in &mut hits[open_from..] {
            hit.after.push(line.clone());
        }
        while open_from < hits.len() && hits[open_from].after.len() >= context {
            open_from += 1;
        }

        let found = if case_sensitive {
            line.contains(needle)
        } else {
            line.to_lowercase().contains(needle)
        };
        if found && hits.len() < cap {
            hits.push(SearchHit {
                line_number: idx as u64 + 1,
                line: line.clone(),
                before: before.iter().cloned().collect(),
                after: Vec::new(),
            });
            if context == 0 {
                open_from = hits.len();
            }
        }

        if context > 0 {
            if before.len() == context {
                before.pop_front();
            }
            before.push_back(line);
        }
    }

    Ok(FileSearchResult {
        file: file_name_of(path),
        hits,
        truncated,
    })
}
