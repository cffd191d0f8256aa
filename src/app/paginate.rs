// logsmith - app/paginate.rs
//
// Filtered pagination over one file. Every call scans the whole file so
// `total` and `matched` are exact; only the requested page is kept in
// memory.

use crate::app::files::LogFileSet;
use crate::app::scan::EntryStream;
use crate::core::filter::EntryFilter;
use crate::core::model::{Direction, LogEntry, MatchResult, PageRequest};
use crate::platform::config::EngineConfig;
use crate::util::error::Result;
use std::path::Path;
use std::time::Instant;

/// One page of entries from the whitelisted file `name`.
pub fn paginate(
    files: &LogFileSet,
    name: &str,
    request: PageRequest,
    filter: &EntryFilter,
    config: &EngineConfig,
) -> Result<MatchResult> {
    let path = files.resolve(name)?;
    paginate_path(&path, request, filter, config)
}

/// `paginate` on an already-resolved path.
pub fn paginate_path(
    path: &Path,
    request: PageRequest,
    filter: &EntryFilter,
    config: &EngineConfig,
) -> Result<MatchResult> {
    let started = Instant::now();
    let first = request.offset();
    let last = first.saturating_add(request.page_size);

    let mut entries = Vec::with_capacity(request.page_size.min(1024));
    let mut total: u64 = 0;
    let mut matched: u64 = 0;

    for entry in EntryStream::open(path, request.direction, config)? {
        let entry = entry?;
        total += 1;
        if !filter.matches(&entry) {
            continue;
        }
        let index = matched as usize;
        if index >= first && index < last {
            entries.push(entry);
        }
        matched += 1;
    }

    tracing::debug!(
        file = %path.display(),
        page = request.page,
        page_size = request.page_size,
        total,
        matched,
        returned = entries.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Paginated"
    );

    Ok(MatchResult {
        entries,
        total,
        matched,
        page: request.page,
        page_size: request.page_size,
        direction: request.direction,
    })
}

/// All entries of `name` passing `filter`, in `direction` order, stopping
/// after `limit` matches when one is given.
pub fn collect_matching(
    files: &LogFileSet,
    name: &str,
    direction: Direction,
    filter: &EntryFilter,
    config: &EngineConfig,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>> {
    let path = files.resolve(name)?;
    let mut out = Vec::new();
    if limit == Some(0) {
        return Ok(out);
    }
    for entry in EntryStream::open(&path, direction, config)? {
        let entry = entry?;
        if filter.matches(&entry) {
            out.push(entry);
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
    }
    tracing::debug!(file = %path.display(), entries = out.len(), "Collected matching entries");
    Ok(out)
}
