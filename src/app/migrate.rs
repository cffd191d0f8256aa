// logsmith - app/migrate.rs
//
// In-place conversion of a legacy or mixed log file to record format.
//
// The file is streamed forward in windows and rewritten into a temp file
// next to it; the temp file then replaces the original (write -> temp,
// rename -> final), so a crash or error mid-migration never corrupts the
// original. Structured lines are copied unchanged, which makes a second
// migration of the same file byte-identical.
//
// Not safe against a concurrent writer: lines appended between the start of
// the read and the final rename are lost, and a writer holding the old file
// open keeps writing to the replaced inode.

use crate::app::files::LogFileSet;
use crate::core::model::{LogEntry, MigrationStats};
use crate::core::parser::{
    classify_line, entry_from_text, ClassifiedLine, LegacyBlock, LegacyLine, ParseConfig,
};
use crate::platform::config::EngineConfig;
use crate::platform::reader::{ChunkedLines, ReadDirection, ReaderOptions};
use crate::util::constants;
use crate::util::error::{EngineError, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// Migration settings.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Keep the original as `<name>.<YYYYmmddHHMMSS>.bak`.
    pub backup: bool,
    /// Read window.
    pub chunk_size: usize,
    /// Cap on one converted legacy block.
    pub max_entry_size: usize,
}

impl MigrateOptions {
    pub fn from_config(config: &EngineConfig, backup: bool) -> Self {
        Self {
            backup,
            chunk_size: config.chunk_size,
            max_entry_size: config.max_entry_size,
        }
    }
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            backup: true,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            max_entry_size: constants::DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

/// Shape of one converted line.
#[derive(Serialize)]
struct NormalizedRecord<'a> {
    timestamp: String,
    level: &'a str,
    message: &'a Value,
    context: Value,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

/// Migrate the whitelisted file `name`.
pub fn migrate_file(files: &LogFileSet, name: &str, options: &MigrateOptions) -> Result<MigrationStats> {
    let path = files.resolve(name)?;
    migrate(&path, options)
}

/// Rewrite `path` in record format.
pub fn migrate(path: &Path, options: &MigrateOptions) -> Result<MigrationStats> {
    let started = Instant::now();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let metadata = std::fs::metadata(path).map_err(EngineError::io(path, "stat"))?;

    let mut temp = tempfile::Builder::new()
        .prefix(constants::MIGRATION_TEMP_PREFIX)
        .tempfile_in(parent)
        .map_err(EngineError::io(parent, "create temp file"))?;

    let mut stats = {
        let mut out = BufWriter::new(temp.as_file_mut());
        let stats = convert(path, &mut out, options)?;
        out.flush().map_err(EngineError::io(path, "write temp file"))?;
        stats
    };

    temp.as_file()
        .sync_all()
        .map_err(EngineError::io(temp.path(), "sync temp file"))?;
    std::fs::set_permissions(temp.path(), metadata.permissions())
        .map_err(EngineError::io(temp.path(), "set permissions"))?;

    stats.backup_path = options.backup.then(|| backup_path_for(path));
    replace_original(temp, path, stats.backup_path.as_deref())?;

    stats.duration_seconds = started.elapsed().as_secs_f64();

    tracing::info!(
        file = %path.display(),
        total = stats.total_lines,
        converted = stats.converted_lines,
        passthrough = stats.passthrough_lines,
        errors = stats.errors,
        backup = stats.backup_path.is_some(),
        "Migration complete"
    );

    Ok(stats)
}

/// Move the finished temp file over `path`, first renaming the original to
/// `backup` when given. On failure the original is back at `path` and the
/// temp file is removed.
fn replace_original(temp: NamedTempFile, path: &Path, backup: Option<&Path>) -> Result<()> {
    let Some(backup) = backup else {
        return temp
            .persist(path)
            .map(drop)
            .map_err(|e| EngineError::io(path, "replace")(e.error));
    };
    std::fs::rename(path, backup).map_err(EngineError::io(path, "backup"))?;
    if let Err(e) = temp.persist(path) {
        if let Err(restore) = std::fs::rename(backup, path) {
            tracing::error!(
                file = %path.display(),
                backup = %backup.display(),
                error = %restore,
                "Could not restore original after failed migration; original is at the backup path"
            );
        }
        return Err(EngineError::io(path, "replace")(e.error));
    }
    Ok(())
}

/// Stream `path` into `out`, converting as it goes.
fn convert<W: Write>(path: &Path, out: &mut W, options: &MigrateOptions) -> Result<MigrationStats> {
    let parse = ParseConfig {
        max_entry_size: options.max_entry_size,
        fallback_time: Utc::now(),
    };
    let reader_options = ReaderOptions {
        chunk_size: options.chunk_size,
        chunked_threshold: 0,
    };
    let mut lines = ChunkedLines::open(path, ReadDirection::Forward, reader_options)
        .map_err(EngineError::io(path, "open"))?;

    let mut stats = MigrationStats::default();
    let mut pending: Option<LegacyBlock> = None;

    while let Some(line) = lines.next() {
        let line = line.map_err(EngineError::io(path, "read"))?;
        stats.total_lines += 1;
        if lines.last_line_lossy() {
            stats.errors += 1;
        }

        match classify_line(&line) {
            None => {
                if let Some(block) = pending.as_mut() {
                    block.push_line(&line, parse.max_entry_size);
                }
            }
            Some(ClassifiedLine::Structured(_)) => {
                flush_block(&mut pending, out, &parse, &mut stats, path)?;
                writeln!(out, "{line}").map_err(EngineError::io(path, "write temp file"))?;
                stats.passthrough_lines += 1;
            }
            Some(ClassifiedLine::Legacy(LegacyLine::Start { stamp, rest })) => {
                flush_block(&mut pending, out, &parse, &mut stats, path)?;
                pending = Some(LegacyBlock::open(&line, stamp, rest));
            }
            Some(ClassifiedLine::Legacy(LegacyLine::Text { text, malformed })) => {
                if malformed {
                    stats.errors += 1;
                    tracing::debug!(
                        file = %path.display(),
                        line = stats.total_lines,
                        preview = crate::util::logging::preview(text),
                        "Undecodable record kept as text"
                    );
                }
                match pending.as_mut() {
                    Some(block) => block.push_line(text, parse.max_entry_size),
                    None => {
                        if let Some(entry) = entry_from_text(text, &parse) {
                            write_record(out, &entry, path)?;
                            stats.converted_lines += 1;
                        }
                    }
                }
            }
        }
    }
    flush_block(&mut pending, out, &parse, &mut stats, path)?;
    Ok(stats)
}

fn flush_block<W: Write>(
    pending: &mut Option<LegacyBlock>,
    out: &mut W,
    parse: &ParseConfig,
    stats: &mut MigrationStats,
    path: &Path,
) -> Result<()> {
    let Some(block) = pending.take() else {
        return Ok(());
    };
    if block.is_truncated() {
        tracing::warn!(file = %path.display(), "Legacy block exceeded the entry cap and was truncated");
    }
    if let Some(entry) = block.finish(parse) {
        write_record(out, &entry, path)?;
        stats.converted_lines += 1;
    }
    Ok(())
}

fn write_record<W: Write>(out: &mut W, entry: &LogEntry, path: &Path) -> Result<()> {
    let record = NormalizedRecord {
        timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        level: &entry.level,
        message: &entry.message,
        context: Value::Object(entry.context.clone().unwrap_or_default()),
        extra: &entry.extra,
    };
    serde_json::to_writer(&mut *out, &record).map_err(|e| EngineError::Io {
        path: path.to_path_buf(),
        operation: "write temp file",
        source: e.into(),
    })?;
    out.write_all(b"\n")
        .map_err(EngineError::io(path, "write temp file"))
}

/// `<dir>/<name>.<YYYYmmddHHMMSS>.bak`, with a counter when that name is
/// already taken.
fn backup_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let ext = constants::BACKUP_EXTENSION;
    let mut candidate = path.with_file_name(format!("{name}.{stamp}.{ext}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{name}.{stamp}-{n}.{ext}"));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "[2024-01-01 10:00:00] local.INFO: Start\n\
                          [2024-01-01 10:01:00] local.ERROR: PHP Fatal error: X {\"user\":5}\n\
                          #0 foo()\n\
                          #1 bar()\n\
                          {\"timestamp\":\"2024-01-01T10:01:30Z\",\"level\":\"debug\",\"message\":\"already json\"}\n\
                          {\"message\": not json}\n\
                          [2024-01-01 10:02:00] Done\n";

    fn opts(backup: bool, chunk_size: usize) -> MigrateOptions {
        MigrateOptions {
            backup,
            chunk_size,
            max_entry_size: constants::DEFAULT_MAX_ENTRY_SIZE,
        }
    }

    fn no_temp_files(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().all(|e| {
            !e.unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(constants::MIGRATION_TEMP_PREFIX)
        })
    }

    #[test]
    fn test_converts_blocks_and_passes_records_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laravel.log");
        std::fs::write(&path, LEGACY).unwrap();

        let stats = migrate(&path, &opts(false, 7)).unwrap();
        assert_eq!(stats.total_lines, 7);
        assert_eq!(stats.converted_lines, 4);
        assert_eq!(stats.passthrough_lines, 1);
        assert_eq!(stats.errors, 1);
        assert!(stats.backup_path.is_none());

        let output = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            r#"{"timestamp":"2024-01-01T10:00:00Z","level":"info","message":"Start","context":{},"channel":"local"}"#
        );
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["level"], "error");
        assert_eq!(second["message"], "PHP Fatal error: X\n#0 foo()\n#1 bar()");
        assert_eq!(second["context"]["user"], 5);
        assert_eq!(
            lines[2],
            r#"{"timestamp":"2024-01-01T10:01:30Z","level":"debug","message":"already json"}"#
        );
        let fallback: Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(fallback["message"], "{\"message\": not json}");
        assert!(no_temp_files(dir.path()));
    }

    #[test]
    fn test_second_migration_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laravel.log");
        std::fs::write(&path, LEGACY).unwrap();

        migrate(&path, &opts(false, 1 << 20)).unwrap();
        let first = std::fs::read(&path).unwrap();
        let stats = migrate(&path, &opts(false, 3)).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(stats.converted_lines, 0);
        assert_eq!(stats.passthrough_lines, 5);
    }

    #[test]
    fn test_backup_keeps_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laravel.log");
        std::fs::write(&path, LEGACY).unwrap();

        let stats = migrate(&path, &opts(true, 64)).unwrap();
        let backup = stats.backup_path.expect("backup requested");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), LEGACY);
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("laravel.log."), "{name}");
        assert!(name.ends_with(".bak"), "{name}");
        assert_ne!(std::fs::read_to_string(&path).unwrap(), LEGACY);
    }

    #[test]
    fn test_missing_file_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = migrate(&dir.path().join("absent.log"), &opts(true, 64)).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
        assert!(no_temp_files(dir.path()));
    }

    #[test]
    fn test_invalid_utf8_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.log");
        std::fs::write(&path, b"[2024-01-01 10:00:00] bad \xff byte\n").unwrap();
        let stats = migrate(&path, &opts(false, 8)).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.converted_lines, 1);
    }

    #[test]
    fn test_literal_replacement_char_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.log");
        std::fs::write(&path, "[2024-01-01 10:00:00] got \u{fffd} from upstream\n").unwrap();
        let stats = migrate(&path, &opts(false, 8)).unwrap();
        assert_eq!(stats.errors, 0);
        let output = std::fs::read_to_string(&path).unwrap();
        let record: Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(record["message"], "got \u{fffd} from upstream");
    }

    #[test]
    fn test_blank_lines_inside_block_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laravel.log");
        std::fs::write(
            &path,
            "\n[2024-01-01 10:00:00] local.ERROR: Boom\nfirst\n\nthird\n[2024-01-01 10:01:00] local.INFO: After\n",
        )
        .unwrap();

        let stats = migrate(&path, &opts(false, 5)).unwrap();
        assert_eq!(stats.total_lines, 6);
        assert_eq!(stats.converted_lines, 2);

        let output = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], "Boom\nfirst\n\nthird");
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["message"], "After");
    }

    #[test]
    fn test_read_failure_leaves_target_and_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("not-a-file.log");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("inner"), "keep").unwrap();

        let err = migrate(&target, &opts(false, 64)).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
        assert!(target.is_dir());
        assert_eq!(std::fs::read_to_string(target.join("inner")).unwrap(), "keep");
        assert!(no_temp_files(dir.path()));
    }

    fn staged_temp(dir: &Path, content: &str) -> NamedTempFile {
        let mut temp = tempfile::Builder::new()
            .prefix(constants::MIGRATION_TEMP_PREFIX)
            .tempfile_in(dir)
            .unwrap();
        temp.write_all(content.as_bytes()).unwrap();
        temp
    }

    #[test]
    fn test_failed_replace_without_backup_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, LEGACY).unwrap();

        let temp = staged_temp(dir.path(), "converted\n");
        std::fs::remove_file(temp.path()).unwrap();

        let err = replace_original(temp, &path, None).unwrap_err();
        assert!(matches!(err, EngineError::Io { operation: "replace", .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), LEGACY);
        assert!(no_temp_files(dir.path()));
    }

    #[test]
    fn test_failed_replace_restores_original_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let backup = dir.path().join("app.log.20240101000000.bak");
        std::fs::write(&path, LEGACY).unwrap();

        let temp = staged_temp(dir.path(), "converted\n");
        std::fs::remove_file(temp.path()).unwrap();

        let err = replace_original(temp, &path, Some(&backup)).unwrap_err();
        assert!(matches!(err, EngineError::Io { operation: "replace", .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), LEGACY);
        assert!(!backup.exists());
        assert!(no_temp_files(dir.path()));
    }

    #[test]
    fn test_failed_backup_rename_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let backup = dir.path().join("taken.bak");
        std::fs::write(&path, LEGACY).unwrap();
        std::fs::create_dir(&backup).unwrap();
        std::fs::write(backup.join("occupant"), "x").unwrap();

        let temp = staged_temp(dir.path(), "converted\n");
        let err = replace_original(temp, &path, Some(&backup)).unwrap_err();
        assert!(matches!(err, EngineError::Io { operation: "backup", .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), LEGACY);
        assert!(no_temp_files(dir.path()));
    }
}
