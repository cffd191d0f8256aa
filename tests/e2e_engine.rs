// logsmith - tests/e2e_engine.rs
//
// End-to-end tests for the engine operations.
//
// These tests exercise the real filesystem, the chunked reader in both
// directions, real tar.gz output and the CLI binary. Scratch directories
// come from tempfile; modification times are set with filetime.

use chrono::{Duration, Utc};
use logsmith::app::{archive, files::LogFileSet, migrate, paginate};
use logsmith::core::filter::{EntryFilter, SearchQuery};
use logsmith::core::model::{Direction, PageRequest};
use logsmith::platform::config::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

// =============================================================================
// Helpers
// =============================================================================

/// A scratch log directory holding `files`, with a small read window so
/// chunk boundaries fall inside lines.
fn log_dir(files: &[(&str, &str)]) -> (tempfile::TempDir, LogFileSet, EngineConfig) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    let config = EngineConfig {
        log_dir: dir.path().to_path_buf(),
        chunk_size: 13,
        chunked_threshold: 0,
        ..EngineConfig::default()
    };
    let files = LogFileSet::from_config(&config).unwrap();
    (dir, files, config)
}

fn set_age(path: &Path, days: i64) {
    let when = Utc::now() - Duration::days(days);
    let mtime = filetime::FileTime::from_unix_time(when.timestamp(), 0);
    filetime::set_file_mtime(path, mtime).unwrap();
}

fn all_entries(
    files: &LogFileSet,
    name: &str,
    direction: Direction,
    config: &EngineConfig,
) -> Vec<logsmith::core::model::LogEntry> {
    paginate::collect_matching(files, name, direction, &EntryFilter::default(), config, None).unwrap()
}

const LEGACY: &str = "[01/01/2024 10:00] Start\n\
                      [01/01/2024 10:01] PHP Fatal error: X\n\
                      #0 foo()\n\
                      #1 bar()\n\
                      [01/01/2024 10:02] Done\n";

const RECORDS: &str = "{\"timestamp\":\"2024-01-01T10:00:00Z\",\"level\":\"info\",\"message\":\"a\"}\n\
                       {\"timestamp\":\"2024-01-01T10:01:00Z\",\"level\":\"error\",\"message\":\"b\",\"context\":{\"user\":7}}\n\
                       {\"timestamp\":\"2024-01-01T10:02:00Z\",\"level\":\"info\",\"message\":\"c\"}\n";

// =============================================================================
// Parsing and pagination
// =============================================================================

/// Continuation lines join the preceding legacy entry.
#[test]
fn e2e_legacy_stack_trace_is_one_entry() {
    let (_dir, files, config) = log_dir(&[("app.log", LEGACY)]);
    let entries = all_entries(&files, "app.log", Direction::OldestFirst, &config);

    assert_eq!(entries.len(), 3);
    let fatal = entries[1].message_text();
    assert!(fatal.contains("#0 foo()"), "got {fatal:?}");
    assert!(fatal.contains("#1 bar()"), "got {fatal:?}");
    assert_eq!(entries[1].level, "error");
    assert_eq!(entries[0].message_text(), "Start");
    assert_eq!(entries[2].message_text(), "Done");
}

#[test]
fn e2e_level_filter_on_records() {
    let (_dir, files, config) = log_dir(&[("app.log", RECORDS)]);
    let filter = EntryFilter::new(SearchQuery::Any, Some("error"));
    let result = paginate::paginate(
        &files,
        "app.log",
        PageRequest::new(1, 50, Direction::NewestFirst),
        &filter,
        &config,
    )
    .unwrap();

    assert_eq!(result.matched, 1);
    assert_eq!(result.total, 3);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].message_text(), "b");
}

#[test]
fn e2e_second_page_of_size_one() {
    let (_dir, files, config) = log_dir(&[("app.log", RECORDS)]);
    let result = paginate::paginate(
        &files,
        "app.log",
        PageRequest::new(2, 1, Direction::OldestFirst),
        &EntryFilter::default(),
        &config,
    )
    .unwrap();

    assert_eq!(result.matched, 3);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].message_text(), "b");
}

#[test]
fn e2e_field_query_and_conflicting_level_match_nothing() {
    let (_dir, files, config) = log_dir(&[("app.log", RECORDS)]);
    let filter = EntryFilter::new(SearchQuery::parse("level:error", false), Some("warning"));
    let result = paginate::paginate(
        &files,
        "app.log",
        PageRequest::new(1, 10, Direction::NewestFirst),
        &filter,
        &config,
    )
    .unwrap();
    assert_eq!(result.matched, 0);
    assert!(result.entries.is_empty());

    let by_context = EntryFilter::new(SearchQuery::parse("user:7", false), None);
    let result = paginate::paginate(
        &files,
        "app.log",
        PageRequest::new(1, 10, Direction::NewestFirst),
        &by_context,
        &config,
    )
    .unwrap();
    assert_eq!(result.matched, 1);
}

/// Every page in both directions, concatenated, is the full entry list.
#[test]
fn e2e_pagination_is_lossless_on_mixed_file() {
    let mut content = String::new();
    for i in 0..12 {
        content.push_str(&format!("[2024-02-01 08:{i:02}:00] local.INFO: step {i}\n"));
        if i % 4 == 0 {
            content.push_str("#0 /srv/app.php(1): run()\r\n");
        }
        content.push_str(&format!(
            "{{\"timestamp\":\"2024-02-01T09:{i:02}:00Z\",\"level\":\"debug\",\"message\":\"rec {i}\"}}\n"
        ));
    }
    let (_dir, files, config) = log_dir(&[("mixed.log", &content)]);

    let forward = all_entries(&files, "mixed.log", Direction::OldestFirst, &config);
    assert_eq!(forward.len(), 24);

    for direction in [Direction::OldestFirst, Direction::NewestFirst] {
        let mut paged = Vec::new();
        for page in 1..=5 {
            let result = paginate::paginate(
                &files,
                "mixed.log",
                PageRequest::new(page, 7, direction),
                &EntryFilter::default(),
                &config,
            )
            .unwrap();
            assert_eq!(result.matched, 24);
            paged.extend(result.entries);
        }
        if direction == Direction::NewestFirst {
            paged.reverse();
        }
        assert_eq!(paged, forward, "{direction:?}");
    }
}

/// A run of unbracketed lines longer than the entry cap pages the same way
/// in both orders.
#[test]
fn e2e_newest_first_keeps_long_plain_run() {
    let mut content = String::from("{\"timestamp\":\"2024-03-01T00:00:00Z\",\"message\":\"head\"}\n");
    for i in 0..300 {
        content.push_str(&format!("worker heartbeat {i:04}\n"));
    }
    let (_dir, _, config) = log_dir(&[("plain.log", &content)]);
    let config = EngineConfig {
        max_entry_size: 512,
        ..config
    };
    let files = LogFileSet::from_config(&config).unwrap();

    let newest = paginate::paginate(
        &files,
        "plain.log",
        PageRequest::new(1, 3, Direction::NewestFirst),
        &EntryFilter::default(),
        &config,
    )
    .unwrap();
    assert_eq!(newest.matched, 301);
    let messages: Vec<_> = newest.entries.iter().map(|e| e.message.clone()).collect();
    assert_eq!(
        messages,
        ["worker heartbeat 0299", "worker heartbeat 0298", "worker heartbeat 0297"]
    );

    // Undated lines take the scan's fallback time, so compare messages.
    let collect_messages = |direction| -> Vec<_> {
        all_entries(&files, "plain.log", direction, &config)
            .into_iter()
            .map(|e| e.message)
            .collect()
    };
    let mut backward = collect_messages(Direction::NewestFirst);
    backward.reverse();
    assert_eq!(backward.len(), 301);
    assert_eq!(backward, collect_messages(Direction::OldestFirst));
}

#[test]
fn e2e_rejects_names_outside_whitelist() {
    let (_dir, files, config) = log_dir(&[("app.log", RECORDS), ("secret.txt", "x\n")]);
    for name in ["secret.txt", "../app.log", "sub/app.log"] {
        let err = paginate::paginate(
            &files,
            name,
            PageRequest::new(1, 10, Direction::NewestFirst),
            &EntryFilter::default(),
            &config,
        )
        .unwrap_err();
        assert!(
            matches!(err, logsmith::util::error::EngineError::InvalidInput { .. }),
            "{name}: {err:?}"
        );
    }
    let names: Vec<_> = files.discover().unwrap().into_iter().map(|f| f.name).collect();
    assert_eq!(names, ["app.log"]);
}

// =============================================================================
// Migration
// =============================================================================

#[test]
fn e2e_migration_preserves_entries_and_is_idempotent() {
    let (dir, files, config) = log_dir(&[("app.log", LEGACY)]);
    let before = all_entries(&files, "app.log", Direction::OldestFirst, &config);

    let options = migrate::MigrateOptions::from_config(&config, true);
    let stats = migrate::migrate_file(&files, "app.log", &options).unwrap();
    assert_eq!(stats.converted_lines, 3);
    assert_eq!(stats.errors, 0);

    let after = all_entries(&files, "app.log", Direction::OldestFirst, &config);
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.timestamp, new.timestamp);
        assert_eq!(old.level, new.level);
        assert_eq!(old.message_text(), new.message_text());
    }

    let backups: Vec<PathBuf> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "bak"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), LEGACY);

    let migrated = fs::read(dir.path().join("app.log")).unwrap();
    let again = migrate::migrate_file(
        &files,
        "app.log",
        &migrate::MigrateOptions::from_config(&config, false),
    )
    .unwrap();
    assert_eq!(again.converted_lines, 0);
    assert_eq!(again.passthrough_lines, 3);
    assert_eq!(fs::read(dir.path().join("app.log")).unwrap(), migrated);
}

// =============================================================================
// Archive manager
// =============================================================================

/// Only the file older than the cut-off is archived and removed.
#[test]
fn e2e_archive_takes_only_old_files() {
    let (dir, files, _config) = log_dir(&[("recent.log", "recent\n"), ("old.log", "old\n")]);
    set_age(&dir.path().join("recent.log"), 10);
    set_age(&dir.path().join("old.log"), 40);

    let paths = files.resolve_all(&["recent.log", "old.log"]).unwrap();
    let archive_dir = dir.path().join("archives");
    let outcome = archive::archive_older_than(&paths, 30, &archive_dir).unwrap();

    assert_eq!(outcome.archived, ["old.log"]);
    assert!(outcome.failed.is_empty());
    assert!(outcome.originals_removed);
    assert!(dir.path().join("recent.log").exists());
    assert!(!dir.path().join("old.log").exists());

    let archive_path = outcome.archive_path.unwrap();
    assert!(archive_path.starts_with(&archive_dir));
    let name = archive_path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("logs-archive-") && name.ends_with(".tar.gz"), "{name}");

    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(fs::File::open(&archive_path).unwrap()));
    let names: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["old.log"]);
}

#[test]
fn e2e_stats_and_cross_file_search() {
    let (_dir, files, config) = log_dir(&[("a.log", LEGACY), ("b.log", RECORDS)]);

    let stats = archive::stats(&files.resolve("b.log").unwrap(), &config).unwrap();
    assert_eq!(stats.line_count, 3);
    assert!(!stats.line_count_estimated);
    assert_eq!(stats.structured_ratio, 1.0);
    assert_eq!(stats.level_distribution["info"], 2);

    let paths = files.resolve_all(&["a.log", "b.log"]).unwrap();
    let results = archive::search_across_files("foo()", &paths, 1, false, 10).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].file, "a.log");
    assert_eq!(results[0].hits.len(), 1);
    assert_eq!(results[0].hits[0].line_number, 3);
    assert_eq!(results[0].hits[0].before, ["[01/01/2024 10:01] PHP Fatal error: X"]);
    assert_eq!(results[0].hits[0].after, ["#1 bar()"]);
    assert!(results[1].hits.is_empty());
}

#[test]
fn e2e_clear_empties_file_and_keeps_it_readable() {
    let (_dir, files, config) = log_dir(&[("app.log", RECORDS)]);
    let path = files.resolve("app.log").unwrap();
    assert_eq!(archive::clear(&[path.clone()]).unwrap(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);

    let result = paginate::paginate(
        &files,
        "app.log",
        PageRequest::new(1, 10, Direction::NewestFirst),
        &EntryFilter::default(),
        &config,
    )
    .unwrap();
    assert_eq!(result.total, 0);
    assert_eq!(result.total_pages(), 0);
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn e2e_cli_page_prints_json() {
    let (dir, _files, _config) = log_dir(&[("app.log", RECORDS)]);
    let output = Command::new(env!("CARGO_BIN_EXE_logsmith"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--dir")
        .arg(dir.path())
        .args(["page", "app.log", "--size", "2", "--level", "info"])
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["matched"], 2);
    assert_eq!(json["entries"][0]["message"], "c");
    assert_eq!(json["direction"], "newest_first");
}

#[test]
fn e2e_cli_unknown_file_fails() {
    let (dir, _files, _config) = log_dir(&[("app.log", RECORDS)]);
    let output = Command::new(env!("CARGO_BIN_EXE_logsmith"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--dir")
        .arg(dir.path())
        .args(["page", "missing.log"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
