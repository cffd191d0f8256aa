// logsmith - core/export.rs
//
// CSV, JSON and plain-text export of filtered log entries.
// Core layer: writes to any Write implementation.

use crate::core::model::LogEntry;
use crate::util::constants::MAX_EXPORT_ENTRIES;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Output representation for `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Plain,
}

/// Export `entries` in `format`. `export_path` only labels errors.
pub fn export<W: Write>(
    format: ExportFormat,
    entries: &[LogEntry],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    match format {
        ExportFormat::Csv => export_csv(entries, writer, export_path),
        ExportFormat::Json => export_json(entries, writer, export_path),
        ExportFormat::Plain => export_plain(entries, writer, export_path),
    }
}

fn check_limit(entries: &[LogEntry]) -> Result<(), ExportError> {
    if entries.len() > MAX_EXPORT_ENTRIES {
        return Err(ExportError::TooManyEntries {
            count: entries.len(),
            max: MAX_EXPORT_ENTRIES,
        });
    }
    Ok(())
}

/// Export entries to CSV.
///
/// Writes: timestamp, level, message, context
pub fn export_csv<W: Write>(
    entries: &[LogEntry],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_limit(entries)?;
    let csv_err = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(["timestamp", "level", "message", "context"])
        .map_err(csv_err)?;

    for entry in entries {
        csv_writer
            .write_record([
                entry.timestamp.to_rfc3339().as_str(),
                entry.level.as_str(),
                &*entry.message_text(),
                entry.context_text().as_str(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(entries.len())
}

/// Export entries to JSON (array of objects).
pub fn export_json<W: Write>(
    entries: &[LogEntry],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_limit(entries)?;
    serde_json::to_writer_pretty(writer, entries).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(entries.len())
}

/// Export entries as text, one block per entry:
/// `[timestamp] LEVEL: message {context}`.
pub fn export_plain<W: Write>(
    entries: &[LogEntry],
    mut writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    check_limit(entries)?;
    let io_err = |e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    };
    for entry in entries {
        write!(
            writer,
            "[{}] {}: {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level.to_uppercase(),
            entry.message_text()
        )
        .map_err(io_err)?;
        if entry.context.is_some() {
            write!(writer, " {}", entry.context_text()).map_err(io_err)?;
        }
        writeln!(writer).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(entries.len())
}
