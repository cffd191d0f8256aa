// logsmith - platform/fs.rs
//
// Small filesystem helpers shared by the app layer.

use crate::platform::reader::{ChunkedLines, ReadDirection, ReaderOptions};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

/// Read up to `max_lines` non-blank lines from the start of a file for
/// format detection. Invalid UTF-8 is replaced, never an error.
pub fn read_first_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let options = ReaderOptions {
        // The sample only needs the head of the file; never map it whole.
        chunked_threshold: 0,
        chunk_size: 64 * 1024,
    };
    let mut lines = Vec::with_capacity(max_lines);
    for line in ChunkedLines::open(path, ReadDirection::Forward, options)? {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push(line);
        if lines.len() >= max_lines {
            break;
        }
    }
    Ok(lines)
}

/// Modification time of `metadata` in UTC, if the platform reports one.
pub fn modified_utc(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Truncate the file at `path` to zero bytes without replacing it, so
/// writers holding it open in append mode keep writing to the same inode.
pub fn truncate_file(path: &Path) -> io::Result<()> {
    OpenOptions::new().write(true).open(path)?.set_len(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_first_lines_skips_blanks_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "\n\none\n\ntwo\nthree\n").unwrap();
        assert_eq!(read_first_lines(&path, 2).unwrap(), ["one", "two"]);
    }

    #[test]
    fn test_truncate_file_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "content\n").unwrap();
        truncate_file(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(modified_utc(&fs::metadata(&path).unwrap()).is_some());
    }
}
