// logsmith - platform/reader.rs
//
// Lazy line reader over a log file, forwards or backwards.
//
// Two paths with identical output:
//   - files at or below the chunked threshold are memory-mapped and split in
//     one pass;
//   - larger files are read in fixed-size windows. Forward reads carry the
//     trailing partial line into the next window; backward reads keep the
//     leading (possibly partial) line as a pending fragment and prepend the
//     previous window to it.
//
// `\n`, `\r\n` and a lone `\r` all terminate a line. A `\r\n` pair split
// across a window boundary is one terminator in both directions. A trailing
// terminator does not produce an empty final line. Bytes are decoded lossily.
//
// The file length is captured at open: bytes appended afterwards are not
// read.

use crate::util::constants;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

/// Which end of the file lines come from first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirection {
    /// First line first.
    Forward,
    /// Last line first.
    Backward,
}

/// Reader tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Bytes per window on the chunked path.
    pub chunk_size: usize,
    /// Files larger than this use the chunked path.
    pub chunked_threshold: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            chunked_threshold: constants::DEFAULT_CHUNKED_THRESHOLD,
        }
    }
}

enum Mode {
    Mapped {
        map: Option<memmap2::Mmap>,
        ranges: VecDeque<Range<usize>>,
    },
    Forward {
        file: File,
        pos: u64,
        carry: Vec<u8>,
    },
    Backward {
        file: File,
        start: u64,
        pending_fragment: Vec<u8>,
    },
}

/// Iterator of physical lines. Yields `io::Result<String>`; after an error
/// the iterator is exhausted.
pub struct ChunkedLines {
    mode: Mode,
    direction: ReadDirection,
    len: u64,
    chunk_size: usize,
    bytes_read: u64,
    ready: VecDeque<(String, bool)>,
    done: bool,
    last_lossy: bool,
    lossy_lines: u64,
}

impl ChunkedLines {
    /// Open `path` for reading in `direction`.
    pub fn open(path: &Path, direction: ReadDirection, options: ReaderOptions) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let chunk_size = options.chunk_size.max(constants::MIN_CHUNK_SIZE);

        let mode = if len <= options.chunked_threshold {
            let map = if len == 0 {
                None
            } else {
                // SAFETY: the map is read-only and never outlives this reader.
                // A concurrent truncation of the file while mapped is the
                // documented risk of reading live logs this way; appends are
                // harmless because only the first `len` bytes are touched.
                Some(unsafe { memmap2::Mmap::map(&file)? })
            };
            let ranges = match &map {
                Some(m) => {
                    let end = (len as usize).min(m.len());
                    line_ranges(&m[..end]).into()
                }
                None => VecDeque::new(),
            };
            Mode::Mapped { map, ranges }
        } else {
            match direction {
                ReadDirection::Forward => Mode::Forward {
                    file,
                    pos: 0,
                    carry: Vec::new(),
                },
                ReadDirection::Backward => Mode::Backward {
                    file,
                    start: len,
                    pending_fragment: Vec::new(),
                },
            }
        };

        let bytes_read = if matches!(mode, Mode::Mapped { .. }) { len } else { 0 };

        tracing::trace!(
            file = %path.display(),
            len,
            chunked = !matches!(mode, Mode::Mapped { .. }),
            ?direction,
            "Opened line reader"
        );

        Ok(Self {
            mode,
            direction,
            len,
            chunk_size,
            bytes_read,
            ready: VecDeque::new(),
            done: false,
            last_lossy: false,
            lossy_lines: 0,
        })
    }

    /// Bytes read from disk so far. The mapped path counts the whole file.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// File length captured at open.
    pub fn file_len(&self) -> u64 {
        self.len
    }

    /// Whether the line last yielded held invalid UTF-8 that was replaced.
    pub fn last_line_lossy(&self) -> bool {
        self.last_lossy
    }

    /// Lines yielded so far that needed lossy decoding.
    pub fn lossy_lines(&self) -> u64 {
        self.lossy_lines
    }

    /// Read the next window and queue the lines it completes.
    fn fill(&mut self) -> io::Result<()> {
        let chunk = self.chunk_size as u64;
        match &mut self.mode {
            Mode::Mapped { map, ranges } => {
                let range = match self.direction {
                    ReadDirection::Forward => ranges.pop_front(),
                    ReadDirection::Backward => ranges.pop_back(),
                };
                match (range, map.as_ref()) {
                    (Some(r), Some(m)) => self.ready.push_back(decode(&m[r])),
                    _ => self.done = true,
                }
            }

            Mode::Forward { file, pos, carry } => {
                if *pos >= self.len {
                    self.done = true;
                    for line in split_lines(carry) {
                        self.ready.push_back(decode(line));
                    }
                    carry.clear();
                    return Ok(());
                }

                let n = chunk.min(self.len - *pos) as usize;
                let mut buf = std::mem::take(carry);
                let old = buf.len();
                buf.resize(old + n, 0);
                file.seek(SeekFrom::Start(*pos))?;
                file.read_exact(&mut buf[old..])?;
                *pos += n as u64;
                self.bytes_read += n as u64;

                // A window ending in `\r` may be the first half of `\r\n`.
                let region = if *pos < self.len && buf.last() == Some(&b'\r') {
                    &buf[..buf.len() - 1]
                } else {
                    &buf[..]
                };
                match region.iter().rposition(|&b| b == b'\n' || b == b'\r') {
                    Some(i) => {
                        for line in split_lines(&buf[..=i]) {
                            self.ready.push_back(decode(line));
                        }
                        *carry = buf[i + 1..].to_vec();
                    }
                    None => *carry = buf,
                }
            }

            Mode::Backward {
                file,
                start,
                pending_fragment,
            } => {
                if *start == 0 {
                    self.done = true;
                    return Ok(());
                }

                let n = chunk.min(*start) as usize;
                *start -= n as u64;
                let mut combined = vec![0u8; n];
                file.seek(SeekFrom::Start(*start))?;
                file.read_exact(&mut combined)?;
                self.bytes_read += n as u64;
                combined.extend_from_slice(pending_fragment);

                if *start == 0 {
                    for line in split_lines(&combined).into_iter().rev() {
                        self.ready.push_back(decode(line));
                    }
                    pending_fragment.clear();
                    self.done = self.ready.is_empty();
                    return Ok(());
                }

                // Everything after the first terminator is whole lines; the
                // first line may continue into the previous window.
                match first_terminator_end(&combined) {
                    Some(end) => {
                        for line in split_lines(&combined[end..]).into_iter().rev() {
                            self.ready.push_back(decode(line));
                        }
                        combined.truncate(end);
                        *pending_fragment = combined;
                    }
                    None => *pending_fragment = combined,
                }
            }
        }
        Ok(())
    }
}

impl Iterator for ChunkedLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((line, lossy)) = self.ready.pop_front() {
                self.last_lossy = lossy;
                self.lossy_lines += u64::from(lossy);
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fill() {
                self.done = true;
                self.ready.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Split `buf` into lines on `\n`, `\r\n` or `\r`. A trailing terminator
/// does not yield an empty final line.
pub fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    line_ranges(buf).into_iter().map(|r| &buf[r]).collect()
}

fn line_ranges(buf: &[u8]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'\n' => {
                out.push(start..i);
                i += 1;
                start = i;
            }
            b'\r' => {
                out.push(start..i);
                i += if buf.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < buf.len() {
        out.push(start..buf.len());
    }
    out
}

/// Index just past the first line terminator in `buf`.
fn first_terminator_end(buf: &[u8]) -> Option<usize> {
    let i = buf.iter().position(|&b| b == b'\n' || b == b'\r')?;
    Some(if buf[i] == b'\r' && buf.get(i + 1) == Some(&b'\n') {
        i + 2
    } else {
        i + 1
    })
}

/// Decoded line plus whether invalid UTF-8 had to be replaced.
fn decode(line: &[u8]) -> (String, bool) {
    match std::str::from_utf8(line) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (String::from_utf8_lossy(line).into_owned(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    fn read_all(path: &Path, direction: ReadDirection, options: ReaderOptions) -> Vec<String> {
        ChunkedLines::open(path, direction, options)
            .unwrap()
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    fn chunked(chunk_size: usize) -> ReaderOptions {
        ReaderOptions {
            chunk_size,
            chunked_threshold: 0,
        }
    }

    const SAMPLES: &[&[u8]] = &[
        b"",
        b"one line no terminator",
        b"a\nb\nc\n",
        b"a\r\nb\r\nc\r\n",
        b"mixed\r\nlone\rcr\nend",
        b"blank\n\n\nlines\n\n",
        b"\n\nleading blanks",
        b"\r\n\r\n",
        "multi-byte \u{e9}\u{e8} and \u{1f600}\nsecond \u{4e2d}\u{6587}\r\n".as_bytes(),
        b"[2024-01-15 10:00:00] start\n#0 frame()\n#1 frame()\n[2024-01-15 10:00:01] next",
    ];

    #[test]
    fn test_split_lines_terminators() {
        let lines = split_lines(b"a\r\nb\rc\nd\n");
        assert_eq!(lines, vec![&b"a"[..], b"b", b"c", b"d"]);
        assert!(split_lines(b"").is_empty());
        assert_eq!(split_lines(b"\n"), vec![&b""[..]]);
    }

    #[test]
    fn test_every_window_size_matches_whole_file_forward() {
        for sample in SAMPLES {
            let f = write_temp(sample);
            let whole = read_all(f.path(), ReadDirection::Forward, ReaderOptions::default());
            for size in 1..=sample.len() + 2 {
                let got = read_all(f.path(), ReadDirection::Forward, chunked(size));
                assert_eq!(got, whole, "window {size} on {:?}", String::from_utf8_lossy(sample));
            }
        }
    }

    #[test]
    fn test_every_window_size_matches_whole_file_backward() {
        for sample in SAMPLES {
            let f = write_temp(sample);
            let mut expected = read_all(f.path(), ReadDirection::Forward, ReaderOptions::default());
            expected.reverse();
            let mapped = read_all(f.path(), ReadDirection::Backward, ReaderOptions::default());
            assert_eq!(mapped, expected);
            for size in 1..=sample.len() + 2 {
                let got = read_all(f.path(), ReadDirection::Backward, chunked(size));
                assert_eq!(got, expected, "window {size} on {:?}", String::from_utf8_lossy(sample));
            }
        }
    }

    #[test]
    fn test_boundary_exactly_at_terminator() {
        // Window of 4 ends every read right after "abc\n".
        let f = write_temp(b"abc\ndef\nghi\n");
        assert_eq!(read_all(f.path(), ReadDirection::Forward, chunked(4)), ["abc", "def", "ghi"]);
        assert_eq!(read_all(f.path(), ReadDirection::Backward, chunked(4)), ["ghi", "def", "abc"]);
    }

    #[test]
    fn test_boundary_mid_line() {
        let f = write_temp(b"abcdef\nghijkl\n");
        assert_eq!(read_all(f.path(), ReadDirection::Forward, chunked(3)), ["abcdef", "ghijkl"]);
        assert_eq!(read_all(f.path(), ReadDirection::Backward, chunked(3)), ["ghijkl", "abcdef"]);
    }

    #[test]
    fn test_boundary_mid_crlf_counts_once() {
        // Window of 4 splits "abc\r" | "\ndef".
        let f = write_temp(b"abc\r\ndef\r\n");
        assert_eq!(read_all(f.path(), ReadDirection::Forward, chunked(4)), ["abc", "def"]);
        // Backward: a window of 6 leaves "abc\r" | "\ndef\r\n".
        for size in [5, 6] {
            assert_eq!(read_all(f.path(), ReadDirection::Backward, chunked(size)), ["def", "abc"]);
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let f = write_temp(b"ok\n\xff\xfe bad\n");
        let lines = read_all(f.path(), ReadDirection::Forward, chunked(2));
        assert_eq!(lines[0], "ok");
        assert!(lines[1].contains('\u{fffd}'));
    }

    #[test]
    fn test_lossy_flag_only_for_invalid_bytes() {
        let mut content = "literal \u{fffd} kept\n".as_bytes().to_vec();
        content.extend_from_slice(b"\xff broken\nclean\n");
        let f = write_temp(&content);
        for options in [ReaderOptions::default(), chunked(3)] {
            let mut lines = ChunkedLines::open(f.path(), ReadDirection::Forward, options).unwrap();
            let mut flags = Vec::new();
            while let Some(line) = lines.next() {
                line.unwrap();
                flags.push(lines.last_line_lossy());
            }
            assert_eq!(flags, [false, true, false]);
            assert_eq!(lines.lossy_lines(), 1);
        }
    }

    #[test]
    fn test_early_stop_reads_less_than_file() {
        let mut content = Vec::new();
        for i in 0..1000 {
            content.extend_from_slice(format!("line number {i}\n").as_bytes());
        }
        let f = write_temp(&content);

        let mut fwd = ChunkedLines::open(f.path(), ReadDirection::Forward, chunked(256)).unwrap();
        assert_eq!(fwd.next().unwrap().unwrap(), "line number 0");
        assert!(fwd.bytes_read() < fwd.file_len());

        let mut back = ChunkedLines::open(f.path(), ReadDirection::Backward, chunked(256)).unwrap();
        assert_eq!(back.next().unwrap().unwrap(), "line number 999");
        assert_eq!(back.bytes_read(), 256);
    }

    #[test]
    fn test_appends_after_open_are_not_read() {
        let mut f = write_temp(b"first\nsecond\n");
        let reader = ChunkedLines::open(f.path(), ReadDirection::Forward, chunked(4)).unwrap();
        f.write_all(b"third\n").unwrap();
        f.flush().unwrap();
        let lines: Vec<String> = reader.map(|l| l.unwrap()).collect();
        assert_eq!(lines, ["first", "second"]);
    }
}
