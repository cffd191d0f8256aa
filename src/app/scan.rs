// logsmith - app/scan.rs
//
// Entry stream: chunked reader + assembler for one file, in either
// direction. Every read-side operation (pagination, export, analytics,
// stats) pulls entries through this type.
//
// The fallback timestamp for entries without one is fixed when the stream
// opens, so two scans that start together see identical entries.

use crate::core::model::{Direction, LogEntry};
use crate::core::parser::{ForwardAssembler, ParseConfig, ParseCounters, ReverseAssembler};
use crate::platform::config::EngineConfig;
use crate::platform::reader::{ChunkedLines, ReadDirection, ReaderOptions};
use crate::util::error::{EngineError, Result};
use std::path::{Path, PathBuf};

enum Assembler {
    Forward(ForwardAssembler),
    Reverse(ReverseAssembler),
}

impl Assembler {
    fn push_line(&mut self, line: &str) {
        match self {
            Self::Forward(a) => a.push_line(line),
            Self::Reverse(a) => a.push_line(line),
        }
    }

    fn finish(&mut self) {
        match self {
            Self::Forward(a) => a.finish(),
            Self::Reverse(a) => a.finish(),
        }
    }

    fn pop(&mut self) -> Option<LogEntry> {
        match self {
            Self::Forward(a) => a.pop(),
            Self::Reverse(a) => a.pop(),
        }
    }

    fn counters(&self) -> ParseCounters {
        match self {
            Self::Forward(a) => a.counters(),
            Self::Reverse(a) => a.counters(),
        }
    }
}

/// Lazy sequence of entries from one file.
pub struct EntryStream {
    path: PathBuf,
    lines: ChunkedLines,
    assembler: Assembler,
    exhausted: bool,
}

impl EntryStream {
    /// Open `path` with reader and parser settings from `config`.
    pub fn open(path: &Path, direction: Direction, config: &EngineConfig) -> Result<Self> {
        let parse = ParseConfig {
            max_entry_size: config.max_entry_size,
            ..ParseConfig::default()
        };
        Self::open_with(path, direction, config.reader_options(), parse)
    }

    pub fn open_with(
        path: &Path,
        direction: Direction,
        options: ReaderOptions,
        parse: ParseConfig,
    ) -> Result<Self> {
        let (read_direction, assembler) = match direction {
            Direction::OldestFirst => (
                ReadDirection::Forward,
                Assembler::Forward(ForwardAssembler::new(parse)),
            ),
            Direction::NewestFirst => (
                ReadDirection::Backward,
                Assembler::Reverse(ReverseAssembler::new(parse)),
            ),
        };
        let lines = ChunkedLines::open(path, read_direction, options)
            .map_err(EngineError::io(path, "open"))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines,
            assembler,
            exhausted: false,
        })
    }

    /// Lines and fallbacks seen so far.
    pub fn counters(&self) -> ParseCounters {
        self.assembler.counters()
    }

    /// Bytes read from disk so far.
    pub fn bytes_read(&self) -> u64 {
        self.lines.bytes_read()
    }
}

impl Iterator for EntryStream {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.assembler.pop() {
                return Some(Ok(entry));
            }
            if self.exhausted {
                return None;
            }
            match self.lines.next() {
                Some(Ok(line)) => self.assembler.push_line(&line),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(EngineError::io(&self.path, "read")(e)));
                }
                None => {
                    self.assembler.finish();
                    self.exhausted = true;
                }
            }
        }
    }
}
