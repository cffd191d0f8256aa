// logsmith - app/files.rs
//
// The set of log files the engine may touch: one directory plus a whitelist
// of names or glob patterns. Every operation that takes a file name goes
// through `resolve`, so a name outside the whitelist is rejected before any
// filesystem access.

use crate::core::model::{FileFormat, LogFile};
use crate::core::parser::{classify_line, ClassifiedLine};
use crate::platform::config::EngineConfig;
use crate::platform::fs;
use crate::util::constants;
use crate::util::error::{EngineError, Result};
use std::path::{Path, PathBuf};

/// A log directory and the names within it that may be read or modified.
#[derive(Debug, Clone)]
pub struct LogFileSet {
    root: PathBuf,
    whitelist: Vec<glob::Pattern>,
}

impl LogFileSet {
    /// Build a file set. Fails if any whitelist entry is not a valid pattern.
    pub fn new(root: impl Into<PathBuf>, whitelist: &[String]) -> Result<Self> {
        let whitelist = whitelist
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| EngineError::invalid("whitelist", format!("'{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            root: root.into(),
            whitelist,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(&config.log_dir, &config.whitelist)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` is a plain file name matched by the whitelist.
    pub fn is_allowed(&self, name: &str) -> bool {
        is_plain_name(name) && self.whitelist.iter().any(|p| p.matches(name))
    }

    /// Map a whitelisted name to its path.
    ///
    /// InvalidInput for names with separators, `..`, or outside the
    /// whitelist; NotFound when the file is not on disk.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !is_plain_name(name) {
            return Err(EngineError::invalid(
                "file",
                format!("'{name}' must be a bare file name"),
            ));
        }
        if !self.is_allowed(name) {
            return Err(EngineError::invalid(
                "file",
                format!("'{name}' is not whitelisted"),
            ));
        }
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(EngineError::NotFound {
                name: name.to_string(),
                path,
            });
        }
        Ok(path)
    }

    /// Resolve several names, failing on the first bad one.
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<PathBuf>> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }

    /// List whitelisted regular files directly under the root, sorted by name.
    pub fn discover(&self) -> Result<Vec<LogFile>> {
        if !self.root.is_dir() {
            return Err(EngineError::Io {
                path: self.root.clone(),
                operation: "list directory",
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let walker = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        let mut files = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping inaccessible entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                tracing::debug!(path = %entry.path().display(), "Skipping non-UTF-8 filename");
                continue;
            };
            if !self.is_allowed(name) {
                tracing::trace!(file = name, "Not whitelisted");
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(file = name, error = %e, "Cannot read metadata");
                    continue;
                }
            };

            let format = match fs::read_first_lines(entry.path(), constants::FORMAT_DETECTION_LINES) {
                Ok(lines) => classify_format(&lines),
                Err(e) => {
                    tracing::debug!(file = name, error = %e, "Cannot sample file");
                    FileFormat::Empty
                }
            };

            files.push(LogFile {
                name: name.to_string(),
                path: entry.path().to_path_buf(),
                size: metadata.len(),
                modified: fs::modified_utc(&metadata),
                format,
            });
        }

        tracing::debug!(root = %self.root.display(), files = files.len(), "Discovery complete");
        Ok(files)
    }
}

/// Classify a file from its leading non-blank lines.
pub fn classify_format(lines: &[String]) -> FileFormat {
    let mut structured = 0;
    let mut other = 0;
    for line in lines {
        match classify_line(line) {
            Some(ClassifiedLine::Structured(_)) => structured += 1,
            Some(ClassifiedLine::Legacy(_)) => other += 1,
            None => {}
        }
    }
    match (structured, other) {
        (0, 0) => FileFormat::Empty,
        (_, 0) => FileFormat::Record,
        (0, _) => FileFormat::Legacy,
        _ => FileFormat::Mixed,
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}
