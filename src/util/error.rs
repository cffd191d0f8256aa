// logsmith - util/error.rs
//
// Error types for every engine operation.
// No string-based error propagation: every failure carries the file name or
// field and the operation that produced it, and keeps the causal chain for
// diagnostic logging.
//
// Parse-level anomalies are NOT errors. A structured-looking line that fails
// to decode is a fallback (counted, treated as text) and a malformed line
// during migration or analytics is tallied; neither aborts a scan.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// The name is whitelisted but the file is not on disk.
    NotFound { name: String, path: PathBuf },

    /// Input rejected before any I/O: a name outside the whitelist, an
    /// unparseable time range, an empty search, a negative age, ...
    InvalidInput { field: &'static str, reason: String },

    /// Open, read, write or rename failed on `path`.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// Writing an export failed.
    Export(ExportError),

    /// config.toml could not be used.
    Config(ConfigError),
}

impl EngineError {
    /// Shorthand for an `InvalidInput` with a formatted reason.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand used with `map_err` on `io::Result`.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            path,
            operation,
            source,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name, path } => {
                write!(f, "Log file '{name}' not found at '{}'", path.display())
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Export(e) => write!(f, "Export failed: {e}"),
            Self::Config(e) => write!(f, "Bad configuration: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Failures while writing CSV, JSON or plain-text exports.
#[derive(Debug)]
pub enum ExportError {
    /// The destination could not be written.
    Io { path: PathBuf, source: io::Error },

    /// The CSV writer failed.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON encoding failed.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// More entries than `MAX_EXPORT_ENTRIES`.
    TooManyEntries { count: usize, max: usize },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot write '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV output to '{}' failed: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON output to '{}' failed: {source}", path.display())
            }
            Self::TooManyEntries { count, max } => write!(
                f,
                "{count} entries exceed the export limit of {max}; \
                 narrow the query or level filter"
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExportError> for EngineError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Problems with config.toml. Loading never fails on these; they are
/// rendered into startup warnings.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A numeric setting outside its accepted range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// The file exists but could not be read.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config file '{}' is not valid TOML: {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config value {field} = {value} is out of range ({expected})"
            ),
            Self::Io { path, source } => {
                write!(f, "Config file '{}' could not be read: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
