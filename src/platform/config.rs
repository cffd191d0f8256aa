// logsmith - platform/config.rs
//
// Platform-specific configuration: config directory resolution and
// config.toml loading with startup validation.
//
// The config directory comes from `directories` (XDG, AppData or
// Application Support depending on the OS).

use crate::platform::reader::ReaderOptions;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for logsmith configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logsmith/ or %APPDATA%\logsmith\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Locate the config directory, or `.` when the OS gives none.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("No platform config directory; looking for config.toml in the working directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so a newer config file can be used with
/// an older binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub engine: EngineSection,
    pub reader: ReaderSection,
    pub archive: ArchiveSection,
    pub logging: LoggingSection,
}

/// `[engine]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Directory holding the log files.
    pub log_dir: Option<String>,
    /// File names or glob patterns that may be read.
    pub whitelist: Option<Vec<String>>,
}

/// `[reader]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReaderSection {
    /// Window size for chunked reads.
    pub chunk_size_bytes: Option<usize>,
    /// Files above this size are read in windows instead of mapped.
    pub chunked_threshold_bytes: Option<u64>,
    /// Cap on one reassembled entry.
    pub max_entry_bytes: Option<usize>,
}

/// `[archive]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    /// Where archives are written (default: the log directory).
    pub archive_dir: Option<String>,
    /// Lines sampled by `stats`.
    pub sample_lines: Option<usize>,
    /// Hit cap per file for cross-file search.
    pub max_matches_per_file: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated engine configuration.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // -- Engine --
    /// Directory holding the log files. Relative paths resolve against the
    /// working directory.
    pub log_dir: PathBuf,
    /// Whitelisted names or glob patterns.
    pub whitelist: Vec<String>,

    // -- Reader --
    pub chunk_size: usize,
    pub chunked_threshold: u64,
    pub max_entry_size: usize,

    // -- Archive --
    /// `None` = write archives into `log_dir`.
    pub archive_dir: Option<PathBuf>,
    pub sample_lines: usize,
    pub max_matches_per_file: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            whitelist: constants::DEFAULT_WHITELIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            chunked_threshold: constants::DEFAULT_CHUNKED_THRESHOLD,
            max_entry_size: constants::DEFAULT_MAX_ENTRY_SIZE,
            archive_dir: None,
            sample_lines: constants::DEFAULT_STATS_SAMPLE_LINES,
            max_matches_per_file: constants::DEFAULT_MAX_MATCHES_PER_FILE,
            log_level: None,
            log_file: None,
        }
    }
}

impl EngineConfig {
    /// Reader settings derived from this configuration.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            chunk_size: self.chunk_size,
            chunked_threshold: self.chunked_threshold,
        }
    }

    /// Directory archives are written to.
    pub fn archive_dir(&self) -> &Path {
        self.archive_dir.as_deref().unwrap_or(&self.log_dir)
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `EngineConfig` with validated values and a list of non-fatal
/// warnings. A missing file yields defaults with no warnings; an unreadable
/// or unparseable file yields defaults plus a warning.
pub fn load_config(config_path: &Path) -> (EngineConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (EngineConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(source) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (EngineConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(source) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (EngineConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let (config, mut field_warnings) = validate(raw);
    warnings.append(&mut field_warnings);

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

/// Validate each field against named constants, accumulating all warnings.
fn validate(raw: RawConfig) -> (EngineConfig, Vec<String>) {
    let mut warnings = Vec::new();
    let mut config = EngineConfig::default();

    // -- Engine: log_dir --
    if let Some(dir) = raw.engine.log_dir {
        if dir.trim().is_empty() {
            warnings.push(format!(
                "[engine] log_dir is empty. Using default ({}).",
                constants::DEFAULT_LOG_DIR
            ));
        } else {
            config.log_dir = PathBuf::from(dir);
        }
    }

    // -- Engine: whitelist --
    if let Some(list) = raw.engine.whitelist {
        let mut valid = Vec::new();
        for entry in list {
            match glob::Pattern::new(&entry) {
                Ok(_) if !entry.contains(['/', '\\']) => valid.push(entry),
                Ok(_) => warnings.push(format!(
                    "[engine] whitelist entry \"{entry}\" contains a path separator. Ignored."
                )),
                Err(e) => warnings.push(format!(
                    "[engine] whitelist entry \"{entry}\" is not a valid pattern: {e}. Ignored."
                )),
            }
        }
        if valid.is_empty() {
            warnings.push(format!(
                "[engine] whitelist has no usable entries. Using default ({}).",
                constants::DEFAULT_WHITELIST.join(", ")
            ));
        } else {
            config.whitelist = valid;
        }
    }

    // -- Reader: chunk_size_bytes --
    if let Some(size) = raw.reader.chunk_size_bytes {
        if (constants::MIN_CHUNK_SIZE..=constants::MAX_CHUNK_SIZE).contains(&size) {
            config.chunk_size = size;
        } else {
            warnings.push(out_of_range(
                "reader.chunk_size_bytes",
                size,
                constants::MIN_CHUNK_SIZE,
                constants::MAX_CHUNK_SIZE,
                constants::DEFAULT_CHUNK_SIZE,
            ));
        }
    }

    // -- Reader: chunked_threshold_bytes --
    // Any value is legal: 0 forces the windowed path for every file.
    if let Some(threshold) = raw.reader.chunked_threshold_bytes {
        config.chunked_threshold = threshold;
    }

    // -- Reader: max_entry_bytes --
    if let Some(max) = raw.reader.max_entry_bytes {
        if max >= constants::MIN_MAX_ENTRY_SIZE {
            config.max_entry_size = max;
        } else {
            warnings.push(format!(
                "[reader] max_entry_bytes = {max} is below the minimum ({}). Using default ({}).",
                constants::MIN_MAX_ENTRY_SIZE,
                constants::DEFAULT_MAX_ENTRY_SIZE,
            ));
        }
    }

    // -- Archive: archive_dir --
    if let Some(dir) = raw.archive.archive_dir {
        if !dir.trim().is_empty() {
            config.archive_dir = Some(PathBuf::from(dir));
        }
    }

    // -- Archive: sample_lines --
    if let Some(lines) = raw.archive.sample_lines {
        if (1..=constants::MAX_STATS_SAMPLE_LINES).contains(&lines) {
            config.sample_lines = lines;
        } else {
            warnings.push(out_of_range(
                "archive.sample_lines",
                lines,
                1,
                constants::MAX_STATS_SAMPLE_LINES,
                constants::DEFAULT_STATS_SAMPLE_LINES,
            ));
        }
    }

    // -- Archive: max_matches_per_file --
    if let Some(max) = raw.archive.max_matches_per_file {
        if (1..=constants::MAX_MATCHES_PER_FILE).contains(&max) {
            config.max_matches_per_file = max;
        } else {
            warnings.push(out_of_range(
                "archive.max_matches_per_file",
                max,
                1,
                constants::MAX_MATCHES_PER_FILE,
                constants::DEFAULT_MAX_MATCHES_PER_FILE,
            ));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    (config, warnings)
}

fn out_of_range(field: &str, value: usize, min: usize, max: usize, default: usize) -> String {
    let err = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected: format!("{min}-{max}"),
    };
    format!("{err}. Using default ({default}).")
}
