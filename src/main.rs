// logsmith - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and CLI overrides
// 3. Logging initialisation (debug mode support)
// 4. Dispatch to the engine operations, printing results as JSON

use clap::{Parser, Subcommand, ValueEnum};
use logsmith::app::{analytics, archive, files::LogFileSet, migrate, paginate};
use logsmith::core::export::{self, ExportFormat};
use logsmith::core::filter::{EntryFilter, SearchQuery};
use logsmith::core::model::{Direction, Granularity, PageRequest};
use logsmith::platform::config::{self, EngineConfig, PlatformPaths};
use logsmith::util::{constants, error::EngineError, error::Result, logging};
use std::io::Write;
use std::path::{Path, PathBuf};

/// logsmith - streaming log processing engine.
///
/// Reads, filters, paginates, analyses, migrates and archives the
/// whitelisted log files of one directory.
#[derive(Parser, Debug)]
#[command(name = "logsmith", version, about)]
struct Cli {
    /// Config file (default: platform config directory).
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Log directory, overriding [engine] log_dir.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Whitelisted file name or glob; repeat to allow several. Replaces the
    /// configured whitelist.
    #[arg(long = "allow", global = true)]
    allow: Vec<String>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List whitelisted log files.
    Files,

    /// Print one page of entries.
    Page {
        file: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = constants::DEFAULT_PAGE_SIZE as i64)]
        size: i64,
        #[arg(long, value_enum, default_value_t = Order::Newest)]
        order: Order,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Export matching entries to stdout.
    Export {
        file: String,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        #[arg(long, value_enum, default_value_t = Order::Oldest)]
        order: Order,
        /// Stop after this many entries.
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Size, line count and level mix (all files when none are named).
    Stats { files: Vec<String> },

    /// Trend buckets, error rate and top errors for a time range.
    Analytics {
        file: String,
        /// Range start (any recognised timestamp, or YYYY-MM-DD).
        #[arg(long)]
        start: String,
        /// Range end, inclusive.
        #[arg(long)]
        end: String,
        #[arg(long, value_enum, default_value_t = Bucket::Hour)]
        granularity: Bucket,
    },

    /// Rewrite a file in record format.
    Migrate {
        file: String,
        /// Skip the timestamped backup of the original.
        #[arg(long)]
        no_backup: bool,
    },

    /// Truncate files to zero bytes.
    Clear {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Move files older than N days into a tar.gz (all files when none are named).
    Archive {
        #[arg(long)]
        days: i64,
        files: Vec<String>,
    },

    /// Line search with context across files (all files when none are named).
    Search {
        text: String,
        files: Vec<String>,
        #[arg(short = 'C', long, default_value_t = 2)]
        context: usize,
        #[arg(long)]
        case_sensitive: bool,
        /// Hit cap per file (default from config).
        #[arg(long)]
        max_matches: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Level filter, e.g. error.
    #[arg(long)]
    level: Option<String>,
    /// Free text, or key:value for a field match.
    #[arg(short = 'q', long)]
    query: Option<String>,
    #[arg(long)]
    case_sensitive: bool,
}

impl FilterArgs {
    fn build(&self) -> EntryFilter {
        let query = self
            .query
            .as_deref()
            .map(|q| SearchQuery::parse(q, self.case_sensitive))
            .unwrap_or_default();
        EntryFilter::new(query, self.level.as_deref())
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Order {
    Newest,
    Oldest,
}

impl From<Order> for Direction {
    fn from(order: Order) -> Self {
        match order {
            Order::Newest => Direction::NewestFirst,
            Order::Oldest => Direction::OldestFirst,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Json,
    Plain,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Json => ExportFormat::Json,
            Format::Plain => ExportFormat::Plain,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Bucket {
    Minute,
    Hour,
    Day,
}

impl From<Bucket> for Granularity {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Minute => Granularity::Minute,
            Bucket::Hour => Granularity::Hour,
            Bucket::Day => Granularity::Day,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());
    let (mut config, warnings) = config::load_config(&config_path);
    if let Some(dir) = &cli.dir {
        config.log_dir = dir.clone();
    }
    if !cli.allow.is_empty() {
        config.whitelist = cli.allow.clone();
    }

    logging::init(
        cli.debug,
        config.log_level.as_deref(),
        config.log_file.as_deref(),
    );
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    tracing::debug!(
        version = constants::APP_VERSION,
        config = %config_path.display(),
        log_dir = %config.log_dir.display(),
        "logsmith starting"
    );

    if let Err(e) = run(cli.command, &config) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command, config: &EngineConfig) -> Result<()> {
    let files = LogFileSet::from_config(config)?;

    match command {
        Command::Files => print_json(&files.discover()?),

        Command::Page {
            file,
            page,
            size,
            order,
            filter,
        } => {
            let request = PageRequest::new(page, size, order.into());
            let result = paginate::paginate(&files, &file, request, &filter.build(), config)?;
            print_json(&result)
        }

        Command::Export {
            file,
            format,
            order,
            limit,
            filter,
        } => {
            let entries =
                paginate::collect_matching(&files, &file, order.into(), &filter.build(), config, limit)?;
            let stdout = std::io::stdout();
            let written = export::export(format.into(), &entries, stdout.lock(), Path::new("<stdout>"))?;
            tracing::info!(file = %file, entries = written, "Export complete");
            Ok(())
        }

        Command::Stats { files: names } => {
            let paths = selected_paths(&files, &names)?;
            let stats = paths
                .iter()
                .map(|p| archive::stats(p, config))
                .collect::<Result<Vec<_>>>()?;
            print_json(&stats)
        }

        Command::Analytics {
            file,
            start,
            end,
            granularity,
        } => {
            let start = analytics::parse_time_bound("start", &start)?;
            let end = analytics::parse_time_bound("end", &end)?;
            let summary = analytics::aggregate(&files, &file, start, end, granularity.into(), config)?;
            print_json(&summary)
        }

        Command::Migrate { file, no_backup } => {
            let options = migrate::MigrateOptions::from_config(config, !no_backup);
            print_json(&migrate::migrate_file(&files, &file, &options)?)
        }

        Command::Clear { files: names } => {
            let paths = files.resolve_all(&names)?;
            let cleared = archive::clear(&paths)?;
            print_json(&serde_json::json!({ "cleared": cleared }))
        }

        Command::Archive { days, files: names } => {
            let paths = selected_paths(&files, &names)?;
            print_json(&archive::archive_older_than(&paths, days, config.archive_dir())?)
        }

        Command::Search {
            text,
            files: names,
            context,
            case_sensitive,
            max_matches,
        } => {
            let paths = selected_paths(&files, &names)?;
            let results = archive::search_across_files(
                &text,
                &paths,
                context,
                case_sensitive,
                max_matches.unwrap_or(config.max_matches_per_file),
            )?;
            print_json(&results)
        }
    }
}

/// Named files, or every discovered file when `names` is empty.
fn selected_paths(files: &LogFileSet, names: &[String]) -> Result<Vec<PathBuf>> {
    if names.is_empty() {
        Ok(files.discover()?.into_iter().map(|f| f.path).collect())
    } else {
        files.resolve_all(names)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(out))
        .map_err(EngineError::io("<stdout>", "write"))
}
