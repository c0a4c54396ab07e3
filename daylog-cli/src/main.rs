//! CLI for the daylog rotating log store.
//!
//! Provides commands for inspecting, reading, writing and archiving a log
//! pool directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use daylog::state::keys;
use daylog::{
    DecodedSlot, FilePoolManager, JsonFileStore, KeyValueStore, LogRecord, PoolConfig,
    RotationState, Severity, SlotStatus, SystemDate,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Name of the rotation state file inside a pool directory.
const STATE_FILE: &str = "state.json";

/// daylog — Daily rotating log record store CLI.
#[derive(Parser)]
#[command(name = "daylog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display rotation state and slot usage.
    Info {
        /// Path to the pool directory.
        pool_dir: PathBuf,
    },

    /// Print the records stored in a slot.
    Read {
        /// Path to the pool directory.
        pool_dir: PathBuf,

        /// Slot to read (defaults to the active slot).
        #[arg(long)]
        slot: Option<usize>,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Bundle every existing slot file into a compressed archive.
    Archive {
        /// Path to the pool directory.
        pool_dir: PathBuf,
    },

    /// Restore slot files from an archive.
    Unpack {
        /// Path to the archive file.
        archive: PathBuf,

        /// Directory to write the slot files into.
        out_dir: PathBuf,
    },

    /// Append one record to the pool, rotating if the day changed.
    Write {
        /// Path to the pool directory.
        pool_dir: PathBuf,

        /// Record severity (debug, info, warn, error).
        #[arg(long, default_value = "info")]
        severity: Severity,

        /// Record body.
        #[arg(long)]
        message: String,

        /// Number of slot files, used when the pool is created.
        #[arg(long)]
        pool_size: Option<usize>,
    },
}

/// Output format for read results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One line per record, continuation lines indented.
    Text,
    /// JSON object with records and malformed entries.
    Json,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { pool_dir } => cmd_info(&pool_dir),
        Commands::Read {
            pool_dir,
            slot,
            format,
        } => cmd_read(&pool_dir, slot, &format),
        Commands::Archive { pool_dir } => cmd_archive(&pool_dir),
        Commands::Unpack { archive, out_dir } => cmd_unpack(&archive, &out_dir),
        Commands::Write {
            pool_dir,
            severity,
            message,
            pool_size,
        } => cmd_write(&pool_dir, severity, &message, pool_size),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Opens the pool whose state lives in `<pool_dir>/state.json`.
///
/// An existing pool is reopened with its stored directory and size. A fresh
/// one is created only when `create` is set, and always records an absolute
/// directory so later calls work from any working directory.
fn open_pool(
    pool_dir: &Path,
    pool_size: Option<usize>,
    create: bool,
) -> Result<FilePoolManager, Box<dyn std::error::Error>> {
    let pool_dir = std::path::absolute(pool_dir)?;
    let mut store = JsonFileStore::open(pool_dir.join(STATE_FILE))?;

    let config = match RotationState::load(&store)? {
        Some(state) => {
            let directory = if state.directory.is_absolute() {
                state.directory
            } else {
                // The state file lives inside the pool directory it names.
                store.set(keys::LOG_DIR, &pool_dir.to_string_lossy())?;
                pool_dir.clone()
            };
            PoolConfig::new(directory, pool_size.unwrap_or(state.pool_size))
        }
        None if create => PoolConfig::new(
            &pool_dir,
            pool_size.unwrap_or(daylog::config::DEFAULT_POOL_SIZE),
        ),
        None => {
            return Err(format!("No log pool found at '{}'", pool_dir.display()).into());
        }
    };

    Ok(FilePoolManager::open(config, store, Arc::new(SystemDate))?)
}

/// Implements `daylog info <pool_dir>`.
fn cmd_info(pool_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(pool_dir, None, false)?;
    let state = pool.state();

    println!("Pool: {}", pool.directory().display());
    println!("  Slots: {}", state.pool_size);
    println!("  Active slot: {}", state.active_slot);
    println!("  Last write date: {}", state.last_write_date);
    println!();

    let mut total = 0;
    for index in 0..pool.pool_size() {
        let marker = if index == state.active_slot { "*" } else { " " };
        let file_name = pool
            .slot_path(index)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match pool.slot_status(index)? {
            SlotStatus::Absent => println!("  {marker} {file_name}: absent"),
            SlotStatus::Empty => println!("  {marker} {file_name}: empty"),
            SlotStatus::Populated { bytes } => {
                total += bytes;
                println!("  {marker} {file_name}: {}", format_bytes(bytes));
            }
        }
    }

    println!();
    println!("Total: {}", format_bytes(total));

    Ok(())
}

/// Implements `daylog read <pool_dir>`.
fn cmd_read(
    pool_dir: &Path,
    slot: Option<usize>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(pool_dir, None, false)?;
    let slot = slot.unwrap_or_else(|| pool.active_slot());
    let decoded = pool.read_slot(slot)?;

    match format {
        OutputFormat::Text => {
            for record in &decoded.records {
                println!("{}", format_record(record));
            }
            for malformed in &decoded.malformed {
                eprintln!("malformed: {malformed}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&slot_json(slot, &decoded))?);
        }
    }

    Ok(())
}

/// Implements `daylog archive <pool_dir>`.
fn cmd_archive(pool_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(pool_dir, None, false)?;

    match daylog::archive(&pool)? {
        Some(path) => println!("{}", path.display()),
        None => println!("No slot files to archive"),
    }

    Ok(())
}

/// Implements `daylog unpack <archive> <out_dir>`.
fn cmd_unpack(archive: &Path, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = daylog::read_archive(archive)?;
    println!(
        "Archive created {} with {} slot(s)",
        bundle.created_at.to_rfc3339(),
        bundle.slots.len()
    );

    for path in bundle.restore(out_dir)? {
        println!("  {}", path.display());
    }

    Ok(())
}

/// Implements `daylog write <pool_dir>`.
fn cmd_write(
    pool_dir: &Path,
    severity: Severity,
    message: &str,
    pool_size: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(pool_dir, pool_size, true)?;
    let record = LogRecord::new(severity, Utc::now(), file!(), "cmd_write", line!(), message);

    let outcome = pool.append_record(&record)?;
    debug!(
        slot = outcome.slot,
        rotated = outcome.rotated,
        "appended record"
    );

    Ok(())
}

/// Formats a record as one display line, indenting body continuations.
fn format_record(record: &LogRecord) -> String {
    let body = record.body.replace('\n', "\n    ");
    format!(
        "{} {:<5} {}:{} {}: {body}",
        record.header.timestamp.to_rfc3339(),
        record.header.severity,
        record.location.file,
        record.location.line,
        record.location.function,
    )
}

/// Builds the JSON document printed by `read --format json`.
fn slot_json(slot: usize, decoded: &DecodedSlot) -> serde_json::Value {
    let malformed: Vec<serde_json::Value> = decoded
        .malformed
        .iter()
        .map(|m| {
            serde_json::json!({
                "line": m.line,
                "reason": m.reason.to_string(),
            })
        })
        .collect();

    serde_json::json!({
        "slot": slot,
        "count": decoded.records.len(),
        "records": decoded.records,
        "malformed": malformed,
    })
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
