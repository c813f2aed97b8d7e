//! Bulk CSV loader for gnomon.
//!
//! Loads configuration from (in precedence order): defaults, config file,
//! environment variables (`GNOMON_*`), and CLI flags. Opens the store, then
//! reads a header-bearing CSV whose first three columns are timestamp, metric,
//! value; every remaining column is a tag name. Rows are inserted through the
//! no-log path (the CSV itself is the durability source) and reported as
//! inserted, skipped-old, or malformed.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File as ConfigFile};
use gnomon::{StoreConfig, StoreError, TagSet, TimeSeriesStore};

// ---------- CLI ----------

/// gnomon bulk CSV loader.
#[derive(Parser, Debug)]
#[command(name = "gnomon-load", version, about)]
pub struct Cli {
    /// CSV file to load (timestamp, metric, value, then tag columns).
    pub csv: Option<PathBuf>,

    /// Path to config file (TOML). If omitted, gnomon.toml is loaded when it exists.
    #[arg(long, env = "GNOMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the active WAL file path.
    #[arg(long, env = "GNOMON_WAL_PATH")]
    pub wal_path: Option<PathBuf>,

    /// Do not load any config file; use defaults + env + CLI only.
    #[arg(long, default_value_t = false)]
    pub no_config: bool,

    /// Load and validate config (file + env + CLI), print the effective settings, then exit.
    #[arg(long, default_value_t = false)]
    pub validate_config: bool,
}

// ---------- File/env config (all optional for partial config) ----------

/// Top-level loader config as read from file + env. Every field optional for layering.
#[derive(Debug, Default, serde::Deserialize)]
pub struct LoaderFileConfig {
    pub wal_path: Option<String>,
    pub retention_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub max_wal_bytes: Option<u64>,
}

/// Load merged config. CLI overrides file/env.
fn load_store_config(cli: &Cli) -> Result<StoreConfig, String> {
    let mut builder = Config::builder();

    if !cli.no_config {
        if let Some(ref path) = cli.config {
            if !path.exists() {
                return Err(format!("config file not found: {}", path.display()));
            }
            builder = builder.add_source(ConfigFile::from(path.as_path()).required(false));
        } else {
            let default_path = PathBuf::from("gnomon.toml");
            if default_path.exists() {
                builder = builder.add_source(ConfigFile::from(default_path.as_path()).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("GNOMON")
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true),
    );

    let merged = builder.build().map_err(|e| e.to_string())?;
    let partial: LoaderFileConfig = merged.try_deserialize().map_err(|e| e.to_string())?;

    let mut store_config = StoreConfig::default();
    if let Some(s) = &partial.wal_path {
        store_config.wal_path = PathBuf::from(s);
    }
    if let Some(secs) = partial.retention_secs {
        store_config.retention = Duration::from_secs(secs);
    }
    if let Some(secs) = partial.sweep_interval_secs {
        store_config.sweep_interval = Duration::from_secs(secs);
    }
    if let Some(bytes) = partial.max_wal_bytes {
        store_config.max_wal_bytes = bytes;
    }

    if let Some(ref p) = cli.wal_path {
        store_config.wal_path = p.clone();
    }

    Ok(store_config)
}

// ---------- CSV loading ----------

#[derive(Debug, Default)]
struct LoadReport {
    inserted: u64,
    skipped_old: u64,
    malformed: u64,
}

/// Streams the CSV through the no-log insert path, counting outcomes per row.
/// A row is malformed when its column count differs from the header or its
/// timestamp/value fields fail to parse.
fn load_csv(store: &TimeSeriesStore, path: &Path) -> Result<LoadReport, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|e| format!("failed to open CSV {}: {}", path.display(), e))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err("CSV file is empty".into()),
    };
    let headers: Vec<String> = header.split(',').map(|h| h.trim().to_string()).collect();
    if headers.len() < 3 {
        return Err("CSV needs at least timestamp, metric and value columns".into());
    }

    let mut report = LoadReport::default();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != headers.len() {
            report.malformed += 1;
            continue;
        }

        let Ok(timestamp) = fields[0].trim().parse::<u64>() else {
            report.malformed += 1;
            eprintln!("Skipping invalid row: {}", line);
            continue;
        };
        let Ok(value) = fields[2].trim().parse::<f64>() else {
            report.malformed += 1;
            eprintln!("Skipping invalid row: {}", line);
            continue;
        };
        let metric = fields[1].trim();

        let tags: TagSet = headers[3..]
            .iter()
            .cloned()
            .zip(fields[3..].iter().map(|v| v.trim().to_string()))
            .collect();

        match store.insert_without_log(timestamp, metric, value, tags) {
            Ok(()) => {
                report.inserted += 1;
                if report.inserted % 100_000 == 0 {
                    println!("Inserted: {} records...", report.inserted);
                }
            }
            Err(StoreError::PointTooOld { .. }) => report.skipped_old += 1,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(report)
}

// ---------- Main ----------

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_store_config(&cli).map_err(|e| {
        eprintln!("config error: {}", e);
        e
    })?;

    if cli.validate_config {
        println!("wal_path={}", config.wal_path.display());
        println!("retention_secs={}", config.retention.as_secs());
        println!("sweep_interval_secs={}", config.sweep_interval.as_secs());
        println!("max_wal_bytes={}", config.max_wal_bytes);
        return Ok(());
    }

    let Some(csv_path) = cli.csv.clone() else {
        return Err("missing CSV path (pass it as the first argument)".into());
    };

    let store = TimeSeriesStore::open(config).map_err(|e| {
        eprintln!("failed to open store: {}", e);
        e
    })?;
    println!("Store initialized (wal={})", store.get_config().wal_path.display());

    let result = load_csv(&store, &csv_path);
    let close_result = store.close();

    let report = result?;
    println!("Finished loading.");
    println!("Inserted: {}", report.inserted);
    println!("Skipped old: {}", report.skipped_old);
    println!("Malformed: {}", report.malformed);

    close_result?;
    Ok(())
}
