//! Pipe-delimited table CLI
//!
//! Command-line tool for loading, querying, editing and exporting a
//! pipe-delimited dataset kept in SQLite with a flat-file mirror.

use clap::{Parser, Subcommand};
use pd_core::{
    Dataset, DatasetConfig, IngestMirror, Limit, SortDirection, UpdateRequest,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pd-cli")]
#[command(about = "Pipe-delimited table loader and editor", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Mirror file kept in sync with the store (overrides config)
    #[arg(long, global = true)]
    mirror: Option<PathBuf>,

    /// Mirror the uploaded text verbatim after an ingest
    #[arg(long, global = true)]
    verbatim_mirror: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the dataset with a pipe-delimited file
    Ingest {
        /// Path to the delimited file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Query records
    Query {
        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Page size, or "all"
        #[arg(short, long)]
        limit: Option<Limit>,

        /// Column filter (column=substring), repeatable
        #[arg(short, long, value_parser = parse_assignment)]
        filter: Vec<(String, String)>,

        /// Column to sort by
        #[arg(short, long)]
        sort: Option<String>,

        /// Sort order, "asc" or "desc"
        #[arg(long, default_value = "asc")]
        order: String,
    },

    /// Update one record
    Update {
        /// Record id
        #[arg(long, conflicts_with = "request")]
        id: Option<i64>,

        /// New value (column=value), repeatable
        #[arg(long, value_parser = parse_assignment, conflicts_with = "request")]
        set: Vec<(String, String)>,

        /// JSON update request ({"id": 1, "column": "value"})
        #[arg(short, long)]
        request: Option<PathBuf>,
    },

    /// Delete all records and the schema
    DeleteAll,

    /// Print the number of records
    Count,

    /// Print the active column names
    Headers,

    /// Print a summary of the dataset
    Info,

    /// Write the mirror document to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create a config file template
    InitConfig {
        /// Output path for the config file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> pd_core::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        return cmd_init_config(output);
    }

    let dataset = Dataset::open(load_config(&cli)?)?;

    match cli.command {
        Commands::Ingest { file } => cmd_ingest(&dataset, &file),
        Commands::Query {
            offset,
            limit,
            filter,
            sort,
            order,
        } => cmd_query(&dataset, offset, limit, filter, sort, &order),
        Commands::Update { id, set, request } => cmd_update(&dataset, id, set, request),
        Commands::DeleteAll => cmd_delete_all(&dataset),
        Commands::Count => cmd_count(&dataset),
        Commands::Headers => cmd_headers(&dataset),
        Commands::Info => cmd_info(&dataset),
        Commands::Export { output } => cmd_export(&dataset, &output),
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn load_config(cli: &Cli) -> pd_core::Result<DatasetConfig> {
    let mut config = match &cli.config {
        Some(path) => DatasetConfig::load(path)?,
        None => DatasetConfig::default(),
    };

    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }
    if let Some(mirror) = &cli.mirror {
        config.mirror = Some(mirror.clone());
    }
    if cli.verbatim_mirror {
        config.ingest_mirror = IngestMirror::Verbatim;
    }

    if config.database.is_none() {
        tracing::warn!("no database configured, using an in-memory store that is discarded on exit");
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> pd_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ingest(dataset: &Dataset, file: &PathBuf) -> pd_core::Result<()> {
    let report = dataset.ingest_file(file)?;
    print_json(&report)
}

fn cmd_query(
    dataset: &Dataset,
    offset: usize,
    limit: Option<Limit>,
    filters: Vec<(String, String)>,
    sort: Option<String>,
    order: &str,
) -> pd_core::Result<()> {
    let mut request = dataset.page_request(offset);
    if let Some(limit) = limit {
        request.limit = limit;
    }
    request.filters.extend(filters);
    if let Some(column) = sort {
        request = request.sort_by(column, SortDirection::from_param(order));
    }

    let page = dataset.query(&request)?;
    print_json(&page)
}

fn cmd_update(
    dataset: &Dataset,
    id: Option<i64>,
    set: Vec<(String, String)>,
    request_path: Option<PathBuf>,
) -> pd_core::Result<()> {
    let request = match request_path {
        Some(path) => UpdateRequest::load(path)?,
        None => UpdateRequest {
            id,
            fields: set.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
        },
    };

    let report = dataset.update(&request)?;
    if report.mirror.is_failed() {
        eprintln!("Warning: record updated but the mirror could not be written");
    }
    print_json(&report)
}

fn cmd_delete_all(dataset: &Dataset) -> pd_core::Result<()> {
    let outcome = dataset.delete_all()?;
    print_json(&serde_json::json!({ "deleted": true, "mirror": outcome }))
}

fn cmd_count(dataset: &Dataset) -> pd_core::Result<()> {
    print_json(&serde_json::json!({ "count": dataset.record_count()? }))
}

fn cmd_headers(dataset: &Dataset) -> pd_core::Result<()> {
    let headers = match dataset.headers() {
        Some(headers) => serde_json::to_value(&headers)?,
        None => Value::Array(Vec::new()),
    };
    print_json(&headers)
}

fn cmd_info(dataset: &Dataset) -> pd_core::Result<()> {
    print_json(&dataset.info()?)
}

fn cmd_export(dataset: &Dataset, output: &PathBuf) -> pd_core::Result<()> {
    dataset.export(output)?;
    println!(
        "Exported {} rows to {}",
        dataset.record_count()?,
        output.display()
    );
    Ok(())
}

fn cmd_init_config(output: &PathBuf) -> pd_core::Result<()> {
    let config = DatasetConfig {
        database: Some(PathBuf::from("dataset.db")),
        mirror: Some(PathBuf::from("data.txt")),
        ..DatasetConfig::default()
    };

    config.save(output)?;
    println!("Created config file: {}", output.display());
    println!();
    println!("Edit the file to point at your database and mirror, then run:");
    println!("  pd-cli --config {} ingest --file <path>", output.display());

    Ok(())
}

/// Parse "column=value"
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid assignment '{}', expected 'column=value'", s))?;
    Ok((column.trim().to_string(), value.to_string()))
}
