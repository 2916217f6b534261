//! qcache command line entry point.
//!
//! Inspects and moves a query result cache on disk. Results go to stdout;
//! logs go to stderr.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use qcache_core::{Backend, KeyDeriver, Normalizer, Store, StoreConfig, Table};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "qcache",
    version,
    about = "Inspect, export and import a disk cache of SQL query results",
    after_help = r#"EXAMPLES
  $ qcache list
  $ qcache key "select top 3 * from Receipts"
  $ qcache export backup.zip --query "select 1" --query "select 2"
  $ qcache --backend msgpack import backup.zip
  $ qcache --db warehouse list

Databases opened through the client keep their entries under <root>/<name>;
pass --db <name> to inspect them.

Settings are read from QCACHE_* environment variables and the TOML file
named by QCACHE_CONFIG_FILE. Flags override both."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, help = "Cache root directory", value_hint = ValueHint::DirPath)]
    root: Option<PathBuf>,

    #[arg(long, global = true, help = "Database name, entries live under <root>/<name>")]
    db: Option<String>,

    #[arg(long, global = true, help = "Serializer backend: parquet|msgpack")]
    backend: Option<Backend>,

    #[arg(long, global = true, help = "Hash queries exactly as given")]
    no_normalize: bool,

    #[arg(long, global = true, help = "Write logs to stderr as JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List cached entries.
    List {
        #[arg(long, help = "Print entries as a JSON array")]
        json: bool,
    },
    /// Print the cache key of a query.
    Key {
        #[arg(help = "Query text, or - to read stdin")]
        query: String,
        #[arg(long, help = "Skip normalization for this key")]
        raw: bool,
    },
    /// Print the normalized form of a query.
    Normalize {
        #[arg(help = "Query text, or - to read stdin")]
        query: String,
    },
    /// Print the metadata and cached results of a query.
    Show {
        #[arg(help = "Query text, or - to read stdin")]
        query: String,
    },
    /// Write cached entries to a zip archive.
    Export {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long = "query", help = "Export only this query (repeatable)")]
        queries: Vec<String>,
    },
    /// Extract a zip archive into the cache.
    Import {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = StoreConfig::load().context("loading configuration")?;
    if let Some(root) = &cli.root {
        config.root.clone_from(root);
    }
    if let Some(db) = &cli.db {
        config.root = config.root.join(db);
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if cli.no_normalize {
        config.normalize = false;
    }
    config.validate()?;
    tracing::debug!(
        root = %config.root.display(),
        backend = %config.backend,
        normalize = config.normalize,
        "resolved configuration"
    );
    Ok(config)
}

/// `-` reads the query from stdin.
fn read_query(query: &str, stdin: impl Read) -> Result<String> {
    if query != "-" {
        return Ok(query.to_string());
    }
    let mut text = String::new();
    io::BufReader::new(stdin).read_to_string(&mut text).context("reading query from stdin")?;
    Ok(text)
}

fn table_to_json(table: &Table) -> serde_json::Value {
    table
        .rows()
        .iter()
        .map(|row| {
            table
                .columns()
                .iter()
                .cloned()
                .zip(row.iter().map(qcache_core::Value::to_json))
                .collect::<serde_json::Map<_, _>>()
        })
        .map(serde_json::Value::Object)
        .collect()
}

fn write_table(out: &mut impl Write, table: &Table) -> io::Result<()> {
    writeln!(out, "{}", table.columns().join("\t"))?;
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut out = io::stdout().lock();

    match cli.command {
        Command::List { json } => {
            let listing = Store::open(&config)?.list()?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&table_to_json(&listing))?)?;
            } else {
                write_table(&mut out, &listing)?;
            }
        }
        Command::Key { query, raw } => {
            let query = read_query(&query, io::stdin())?;
            let normalizer = Normalizer::new(config.max_normalize_length, config.memo_capacity);
            let keys = KeyDeriver::new(Arc::new(normalizer), config.normalize && !raw);
            writeln!(out, "{}", keys.derive(&query))?;
        }
        Command::Normalize { query } => {
            let query = read_query(&query, io::stdin())?;
            let normalizer = Normalizer::new(config.max_normalize_length, config.memo_capacity);
            writeln!(out, "{}", normalizer.normalize(&query))?;
        }
        Command::Show { query } => {
            let query = read_query(&query, io::stdin())?;
            let (results, metadata) = Store::open(&config)?.load(&query)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&metadata)?)?;
            writeln!(out)?;
            write_table(&mut out, &results)?;
        }
        Command::Export { path, queries } => {
            let store = Store::open(&config)?;
            let selected: Vec<&str> = queries.iter().map(String::as_str).collect();
            let written = store.export(&path, (!selected.is_empty()).then_some(selected.as_slice()))?;
            tracing::info!(path = %written.display(), queries = selected.len(), "export finished");
            writeln!(out, "{}", written.display())?;
        }
        Command::Import { path } => {
            let count = Store::open(&config)?
                .import_cache(&path)
                .with_context(|| format!("importing {}", path.display()))?;
            tracing::info!(path = %path.display(), files = count, "import finished");
            writeln!(out, "imported {count} files")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    run(cli)
}
