//! PageKV CLI
//!
//! Runs one command against a filesystem-backed store.
//!
//! Keys are given as a plain key, an inclusive `min..max` range, or a
//! comma-separated list:
//!
//! ```text
//! pagekv-cli create users --map
//! pagekv-cli insert users alice alice@example.com
//! pagekv-cli query users alice,bob
//! pagekv-cli create log
//! pagekv-cli insert log "first entry"
//! pagekv-cli list log --limit 10 --desc
//! ```

use clap::{Parser, Subcommand};
use pagekv::{Command, Config, Engine, IndexKind, Keys, LockSettings};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// PageKV CLI
#[derive(Parser, Debug)]
#[command(name = "pagekv-cli")]
#[command(about = "CLI for the PageKV storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./pagekv_data")]
    data_dir: String,

    /// Records per auto index page
    #[arg(long, default_value = "1000")]
    auto_page_size: u64,

    /// Lock duration in milliseconds
    #[arg(long, default_value = "50")]
    lock_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an index
    Create {
        index: String,

        /// Create a map index instead of an auto index
        #[arg(long)]
        map: bool,
    },

    /// Drop an index and all of its pages
    Drop {
        index: String,

        #[arg(long)]
        map: bool,
    },

    /// Read keys
    Query { index: String, keys: String },

    /// Auto index: insert VALUE_OR_KEY. Map index: insert VALUE under KEY.
    Insert {
        index: String,
        value_or_keys: String,
        value: Option<String>,
    },

    /// Replace the value of existing keys
    Update {
        index: String,
        keys: String,
        value: String,
    },

    /// Insert or replace
    Upsert {
        index: String,
        keys: String,
        value: String,
    },

    /// Delete keys
    Delete { index: String, keys: String },

    /// List records
    List {
        index: String,

        #[arg(short, long, default_value = "0")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,

        #[arg(long)]
        desc: bool,
    },

    /// Count records
    Count { index: String },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pagekv=info"));
    // Results go to stdout, logs to stderr
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .auto_page_size(args.auto_page_size)
        .filesystem_lock(LockSettings::new(Duration::from_millis(args.lock_ms)))
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let command = match to_command(args.command) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    match engine.execute(command) {
        Ok(result) => println!("{}", result),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

fn to_command(command: Commands) -> Result<Command, String> {
    let kind = |map: bool| if map { IndexKind::Map } else { IndexKind::Auto };
    Ok(match command {
        Commands::Create { index, map } => Command::Create {
            kind: kind(map),
            index,
        },
        Commands::Drop { index, map } => Command::Drop {
            kind: kind(map),
            index,
        },
        Commands::Query { index, keys } => Command::Query {
            index,
            keys: parse_keys(&keys)?,
        },
        Commands::Insert {
            index,
            value_or_keys,
            value,
        } => match value {
            Some(value) => Command::Insert {
                index,
                keys: Some(parse_keys(&value_or_keys)?),
                value,
            },
            None => Command::Insert {
                index,
                keys: None,
                value: value_or_keys,
            },
        },
        Commands::Update { index, keys, value } => Command::Update {
            index,
            keys: parse_keys(&keys)?,
            value,
        },
        Commands::Upsert { index, keys, value } => Command::Upsert {
            index,
            keys: parse_keys(&keys)?,
            value,
        },
        Commands::Delete { index, keys } => Command::Delete {
            index,
            keys: parse_keys(&keys)?,
        },
        Commands::List {
            index,
            limit,
            offset,
            desc,
        } => Command::List {
            index,
            limit,
            offset,
            descending: desc,
        },
        Commands::Count { index } => Command::Count { index },
    })
}

/// `a..b` (inclusive range), `a,b,c` (list) or a single key
fn parse_keys(raw: &str) -> Result<Keys, String> {
    if let Some((min, max)) = raw.split_once("..") {
        let min = min.trim().parse().map_err(|_| format!("bad range start {:?}", min))?;
        let max = max.trim().parse().map_err(|_| format!("bad range end {:?}", max))?;
        return Ok(Keys::Range { min, max });
    }
    if raw.contains(',') {
        return Ok(Keys::array(raw.split(',').map(str::trim)));
    }
    Ok(Keys::single(raw))
}
