//! StrataKV CLI
//!
//! Command-line interface for inspecting and editing a local StrataKV
//! data directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stratakv::{Config, Engine, Lookup};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv-cli")]
#[command(about = "Embedded LSM key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: String,

    /// Level-0 size budget in KB
    #[arg(long, default_value = "1024")]
    level0_kb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Flush the memtable to a level-0 table
    Flush,

    /// Compact a level, or every level over budget when omitted
    Compact {
        /// Level to compact
        level: Option<usize>,
    },

    /// Print memtable and per-level statistics
    Stats,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stratakv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .level0_size(args.level0_kb * 1024)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&engine, args.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> stratakv::Result<ExitCode> {
    match command {
        Commands::Get { key } => match engine.get(&key)? {
            Lookup::Found(value) => println!("{}", String::from_utf8_lossy(&value)),
            Lookup::Deleted => {
                println!("(deleted)");
                return Ok(ExitCode::from(1));
            }
            Lookup::NotPresent => {
                println!("(not found)");
                return Ok(ExitCode::from(1));
            }
        },
        Commands::Put { key, value } => {
            engine.put(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            let previous = engine.delete(&key)?;
            println!("{}", if previous.is_some() { "DELETED" } else { "OK" });
        }
        Commands::Flush => {
            let flushed = engine.flush()?;
            println!("{}", if flushed { "FLUSHED" } else { "EMPTY" });
        }
        Commands::Compact { level } => {
            let results = match level {
                Some(level) => engine.compact_level(level)?.into_iter().collect(),
                None => engine.maintain()?.compactions,
            };
            for result in &results {
                println!(
                    "L{} -> L{}: {} tables in, {} out, {} records",
                    result.source_level,
                    result.target_level,
                    result.consumed.len(),
                    result.produced.len(),
                    result.records_written
                );
            }
            if results.is_empty() {
                println!("nothing to compact");
            }
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!(
                "memtable: {} live / {} entries",
                stats.memtable_live, stats.memtable_entries
            );
            for (level, (tables, bytes, budget)) in stats.levels.iter().enumerate() {
                println!("L{}: {} tables, {} / {} bytes", level, tables, bytes, budget);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
