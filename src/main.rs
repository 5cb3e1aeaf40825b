use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{error, info};
use sessionstore::configuration::config::Config;
use sessionstore::session_management::session::SessionData;
use sessionstore::storage::{DatabaseStorage, StorageHandler};

#[derive(Parser)]
#[command(name = "sessionstore")]
#[command(version)]
#[command(about = "Maintenance tool for the SQL session store")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long, env = "SESSIONSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the session table if it does not exist
    Init,
    /// Delete sessions idle for longer than the maximum age
    Gc {
        /// Maximum idle time in seconds (defaults to the configured gc_maxlifetime)
        #[arg(long, allow_negative_numbers = true)]
        max_age: Option<i64>,
    },
    /// Delete one session
    Destroy { id: String },
    /// Print the timestamps and data of one session
    Show { id: String },
    /// Print the number of stored sessions
    Count,
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            eprintln!("Unable to import configuration from {}: {}", path.display(), e);
            std::process::exit(1);
        }),
        None => Config::default(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level()))
        .format_target(false)
        .init();

    if let Err(e) = run(&config, args.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config, command: Command) -> Result<(), Box<dyn Error>> {
    let conn = Arc::new(config.connect()?);
    let schema = config.database.schema();

    if let Command::Init = command {
        conn.create_schema(&schema)?;
        info!("Session table {} is ready", schema.table);
        return Ok(());
    }

    let storage = DatabaseStorage::with_schema(conn, schema)?;
    match command {
        Command::Init => {}
        Command::Gc { max_age } => {
            let max_age = match max_age {
                Some(secs) => secs,
                None => config.session_options()?.gc_maxlifetime(),
            };
            let removed = storage.purge_expired(max_age)?;
            println!("{}", removed);
        }
        Command::Destroy { id } => {
            storage.destroy(&id)?;
            info!("Session {} destroyed", id);
        }
        Command::Show { id } => match storage.fetch_record(&id)? {
            Some(record) => {
                println!("id:              {}", record.id);
                println!("created:         {}", format_timestamp(record.created));
                println!("last impression: {}", format_timestamp(record.last_impression));
                match SessionData::from_payload(&record.data) {
                    Ok(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                    Err(_) => println!("{}", String::from_utf8_lossy(&record.data)),
                }
            }
            None => return Err(format!("no session with id {}", id).into()),
        },
        Command::Count => println!("{}", storage.count()?),
    }
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(at) => format!("{} ({})", at.to_rfc3339(), secs),
        None => secs.to_string(),
    }
}
