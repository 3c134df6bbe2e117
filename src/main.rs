use clap::Parser;
use polog::args::{Args, BackupAction, Command};
use polog::commands::{self, OutputFormat};
use polog::{Config, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with {} error: {e}", e.error_type());
            ExitCode::FAILURE
        }
    }
}

pub fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().polog_home().path();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args)?.print(),

        Command::Add(add_args) => {
            let config = Config::load(home)?;
            commands::add(&config, add_args)?.print()
        }

        Command::Search(search_args) => {
            let config = Config::load(home)?;
            let out = commands::search(&config, search_args)?;
            out.print();
            if let Some(found) = out.structure() {
                // an empty table would print only a header
                if found.matched > 0 || search_args.format() == OutputFormat::Json {
                    println!("{}", found.rows);
                }
            }
        }

        Command::Sheets => {
            let config = Config::load(home)?;
            commands::sheets(&config)?.print()
        }

        Command::Backup(backup_args) => {
            let config = Config::load(home)?;
            match backup_args.action() {
                BackupAction::Create => commands::backup_create(&config)?.print(),
                BackupAction::List => commands::backup_list(&config)?.print(),
                BackupAction::Restore(restore_args) => {
                    commands::backup_restore(&config, restore_args.file())?.print()
                }
            }
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
