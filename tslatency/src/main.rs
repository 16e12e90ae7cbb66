use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::info;

use tslatency::commands::{recv, send, watch};
use tslatency::config::{self, ConfigFile, LoggingConfig, LoggingSection};
use tslatency::{LatencyError, LogTrigger, ReceiverConfig, SenderConfig, StopFlag, WatchConfig};

use crate::context::{Cli, Commands};

mod context;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LatencyError> {
    // Config file: explicit path > auto-detect > defaults
    let file_config = match config::find_config(cli.config.clone()) {
        Some(path) => config::load_config(&path)?,
        None => ConfigFile::default(),
    };

    let logging = LoggingConfig::from(
        LoggingSection {
            log_dir: cli
                .log_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            ..Default::default()
        }
        .or(file_config.logging.clone()),
    );
    let _log_guard = tslatency::logging::init_logging(&logging, cli.verbose)?;

    let stop = StopFlag::new();
    stop.install_handler()?;
    info!("Press Ctrl+C to stop.");

    let mut out = io::stdout().lock();

    match &cli.command {
        Commands::Send { .. } => {
            let section = cli.command.sender_section().unwrap_or_default();
            let config = SenderConfig::try_from(section.or(file_config.sender))?;
            send::run(&config, &stop)?;
        }
        Commands::Recv { .. } => {
            let section = cli.command.receiver_section().unwrap_or_default();
            let config = ReceiverConfig::try_from(section.or(file_config.receiver))?;
            let summary = recv::run(&config, &stop, &mut out)?;
            writeln!(out, "{} {}", "Summary:".bold(), summary).map_err(LatencyError::Output)?;
        }
        Commands::Watch { .. } => {
            let section = cli.command.watch_section().unwrap_or_default();
            let config = WatchConfig::try_from(section.or(file_config.watch))?;
            let mut trigger = LogTrigger::new();
            let summary = watch::run(&config, &stop, io::stdin(), &mut trigger, &mut out)?;
            writeln!(out, "{} {}", "Summary:".bold(), summary).map_err(LatencyError::Output)?;
        }
    }

    Ok(())
}
