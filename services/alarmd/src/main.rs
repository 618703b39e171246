//! alarmd - alarm scheduler service
//!
//! `alarmd run` polls the alarm table until Ctrl+C/SIGTERM; SIGHUP re-reads
//! `log.level` from the configuration. The other subcommands edit the
//! customizable alarm file offline.

mod actions;
mod commands;
mod config;
mod service;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::logging::{self, LogConfig};

use crate::commands::AlarmFields;
use crate::config::{AlarmdConfig, SERVICE_NAME};

#[derive(Parser)]
#[command(name = "alarmd")]
#[command(about = "Alarm scheduler service for edge devices")]
#[command(long_about = "Alarm scheduler service for edge devices

Runs up to 16 time-based alarms (system alarms from the config file plus
customizable alarms stored as JSON) once the system clock is trusted.

Examples:
  alarmd run                                    # Run the scheduler
  alarmd list                                   # Show the alarm table
  alarmd add --name Pump --hour 6 --minute 0 --action RELAY_ON --parameter 2
  alarmd modify 3 --minute 30                   # Move alarm 3 to :30
  alarmd disable 3")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: config/alarmd.{toml,yaml,json})
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the config file
    #[arg(long, global = true, env = "ALARMD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler (default)
    Run,

    /// Show the alarm table
    List {
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Hide system alarms
        #[arg(short = 'u', long)]
        customizable: bool,
    },

    /// Show table counters
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Create a customizable alarm
    Add {
        #[command(flatten)]
        fields: AlarmFields,
    },

    /// Change a customizable alarm; omitted fields keep their value
    Modify {
        /// Web id of the alarm
        id: i32,

        #[command(flatten)]
        fields: AlarmFields,
    },

    /// Delete a customizable alarm
    Delete {
        /// Web id of the alarm
        id: i32,
    },

    /// Enable a customizable alarm
    Enable {
        /// Web id of the alarm
        id: i32,
    },

    /// Disable a customizable alarm
    Disable {
        /// Web id of the alarm
        id: i32,
    },

    /// Validate the configuration and the alarm file
    Check {
        /// Print the default configuration as YAML instead
        #[arg(long)]
        print_default: bool,
    },
}

fn init_logging(config: &AlarmdConfig, service_mode: bool) -> Result<()> {
    let log_config = if service_mode {
        LogConfig {
            service_name: SERVICE_NAME.to_string(),
            log_dir: logging::log_root(config.log.dir.as_deref()),
            level: config.log.level.clone(),
            file_enabled: config.log.file_enabled,
            enable_json: false,
        }
    } else {
        // Offline commands print their own output; keep the console quiet
        LogConfig {
            service_name: SERVICE_NAME.to_string(),
            level: if config.log.level == "info" {
                "warn".to_string()
            } else {
                config.log.level.clone()
            },
            file_enabled: false,
            ..LogConfig::default()
        }
    };
    logging::init_with_config(log_config).context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = AlarmdConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }

    let command = cli.command.unwrap_or(Commands::Run);
    let service_mode = matches!(command, Commands::Run);
    init_logging(&config, service_mode)?;

    match command {
        Commands::Run => {
            config.validate()?;
            service::run_service(config, cli.config).await
        },
        Commands::List { json, customizable } => commands::list(&config, json, customizable),
        Commands::Stats { json } => commands::stats(&config, json),
        Commands::Add { fields } => commands::add(&config, &fields),
        Commands::Modify { id, fields } => commands::modify(&config, id, &fields),
        Commands::Delete { id } => commands::delete(&config, id),
        Commands::Enable { id } => commands::set_enabled(&config, id, true),
        Commands::Disable { id } => commands::set_enabled(&config, id, false),
        Commands::Check { print_default } => commands::check(&config, print_default),
    }
}
