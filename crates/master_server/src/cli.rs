//! Command-line interface handling.
//!
//! Argument parsing with `clap`; everything here is an override on top of
//! the TOML configuration file.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the session-service bind address
    pub plasma_bind: Option<String>,
    /// Optional override for the game-hosting bind address
    pub theater_bind: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    pub fn parse() -> Self {
        let matches = Command::new("Master Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Session and game-hosting master server for legacy multiplayer clients")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("plasma-bind")
                    .long("plasma-bind")
                    .value_name("ADDRESS")
                    .help("Session-service bind address (e.g., 0.0.0.0:18270)"),
            )
            .arg(
                Arg::new("theater-bind")
                    .long("theater-bind")
                    .value_name("ADDRESS")
                    .help("Game-hosting bind address (e.g., 0.0.0.0:18395)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("Default config path should always be set"),
            ),
            plasma_bind: matches.get_one::<String>("plasma-bind").cloned(),
            theater_bind: matches.get_one::<String>("theater-bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
