// CLI module - command-line argument parsing and config handlers
//
// Subcommands:
// - serve (default): run the ingestion and broadcast server
// - watch: follow a live broadcast stream and log race progress
// - replay [--follow]: drip-feed a synthesized run through the same tracking
//   logic, optionally switching to the live stream afterwards
// - config --show|--path|--reset: inspect or regenerate the config file

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;

/// Race tracker - GPS ingestion and delayed live broadcast
#[derive(Parser)]
#[command(name = "racetrack")]
#[command(version = VERSION)]
#[command(about = "Race position ingestion and delayed SSE broadcast", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion and broadcast server (default)
    Serve,

    /// Follow a live broadcast stream
    Watch {
        /// Stream URL (defaults to [tracker].stream_url)
        #[arg(long)]
        url: Option<String>,
    },

    /// Replay a synthesized run along the configured route
    Replay {
        /// Milliseconds between fixes (defaults to [tracker].replay_interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Switch to the live stream once the replay finishes
        #[arg(long)]
        follow: bool,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Parse command-line arguments
pub fn parse() -> Cli {
    Cli::parse()
}

/// Handle `config` flags
pub fn handle_config(show: bool, reset: bool, path: bool) {
    if path {
        handle_config_path();
    } else if show {
        handle_config_show();
    } else if reset {
        handle_config_reset();
    } else {
        // No flag provided, show help
        println!("Usage: racetrack config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    println!();
    println!(
        "# RACE_PING_SECRET: {}",
        if config.ping_secret.is_some() {
            "set"
        } else {
            "not set (pings rejected)"
        }
    );

    // Show source info
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return;
        }
    }

    match Config::reset_config_file() {
        Ok(path) => println!("Config reset to defaults: {}", path.display()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
