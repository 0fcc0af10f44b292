// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Dynamics CLI
//!
//! Runs simulations described in YAML files and prints the results as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Run a simulation
//! qubit-os-dynamics solve --spec rabi.yaml
//!
//! # Force a method
//! qubit-os-dynamics solve --spec rabi.yaml --method expm
//!
//! # List solver methods and array libraries
//! qubit-os-dynamics methods
//!
//! # Show effective configuration
//! qubit-os-dynamics config
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qubit_os_dynamics::{
    array::ArrayLibrary, config::Config, simulation::SimulationSpec, solver::SolveSummary,
    solvers::Method, Result, VERSION,
};

/// QubitOS time-dependent quantum dynamics
#[derive(Parser)]
#[command(name = "qubit-os-dynamics")]
#[command(author = "QubitOS Contributors")]
#[command(version = VERSION)]
#[command(about = "Simulate time-dependent quantum systems")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation file
    Solve {
        /// Simulation description (YAML)
        #[arg(short, long)]
        spec: PathBuf,

        /// Integration method, overriding file and config
        #[arg(short, long, env = "QUBITOS_DYNAMICS_METHOD")]
        method: Option<String>,

        /// Print only the final state
        #[arg(long)]
        final_only: bool,
    },

    /// List integration methods and array libraries
    Methods,

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, &config.logging.format);

    match cli.command {
        Commands::Solve {
            spec,
            method,
            final_only,
        } => {
            config.validate()?;
            let method = method.map(|m| m.parse::<Method>()).transpose()?;
            let simulation = SimulationSpec::load(&spec)?;

            info!(version = VERSION, spec = %spec.display(), "Starting simulation");

            let mut result = match simulation.run(&config, method) {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Simulation failed");
                    return Err(e);
                }
            };
            if final_only {
                let last = result.y.len().saturating_sub(1);
                result.t = result.t.split_off(last);
                result.y = result.y.split_off(last);
            }
            println!("{}", serde_json::to_string_pretty(&SolveSummary::from(&result))?);
        }

        Commands::Methods => {
            println!("Integration methods:");
            for tag in Method::tags() {
                let default_marker = if tag.eq_ignore_ascii_case(&config.solver.method) {
                    " (default)"
                } else {
                    ""
                };
                println!("  {}{}", tag, default_marker);
            }
            println!("Array libraries:");
            for tag in ArrayLibrary::tags() {
                println!("  {}", tag);
            }
        }

        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "compact" {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
