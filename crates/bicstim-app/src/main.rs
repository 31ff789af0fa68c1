//! bicstim - Pre-check BIC3232 stimulation commands
//!
//! Validates stimulation command files against the implant's pulse waveform
//! constraints and runs them on a simulated implant.
//!
//! # Usage
//!
//! ```bash
//! # Write a valid example command
//! bicstim example > command.json
//!
//! # Validate a command file
//! bicstim validate command.json
//!
//! # Validate with custom limits, checking ranges only
//! bicstim validate command.json --limits limits.json --range-only
//!
//! # Submit to a simulated implant and log its events
//! bicstim simulate command.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bicstim_core::{CommandValidator, GridPolicy, PulseLimits};
use bicstim_native::io::{example_command, load_command, load_limits, to_json};
use bicstim_native::{Implant, ImplantEvent, SimulatedImplant, StimulationSession};

/// bicstim command-line tool
#[derive(Parser, Debug)]
#[command(name = "bicstim")]
#[command(author, version, about = "BIC3232 stimulation command pre-check", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a command file
    Validate {
        /// Command file (JSON)
        file: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a command file to a simulated implant
    Simulate {
        /// Command file (JSON)
        file: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Print a valid example command
    Example {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct LimitArgs {
    /// Limits file (JSON); missing fields keep BIC3232 values
    #[arg(long)]
    limits: Option<PathBuf>,

    /// Check ranges and ratios but not step grids
    #[arg(long)]
    range_only: bool,
}

impl LimitArgs {
    fn resolve(&self) -> anyhow::Result<PulseLimits> {
        let limits = match &self.limits {
            Some(path) => load_limits(path)?,
            None => PulseLimits::BIC3232,
        };
        Ok(if self.range_only { limits.with_grid(GridPolicy::RangeOnly) } else { limits })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("bicstim v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Validate { file, limits, json } => run_validate(&file, &limits, json),
        Commands::Simulate { file, limits } => run_simulate(&file, &limits),
        Commands::Example { output } => run_example(output.as_deref()),
    }
}

/// Validate a command file, failing if it is rejected
fn run_validate(file: &Path, limits: &LimitArgs, json: bool) -> anyhow::Result<()> {
    let validator = CommandValidator::new(limits.resolve()?);
    let command = load_command(file)?;
    let result = validator.validate(&command);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.valid {
        println!("{}: valid", file.display());
    } else {
        println!("{}: invalid: {}", file.display(), result.reason);
    }

    if !result.valid {
        anyhow::bail!("command rejected");
    }
    info!(
        command = command.name(),
        functions = command.size(),
        duration_us = command.duration_us(),
        "Command accepted"
    );
    Ok(())
}

/// Submit a command file to a simulated implant and log its events
fn run_simulate(file: &Path, limits: &LimitArgs) -> anyhow::Result<()> {
    let command = load_command(file)?;
    let mut session = StimulationSession::new(SimulatedImplant::bic3232(), limits.resolve()?);
    let mut events = session.implant_mut().subscribe();

    let implant_info = session.implant().implant_info();
    info!(
        device = %implant_info.device_type,
        stimulation_channels = implant_info.stimulation_channel_count(),
        "Submitting {} to simulated implant",
        file.display()
    );
    let submitted = session.submit(command);

    let mut faults = 0usize;
    while let Ok(event) = events.try_recv() {
        if event.is_error() {
            faults += 1;
        }
        match event {
            ImplantEvent::StimulationStateChanged(active) => info!(active, "Stimulation state"),
            ImplantEvent::StimulationFunctionFinished(count) => debug!(count, "Function finished"),
            ImplantEvent::Error(message) => error!("Implant error: {}", message),
            ImplantEvent::DataProcessingTooSlow => warn!("Data processing too slow"),
            other => debug!(?other, "Implant event"),
        }
    }

    submitted.context("stimulation was not started")?;
    if faults > 0 {
        anyhow::bail!("implant reported {faults} fault(s) during stimulation");
    }
    println!("{}: stimulated", file.display());
    Ok(())
}

/// Print or write the example command
fn run_example(output: Option<&Path>) -> anyhow::Result<()> {
    let json = to_json(&example_command()?)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote example command to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
