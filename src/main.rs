//! CLI entry point: full-revolution sweeps with JSON/CSV output and single-frame dumps.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;

use jansen_rs::config::{SimulationConfig, load_config};
use jansen_rs::report::write_samples_csv;
use jansen_rs::run_sweep;
use jansen_shared::kinematics::frame_at;

/// Jansen linkage solver CLI
#[derive(Parser, Debug)]
#[command(name = "jansen", about = "Kinematic and kinetic sweeps of a Jansen walking linkage.")]
struct Cli {
    /// Path to a TOML config file (defaults to the reference walker)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Samples per crank revolution (overrides the config file)
    #[arg(long)]
    samples: Option<usize>,

    /// Crank speed in rad/s (overrides the config file)
    #[arg(long, allow_hyphen_values = true)]
    crank_speed: Option<f64>,

    /// Log solver detail
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep every leg through one revolution and print a summary (default)
    Sweep {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Write one CSV row per leg and sample to this file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Solve leg 0 at a single crank angle and print the frame as JSON
    Frame {
        /// Crank angle in degrees
        #[arg(long, allow_hyphen_values = true)]
        angle: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(samples) = cli.samples {
        config.sweep.samples = samples;
    }
    if let Some(speed) = cli.crank_speed {
        config.sweep.crank_speed = speed;
    }

    match cli.command.unwrap_or(Commands::Sweep { json: false, csv: None }) {
        Commands::Sweep { json, csv } => {
            let output = run_sweep(&config)?;
            if let Some(path) = csv {
                let file = File::create(&path)?;
                write_samples_csv(&output.trajectories, output.mechanism.contact_tolerance, file)?;
                tracing::info!("Wrote samples to {}", path.display());
            }

            let report = &output.report;
            if json {
                println!("{}", report.to_json()?);
                return Ok(());
            }
            println!(
                "{} legs x {} samples at {} rad/s",
                report.leg_count, report.sample_count, report.crank_speed
            );
            for leg in &report.legs {
                let gait = &leg.gait;
                println!(
                    "leg {}: contact {:.1}%  step {:.3} cm  mean |v_G| {:.3} cm/s  peak torque {:.5} N·m  skipped {}",
                    gait.leg,
                    gait.contact.fraction * 100.0,
                    gait.step_length.unwrap_or(f64::NAN),
                    gait.speed.mean.unwrap_or(f64::NAN),
                    leg.kinetics.peak_torque.unwrap_or(f64::NAN),
                    gait.contact.excluded
                );
            }
            println!("mean contact fraction: {:.3}", report.contact_fraction);
            if let Some(speed) = report.mean_foot_speed {
                println!("mean foot speed: {:.3} cm/s", speed);
            }
            let load = &report.crank_load;
            match (load.mean_torque, load.peak_torque, load.mean_power) {
                (Some(mean), Some(peak), Some(power)) => println!(
                    "crank load: mean {:.5} N·m, peak {:.5} N·m, mean power {:.5} W ({} angles all legs, {} partial, {} none)",
                    mean, peak, power, load.full_coverage, load.partial_coverage, load.excluded
                ),
                _ => println!("crank load: no angle with any leg solved"),
            }
            if let Some(failure) = &report.partial_failure {
                tracing::warn!(
                    "{} of {} frames did not solve",
                    failure.total_skipped,
                    failure.total_samples
                );
            }
        }
        Commands::Frame { angle } => {
            let mechanism = config.mechanism()?;
            let frame = frame_at(
                angle.to_radians(),
                config.sweep.crank_speed,
                config.sweep.crank_acceleration,
                &mechanism,
            )?;
            println!("{}", serde_json::to_string_pretty(&frame)?);
        }
    }
    Ok(())
}
