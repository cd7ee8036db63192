//! `trajrecon` CLI: scenario simulation, dataset reconstruction, accuracy runs.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sim::replay::{load_json, load_trips, save_json, save_log};
use sim::scenarios::{Scenario, ScenarioKind};
use sim::{evaluate, Evaluation};
use std::path::{Path, PathBuf};
use trajectory_core::{
    ReconstructionConfig, ReconstructionReport, TargetIdAllocator, TripOutcome, TripProcessor,
};

#[derive(Parser)]
#[command(name = "trajrecon", about = "Vehicle trajectory reconstruction CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario and save the trip with its ground truth.
    Simulate {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Scenario log JSON file
        #[arg(long)]
        output: PathBuf,
    },
    /// Reconstruct every trip of a dataset (list of trips or scenario log).
    Reconstruct {
        /// Path to the dataset JSON file
        input: PathBuf,
        /// Reconstruction parameters (JSON); missing fields take defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the reconstruction report to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// First surrounding-vehicle id to hand out
        #[arg(long, default_value_t = 1)]
        first_target_id: u64,
    },
    /// Simulate a scenario, reconstruct it and report the error against truth.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the scenario log
        #[arg(long)]
        save_log: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            scenario,
            seed,
            output,
        } => {
            simulate(scenario, seed, &output)?;
        }
        Commands::Reconstruct {
            input,
            config,
            output,
            first_target_id,
        } => {
            reconstruct(&input, config.as_deref(), output.as_deref(), first_target_id)?;
        }
        Commands::RunScenario {
            scenario,
            seed,
            output,
            save_log: log_path,
        } => {
            run_scenario(scenario, seed, output.as_deref(), log_path.as_deref())?;
        }
    }

    Ok(())
}

fn simulate(kind: ScenarioKind, seed: u64, output: &Path) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let log = scenario.run();
    println!(
        "Scenario '{}' (seed={}): {} ego samples, {} forward / {} rearward returns",
        log.scenario_name,
        seed,
        log.trip.ego.len(),
        log.trip.forward.len(),
        log.trip.rearward.len()
    );
    save_log(&log, output)?;
    println!("Log saved to {}", output.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReconstructionConfig> {
    let config = match path {
        Some(p) => load_json(p)?,
        None => ReconstructionConfig::default(),
    };
    Ok(config)
}

fn reconstruct(input: &Path, config: Option<&Path>, output: Option<&Path>, first_target_id: u64) -> Result<()> {
    let trips = load_trips(input)?;
    if trips.is_empty() {
        bail!("{} contains no trips", input.display());
    }
    let processor = TripProcessor::new(load_config(config)?)?;
    println!("Reconstructing {} trips...", trips.len());

    let start = std::time::Instant::now();
    let mut allocator = TargetIdAllocator::new(first_target_id);
    let report = processor.process_batch(&trips, &mut allocator);
    let elapsed = start.elapsed();

    print_summary(&report);
    println!("elapsed={:.2}s", elapsed.as_secs_f64());

    if let Some(path) = output {
        save_json(&report, path)?;
        println!("Report saved to {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &ReconstructionReport) {
    println!(
        "Trips: {} reconstructed, {} invalid; {} surrounding tracks",
        report.trips.len(),
        report.invalid.len(),
        report.track_count()
    );
    for trip in &report.trips {
        println!(
            "  {}: {} run, {} ego samples, {} tracks ({} dropped)",
            trip.trip_id,
            trip.direction,
            trip.ego.len(),
            trip.tracks.len(),
            trip.dropped_tracks
        );
    }
    for invalid in &report.invalid {
        println!("  {}: invalid ({:?})", invalid.trip_id, invalid.reason);
    }
}

fn run_scenario(kind: ScenarioKind, seed: u64, output: Option<&Path>, log_path: Option<&Path>) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s)...",
        scenario.name, seed, scenario.duration
    );
    let log = scenario.run();
    if let Some(path) = log_path {
        save_log(&log, path)?;
        println!("Log saved to {}", path.display());
    }

    let processor = TripProcessor::new(ReconstructionConfig::default())?;
    let mut allocator = TargetIdAllocator::new(1);
    let rec = match processor.process_trip(&log.trip, &mut allocator)? {
        TripOutcome::Reconstructed(rec) => rec,
        TripOutcome::Invalid(invalid) => bail!("trip not reconstructed: {:?}", invalid.reason),
    };

    let eval: Evaluation = evaluate(&log.truth, &rec);
    println!(
        "Ego ({} run): RMSE pos={:.2}m speed={:.3}m/s heading={:.4}rad",
        rec.direction,
        eval.ego.rmse_position(),
        eval.ego.rmse_speed(),
        eval.ego.rmse_heading()
    );
    println!(
        "Surrounding ({} tracks): RMSE pos={:.2}m speed={:.3}m/s heading={:.4}rad",
        eval.tracks,
        eval.surrounding.rmse_position(),
        eval.surrounding.rmse_speed(),
        eval.surrounding.rmse_heading()
    );

    if let Some(path) = output {
        let json = serde_json::json!({
            "scenario": log.scenario_name,
            "seed": seed,
            "direction": rec.direction,
            "forward_error": rec.forward_error,
            "reverse_error": rec.reverse_error,
            "tracks": eval.tracks,
            "ego_rmse_position": eval.ego.rmse_position(),
            "ego_rmse_speed": eval.ego.rmse_speed(),
            "ego_rmse_heading": eval.ego.rmse_heading(),
            "surrounding_rmse_position": eval.surrounding.rmse_position(),
            "surrounding_rmse_speed": eval.surrounding.rmse_speed(),
            "surrounding_rmse_heading": eval.surrounding.rmse_heading(),
        });
        std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", path.display());
    }
    Ok(())
}
