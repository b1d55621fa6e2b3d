//! Siting Soak
//!
//! Drives the mutation engine against a synthetic plume dataset and checks
//! that every candidate stays well-formed. Each worker owns one candidate and
//! one seeded RNG, applies `steps` mutations, verifies after every step that
//! the wells partition the sensors, then scores its final candidate. The run
//! summary is printed to stdout as JSON; logs go to stderr.
//!
//! # Usage
//! ```bash
//! siting-soak --nx 12 --ny 12 --nz 6 --scenarios 16 --workers 8 --steps 500
//! RUST_LOG=sensor_siting=debug siting-soak --config siting.toml --json-logs
//! ```

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use sensor_siting::config::{MutationMode, RunConfig};
use sensor_siting::detection::score_configuration;
use sensor_siting::seeding::{worker_rng, worker_seed};
use sensor_siting::sensors::DeltaType;
use sensor_siting::{
    Configuration, ExtendedConfiguration, InMemoryFieldData, NodeStructure, Scenario, ScenarioSet,
    TimeStep, Trigger, Xyz,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "siting-soak")]
#[command(about = "Soak test of the sensor siting mutation engine on synthetic plumes")]
#[command(version)]
struct Args {
    /// Run config (TOML); falls back to SITING_CONFIG, ./siting.toml, defaults
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Grid cells along x
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=200))]
    nx: u16,

    /// Grid cells along y
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=200))]
    ny: u16,

    /// Grid cells along z
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u16).range(1..=100))]
    nz: u16,

    /// Number of synthetic leakage scenarios
    #[arg(long, default_value = "8")]
    scenarios: usize,

    /// Time steps per scenario, after the initial one
    #[arg(long, default_value = "10")]
    time_steps: usize,

    /// Standard deviation of the measurement noise added to the plumes
    #[arg(long, default_value = "0.01")]
    noise: f64,

    /// Override run.workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override run.steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override run.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Sensor types used when the config does not name any.
const DEFAULT_SENSOR_TYPES: [&str; 2] = ["co2", "pressure"];

/// Cell sizes of the synthetic grid (m).
const CELL_XY: f64 = 50.0;
const CELL_Z: f64 = 10.0;

/// Years between synthetic time steps.
const STEP_YEARS: f64 = 5.0;

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct WorkerReport {
    worker: usize,
    seed: u64,
    sensors: usize,
    wells: usize,
    sensor_cost: f64,
    installation_cost: f64,
    objective: f64,
    time_to_detection: f64,
    percent_detected: f64,
    outcomes: BTreeMap<&'static str, usize>,
    summary: String,
    configuration: Configuration,
}

#[derive(Debug, Serialize)]
struct RunReport {
    run: String,
    dims: [usize; 3],
    scenarios: usize,
    sensor_types: Vec<String>,
    steps: usize,
    best_worker: Option<usize>,
    workers: Vec<WorkerReport>,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = match &args.config {
        Some(path) => RunConfig::load_from_file(path)
            .with_context(|| format!("loading run config {}", path.display()))?,
        None => RunConfig::load(),
    };
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if let Some(steps) = args.steps {
        config.run.steps = steps;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    config.validate().context("invalid run config after CLI overrides")?;

    let set = build_scenario_set(&args, &config)?;
    let seed = config.run.seed;
    info!(
        run = %config.run.name,
        workers = config.run.workers,
        steps = config.run.steps,
        seed,
        mutation = ?config.run.mutation,
        threaded = config.run.threaded,
        "Starting soak run"
    );

    let reports: Vec<WorkerReport> = if config.run.threaded {
        (0..config.run.workers)
            .into_par_iter()
            .map(|w| run_worker(&set, &config, w))
            .collect::<Result<_>>()?
    } else {
        (0..config.run.workers)
            .map(|w| run_worker(&set, &config, w))
            .collect::<Result<_>>()?
    };

    let best_worker = reports
        .iter()
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
        .map(|r| r.worker);
    let dims = set.grid().dims();
    let report = RunReport {
        run: config.run.name.clone(),
        dims: [dims.i, dims.j, dims.k],
        scenarios: set.scenarios().len(),
        sensor_types: set.sensor_types().map(str::to_string).collect(),
        steps: config.run.steps,
        best_worker,
        workers: reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Synthetic grid, plumes and scenario set, with the config applied on top
/// of soak defaults.
fn build_scenario_set(args: &Args, config: &RunConfig) -> Result<ScenarioSet> {
    let time_steps: Vec<TimeStep> = (0..=args.time_steps)
        .map(|t| TimeStep::new(t, t as f64 * STEP_YEARS))
        .collect();
    let (nx, ny, nz) = (usize::from(args.nx), usize::from(args.ny), usize::from(args.nz));
    let grid = NodeStructure::from_cell_widths(
        Xyz::new(0.0, 0.0, -(nz as f64) * CELL_Z),
        &vec![CELL_XY; nx],
        &vec![CELL_XY; ny],
        &vec![CELL_Z; nz],
        time_steps,
    )
    .context("building synthetic grid")?;

    ensure!(args.scenarios > 0, "at least one scenario is required");
    let scenarios: Vec<Scenario> = (1..=args.scenarios)
        .map(|i| Scenario::new(format!("scenario_{i:03}")))
        .collect();

    let sensor_types: Vec<String> = if config.sensors.is_empty() {
        DEFAULT_SENSOR_TYPES.iter().map(|t| (*t).to_string()).collect()
    } else {
        config.sensors.keys().cloned().collect()
    };
    let amplitudes: Vec<(&str, f64)> = sensor_types
        .iter()
        .enumerate()
        .map(|(n, t)| (t.as_str(), 1.0 + n as f64 * 0.5))
        .collect();
    let data = InMemoryFieldData::synthetic_plumes(
        &grid,
        &scenarios,
        &amplitudes,
        args.noise,
        worker_seed(config.run.seed, usize::MAX),
    );

    let mut set = ScenarioSet::new(grid, scenarios, &sensor_types, Arc::new(data))
        .context("building scenario set")?;

    // Plume values start at zero, so fire on a rise above the noise floor
    for sensor_type in &sensor_types {
        let settings = sensor_siting::UserSettings {
            cost: 50.0,
            trigger: Trigger::AbsoluteDelta,
            delta_type: DeltaType::Increase,
            lower_threshold: 0.1,
            ..set
                .setting(sensor_type)
                .context("sensor type vanished from scenario set")?
                .user_settings()
        };
        set.apply_user_settings(sensor_type, &settings)?;
    }
    set.apply_run_config(config).context("applying run config")?;

    for sensor_type in &sensor_types {
        let cloud = set.cloud(sensor_type).len();
        if cloud == 0 {
            warn!(sensor_type = %sensor_type, "Sensor type never triggers, it will not be placed");
        } else {
            info!(sensor_type = %sensor_type, cloud, "Sensor cloud ready");
        }
    }
    Ok(set)
}

fn run_worker(set: &ScenarioSet, config: &RunConfig, worker: usize) -> Result<WorkerReport> {
    let mut rng = worker_rng(config.run.seed, worker);
    let mut candidate = ExtendedConfiguration::new();
    let mut outcomes: BTreeMap<&'static str, usize> = BTreeMap::new();

    for step in 0..config.run.steps {
        let before = Configuration::from(&candidate);
        let outcome = match config.run.mutation {
            MutationMode::Sensor => candidate.mutate_sensor(set, config.run.model_option, &mut rng),
            MutationMode::Well => candidate.mutate_well(set, &mut rng),
        };
        *outcomes.entry(outcome.name()).or_insert(0) += 1;

        check_partition(&candidate).with_context(|| format!("worker {worker}, step {step}, after {}", outcome.name()))?;
        if !outcome.succeeded() {
            ensure!(
                Configuration::from(&candidate) == before,
                "worker {worker}, step {step}: failed mutation changed the candidate"
            );
        }
        if candidate.count_wells() > set.constraints().max_wells && config.run.mutation == MutationMode::Well {
            bail!("worker {worker}, step {step}: realized wells exceed the cap");
        }
    }

    let objective = score_configuration(&mut candidate, set, config.run.threaded);
    let report = WorkerReport {
        worker,
        seed: worker_seed(config.run.seed, worker),
        sensors: candidate.sensors().len(),
        wells: candidate.count_wells(),
        sensor_cost: candidate.cost(set),
        installation_cost: set.installation_cost(&candidate),
        objective,
        time_to_detection: candidate.time_to_detection(set),
        percent_detected: candidate.percent_scenarios_detected(set),
        outcomes,
        summary: candidate.summary(set.grid()),
        configuration: Configuration::from(&candidate),
    };
    info!(
        worker,
        sensors = report.sensors,
        wells = report.wells,
        objective,
        percent_detected = report.percent_detected,
        "Worker finished"
    );
    Ok(report)
}

/// Every sensor belongs to exactly one well, and shares its column.
fn check_partition(candidate: &ExtendedConfiguration) -> Result<()> {
    let mut seen = vec![0usize; candidate.sensors().len()];
    for (w, well) in candidate.wells().iter().enumerate() {
        for &m in well.members() {
            let Some(sensor) = candidate.sensors().get(m) else {
                bail!("well {w} lists missing sensor {m}");
            };
            ensure!(sensor.column() == well.column(), "sensor {m} is not in the column of well {w}");
            ensure!(sensor.well() == Some(w), "sensor {m} does not point back at well {w}");
            seen[m] += 1;
        }
    }
    if let Some(m) = seen.iter().position(|&n| n != 1) {
        bail!("sensor {m} belongs to {} wells", seen[m]);
    }
    Ok(())
}
