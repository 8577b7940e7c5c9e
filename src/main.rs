use clap::{Parser, ValueEnum};
use pi_cluster_sim::canvas::Canvas;
use pi_cluster_sim::{
    Collaborators, ConfigOptions, Configuration, Error, ExperimentKind, IntermediateSnapshot,
    LogSink, Phase, ProgressSink, RunResult, Severity, SimulationController, WorkerStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    MonteCarlo,
    RiemannSum,
}

impl From<Method> for ExperimentKind {
    fn from(method: Method) -> Self {
        match method {
            Method::MonteCarlo => ExperimentKind::MonteCarlo,
            Method::RiemannSum => ExperimentKind::RiemannSum,
        }
    }
}

/// Animated scatter / compute / reduce estimation of π over simulated processes
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Estimation method
    #[arg(short, long, value_enum)]
    experiment: Option<Method>,

    /// Number of simulated processes
    #[arg(short, long)]
    workers: Option<usize>,

    /// Points (Monte Carlo) or slices (Riemann sum)
    #[arg(short = 'n', long)]
    workload: Option<usize>,

    /// Animation speed multiplier; delays are divided by it
    #[arg(short, long)]
    speed: Option<f64>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with configuration options; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip intermediate snapshots from process 0
    #[arg(long)]
    no_intermediate: bool,

    /// Time a sequential pass for speedup and efficiency figures
    #[arg(long)]
    baseline: bool,

    /// Write the rendered points or rectangles to a PNG
    #[arg(long)]
    render: Option<PathBuf>,

    /// Print the MPI listing parameters as JSON and exit
    #[arg(long)]
    listing: bool,
}

impl Args {
    fn options(&self) -> ConfigOptions {
        ConfigOptions {
            experiment_kind: self.experiment.map(Into::into),
            worker_count: self.workers,
            workload_size: self.workload,
            animation_speed: self.speed,
            seed: self.seed,
            visual_budget: None,
            intermediate_reports: self.no_intermediate.then_some(false),
            measure_baseline: self.baseline.then_some(true),
        }
    }
}

struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn append_log(&self, message: &str, severity: Severity) {
        let tag = match severity {
            Severity::Info => "info",
            Severity::Success => " ok ",
            Severity::Warning => "warn",
            Severity::Error => "fail",
        };
        println!("[{}] {}", tag, message);
    }
}

struct ConsoleProgress {
    kind: ExperimentKind,
}

impl ProgressSink for ConsoleProgress {
    fn update_progress(&self, percent: u8) {
        tracing::debug!(percent, "progress");
    }

    fn intermediate(&self, snapshot: &IntermediateSnapshot) {
        println!(
            "  {:>3}%  π ≈ {:.8}  ({} {})",
            snapshot.progress_percent,
            snapshot.estimated_pi,
            snapshot.items_processed,
            self.kind.item_name()
        );
    }

    fn worker_status(&self, worker_id: usize, status: WorkerStatus) {
        tracing::debug!(worker = worker_id, %status, "status");
    }

    fn phase_changed(&self, phase: Phase) {
        println!("--- {:?} ---", phase);
    }
}

fn print_report(result: &RunResult) {
    println!();
    println!("{} Pi Estimation", result.experiment_kind.display_name());
    println!("Total {}: {}", result.experiment_kind.item_name(), result.total_items);
    println!("Pi estimate: {:.8}", result.pi_estimate);
    println!("Error: {:.8}", result.absolute_error);
    println!("Total time: {}ms", result.elapsed.as_millis());
    for (worker_id, time) in result.worker_times.iter().enumerate() {
        println!("  Process {} time: {}ms", worker_id, time.as_millis());
    }
    if let Some(metrics) = &result.metrics {
        println!("Sequential baseline: {}ms", metrics.baseline.as_millis());
        println!("Speedup: {:.3e}", metrics.speedup);
        println!("Efficiency: {:.3e}", metrics.efficiency);
    }
}

async fn run(args: Args) -> pi_cluster_sim::Result<()> {
    let file_options = match &args.config {
        Some(path) => ConfigOptions::from_json_file(path)?,
        None => ConfigOptions::default(),
    };
    let options = file_options.overlay(args.options());
    let config = Configuration::default().merged(&options)?;

    let canvas = Arc::new(Canvas::new());
    let collaborators = Collaborators {
        renderer: canvas.clone(),
        log: Arc::new(ConsoleLog),
        progress: Arc::new(ConsoleProgress { kind: config.experiment_kind }),
    };
    let controller = Arc::new(SimulationController::with_collaborators(config, collaborators)?);

    if args.listing {
        let params = controller.listing_parameters();
        println!("{}", params.file_name());
        println!("{}", serde_json::to_string_pretty(&params)?);
        return Ok(());
    }

    let on_interrupt = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = on_interrupt.cancel();
        }
    });

    let result = match controller.start().await {
        Ok(result) => result,
        Err(Error::Cancelled) => {
            println!("Stopped before completion.");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    print_report(&result);

    if let Some(path) = &args.render {
        println!("Saving {} visual items to: {}", canvas.len(), path.display());
        canvas.save(path, 400)?;
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
