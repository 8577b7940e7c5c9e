use pi_cluster_sim::canvas::Canvas;
use pi_cluster_sim::{
    Collaborators, ConfigOptions, Configuration, Error, ExperimentKind, IntermediateSnapshot,
    Phase, ProgressSink, PublishedState, Rectangle, SimulationController, VisualArtifact,
    WorkerStatus,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<u8>>,
    phases: Mutex<Vec<Phase>>,
    snapshots: Mutex<Vec<IntermediateSnapshot>>,
}

impl ProgressSink for Recorder {
    fn update_progress(&self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }

    fn intermediate(&self, snapshot: &IntermediateSnapshot) {
        self.snapshots.lock().unwrap().push(*snapshot);
    }

    fn phase_changed(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }
}

fn config(kind: ExperimentKind, workers: usize, workload: usize) -> Configuration {
    Configuration {
        experiment_kind: kind,
        worker_count: workers,
        workload_size: workload,
        seed: Some(2024),
        ..Default::default()
    }
}

async fn run_once(config: Configuration) -> pi_cluster_sim::RunResult {
    SimulationController::new(config)
        .unwrap()
        .start()
        .await
        .unwrap()
}

fn drawn_rectangles(canvas: &Canvas) -> Vec<Rectangle> {
    canvas
        .artifacts()
        .into_iter()
        .filter_map(|artifact| match artifact {
            VisualArtifact::Rectangle(rect) => Some(rect),
            VisualArtifact::Point { .. } => None,
        })
        .collect()
}

async fn wait_until_running(controller: &SimulationController) {
    while !controller.is_running() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_monte_carlo_converges_for_any_worker_count() {
    let mut estimates = Vec::new();
    for workers in [1, 2, 4] {
        let result = run_once(config(ExperimentKind::MonteCarlo, workers, 1_000_000)).await;
        assert_eq!(result.total_items, 1_000_000);
        assert!(
            result.absolute_error < 0.01,
            "{} workers: estimate {} too far from pi",
            workers,
            result.pi_estimate
        );
        estimates.push(result.pi_estimate);
    }

    let spread = estimates.iter().cloned().fold(f64::MIN, f64::max)
        - estimates.iter().cloned().fold(f64::MAX, f64::min);
    assert!(spread < 0.02, "estimates diverge across worker counts: {:?}", estimates);
}

#[tokio::test(start_paused = true)]
async fn test_riemann_sum_independent_of_worker_count() {
    let single = run_once(config(ExperimentKind::RiemannSum, 1, 10_000)).await;
    let split = run_once(config(ExperimentKind::RiemannSum, 4, 10_000)).await;

    assert!((single.pi_estimate - split.pi_estimate).abs() < 1e-9);
    // Left endpoints overestimate the quarter circle by about 4/N
    assert!(single.pi_estimate > std::f64::consts::PI);
    assert!(single.absolute_error < 1e-3);
    assert_eq!(split.worker_times.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_visual_budget_holds_for_large_workloads() {
    let runs = [
        (ExperimentKind::RiemannSum, 1),
        (ExperimentKind::RiemannSum, 3),
        (ExperimentKind::RiemannSum, 7),
        (ExperimentKind::MonteCarlo, 8),
    ];

    for (kind, workers) in runs {
        let canvas = Arc::new(Canvas::new());
        let collaborators = Collaborators {
            renderer: canvas.clone(),
            ..Default::default()
        };
        let controller = SimulationController::with_collaborators(
            config(kind, workers, 10_000_000),
            collaborators,
        )
        .unwrap();

        let result = controller.start().await.unwrap();
        assert!(result.visual_items <= 2000, "{:?}/{}: {}", kind, workers, result.visual_items);
        assert!(canvas.len() <= 2000);
        assert!(!canvas.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_riemann_rectangles_reach_the_right_edge() {
    for (workers, slices, expected) in [(1, 3000, vec![2000]), (3, 10_000, vec![666, 667, 667])] {
        let canvas = Arc::new(Canvas::new());
        let collaborators = Collaborators {
            renderer: canvas.clone(),
            ..Default::default()
        };
        let controller = SimulationController::with_collaborators(
            config(ExperimentKind::RiemannSum, workers, slices),
            collaborators,
        )
        .unwrap();
        controller.start().await.unwrap();

        let rects = drawn_rectangles(&canvas);
        let mut per_worker = vec![0; workers];
        for rect in &rects {
            per_worker[rect.worker_id] += 1;
        }
        assert_eq!(per_worker, expected, "{} workers / {} slices", workers, slices);

        let right_edge = rects.iter().map(|r| r.x + r.width).fold(0.0, f64::max);
        assert!((right_edge - 1.0).abs() < 1e-9, "right edge {}", right_edge);
        let left_edge = rects.iter().map(|r| r.x).fold(1.0, f64::min);
        assert_eq!(left_edge, 0.0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_riemann_checkpoints_scale_the_reporting_share() {
    let recorder = Arc::new(Recorder::default());
    let collaborators = Collaborators {
        progress: recorder.clone(),
        ..Default::default()
    };
    let controller = SimulationController::with_collaborators(
        config(ExperimentKind::RiemannSum, 4, 10_000),
        collaborators,
    )
    .unwrap();
    let result = controller.start().await.unwrap();

    // process 0 owns slices 0..2500 and reports every 250 of them
    let width = 1.0 / 10_000.0;
    let mut area = 0.0;
    let mut expected = Vec::new();
    for j in 0..2500usize {
        let x = j as f64 / 10_000.0;
        area += (1.0 - x * x).max(0.0).sqrt() * width;
        if j > 0 && j % 250 == 0 {
            expected.push(IntermediateSnapshot {
                progress_percent: (j * 100 / 2500) as u8,
                estimated_pi: 4.0 * area * 4.0,
                items_processed: (j + 1) * 4,
            });
        }
    }

    let snapshots = recorder.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.len(), expected.len() + 1);
    for (got, want) in snapshots.iter().zip(&expected) {
        assert_eq!(got.progress_percent, want.progress_percent);
        assert_eq!(got.items_processed, want.items_processed);
        assert!(
            (got.estimated_pi - want.estimated_pi).abs() < 1e-12,
            "{:?} vs {:?}",
            got,
            want
        );
    }
    assert_eq!(snapshots[0].progress_percent, 10);
    assert_eq!(snapshots[0].items_processed, 251 * 4);

    let last = snapshots[snapshots.len() - 1];
    assert_eq!(last.progress_percent, 100);
    assert_eq!(last.items_processed, 10_000);
    assert_eq!(last.estimated_pi, result.pi_estimate);
}

#[tokio::test(start_paused = true)]
async fn test_empty_chunks_complete() {
    // ceil(3 / 5) = 1: workers 3 and 4 receive nothing
    let result = run_once(config(ExperimentKind::MonteCarlo, 5, 3)).await;
    assert_eq!(result.total_items, 3);
    assert_eq!(result.worker_times[4], Duration::ZERO);

    let result = run_once(config(ExperimentKind::RiemannSum, 6, 10)).await;
    assert_eq!(result.total_items, 10);
}

#[tokio::test(start_paused = true)]
async fn test_progress_and_phases_are_ordered() {
    let recorder = Arc::new(Recorder::default());
    let collaborators = Collaborators {
        progress: recorder.clone(),
        ..Default::default()
    };
    let controller = SimulationController::with_collaborators(
        config(ExperimentKind::MonteCarlo, 4, 100_000),
        collaborators,
    )
    .unwrap();

    controller.start().await.unwrap();

    let progress = recorder.progress.lock().unwrap().clone();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert_eq!(progress.first(), Some(&10));
    assert_eq!(progress.last(), Some(&100));

    let phases = recorder.phases.lock().unwrap().clone();
    assert_eq!(
        phases,
        vec![Phase::Scattering, Phase::Computing, Phase::Reducing, Phase::Done]
    );

    // nine decile checkpoints from process 0, then the final value
    let snapshots = recorder.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 10);
    assert_eq!(snapshots[0].progress_percent, 10);
    assert_eq!(snapshots[0].items_processed, 2501 * 4);
    assert_eq!(snapshots[9].progress_percent, 100);
    assert_eq!(snapshots[9].items_processed, 100_000);

    // each checkpoint is 4 * inside / (j + 1) for process 0's own samples
    for snapshot in &snapshots[..9] {
        let own_samples = snapshot.items_processed / 4;
        let inside = snapshot.estimated_pi * own_samples as f64 / 4.0;
        assert!((inside - inside.round()).abs() < 1e-6, "{:?}", snapshot);
        assert!(inside.round() as usize <= own_samples);
    }

    let state = controller.state();
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.progress, 100);
    assert_eq!(state.snapshots, snapshots);
    assert!(state.worker_statuses.iter().all(|s| *s == WorkerStatus::Finished));
    assert!(state.result.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_intermediate_reports_can_be_disabled() {
    let controller = SimulationController::new(Configuration {
        intermediate_reports: false,
        ..config(ExperimentKind::RiemannSum, 2, 50_000)
    })
    .unwrap();
    controller.start().await.unwrap();
    assert!(controller.state().snapshots.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent() {
    let controller = SimulationController::new(config(ExperimentKind::MonteCarlo, 3, 30_000)).unwrap();
    controller.start().await.unwrap();
    assert!(!controller.state().logs.is_empty());

    controller.reset().unwrap();
    let first = controller.state();
    controller.reset().unwrap();
    let second = controller.state();

    assert_eq!(first, second);
    assert_eq!(first, PublishedState::initial(3));
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let controller = Arc::new(
        SimulationController::new(config(ExperimentKind::MonteCarlo, 2, 40_000)).unwrap(),
    );

    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start().await })
    };
    wait_until_running(&controller).await;

    assert!(matches!(controller.start().await, Err(Error::AlreadyRunning)));
    let options = ConfigOptions { workload_size: Some(10), ..Default::default() };
    assert!(matches!(controller.configure(&options), Err(Error::AlreadyRunning)));
    assert!(matches!(controller.reset(), Err(Error::AlreadyRunning)));

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.total_items, 40_000);
    assert_eq!(controller.configuration().workload_size, 40_000);
    assert!(!controller.is_running());
}

#[test]
fn test_failed_configure_keeps_previous_configuration() {
    let controller = SimulationController::new(config(ExperimentKind::MonteCarlo, 2, 1000)).unwrap();
    let bad = ConfigOptions {
        worker_count: Some(8),
        workload_size: Some(0),
        ..Default::default()
    };
    assert!(matches!(controller.configure(&bad), Err(Error::InvalidConfiguration(_))));
    assert_eq!(controller.configuration().worker_count, 2);

    let good = ConfigOptions { worker_count: Some(8), ..Default::default() };
    controller.configure(&good).unwrap();
    assert_eq!(controller.configuration().worker_count, 8);
    assert_eq!(controller.state().worker_statuses.len(), 8);
}

#[test]
fn test_idle_controls_report_not_running() {
    let controller = SimulationController::new(Configuration::default()).unwrap();
    assert!(matches!(controller.cancel(), Err(Error::NotRunning)));
    assert!(matches!(controller.pause_worker(0), Err(Error::NotRunning)));
    assert!(matches!(controller.resume_worker(0), Err(Error::NotRunning)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_run() {
    let controller = Arc::new(
        SimulationController::new(Configuration {
            animation_speed: 0.5,
            ..config(ExperimentKind::MonteCarlo, 2, 200_000)
        })
        .unwrap(),
    );

    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start().await })
    };
    wait_until_running(&controller).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    controller.cancel().unwrap();
    assert!(matches!(run.await.unwrap(), Err(Error::Cancelled)));

    let state = controller.state();
    assert_eq!(state.phase, Phase::Cancelled);
    assert!(state.result.is_none());
    assert!(state.worker_statuses.iter().all(|s| *s == WorkerStatus::Cancelled));
    assert!(!controller.is_running());

    // the controller accepts a fresh run afterwards
    controller.configure(&ConfigOptions { animation_speed: Some(10.0), ..Default::default() }).unwrap();
    assert!(controller.start().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_paused_worker_holds_the_join() {
    let controller = Arc::new(
        SimulationController::new(config(ExperimentKind::MonteCarlo, 2, 20_000)).unwrap(),
    );

    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start().await })
    };
    wait_until_running(&controller).await;

    controller.pause_worker(1).unwrap();
    assert!(matches!(controller.pause_worker(5), Err(Error::UnknownWorker(5))));
    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = controller.state();
    assert_eq!(state.phase, Phase::Computing);
    assert_eq!(state.worker_statuses[1], WorkerStatus::Paused);
    assert!(!run.is_finished());

    controller.resume_worker(1).unwrap();
    let result = run.await.unwrap().unwrap();
    assert_eq!(result.total_items, 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_listing_parameters_follow_configuration() {
    let controller = SimulationController::new(config(ExperimentKind::MonteCarlo, 4, 1_000_001)).unwrap();
    let params = controller.listing_parameters();
    assert_eq!(params.per_worker_share, 250_001);
    assert_eq!(params.total_workload, 1_000_001);
    assert_eq!(params.file_name(), "pi_calculation_mpi_monte-carlo_4proc.c");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_controls_reach_a_run_as_soon_as_it_is_visible() {
    let controller = Arc::new(
        SimulationController::new(config(ExperimentKind::MonteCarlo, 2, 40_000)).unwrap(),
    );

    for _ in 0..20 {
        let run = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start().await })
        };
        wait_until_running(&controller).await;

        assert!(controller.pause_worker(1).is_ok());
        assert!(controller.resume_worker(1).is_ok());
        assert!(controller.cancel().is_ok());
        assert!(matches!(run.await.unwrap(), Err(Error::Cancelled)));
        assert!(!controller.is_running());
    }
}

/// Panics the first time process 0 starts computing.
struct CrashOnCompute;

impl ProgressSink for CrashOnCompute {
    fn update_progress(&self, _percent: u8) {}

    fn worker_status(&self, worker_id: usize, status: WorkerStatus) {
        if worker_id == 0 && status == WorkerStatus::Computing {
            panic!("process 0 crashed");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_crashed_worker_still_joins_the_rest() {
    let collaborators = Collaborators {
        progress: Arc::new(CrashOnCompute),
        ..Default::default()
    };
    let controller = SimulationController::with_collaborators(
        config(ExperimentKind::MonteCarlo, 4, 40_000),
        collaborators,
    )
    .unwrap();

    let outcome = controller.start().await;
    assert!(matches!(outcome, Err(Error::WorkerFailed(_))), "{:?}", outcome.err());

    // the three surviving processes all finished before the run returned
    let state = controller.state();
    assert_eq!(state.progress, (20 + 3 * 50 / 4) as u8);
    assert_eq!(state.phase, Phase::Idle);
    assert!(state.result.is_none());
    assert!(!controller.is_running());
}
