use crate::config::{
    ExperimentKind, RECTANGLE_ANIMATION_MS, REDUCE_DELAY_MS, SCATTER_DELAY_MS,
};
use crate::error::{Error, Result};
use crate::events::{IntermediateSnapshot, Rectangle, Severity, VisualArtifact, WorkerStatus};
use crate::partition::{chunk_size, partition};
use crate::reduce::reduce;
use crate::worker::{compute_serial, run_worker, PartialResult, RunContext};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Scattering,
    Computing,
    Reducing,
    Done,
    Cancelled,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Scattering | Phase::Computing | Phase::Reducing)
    }
}

/// Speedup figures against a sequential pass over the same workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub baseline: Duration,
    pub speedup: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub experiment_kind: ExperimentKind,
    pub pi_estimate: f64,
    pub absolute_error: f64,
    pub total_items: usize,
    pub elapsed: Duration,
    /// Indexed by worker id
    pub worker_times: Vec<Duration>,
    pub visual_items: usize,
    pub metrics: Option<RunMetrics>,
}

pub struct PhaseCoordinator {
    ctx: Arc<RunContext>,
    phase: Phase,
}

impl PhaseCoordinator {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx, phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::info!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
        self.ctx.collaborators.progress.phase_changed(phase);
    }

    fn log(&self, message: &str, severity: Severity) {
        self.ctx.collaborators.log.append_log(message, severity);
    }

    fn set_status(&self, worker_id: usize, status: WorkerStatus) {
        self.ctx.collaborators.progress.worker_status(worker_id, status);
    }

    fn set_all_statuses(&self, status: WorkerStatus) {
        for worker_id in 0..self.ctx.config.worker_count {
            self.set_status(worker_id, status);
        }
    }

    /// Drives one run from scatter to done. A cancelled run ends in
    /// `Phase::Cancelled` with `Error::Cancelled`.
    pub async fn run(mut self) -> Result<RunResult> {
        match self.drive().await {
            Ok(result) => Ok(result),
            Err(Error::Cancelled) => {
                self.set_all_statuses(WorkerStatus::Cancelled);
                self.log("Simulation cancelled", Severity::Warning);
                self.enter(Phase::Cancelled);
                Err(Error::Cancelled)
            }
            Err(err) => {
                self.log(&format!("Simulation failed: {}", err), Severity::Error);
                self.enter(Phase::Idle);
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<RunResult> {
        let config = self.ctx.config.clone();
        let kind = config.experiment_kind;
        let workers = config.worker_count;
        let items = kind.item_name();

        let baseline = if config.measure_baseline {
            Some(measure_baseline(kind, config.workload_size, config.seed).await?)
        } else {
            None
        };

        let start = Instant::now();
        let chunks = partition(config.workload_size, workers)?;
        let share = chunk_size(config.workload_size, workers);

        // Phase 1: scatter
        self.enter(Phase::Scattering);
        self.log(&format!("Scattering {} {} per process", share, items), Severity::Info);
        self.ctx.collaborators.progress.update_progress(10);
        self.set_all_statuses(WorkerStatus::Receiving);
        self.ctx.pause_for(config.delay(SCATTER_DELAY_MS)).await?;

        // Phase 2: compute
        self.enter(Phase::Computing);
        self.log(
            &format!("Starting parallel {} computation", kind.display_name()),
            Severity::Info,
        );

        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        for chunk in chunks {
            let ctx = Arc::clone(&self.ctx);
            let completed = Arc::clone(&completed);

            let task = task::spawn(async move {
                let result = run_worker(Arc::clone(&ctx), chunk, kind).await?;
                let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                ctx.collaborators
                    .progress
                    .update_progress((20 + done * 50 / workers) as u8);
                Ok::<_, Error>(result)
            });

            tasks.push(task);
        }

        // Join barrier: every worker reports before reduction starts
        let results = join_all(tasks).await?;
        self.log(&format!("All {} processes finished computing", workers), Severity::Info);

        if kind == ExperimentKind::RiemannSum {
            self.animate_rectangles(&results).await?;
        }
        self.ctx.collaborators.progress.update_progress(80);

        // Phase 3: reduce
        self.enter(Phase::Reducing);
        self.log("Reducing partial results from all processes", Severity::Info);
        for worker_id in 1..workers {
            self.set_status(worker_id, WorkerStatus::SendingResult);
        }
        self.set_status(0, WorkerStatus::Receiving);
        self.ctx.pause_for(config.delay(REDUCE_DELAY_MS)).await?;

        let pi_estimate = reduce(&results, kind);
        let total_items: usize = results.iter().map(|r| r.items).sum();
        let elapsed = start.elapsed();

        self.ctx.collaborators.progress.update_progress(100);
        if config.intermediate_reports {
            self.ctx.collaborators.progress.intermediate(&IntermediateSnapshot {
                progress_percent: 100,
                estimated_pi: pi_estimate,
                items_processed: total_items,
            });
        }

        let total: f64 = results.iter().map(|r| r.value).sum();
        match kind {
            ExperimentKind::MonteCarlo => self.log(
                &format!(
                    "Found {} points inside circle out of {}",
                    total as usize, total_items
                ),
                Severity::Success,
            ),
            ExperimentKind::RiemannSum => {
                self.log(&format!("Computed total area: {:.8}", total), Severity::Success)
            }
        }

        let metrics = baseline.map(|baseline| {
            let speedup = baseline.as_secs_f64() / elapsed.as_secs_f64().max(f64::EPSILON);
            RunMetrics {
                baseline,
                speedup,
                efficiency: speedup / workers as f64,
            }
        });

        let result = RunResult {
            experiment_kind: kind,
            pi_estimate,
            absolute_error: (std::f64::consts::PI - pi_estimate).abs(),
            total_items,
            elapsed,
            worker_times: results.iter().map(|r| r.elapsed).collect(),
            visual_items: self.ctx.budget.used(),
            metrics,
        };

        self.set_all_statuses(WorkerStatus::Finished);
        self.log(
            &format!("Pi calculation completed: π ≈ {:.8}", pi_estimate),
            Severity::Success,
        );
        self.enter(Phase::Done);

        tracing::info!(
            pi = result.pi_estimate,
            error = result.absolute_error,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "run complete"
        );

        Ok(result)
    }

    /// Draws each worker's kept rectangles, all workers at once, spreading
    /// one worker's rectangles evenly over the animation window.
    async fn animate_rectangles(&self, results: &[PartialResult]) -> Result<()> {
        let window = self.ctx.config.delay(RECTANGLE_ANIMATION_MS);
        let mut tasks = Vec::new();

        for result in results {
            let rects: Vec<Rectangle> = result
                .artifacts
                .iter()
                .filter_map(|artifact| match artifact {
                    VisualArtifact::Rectangle(rect) => Some(*rect),
                    VisualArtifact::Point { .. } => None,
                })
                .collect();
            if rects.is_empty() {
                continue;
            }

            let ctx = Arc::clone(&self.ctx);
            let step = window / rects.len() as u32;

            let task = task::spawn(async move {
                for rect in rects {
                    ctx.collaborators.renderer.draw_rectangle(&rect);
                    ctx.pause_for(step).await?;
                }
                Ok::<_, Error>(())
            });

            tasks.push(task);
        }

        join_all(tasks).await?;
        Ok(())
    }
}

/// Awaits every handle in order, even after one fails, and returns the
/// first error seen. A panicked task counts as that task's error.
async fn join_all<T>(tasks: Vec<JoinHandle<Result<T>>>) -> Result<Vec<T>> {
    let mut outputs = Vec::with_capacity(tasks.len());
    let mut failure = None;
    for task in tasks {
        match task.await {
            Ok(Ok(output)) => outputs.push(output),
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "worker task failed");
                failure.get_or_insert(Error::from(join_err));
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

async fn measure_baseline(
    kind: ExperimentKind,
    workload_size: usize,
    seed: Option<u64>,
) -> Result<Duration> {
    let elapsed = task::spawn_blocking(move || {
        let start = std::time::Instant::now();
        let estimate = compute_serial(kind, workload_size, seed);
        tracing::debug!(estimate, "baseline pass finished");
        start.elapsed()
    })
    .await?;
    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn join_drains_every_task_after_a_panic() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut tasks: Vec<JoinHandle<Result<usize>>> = Vec::new();
        tasks.push(task::spawn(async { panic!("worker 0 crashed") }));
        tasks.push(task::spawn(async { Err(Error::Cancelled) }));
        let flag = Arc::clone(&finished);
        tasks.push(task::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::Release);
            Ok(2)
        }));

        let joined = join_all(tasks).await;
        assert!(matches!(joined, Err(Error::WorkerFailed(_))));
        assert!(finished.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn join_keeps_task_order() {
        let tasks: Vec<JoinHandle<Result<usize>>> = (0..4)
            .map(|i| task::spawn(async move { Ok(i) }))
            .collect();
        assert_eq!(join_all(tasks).await.unwrap(), vec![0, 1, 2, 3]);
    }
}
