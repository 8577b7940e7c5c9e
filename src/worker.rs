use crate::config::{Configuration, ExperimentKind, CHECKPOINT_DELAY_MS};
use crate::control::{CancelToken, PauseGate};
use crate::error::{Error, Result};
use crate::events::{Collaborators, IntermediateSnapshot, Rectangle, VisualArtifact, WorkerStatus};
use crate::partition::WorkChunk;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Worker that publishes intermediate snapshots.
pub const REPORTING_WORKER: usize = 0;

// Items processed between cooperative yields
const YIELD_EVERY: usize = 1024;

/// Shared cap on visual artifacts across all workers of a run.
#[derive(Debug)]
pub struct VisualBudget {
    cap: usize,
    used: AtomicUsize,
}

impl VisualBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: AtomicUsize::new(0) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Claims one slot, or returns false once the cap is reached.
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.cap).then_some(used + 1)
            })
            .is_ok()
    }
}

/// Everything one run shares with its worker tasks.
pub struct RunContext {
    pub config: Configuration,
    pub budget: VisualBudget,
    pub cancel: CancelToken,
    pub gates: Vec<PauseGate>,
    pub collaborators: Collaborators,
}

impl RunContext {
    pub fn new(
        config: Configuration,
        cancel: CancelToken,
        gates: Vec<PauseGate>,
        collaborators: Collaborators,
    ) -> Self {
        let budget = VisualBudget::new(config.visual_budget);
        Self { config, budget, cancel, gates, collaborators }
    }

    fn reports(&self, worker_id: usize) -> bool {
        self.config.intermediate_reports && worker_id == REPORTING_WORKER
    }

    /// Suspension point: honours cancellation and this worker's pause gate, then yields.
    pub async fn suspend(&self, worker_id: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(gate) = self.gates.get(worker_id) {
            if gate.is_paused() {
                let progress = &self.collaborators.progress;
                progress.worker_status(worker_id, WorkerStatus::Paused);
                tokio::select! {
                    _ = gate.resumed() => {}
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                }
                progress.worker_status(worker_id, WorkerStatus::Computing);
            }
        }

        tokio::task::yield_now().await;
        Ok(())
    }

    /// Sleeps for `delay` unless the run is cancelled first.
    pub async fn pause_for(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    pub worker_id: usize,
    /// Number of points or slices this worker processed
    pub items: usize,
    /// Inside count (Monte Carlo) or partial area (Riemann sum)
    pub value: f64,
    pub artifacts: Vec<VisualArtifact>,
    pub elapsed: Duration,
}

impl PartialResult {
    pub fn empty(worker_id: usize) -> Self {
        Self {
            worker_id,
            items: 0,
            value: 0.0,
            artifacts: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

fn sampler(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn sample_point(rng: &mut StdRng) -> (f64, f64, bool) {
    let x: f64 = rng.gen();
    let y: f64 = rng.gen();
    (x, y, x * x + y * y <= 1.0)
}

/// Left-endpoint height of slice `i` out of `slices` under the unit quarter circle.
fn slice_height(i: usize, slices: usize) -> (f64, f64) {
    let x = i as f64 / slices as f64;
    (x, (1.0 - x * x).max(0.0).sqrt())
}

/// Runs one worker over its chunk.
pub async fn run_worker(
    ctx: Arc<RunContext>,
    chunk: WorkChunk,
    kind: ExperimentKind,
) -> Result<PartialResult> {
    if chunk.is_empty() {
        return Ok(PartialResult::empty(chunk.worker_id));
    }

    ctx.suspend(chunk.worker_id).await?;
    ctx.collaborators
        .progress
        .worker_status(chunk.worker_id, WorkerStatus::Computing);

    let start = Instant::now();
    let mut result = match kind {
        ExperimentKind::MonteCarlo => monte_carlo(&ctx, chunk).await?,
        ExperimentKind::RiemannSum => riemann_sum(&ctx, chunk).await?,
    };
    result.elapsed = start.elapsed();

    tracing::debug!(
        worker = chunk.worker_id,
        items = result.items,
        value = result.value,
        artifacts = result.artifacts.len(),
        "worker finished"
    );

    Ok(result)
}

async fn checkpoint(
    ctx: &RunContext,
    chunk: WorkChunk,
    relative: usize,
    estimated_pi: f64,
) -> Result<()> {
    let snapshot = IntermediateSnapshot {
        progress_percent: (relative * 100 / chunk.len()) as u8,
        estimated_pi,
        items_processed: (relative + 1) * ctx.config.worker_count,
    };
    ctx.collaborators.progress.intermediate(&snapshot);

    ctx.pause_for(ctx.config.delay(CHECKPOINT_DELAY_MS)).await?;
    ctx.suspend(chunk.worker_id).await
}

async fn monte_carlo(ctx: &RunContext, chunk: WorkChunk) -> Result<PartialResult> {
    let workers = ctx.config.worker_count;
    let interval = chunk.len() / 10;
    let report = ctx.reports(chunk.worker_id) && interval > 0;

    let mut rng = sampler(ctx.config.worker_seed(chunk.worker_id));
    let mut inside = 0usize;
    let mut artifacts = Vec::new();

    for j in 0..chunk.len() {
        let (x, y, is_inside) = sample_point(&mut rng);
        if is_inside {
            inside += 1;
        }

        if ctx.budget.try_acquire() {
            ctx.collaborators.renderer.draw_point(x, y, is_inside);
            artifacts.push(VisualArtifact::Point { x, y, inside: is_inside });
        }

        if report && j > 0 && j % interval == 0 {
            // Extrapolated from this worker's own count, not a cross-worker total
            let estimate = 4.0 * (inside * workers) as f64 / ((j + 1) * workers) as f64;
            checkpoint(ctx, chunk, j, estimate).await?;
        } else if (j + 1) % YIELD_EVERY == 0 {
            ctx.suspend(chunk.worker_id).await?;
        }
    }

    Ok(PartialResult {
        worker_id: chunk.worker_id,
        items: chunk.len(),
        value: inside as f64,
        artifacts,
        elapsed: Duration::ZERO,
    })
}

/// Rectangles one worker keeps out of `min(slices, visual_cap)`.
///
/// Shares are cut at `floor(start * total / slices)` boundaries, so adjacent
/// workers' shares add up to exactly `total` and each stays within one of
/// `len * total / slices`.
pub fn rectangle_share(chunk: &WorkChunk, slices: usize, visual_cap: usize) -> usize {
    if slices == 0 || chunk.is_empty() {
        return 0;
    }
    let total = slices.min(visual_cap) as u128;
    let boundary = |index: usize| (index as u128 * total / slices as u128) as usize;
    boundary(chunk.end) - boundary(chunk.start)
}

/// Offset of the `k`-th kept slice when `keep` of `len` slices are drawn.
/// Offsets are evenly spaced, start at 0 and reach `len` at `k == keep`.
fn kept_offset(k: usize, len: usize, keep: usize) -> usize {
    (k as u128 * len as u128 / keep as u128) as usize
}

async fn riemann_sum(ctx: &RunContext, chunk: WorkChunk) -> Result<PartialResult> {
    let workers = ctx.config.worker_count;
    let slices = ctx.config.workload_size;
    let width = 1.0 / slices as f64;
    let interval = chunk.len() / 10;
    let report = ctx.reports(chunk.worker_id) && interval > 0;
    let keep = rectangle_share(&chunk, slices, ctx.budget.cap());

    let mut area = 0.0;
    let mut artifacts = Vec::with_capacity(keep);
    let mut kept = 0;
    let mut next_kept = if keep > 0 { 0 } else { usize::MAX };

    for (j, i) in chunk.range().enumerate() {
        let (x, height) = slice_height(i, slices);
        area += height * width;

        if j == next_kept {
            kept += 1;
            // each rectangle spans the slices up to the next kept one
            let following = kept_offset(kept, chunk.len(), keep);
            if ctx.budget.try_acquire() {
                artifacts.push(VisualArtifact::Rectangle(Rectangle {
                    x,
                    height,
                    width: (following - j) as f64 / slices as f64,
                    worker_id: chunk.worker_id,
                }));
            }
            next_kept = if kept < keep { following } else { usize::MAX };
        }

        if report && j > 0 && j % interval == 0 {
            checkpoint(ctx, chunk, j, 4.0 * area * workers as f64).await?;
        } else if (j + 1) % YIELD_EVERY == 0 {
            ctx.suspend(chunk.worker_id).await?;
        }
    }

    Ok(PartialResult {
        worker_id: chunk.worker_id,
        items: chunk.len(),
        value: area,
        artifacts,
        elapsed: Duration::ZERO,
    })
}

/// Single pass over the whole workload with no pacing or visuals.
/// Used as the sequential baseline for speedup figures.
pub fn compute_serial(kind: ExperimentKind, workload_size: usize, seed: Option<u64>) -> f64 {
    if workload_size == 0 {
        return 0.0;
    }
    match kind {
        ExperimentKind::MonteCarlo => {
            let mut rng = sampler(seed);
            let inside = (0..workload_size)
                .filter(|_| sample_point(&mut rng).2)
                .count();
            4.0 * inside as f64 / workload_size as f64
        }
        ExperimentKind::RiemannSum => {
            let width = 1.0 / workload_size as f64;
            let area: f64 = (0..workload_size)
                .map(|i| slice_height(i, workload_size).1 * width)
                .sum();
            4.0 * area
        }
    }
}
