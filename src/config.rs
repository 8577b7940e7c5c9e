use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const MAX_WORKERS: usize = 64;
pub const MAX_WORKLOAD: usize = 100_000_000;
pub const MIN_ANIMATION_SPEED: f64 = 0.01;

/// Upper bound on rendered points/rectangles per run
pub const DEFAULT_VISUAL_BUDGET: usize = 2000;

// Base delays in milliseconds at speed 1.0
pub const SCATTER_DELAY_MS: f64 = 1000.0;
pub const REDUCE_DELAY_MS: f64 = 1000.0;
pub const CHECKPOINT_DELAY_MS: f64 = 100.0;
pub const RECTANGLE_ANIMATION_MS: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentKind {
    MonteCarlo,
    RiemannSum,
}

impl ExperimentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentKind::MonteCarlo => "monte-carlo",
            ExperimentKind::RiemannSum => "riemann-sum",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExperimentKind::MonteCarlo => "Monte Carlo",
            ExperimentKind::RiemannSum => "Riemann Sum",
        }
    }

    /// What one workload item is called in logs
    pub fn item_name(&self) -> &'static str {
        match self {
            ExperimentKind::MonteCarlo => "points",
            ExperimentKind::RiemannSum => "slices",
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monte-carlo" => Ok(ExperimentKind::MonteCarlo),
            "riemann-sum" => Ok(ExperimentKind::RiemannSum),
            other => Err(Error::invalid(format!("unknown experiment kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub experiment_kind: ExperimentKind,
    pub worker_count: usize,
    pub workload_size: usize,
    pub animation_speed: f64,
    /// Base seed for sampling; `None` draws each worker's seed from entropy
    pub seed: Option<u64>,
    pub visual_budget: usize,
    /// Whether worker 0 publishes intermediate snapshots while computing
    pub intermediate_reports: bool,
    /// Time a single-worker pass over the same workload for speedup figures
    pub measure_baseline: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            experiment_kind: ExperimentKind::MonteCarlo,
            worker_count: 4,
            workload_size: 100_000,
            animation_speed: 1.0,
            seed: None,
            visual_budget: DEFAULT_VISUAL_BUDGET,
            intermediate_reports: true,
            measure_baseline: false,
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(Error::invalid(format!(
                "worker count must be in 1..={}, got {}",
                MAX_WORKERS, self.worker_count
            )));
        }
        if self.workload_size == 0 || self.workload_size > MAX_WORKLOAD {
            return Err(Error::invalid(format!(
                "workload size must be in 1..={}, got {}",
                MAX_WORKLOAD, self.workload_size
            )));
        }
        if !self.animation_speed.is_finite() || self.animation_speed < MIN_ANIMATION_SPEED {
            return Err(Error::invalid(format!(
                "animation speed must be a finite value >= {}, got {}",
                MIN_ANIMATION_SPEED, self.animation_speed
            )));
        }
        Ok(())
    }

    /// Scales a base delay by the animation speed multiplier.
    pub fn delay(&self, base_ms: f64) -> Duration {
        Duration::from_secs_f64(base_ms / self.animation_speed / 1000.0)
    }

    /// Seed for one worker's sampler, following a fixed per-worker offset pattern.
    pub fn worker_seed(&self, worker_id: usize) -> Option<u64> {
        self.seed.map(|seed| {
            seed.wrapping_add(12345)
                .wrapping_add((worker_id as u64).wrapping_mul(67890))
        })
    }

    /// Applies a partial update and validates the result without touching `self`.
    pub fn merged(&self, options: &ConfigOptions) -> Result<Configuration> {
        let mut next = self.clone();
        if let Some(kind) = options.experiment_kind {
            next.experiment_kind = kind;
        }
        if let Some(workers) = options.worker_count {
            next.worker_count = workers;
        }
        if let Some(workload) = options.workload_size {
            next.workload_size = workload;
        }
        if let Some(speed) = options.animation_speed {
            next.animation_speed = speed;
        }
        if let Some(seed) = options.seed {
            next.seed = Some(seed);
        }
        if let Some(budget) = options.visual_budget {
            next.visual_budget = budget;
        }
        if let Some(reports) = options.intermediate_reports {
            next.intermediate_reports = reports;
        }
        if let Some(baseline) = options.measure_baseline {
            next.measure_baseline = baseline;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration update. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOptions {
    pub experiment_kind: Option<ExperimentKind>,
    pub worker_count: Option<usize>,
    pub workload_size: Option<usize>,
    pub animation_speed: Option<f64>,
    pub seed: Option<u64>,
    pub visual_budget: Option<usize>,
    pub intermediate_reports: Option<bool>,
    pub measure_baseline: Option<bool>,
}

impl ConfigOptions {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Overlays `other` on top of `self`; fields set in `other` win.
    pub fn overlay(mut self, other: ConfigOptions) -> Self {
        self.experiment_kind = other.experiment_kind.or(self.experiment_kind);
        self.worker_count = other.worker_count.or(self.worker_count);
        self.workload_size = other.workload_size.or(self.workload_size);
        self.animation_speed = other.animation_speed.or(self.animation_speed);
        self.seed = other.seed.or(self.seed);
        self.visual_budget = other.visual_budget.or(self.visual_budget);
        self.intermediate_reports = other.intermediate_reports.or(self.intermediate_reports);
        self.measure_baseline = other.measure_baseline.or(self.measure_baseline);
        self
    }
}
