use crate::config::{ConfigOptions, Configuration};
use crate::control::{CancelToken, PauseGate};
use crate::coordinator::{Phase, PhaseCoordinator, RunResult};
use crate::error::{Error, Result};
use crate::events::{
    Collaborators, IntermediateSnapshot, LogEntry, LogSink, ProgressSink, Rectangle, Renderer,
    Severity, WorkerStatus,
};
use crate::listing::ListingParameters;
use crate::worker::RunContext;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Everything the controller exposes to observers between and during runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedState {
    pub phase: Phase,
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    pub snapshots: Vec<IntermediateSnapshot>,
    pub worker_statuses: Vec<WorkerStatus>,
    pub result: Option<RunResult>,
}

impl PublishedState {
    pub fn initial(worker_count: usize) -> Self {
        Self {
            worker_statuses: vec![WorkerStatus::Idle; worker_count],
            ..Default::default()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records published state and forwards to the external collaborators.
struct Publisher {
    state: Arc<Mutex<PublishedState>>,
    external: Collaborators,
}

impl Renderer for Publisher {
    fn draw_point(&self, x: f64, y: f64, inside: bool) {
        self.external.renderer.draw_point(x, y, inside);
    }

    fn draw_rectangle(&self, rect: &Rectangle) {
        self.external.renderer.draw_rectangle(rect);
    }

    fn clear(&self) {
        self.external.renderer.clear();
    }
}

impl LogSink for Publisher {
    fn append_log(&self, message: &str, severity: Severity) {
        lock(&self.state).logs.push(LogEntry {
            timestamp: SystemTime::now(),
            message: message.to_string(),
            severity,
        });
        self.external.log.append_log(message, severity);
    }
}

impl ProgressSink for Publisher {
    fn update_progress(&self, percent: u8) {
        let percent = percent.min(100);
        {
            let mut state = lock(&self.state);
            // Workers finish in any order; never step backwards within a run
            if percent <= state.progress {
                return;
            }
            state.progress = percent;
        }
        self.external.progress.update_progress(percent);
    }

    fn intermediate(&self, snapshot: &IntermediateSnapshot) {
        lock(&self.state).snapshots.push(*snapshot);
        self.external.progress.intermediate(snapshot);
    }

    fn worker_status(&self, worker_id: usize, status: WorkerStatus) {
        if let Some(slot) = lock(&self.state).worker_statuses.get_mut(worker_id) {
            *slot = status;
        }
        self.external.progress.worker_status(worker_id, status);
    }

    fn phase_changed(&self, phase: Phase) {
        lock(&self.state).phase = phase;
        self.external.progress.phase_changed(phase);
    }
}

struct ActiveRun {
    cancel: CancelToken,
    gates: Vec<PauseGate>,
}

/// Releases the active slot even if the `start` future is dropped mid-run.
struct RunGuard<'a> {
    controller: &'a SimulationController,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.controller.active).take() {
            // Stops any worker still suspended when the run future was dropped
            run.cancel.cancel();
        }
    }
}

pub struct SimulationController {
    config: Mutex<Configuration>,
    /// `Some` exactly while a run is in flight
    active: Mutex<Option<ActiveRun>>,
    state: Arc<Mutex<PublishedState>>,
    publisher: Arc<Publisher>,
}

impl SimulationController {
    pub fn new(config: Configuration) -> Result<Self> {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: Configuration, external: Collaborators) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(Mutex::new(PublishedState::initial(config.worker_count)));
        let publisher = Arc::new(Publisher {
            state: Arc::clone(&state),
            external,
        });
        Ok(Self {
            config: Mutex::new(config),
            active: Mutex::new(None),
            state,
            publisher,
        })
    }

    pub fn configuration(&self) -> Configuration {
        lock(&self.config).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn state(&self) -> PublishedState {
        lock(&self.state).clone()
    }

    pub fn listing_parameters(&self) -> ListingParameters {
        ListingParameters::from_config(&lock(&self.config))
    }

    fn reject_while_running(&self, operation: &str) -> Error {
        tracing::info!(operation, "rejected: a run is active");
        self.publisher.append_log(
            &format!("Simulation already running; {} ignored", operation),
            Severity::Info,
        );
        Error::AlreadyRunning
    }

    /// Validates and stores a partial update. On error the current
    /// configuration is left as it was.
    pub fn configure(&self, options: &ConfigOptions) -> Result<()> {
        // held so a concurrent `start` cannot snapshot a half-applied update
        let active = lock(&self.active);
        if active.is_some() {
            drop(active);
            return Err(self.reject_while_running("configure"));
        }

        let workers = {
            let mut config = lock(&self.config);
            *config = config.merged(options)?;
            config.worker_count
        };

        let mut state = lock(&self.state);
        if state.worker_statuses.len() != workers {
            state.worker_statuses = vec![WorkerStatus::Idle; workers];
        }
        Ok(())
    }

    /// Runs one simulation to completion. Returns `Error::AlreadyRunning`
    /// without side effects on the active run if one is in flight.
    pub async fn start(&self) -> Result<RunResult> {
        // Claiming the slot publishes the cancel token and pause gates in the
        // same step that makes the run visible to `is_running`.
        let (config, cancel, gates) = {
            let mut active = lock(&self.active);
            if active.is_some() {
                drop(active);
                return Err(self.reject_while_running("start"));
            }
            let config = self.configuration();
            let cancel = CancelToken::new();
            let gates: Vec<PauseGate> =
                (0..config.worker_count).map(|_| PauseGate::new()).collect();
            *active = Some(ActiveRun {
                cancel: cancel.clone(),
                gates: gates.clone(),
            });
            (config, cancel, gates)
        };
        let _guard = RunGuard { controller: self };

        *lock(&self.state) = PublishedState::initial(config.worker_count);
        self.publisher.clear();
        self.publisher.append_log(
            &format!(
                "Starting {} simulation with {} processes",
                config.experiment_kind.display_name(),
                config.worker_count
            ),
            Severity::Info,
        );
        tracing::info!(
            kind = %config.experiment_kind,
            workers = config.worker_count,
            workload = config.workload_size,
            speed = config.animation_speed,
            "starting run"
        );

        let collaborators = Collaborators {
            renderer: self.publisher.clone(),
            log: self.publisher.clone(),
            progress: self.publisher.clone(),
        };
        let ctx = Arc::new(RunContext::new(config, cancel, gates, collaborators));

        let outcome = PhaseCoordinator::new(ctx).run().await;
        if let Ok(result) = &outcome {
            lock(&self.state).result = Some(result.clone());
        }
        outcome
    }

    /// Returns published state to its initial empty values.
    pub fn reset(&self) -> Result<()> {
        {
            let active = lock(&self.active);
            if active.is_some() {
                drop(active);
                return Err(self.reject_while_running("reset"));
            }
            let workers = lock(&self.config).worker_count;
            *lock(&self.state) = PublishedState::initial(workers);
        }
        self.publisher.external.renderer.clear();
        self.publisher.external.progress.update_progress(0);
        tracing::info!("state reset");
        Ok(())
    }

    fn with_active<T>(&self, f: impl FnOnce(&ActiveRun) -> Result<T>) -> Result<T> {
        match lock(&self.active).as_ref() {
            Some(run) => f(run),
            None => {
                tracing::debug!("no active run");
                Err(Error::NotRunning)
            }
        }
    }

    /// Requests cancellation; the active `start` returns `Error::Cancelled`.
    pub fn cancel(&self) -> Result<()> {
        self.with_active(|run| {
            run.cancel.cancel();
            Ok(())
        })?;
        self.publisher.append_log("Cancellation requested", Severity::Warning);
        Ok(())
    }

    pub fn pause_worker(&self, worker_id: usize) -> Result<()> {
        self.with_active(|run| {
            run.gates
                .get(worker_id)
                .ok_or(Error::UnknownWorker(worker_id))?
                .pause();
            Ok(())
        })?;
        self.publisher
            .append_log(&format!("Process {} paused", worker_id), Severity::Info);
        Ok(())
    }

    pub fn resume_worker(&self, worker_id: usize) -> Result<()> {
        self.with_active(|run| {
            run.gates
                .get(worker_id)
                .ok_or(Error::UnknownWorker(worker_id))?
                .resume();
            Ok(())
        })?;
        self.publisher
            .append_log(&format!("Process {} resumed", worker_id), Severity::Info);
        Ok(())
    }
}
