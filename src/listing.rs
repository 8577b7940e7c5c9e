use crate::config::{Configuration, ExperimentKind};
use crate::partition::chunk_size;
use serde::Serialize;

/// Values an MPI listing generator is templated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingParameters {
    pub experiment_kind: ExperimentKind,
    pub worker_count: usize,
    pub per_worker_share: usize,
    pub total_workload: usize,
}

impl ListingParameters {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            experiment_kind: config.experiment_kind,
            worker_count: config.worker_count,
            per_worker_share: chunk_size(config.workload_size, config.worker_count),
            total_workload: config.workload_size,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "pi_calculation_mpi_{}_{}proc.c",
            self.experiment_kind, self.worker_count
        )
    }
}
