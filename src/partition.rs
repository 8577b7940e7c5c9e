use crate::error::{Error, Result};
use serde::Serialize;
use std::ops::Range;

/// Half-open slice of the workload assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkChunk {
    pub worker_id: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkChunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Ceiling share each worker is offered.
pub fn chunk_size(workload_size: usize, worker_count: usize) -> usize {
    if worker_count == 0 {
        return 0;
    }
    workload_size.div_ceil(worker_count)
}

/// Splits `[0, workload_size)` into `worker_count` contiguous chunks of the
/// ceiling share. Trailing chunks are short or empty when the division is uneven.
pub fn partition(workload_size: usize, worker_count: usize) -> Result<Vec<WorkChunk>> {
    if worker_count == 0 {
        return Err(Error::invalid("worker count must be at least 1"));
    }

    let size = chunk_size(workload_size, worker_count);

    let chunks = (0..worker_count)
        .map(|worker_id| {
            let start = worker_id.saturating_mul(size).min(workload_size);
            let end = (worker_id + 1).saturating_mul(size).min(workload_size);
            WorkChunk { worker_id, start, end }
        })
        .collect();

    Ok(chunks)
}
