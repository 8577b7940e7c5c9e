use crate::config::ExperimentKind;
use crate::worker::PartialResult;

/// Combines partial results into a π estimate. Sum then scale, so the order
/// of `results` does not matter beyond floating-point rounding.
pub fn reduce(results: &[PartialResult], kind: ExperimentKind) -> f64 {
    let total: f64 = results.iter().map(|r| r.value).sum();

    match kind {
        ExperimentKind::MonteCarlo => {
            let items: usize = results.iter().map(|r| r.items).sum();
            if items == 0 {
                0.0
            } else {
                4.0 * total / items as f64
            }
        }
        ExperimentKind::RiemannSum => 4.0 * total,
    }
}
