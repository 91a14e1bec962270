use ::metrics::{counter, histogram};
use tracing::trace;

pub fn inc_requests(route: &'static str) {
    counter!("linkmeta_requests_total", "route" => route).increment(1);
    trace!(
        target = "linkmeta.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!("linkmeta_stage_elapsed_ms", "stage" => stage).record(elapsed_ms as f64);
    trace!(
        target = "linkmeta.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn lookup_outcome(source: &'static str) {
    counter!("linkmeta_lookup_outcomes_total", "source" => source).increment(1);
}
