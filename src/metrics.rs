use tracing::trace;

// Trace-based counters; a log pipeline turns these into series.

pub fn marketplace_outcome(operation: &'static str, marketplace: &str, outcome: &'static str) {
    trace!(
        target = "crosslist.metrics",
        operation = operation,
        marketplace = marketplace,
        outcome = outcome,
        "marketplace_outcome_inc"
    );
}

pub fn step_elapsed(step: &'static str, elapsed_ms: u128) {
    trace!(
        target = "crosslist.metrics",
        step = step,
        elapsed_ms = elapsed_ms as u64,
        "step_elapsed"
    );
}

pub fn retry_scheduled(status: u16) {
    trace!(
        target = "crosslist.metrics",
        status = status,
        "upstream_retries_inc"
    );
}

pub fn cache_lookup(cache: &'static str, hit: bool) {
    trace!(
        target = "crosslist.metrics",
        cache = cache,
        hit = hit,
        "cache_lookup"
    );
}
