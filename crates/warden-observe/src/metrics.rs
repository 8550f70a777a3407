//! Metrics collection for permission checks
//!
//! Provides structured metrics using the `metrics` crate with Prometheus export.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initialize all metric descriptions
pub fn init_metrics_descriptions() {
    // Permission check metrics
    describe_counter!(
        "warden_checks_total",
        "Total number of permission checks performed"
    );
    describe_counter!(
        "warden_checks_allowed_total",
        "Total number of checks that resulted in ALLOWED"
    );
    describe_counter!(
        "warden_checks_denied_total",
        "Total number of checks that resulted in DENIED"
    );
    describe_histogram!(
        "warden_check_duration_seconds",
        "Duration of permission checks in seconds"
    );

    // Cache metrics
    describe_counter!("warden_cache_hits_total", "Total number of cache hits");
    describe_counter!("warden_cache_misses_total", "Total number of cache misses");
    describe_counter!(
        "warden_cache_invalidations_total",
        "Total number of whole-cache invalidations"
    );
    describe_gauge!(
        "warden_cache_entries",
        "Current number of entries in the cache"
    );
    describe_gauge!(
        "warden_cache_hit_rate",
        "Current cache hit rate as a percentage"
    );

    // Evaluation metrics
    describe_counter!(
        "warden_evaluations_total",
        "Total number of evaluator runs by target kind"
    );
}

/// Record a completed check; `decision` is `allowed` or `denied`
pub fn record_check(decision: &str, duration_seconds: f64) {
    counter!("warden_checks_total").increment(1);

    match decision {
        "allowed" => counter!("warden_checks_allowed_total").increment(1),
        "denied" => counter!("warden_checks_denied_total").increment(1),
        _ => {}
    }

    histogram!("warden_check_duration_seconds").record(duration_seconds);
}

pub fn record_cache_hit(hit: bool) {
    if hit {
        counter!("warden_cache_hits_total").increment(1);
    } else {
        counter!("warden_cache_misses_total").increment(1);
    }
}

/// `reason` names the mutation that forced the invalidation
pub fn record_cache_invalidation(reason: &'static str) {
    counter!("warden_cache_invalidations_total", "reason" => reason).increment(1);
}

pub fn update_cache_stats(entries: u64, hit_rate: f64) {
    gauge!("warden_cache_entries").set(entries as f64);
    gauge!("warden_cache_hit_rate").set(hit_rate);
}

/// `target` is `node` or `acl`
pub fn record_evaluation(target: &'static str) {
    counter!("warden_evaluations_total", "target" => target).increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use super::*;

    static INIT: Once = Once::new();

    fn init_test_metrics() {
        INIT.call_once(|| {
            let _ = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder();
            init_metrics_descriptions();
        });
    }

    #[test]
    fn test_record_check() {
        init_test_metrics();
        record_check("allowed", 0.001);
        record_check("denied", 0.002);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_cache_operations() {
        init_test_metrics();
        record_cache_hit(true);
        record_cache_hit(false);
        record_cache_invalidation("set_permission");
        update_cache_stats(100, 75.5);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_evaluation() {
        init_test_metrics();
        record_evaluation("node");
        record_evaluation("acl");
    }
}
