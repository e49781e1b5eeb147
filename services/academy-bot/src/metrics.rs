//! Prometheus metrics exposition
//!
//! Metrics recorded by the bot process:
//!
//! - `bot_updates_total` (counter): label `kind` (`start`, `callback`, `ai_question`, `text`, `ignored`)
//! - `telegram_errors_total` (counter): label `method`
//! - `completion_duration_seconds` (histogram)
//! - `completion_requests_total`, `credential_rotations_total` (counters, recorded by `key-pool`)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const COMPLETION_DURATION: &str = "completion_duration_seconds";

/// Bucket boundaries from 100ms to 120s; model answers take seconds, not milliseconds.
const COMPLETION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(COMPLETION_DURATION.to_string()), COMPLETION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The handle's `render()` method produces the Prometheus text exposition format
/// served on the admin `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Count one handled update by kind.
pub fn record_update(kind: &'static str) {
    metrics::counter!("bot_updates_total", "kind" => kind).increment(1);
}

/// Count a failed Bot API call.
pub fn record_telegram_error(method: &'static str) {
    metrics::counter!("telegram_errors_total", "method" => method).increment(1);
}

/// Record how long one AI answer took, placeholders included.
pub fn record_completion_duration(duration_secs: f64) {
    metrics::histogram!(COMPLETION_DURATION).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_update("start");
        record_telegram_error("sendMessage");
        record_completion_duration(1.2);
    }

    /// Isolated recorder/handle pair; install_recorder() can only succeed once
    /// per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_update_counts_by_kind() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_update("callback");
        record_update("callback");
        record_update("ai_question");

        let output = handle.render();
        assert!(output.contains("bot_updates_total{kind=\"callback\"} 2"), "{output}");
        assert!(output.contains("bot_updates_total{kind=\"ai_question\"} 1"), "{output}");
    }

    #[test]
    fn record_telegram_error_carries_method_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_telegram_error("getUpdates");

        let output = handle.render();
        assert!(output.contains("telegram_errors_total{method=\"getUpdates\"} 1"), "{output}");
    }

    #[test]
    fn completion_duration_renders_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_completion_duration(3.0);

        let output = handle.render();
        assert!(output.contains("completion_duration_seconds_bucket"), "{output}");
        assert!(output.contains("le=\"0.1\""));
        assert!(output.contains("le=\"120\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
