//! Prometheus metrics for pipeline lifecycle observability.

use metrics::counter;

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a pipeline lifecycle operation (`created`, `updated`, `deleted`).
pub fn pipeline_changed(operation: &'static str) {
    counter!("ci_pipelines_total", "operation" => operation).increment(1);
}

/// Record a webhook registered with an SCM server.
pub fn webhook_created(scm: &str) {
    counter!("ci_webhooks_created_total", "scm" => scm.to_string()).increment(1);
}

/// Record a webhook removed from an SCM server.
pub fn webhook_deleted(scm: &str) {
    counter!("ci_webhooks_deleted_total", "scm" => scm.to_string()).increment(1);
}

/// Record a compensating re-creation after a failed webhook replace.
pub fn webhook_rollback(succeeded: bool) {
    let outcome = if succeeded { "restored" } else { "lost" };
    counter!("ci_webhook_rollbacks_total", "outcome" => outcome).increment(1);
}

/// Record a request that failed with a server-side error, by reason.
pub fn error_recorded(category: &'static str) {
    counter!("ci_errors_total", "category" => category).increment(1);
}
