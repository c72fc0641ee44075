use anyhow::{Context, Result};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

pub fn describe() {
    describe_counter!(
        "scorer_transactions_loaded_total",
        "Number of transaction records loaded from input."
    );
    describe_counter!(
        "scorer_wallets_scored_total",
        "Number of wallets assigned a credit score."
    );
    describe_counter!(
        "scorer_degenerate_columns_total",
        "Number of weighted or score columns with zero variance across the batch."
    );
    describe_counter!(
        "scorer_amount_coercions_total",
        "Number of malformed amounts coerced to 0 in lenient mode."
    );
}

/// Install a global Prometheus recorder without an HTTP listener; the run is
/// short-lived, so the exposition is written to a file at exit instead.
pub fn install_textfile_recorder() -> Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, handle.render())
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}

/// Write the textfile at exit, logging instead of failing so the run's own
/// outcome is what the process reports.
pub fn flush_textfile(handle: &PrometheusHandle, path: &Path) {
    if let Err(e) = write_textfile(handle, path) {
        tracing::error!(error = %format!("{e:#}"), "failed to write metrics textfile");
    }
}
