use anyhow::Result;
use std::path::Path;

mod cli;

fn main() -> Result<()> {
    let invocation = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;

    let config = match &invocation.config {
        Some(path) => common::config::Config::load_from(path)?,
        None => common::config::Config::load()?,
    };

    let dispatch = common::observability::build_dispatch(&config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let metrics_handle = match config.metrics_textfile() {
        Some(_) => Some(scorer::metrics::install_textfile_recorder()?),
        None => None,
    };
    scorer::metrics::describe();

    tracing::info!(
        command = ?invocation.command,
        input = %invocation.input.display(),
        "wallet scorer starting"
    );

    let result = cli::run_command(&invocation, &config);
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "scoring run failed");
    }

    // Metrics are written even for failed runs.
    if let (Some(handle), Some(path)) = (metrics_handle, config.metrics_textfile()) {
        scorer::metrics::flush_textfile(&handle, Path::new(path));
    }

    result
}
