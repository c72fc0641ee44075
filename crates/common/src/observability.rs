use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

struct ErrorCounterLayer;

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

/// Build a `tracing` dispatcher configured for:
/// - JSON logs to stderr
/// - EnvFilter that respects `RUST_LOG` (takes precedence) and falls back to `default_level`
/// - `tracing_error_events` counter for ERROR events
///
/// Stdout is left to the CLI, which may stream CSV there.
pub fn build_dispatch(default_level: &str) -> tracing::Dispatch {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr)
        .json();

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorCounterLayer);

    tracing::Dispatch::new(subscriber)
}
