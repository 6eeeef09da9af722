use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// Builds the subscriber shared by the worker, the gateway and their test suites.
///
/// Spans and events are filtered with `RUST_LOG` (or `fallback_env_filter` when it is not set),
/// then written as bunyan-compatible JSON lines to `sink`.
///
/// # Arguments
/// - `name`: name of the service, present on every log line
/// - `fallback_env_filter`: filter directive used when `RUST_LOG` is absent, ex: "info"
/// - `sink`: where log lines are written, ex: `std::io::stdout` or `std::io::sink` in tests
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    Registry::default()
        .with(env_filter)
        // Span fields are stored as JSON so that children spans and events inherit them
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(name, sink))
}

/// Installs `subscriber` as the global default and redirects `log` records to it.
///
/// Must only be called once per process.
pub fn init_tracing_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("Failed to set logger");
    set_global_default(subscriber).expect("Failed to set subscriber");
}
