use otel_tester_core::error::GenericError;
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::{
    layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _, EnvFilter, Layer,
};

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// `directives` are standard `EnvFilter` directives, such as `info` or `otel_tester_core=debug,info`. When `json` is
/// `true`, events are written as flattened JSON objects, which keeps span fields like the correlation identifier
/// available to log shippers. Otherwise, events are written in a compact, human-readable format.
///
/// # Errors
///
/// If the directives are invalid, or the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(directives: &str, json: bool) -> Result<(), GenericError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives)?;

    if json {
        tracing_subscriber::registry()
            .with(json_layer().with_filter(filter))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(compact_layer().with_filter(filter))
            .try_init()?;
    }

    Ok(())
}

fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_target(true)
}

fn compact_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new().compact().with_target(true)
}
