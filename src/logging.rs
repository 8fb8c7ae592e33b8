use tracing_subscriber::{
    EnvFilter, FmtSubscriber,
    fmt::{format::FmtSpan, time::LocalTime},
};

/// Proxy events at `info`; the connection pool and hyper internals only when
/// something goes wrong.
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,rustls=warn";

/// Filter from a `RUST_LOG` style directive, falling back to [`DEFAULT_FILTER`]
/// when it is unset or does not parse.
fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging from the `RUST_LOG` environment variable.
///
/// Each request runs inside a `proxy_request` span holding the client, method
/// and URI; closing that span logs the time spent on the request.
pub fn init_logging_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(directives.as_deref()))
        .with_target(false)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("Logging initialized");
    Ok(())
}
