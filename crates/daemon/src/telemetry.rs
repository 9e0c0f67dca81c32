//! Logging and optional OpenTelemetry export

use anyhow::Result;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "plexfarm=info";

type Subscriber = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Subscriber> + Send + Sync>;

/// Keeps the non-blocking writer alive until [`flush`]
static GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default `plexfarm=info` filter.
pub fn init(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    if let Ok(mut slot) = GUARD.lock() {
        *slot = Some(guard);
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(match format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(writer).boxed(),
    });

    let otel_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    #[cfg(feature = "telemetry")]
    {
        if let Some(endpoint) = &otel_endpoint {
            layers.push(otel_layer(endpoint)?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    match otel_endpoint {
        #[cfg(feature = "telemetry")]
        Some(endpoint) => tracing::info!(endpoint = %endpoint, "OpenTelemetry export enabled"),
        #[cfg(not(feature = "telemetry"))]
        Some(_) => {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
        }
        None => tracing::debug!("OpenTelemetry not configured (OTEL_EXPORTER_OTLP_ENDPOINT not set)"),
    }
    Ok(())
}

/// Drain buffered log lines. Call before `process::exit`.
pub fn flush() {
    if let Ok(mut slot) = GUARD.lock() {
        slot.take();
    }
}

/// OTLP span export
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: plexfarm-worker)
#[cfg(feature = "telemetry")]
fn otel_layer(endpoint: &str) -> Result<BoxedLayer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "plexfarm-worker".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}
