// Logging and tracing setup shared by the gateway and the auth backend
// Decision: Console logs always on; OTLP span export only when an endpoint is configured
// Decision: An exporter that fails to build degrades to console-only logging

use std::time::Duration;

use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_SERVICE_NAME: &str = "otter";

/// Console line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for log shippers
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    /// OTLP gRPC endpoint, e.g. http://localhost:4317
    pub otlp_endpoint: Option<String>,
    pub environment: Option<String>,
    /// EnvFilter directives, e.g. "otter_gateway=debug,tower_http=info"
    pub log_filter: Option<String>,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    /// Read OTEL_SERVICE_NAME, OTEL_SERVICE_VERSION, OTEL_EXPORTER_OTLP_ENDPOINT,
    /// OTEL_ENVIRONMENT, RUST_LOG (or LOG_LEVEL) and LOG_FORMAT
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.is_empty());
        Self {
            service_name: var("OTEL_SERVICE_NAME"),
            service_version: var("OTEL_SERVICE_VERSION"),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            environment: var("OTEL_ENVIRONMENT"),
            log_filter: var("RUST_LOG").or_else(|| var("LOG_LEVEL")),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    /// Fill in what the environment left unset for one binary
    pub fn for_service(mut self, name: &str, version: &str, default_filter: &str) -> Self {
        self.service_name.get_or_insert_with(|| name.to_string());
        self.service_version.get_or_insert_with(|| version.to_string());
        self.log_filter.get_or_insert_with(|| default_filter.to_string());
        self
    }

    fn resource(&self) -> Resource {
        let name = self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME);
        let mut attributes = vec![KeyValue::new("service.name", name.to_string())];
        if let Some(version) = &self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }
        if let Some(environment) = &self.environment {
            attributes.push(KeyValue::new("deployment.environment", environment.clone()));
        }
        Resource::builder().with_attributes(attributes).build()
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Flushes and shuts down span export on drop; hold it for the life of `main`
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shut down tracer provider: {e:?}");
            }
        }
    }
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    }
}

/// Install the global subscriber
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let exporter = config
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| (endpoint, otlp_provider(endpoint, config.resource())));

    let (provider, otel_layer) = match &exporter {
        Some((_, Ok(provider))) => {
            let tracer = provider.tracer(DEFAULT_SERVICE_NAME);
            (
                Some(provider.clone()),
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer(config.log_format).with_filter(config.filter()))
        .with(otel_layer)
        .init();

    match exporter {
        Some((endpoint, Ok(_))) => tracing::info!(%endpoint, "OTLP span export enabled"),
        Some((endpoint, Err(e))) => {
            tracing::warn!(%endpoint, error = %e, "OTLP exporter unavailable, logging to console only")
        }
        None => tracing::debug!("OTLP span export disabled"),
    }

    TelemetryGuard { provider }
}

fn otlp_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}
