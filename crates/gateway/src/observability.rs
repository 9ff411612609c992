//! Tracing setup. Plain JSON logs to stdout always; when
//! `ObservabilityConfig::otlp_endpoint` is set, spans are additionally
//! exported via OTLP/gRPC.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vco_domain::config::ObservabilityConfig;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vco_gateway=debug"))
}

/// Install the global tracing subscriber. Returns the tracer provider so the
/// caller can shut it down (flushing any buffered spans) before exit.
pub fn init(config: &ObservabilityConfig) -> Option<SdkTracerProvider> {
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    let Some(endpoint) = &config.otlp_endpoint else {
        tracing_subscriber::registry().with(env_filter()).with(fmt_layer).init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            tracing_subscriber::registry().with(env_filter()).with(fmt_layer).init();
            tracing::warn!(error = %e, endpoint, "failed to build OTLP exporter, falling back to local logging only");
            return None;
        }
    };

    let resource = Resource::builder().with_service_name(config.service_name.clone()).build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(config.sample_rate))
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(config.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Some(provider)
}

/// Flush and shut down the exporter on graceful shutdown.
pub fn shutdown(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "error shutting down tracer provider");
        }
    }
}
