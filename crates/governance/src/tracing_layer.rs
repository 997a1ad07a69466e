//! Distributed tracing configuration.

use codemode_core::{Error, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configure stdout logging and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set,
/// OpenTelemetry export.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn configure_tracing(json: bool, default_filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
    );

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer());

    let otel_layer = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => {
            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint.clone()),
                )
                .with_trace_config(
                    sdktrace::config().with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        "codemode",
                    )])),
                )
                .install_batch(runtime::Tokio)
                .map_err(|e| {
                    Error::configuration(format!("Failed to install OTLP pipeline: {}", e))
                })?;
            let tracer = provider.tracer("codemode");
            opentelemetry::global::set_tracer_provider(provider);
            Some((endpoint, tracing_opentelemetry::layer().with_tracer(tracer)))
        }
        Err(_) => None,
    };
    let (endpoint, otel_layer) = match otel_layer {
        Some((endpoint, layer)) => (Some(endpoint), Some(layer)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::configuration(format!("Tracing already initialized: {}", e)))?;

    if let Some(endpoint) = endpoint {
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
    }

    Ok(())
}
