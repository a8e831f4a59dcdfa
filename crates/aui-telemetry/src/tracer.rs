//! Tracer setup and management

use aui_core::ObservabilityConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SimpleSpanProcessor, TracerProvider};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Global tracer provider holder
static TRACER_PROVIDER: OnceLock<Arc<TracerProvider>> = OnceLock::new();

/// Global span processor builders (registered before initialization)
type ProcessorBuilder = Box<dyn FnOnce() -> SimpleSpanProcessor + Send>;
static SPAN_PROCESSOR_BUILDERS: Mutex<Option<Vec<ProcessorBuilder>>> = Mutex::new(Some(Vec::new()));

/// Register a span processor builder to be used when telemetry is initialized.
///
/// Must be called BEFORE [`init_telemetry`]; later registrations are ignored
/// with a warning.
///
/// # Example
///
/// ```ignore
/// use aui_telemetry::{register_span_processor, init_telemetry};
/// use opentelemetry_sdk::trace::SimpleSpanProcessor;
///
/// register_span_processor(Box::new(|| {
///     SimpleSpanProcessor::new(Box::new(/* your exporter */))
/// }));
/// init_telemetry(&Default::default())?;
/// ```
pub fn register_span_processor(builder: ProcessorBuilder) {
    let mut builders = match SPAN_PROCESSOR_BUILDERS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(ref mut vec) = *builders {
        vec.push(builder);
    } else {
        tracing::warn!("Attempted to register span processor after telemetry initialization");
    }
}

/// Initialize logging and OpenTelemetry tracing.
///
/// This sets up:
/// - A tracer provider with any registered span processors
/// - A fmt layer, JSON when `json_logs` is set
/// - An `EnvFilter` from `RUST_LOG`, falling back to `log_filter`
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use aui_core::ObservabilityConfig;
/// use aui_telemetry::init_telemetry;
///
/// init_telemetry(&ObservabilityConfig::default()).expect("telemetry");
/// ```
pub fn init_telemetry(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let builders = match SPAN_PROCESSOR_BUILDERS.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
    .unwrap_or_default();

    let mut provider_builder = TracerProvider::builder();
    for builder in builders {
        provider_builder = provider_builder.with_span_processor(builder());
    }
    let tracer_provider = provider_builder.build();

    let service_name = config
        .service_name
        .clone()
        .unwrap_or_else(|| crate::attributes::SYSTEM_NAME.to_string());
    let tracer = tracer_provider.tracer(service_name);

    let _ = TRACER_PROVIDER.set(Arc::new(tracer_provider));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .boxed()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Get the global tracer provider if initialized
pub fn tracer_provider() -> Option<Arc<TracerProvider>> {
    TRACER_PROVIDER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = ObservabilityConfig::default();
        // The first call may race with other test binaries' subscribers;
        // only the second one is guaranteed to fail.
        let _ = init_telemetry(&config);
        assert!(init_telemetry(&config).is_err());
        assert!(tracer_provider().is_some());
    }
}
