//! Logging and span export for Mnemo processes.
//!
//! [`init_tracing`] installs one `tracing` registry made of up to three
//! layers:
//!
//! | Layer | Present when |
//! |---|---|
//! | [`EnvFilter`] | always; directives from `RUST_LOG`, else [`default_directives`] |
//! | OpenTelemetry (OTLP/HTTP) | `OTEL_EXPORTER_OTLP_ENDPOINT` is set |
//! | console formatter | always; compact, or JSON with `MNEMO_LOG_FORMAT=json` |
//!
//! The memory facade opens an `add` span per stored episode and a
//! `retrieve_scored` span per query, with `debug!` events inside them
//! ("episode added", "retrieval ranked").  While spans are exported the
//! default filter raises `mnemo_memory` to `debug` so those events travel
//! with their spans; on a plain console the default stays at `info`.
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = mnemo_runtime::telemetry::init_tracing("mnemo");
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CONSOLE_DIRECTIVES: &str = "info";
const EXPORT_DIRECTIVES: &str = "info,mnemo_memory=debug";

/// Console output format selected by `MNEMO_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON; anything else, or nothing, compact.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    fn from_env() -> Self {
        Self::from_value(std::env::var("MNEMO_LOG_FORMAT").ok().as_deref())
    }
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(exporting_spans: bool) -> &'static str {
    if exporting_spans {
        EXPORT_DIRECTIVES
    } else {
        CONSOLE_DIRECTIVES
    }
}

/// Install the global subscriber and return the guard that flushes spans.
///
/// A second call in the same process leaves the first subscriber in place
/// and reports the conflict on stderr.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let provider = build_provider(service_name);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(provider.is_some())));
    let format = LogFormat::from_env();

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("mnemo")));
    let json_layer = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());
    let compact_layer =
        (format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
    {
        eprintln!("[mnemo] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel [`SdkTracerProvider`] down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[mnemo] span export shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// OTLP/HTTP tracer provider, or `None` without an endpoint or when the
/// exporter cannot be built.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[mnemo] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    // Synchronous export: the CLI starts its Tokio runtime after this call.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_json_only_when_asked() {
        assert_eq!(LogFormat::from_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_value(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::from_value(None), LogFormat::Compact);
    }

    #[test]
    fn exporting_raises_memory_events_to_debug() {
        let console = EnvFilter::new(default_directives(false));
        let exporting = EnvFilter::new(default_directives(true));
        assert!(!console.to_string().contains("mnemo_memory"));
        assert!(exporting.to_string().contains("mnemo_memory=debug"));
    }

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: single-threaded test; no other thread reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("test-service").is_none());
    }

    #[test]
    fn guard_without_provider_is_not_exporting() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
