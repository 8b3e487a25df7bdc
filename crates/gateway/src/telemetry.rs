//! Log and trace pipeline.
//!
//! `serve` writes JSON (or pretty) lines filtered by `observability.log_filter`
//! and, with a collector configured, exports every span over OTLP tagged
//! with who this gateway serves and which backend it fronts.  One-shot CLI
//! commands log compactly to stderr so stdout stays machine-readable.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dc_domain::config::{Config, LogFormat};

/// Instrumentation scope of every span the gateway exports.
pub const TRACER_NAME: &str = "datachat.gateway";

/// Handle on the installed pipeline.  Call [`Telemetry::shutdown`] before
/// exit so batched spans are flushed.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Install the `serve` pipeline.  A collector that cannot be set up is
    /// reported on stderr and the server runs with logs only.
    pub fn for_server(config: &Config) -> Self {
        let obs = &config.observability;
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&obs.log_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let (json, pretty) = match obs.log_format {
            LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
            LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
        };

        let provider = obs.otlp_target().and_then(|endpoint| {
            match otlp_provider(config, endpoint) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    eprintln!("datachat: OTLP export to {endpoint} disabled: {e}");
                    None
                }
            }
        });
        let otel = provider
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

        tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(pretty)
            .with(otel)
            .init();

        if let Some(endpoint) = obs.otlp_target().filter(|_| provider.is_some()) {
            tracing::info!(endpoint, sample_rate = obs.sample_rate, "exporting spans over OTLP");
        }
        Self { provider }
    }

    /// Install the one-shot command pipeline: compact, stderr, `warn` unless
    /// `RUST_LOG` says otherwise.
    pub fn for_cli() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
        Self { provider: None }
    }

    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = ?e, "span exporter shutdown failed");
            }
        }
    }
}

fn otlp_provider(config: &Config, endpoint: &str) -> Result<SdkTracerProvider, String> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| e.to_string())?;

    let resource = Resource::builder()
        .with_service_name(config.observability.service_name.clone())
        .with_attributes(resource_attributes(config))
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            config.observability.sample_rate,
        ))))
        .with_resource(resource)
        .build())
}

/// Attributes every exported span carries.  Never includes the API key.
pub fn resource_attributes(config: &Config) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("datachat.user_id", config.backend.user_id.clone()),
        KeyValue::new("datachat.backend_url", config.backend.base_url.clone()),
        KeyValue::new("datachat.auto_run", config.canvas.auto_run),
    ];
    attrs.extend(
        config
            .observability
            .resource_attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }

    #[test]
    fn resource_names_user_backend_and_version() {
        let mut config = Config::default();
        config.backend.user_id = "u-42".into();
        config.backend.api_key = Some("sk-secret".into());
        config
            .observability
            .resource_attributes
            .insert("deployment.environment".into(), "staging".into());

        let attrs = resource_attributes(&config);
        assert_eq!(attr(&attrs, "datachat.user_id").as_deref(), Some("u-42"));
        assert_eq!(
            attr(&attrs, "datachat.backend_url").as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(
            attr(&attrs, "service.version").as_deref(),
            Some(env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(attr(&attrs, "deployment.environment").as_deref(), Some("staging"));
        assert!(attrs
            .iter()
            .all(|kv| !kv.value.as_str().contains("sk-secret")));
    }
}
