use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logs and traces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How `datachat serve` writes its log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Human-readable, for a terminal.
    Pretty,
}

/// Logging and OpenTelemetry export for `datachat serve`.
///
/// Canvas runs, fixes and credit calls are `tracing` spans; with an
/// `otlp_endpoint` they are also shipped over OTLP/gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives.  `RUST_LOG` wins when set.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// OTLP gRPC collector, e.g. `http://localhost:4317`.  Unset or empty
    /// disables export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// `service.name` reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of traces kept, decided once per trace id.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,

    /// Extra resource attributes (deployment, region, ...).
    #[serde(default)]
    pub resource_attributes: BTreeMap<String, String>,
}

impl ObservabilityConfig {
    /// Collector to export to, if export is on.
    pub fn otlp_target(&self) -> Option<&str> {
        self.otlp_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            log_format: LogFormat::default(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
            resource_attributes: BTreeMap::new(),
        }
    }
}

fn d_log_filter() -> String {
    "info,dc_gateway=debug,dc_canvas=debug".into()
}

fn d_service_name() -> String {
    "datachat".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
