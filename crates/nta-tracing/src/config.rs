//! Subscriber configuration presets and environment overrides.

use std::env;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::TracingSetupError;

/// Environment variable selecting the preset (`local`, `ci`, `performance`).
pub const ENV_PROFILE: &str = "NTA_TRACING_PROFILE";
/// Environment variable overriding the filter directives.
pub const ENV_DIRECTIVES: &str = "NTA_TRACING_DIRECTIVES";
/// Environment variable selecting the output format (`pretty`, `compact`, `json`).
pub const ENV_FORMAT: &str = "NTA_TRACING_FORMAT";
/// Comma-separated list of event field names to redact.
pub const ENV_REDACT_FIELDS: &str = "NTA_TRACING_REDACT_FIELDS";
/// Replacement text for redacted field values.
pub const ENV_REDACT_TOKEN: &str = "NTA_TRACING_REDACT_TOKEN";
/// `true`/`1`/`yes` turns region compute and link copy timing on.
pub const ENV_PERF_TRACING: &str = "NTA_PERF_TRACING";
/// Minimum duration, in microseconds, for a performance span to be logged.
pub const ENV_PERF_THRESHOLD_US: &str = "NTA_PERF_THRESHOLD_US";
/// Extra filter directives merged in while performance tracing is on.
pub const ENV_PERF_DIRECTIVES: &str = "NTA_PERF_DIRECTIVES";

const DEFAULT_REDACTION: &str = "<redacted>";

/// How the shared subscriber should filter and format events.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter directives (e.g. `nta_engine=debug,info`). When absent,
    /// `RUST_LOG` is consulted and then [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    pub default_directive: String,
    /// Show event targets (module paths).
    pub include_targets: bool,
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Event field names whose values are replaced by [`TracingConfig::redaction_text`].
    pub redacted_fields: Vec<String>,
    pub redaction_text: String,
    /// Whether the engine records per-region compute and per-link copy timings.
    pub enable_performance_tracing: bool,
    /// Performance spans shorter than this are dropped silently.
    pub performance_threshold_us: Option<u64>,
    /// Comma-separated directives added to the filter when
    /// [`TracingConfig::enable_performance_tracing`] is set, so the timing
    /// events are not filtered out by a quieter base filter.
    pub performance_directives: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    fn base(output: TracingOutput) -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: !matches!(output, TracingOutput::Json),
            span_events: FmtSpan::NONE,
            output,
            redacted_fields: Vec::new(),
            redaction_text: DEFAULT_REDACTION.to_string(),
            enable_performance_tracing: false,
            performance_threshold_us: None,
            performance_directives: None,
        }
    }

    /// Pretty, coloured output for working on a network interactively.
    pub fn for_local() -> Self {
        Self {
            enable_performance_tracing: cfg!(debug_assertions),
            ..Self::base(TracingOutput::Pretty)
        }
    }

    /// JSON lines without colour codes, suitable for log collection.
    pub fn for_ci() -> Self {
        Self::base(TracingOutput::Json)
    }

    /// JSON output with span close events and debug-level engine events.
    ///
    /// Region compute and link copy timings are enabled so a run can be
    /// profiled from the log alone.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("nta_engine=debug,info".to_string()),
            span_events: FmtSpan::CLOSE,
            enable_performance_tracing: true,
            performance_directives: Some("nta_engine=trace".to_string()),
            ..Self::base(TracingOutput::Json)
        }
    }

    /// Start from the preset named by `NTA_TRACING_PROFILE` and apply the
    /// remaining `NTA_*` overrides on top.
    ///
    /// Unparseable values are ignored so a typo never prevents start-up.
    pub fn from_env() -> Self {
        let profile = env::var(ENV_PROFILE).unwrap_or_default().to_ascii_lowercase();
        let mut config = match profile.trim() {
            "ci" => Self::for_ci(),
            "performance" | "perf" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Some(directives) = non_empty_var(ENV_DIRECTIVES) {
            config.directives = Some(directives);
        }

        if let Some(output) = non_empty_var(ENV_FORMAT).and_then(|value| TracingOutput::parse(&value)) {
            config.output = output;
            if output == TracingOutput::Json {
                config.ansi = false;
            }
        }

        if let Some(fields) = non_empty_var(ENV_REDACT_FIELDS) {
            let fields: Vec<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect();
            if !fields.is_empty() {
                config.redacted_fields = fields;
            }
        }

        if let Some(token) = non_empty_var(ENV_REDACT_TOKEN) {
            config.redaction_text = token;
        }

        if let Some(flag) = non_empty_var(ENV_PERF_TRACING) {
            config.enable_performance_tracing = parse_flag(&flag);
        }

        if let Some(threshold) = non_empty_var(ENV_PERF_THRESHOLD_US).and_then(|value| value.trim().parse().ok()) {
            config.performance_threshold_us = Some(threshold);
        }

        if let Some(directives) = non_empty_var(ENV_PERF_DIRECTIVES) {
            config.performance_directives = Some(directives);
        }

        config
    }

    pub(crate) fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        let mut filter = match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))?
            }
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive)),
        };

        if !self.enable_performance_tracing {
            return Ok(filter);
        }
        let extra = self.performance_directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|directive| !directive.is_empty()) {
            let parsed: Directive = directive
                .parse()
                .map_err(|err| TracingSetupError::InvalidFilter(format!("{directive}: {err}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Formatter used by the fmt layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}
