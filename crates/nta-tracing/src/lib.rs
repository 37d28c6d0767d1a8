//! Shared tracing setup for the nta workspace.
//!
//! Binaries, integration tests and benchmarks install their subscriber through
//! this crate so engine events look the same everywhere.
//!
//! ## Example
//!
//! ```text
//! use nta_tracing::{init_global_tracing, TracingConfig};
//!
//! init_global_tracing(&TracingConfig::from_env())?;
//! ```
//!
//! The engine itself only emits `tracing` events; it never installs a
//! subscriber. [`performance`] holds the timing helpers the engine uses around
//! region compute and link copies.

pub mod config;
pub mod performance;

#[macro_use]
pub mod macros;

mod redact;

use std::error::Error;
use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

pub use config::{TracingConfig, TracingOutput};
pub use tracing::{debug, error, info, trace, warn};

use redact::{Redaction, RedactingJsonEvent, RedactingJsonFields, RedactingTextFields};

/// Failure while installing the shared subscriber.
#[derive(Debug)]
pub enum TracingSetupError {
    /// The directive string did not parse.
    InvalidFilter(String),
    /// A global subscriber is already installed.
    SubscriberInit(TryInitError),
}

impl fmt::Display for TracingSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid tracing directive: {msg}"),
            Self::SubscriberInit(err) => write!(f, "failed to install global tracing subscriber: {err}"),
        }
    }
}

impl Error for TracingSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInit(err) => Some(err),
            Self::InvalidFilter(_) => None,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build a subscriber for `config` without installing it. Output goes to
/// stdout.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    build_subscriber_with_writer(config, std::io::stdout)
}

/// Like [`build_subscriber`], writing formatted events to `writer`.
pub fn build_subscriber_with_writer<W>(
    config: &TracingConfig,
    writer: W,
) -> Result<impl Subscriber + Send + Sync, TracingSetupError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let (filter, layer) = subscriber_layers_with_writer(config, writer)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// The filter and formatting layer, for callers composing their own registry.
pub fn subscriber_layers(config: &TracingConfig) -> Result<(EnvFilter, BoxedLayer), TracingSetupError> {
    subscriber_layers_with_writer(config, std::io::stdout)
}

pub fn subscriber_layers_with_writer<W>(
    config: &TracingConfig,
    writer: W,
) -> Result<(EnvFilter, BoxedLayer), TracingSetupError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = config.resolve_filter()?;
    let redaction = Redaction::new(&config.redacted_fields, &config.redaction_text);

    let base = tracing_fmt::layer::<Registry>()
        .with_writer(writer)
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    let layer: BoxedLayer = match (config.output, redaction.is_empty()) {
        (TracingOutput::Compact, true) => Box::new(base.compact().with_ansi(config.ansi)),
        (TracingOutput::Compact, false) => Box::new(
            base.compact()
                .with_ansi(config.ansi)
                .fmt_fields(RedactingTextFields(redaction)),
        ),
        (TracingOutput::Pretty, true) => Box::new(base.pretty().with_ansi(config.ansi)),
        // The pretty formatter records event fields itself; the full format
        // sends them through `fmt_fields`.
        (TracingOutput::Pretty, false) => {
            Box::new(base.with_ansi(config.ansi).fmt_fields(RedactingTextFields(redaction)))
        }
        (TracingOutput::Json, true) => Box::new(base.json().with_ansi(false)),
        (TracingOutput::Json, false) => Box::new(
            base.with_ansi(false)
                .event_format(RedactingJsonEvent::new(redaction.clone(), config.include_targets))
                .fmt_fields(RedactingJsonFields(redaction)),
        ),
    };

    Ok((filter, layer))
}

/// Install the subscriber described by `config` as the process default and
/// apply its performance settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)?;
    performance::configure(config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Collects everything the fmt layer writes.
    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl CapturedOutput {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedOutput {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Log one event carrying `params` inside a span that also carries it.
    fn log_with_params(output: TracingOutput) -> Result<String, Box<dyn Error>> {
        let config = TracingConfig {
            directives: Some("info".to_string()),
            output,
            ansi: false,
            redacted_fields: vec!["params".to_string()],
            ..TracingConfig::for_ci()
        };
        let captured = CapturedOutput::default();
        let subscriber = build_subscriber_with_writer(&config, captured.clone())?;
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("add_region", region = "level1", params = "span-delta-0.5");
            let _entered = span.enter();
            tracing::info!(params = "event-delta-0.5", nodes = 4u64, "region_added");
        });
        Ok(captured.contents())
    }

    #[test]
    fn json_output_redacts_span_and_event_fields() -> Result<(), Box<dyn Error>> {
        let output = log_with_params(TracingOutput::Json)?;
        assert!(!output.contains("delta-0.5"), "{output}");

        let line: serde_json::Value = serde_json::from_str(output.trim_end())?;
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "region_added");
        assert_eq!(line["fields"]["params"], "<redacted>");
        assert_eq!(line["fields"]["nodes"], 4);
        assert_eq!(line["span"]["name"], "add_region");
        assert_eq!(line["span"]["region"], "level1");
        assert_eq!(line["span"]["params"], "<redacted>");
        assert_eq!(line["spans"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn text_outputs_redact_span_and_event_fields() -> Result<(), Box<dyn Error>> {
        for output in [TracingOutput::Compact, TracingOutput::Pretty] {
            let text = log_with_params(output)?;
            assert!(!text.contains("delta-0.5"), "{output:?}: {text}");
            assert!(text.contains("region_added"), "{output:?}: {text}");
            assert!(text.contains("<redacted>"), "{output:?}: {text}");
        }
        Ok(())
    }

    #[test]
    fn span_records_merge_into_json_span_fields() -> Result<(), Box<dyn Error>> {
        let config = TracingConfig {
            directives: Some("info".to_string()),
            redacted_fields: vec!["params".to_string()],
            ..TracingConfig::for_ci()
        };
        let captured = CapturedOutput::default();
        let subscriber = build_subscriber_with_writer(&config, captured.clone())?;
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("run", iterations = 3u64, params = tracing::field::Empty);
            span.record("params", "late-value");
            let _entered = span.enter();
            tracing::info!("run_started");
        });

        let output = captured.contents();
        let line: serde_json::Value = serde_json::from_str(output.trim_end())?;
        assert_eq!(line["span"]["iterations"], 3);
        assert_eq!(line["span"]["params"], "<redacted>");
        assert!(!output.contains("late-value"));
        Ok(())
    }

    #[test]
    fn invalid_directive_is_rejected() {
        let config = TracingConfig {
            directives: Some("=::nope".to_string()),
            ..TracingConfig::default()
        };
        assert!(matches!(build_subscriber(&config), Err(TracingSetupError::InvalidFilter(_))));
    }

    #[test]
    fn every_output_builds_with_and_without_redaction() {
        for output in [TracingOutput::Compact, TracingOutput::Pretty, TracingOutput::Json] {
            for redacted in [Vec::new(), vec!["params".to_string()]] {
                let config = TracingConfig {
                    directives: Some("info".to_string()),
                    output,
                    redacted_fields: redacted,
                    ..TracingConfig::default()
                };
                assert!(build_subscriber(&config).is_ok(), "{output:?} failed to build");
            }
        }
    }

    #[test]
    fn setup_error_names_the_directive() {
        let err = TracingSetupError::InvalidFilter("bad".to_string());
        assert_eq!(err.to_string(), "invalid tracing directive: bad");
        assert!(err.source().is_none());
    }
}
