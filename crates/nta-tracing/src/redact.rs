//! Field formatters that mask selected event and span fields.
//!
//! Node and link parameter strings are logged verbatim by the engine. When a
//! deployment passes anything sensitive through them, naming the field in
//! [`crate::TracingConfig::redacted_fields`] keeps it out of the log.
//!
//! The stock JSON and pretty event formatters record event fields with their
//! own visitors and never consult `fmt_fields`, so JSON output also needs
//! [`RedactingJsonEvent`].

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::field::{Field, Visit};
use tracing::span::Record;
use tracing::{Event, Subscriber};
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Shared redaction rules: the masked field names and their replacement.
#[derive(Clone, Debug)]
pub(crate) struct Redaction {
    fields: Arc<HashSet<String>>,
    replacement: Arc<str>,
}

impl Redaction {
    pub(crate) fn new(fields: &[String], replacement: &str) -> Self {
        Self {
            fields: Arc::new(fields.iter().cloned().collect()),
            replacement: Arc::from(replacement),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn masks(&self, field: &Field) -> bool {
        self.fields.contains(field.name())
    }
}

/// `key=value` formatter for the compact and pretty outputs.
#[derive(Clone, Debug)]
pub(crate) struct RedactingTextFields(pub(crate) Redaction);

/// Object formatter for span fields in the JSON output.
#[derive(Clone, Debug)]
pub(crate) struct RedactingJsonFields(pub(crate) Redaction);

/// One JSON object per event: `timestamp`, `level`, redacted `fields`,
/// `target`, the current `span` and the root-first `spans` list.
#[derive(Clone, Debug)]
pub(crate) struct RedactingJsonEvent {
    rules: Redaction,
    include_target: bool,
}

impl RedactingJsonEvent {
    pub(crate) fn new(rules: Redaction, include_target: bool) -> Self {
        Self { rules, include_target }
    }
}

struct TextVisitor<'a> {
    rules: &'a Redaction,
    entries: Vec<(&'static str, String)>,
}

impl TextVisitor<'_> {
    fn push(&mut self, field: &Field, render: impl FnOnce() -> String) {
        let value = if self.rules.masks(field) {
            format!("{:?}", &*self.rules.replacement)
        } else {
            render()
        };
        self.entries.push((field.name(), value));
    }
}

struct JsonVisitor<'a> {
    rules: &'a Redaction,
    object: JsonMap<String, JsonValue>,
}

impl<'a> JsonVisitor<'a> {
    fn new(rules: &'a Redaction, object: JsonMap<String, JsonValue>) -> Self {
        Self { rules, object }
    }

    fn render(self) -> Result<String, fmt::Error> {
        serde_json::to_string(&JsonValue::Object(self.object)).map_err(|_| fmt::Error)
    }

    fn insert(&mut self, field: &Field, value: JsonValue) {
        let value = if self.rules.masks(field) {
            JsonValue::String(self.rules.replacement.to_string())
        } else {
            value
        };
        self.object.insert(field.name().to_string(), value);
    }
}

macro_rules! text_records {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(&mut self, field: &Field, value: $ty) {
                self.push(field, || value.to_string());
            }
        )*
    };
}

impl Visit for TextVisitor<'_> {
    text_records!(record_i64(i64), record_u64(u64), record_i128(i128), record_u128(u128), record_bool(bool));
    text_records!(record_f64(f64));

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, || format!("{value:?}"));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, || value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, || format!("{value:?}"));
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, JsonValue::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = JsonNumber::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, JsonValue::String(format!("{value:?}")));
    }
}

impl<'writer> FormatFields<'writer> for RedactingTextFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut visitor = TextVisitor {
            rules: &self.0,
            entries: Vec::new(),
        };
        fields.record(&mut visitor);

        for (index, (key, value)) in visitor.entries.iter().enumerate() {
            if index > 0 {
                writer.write_char(' ')?;
            }
            write!(writer, "{key}={value}")?;
        }
        Ok(())
    }
}

impl<'writer> FormatFields<'writer> for RedactingJsonFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut visitor = JsonVisitor::new(&self.0, JsonMap::new());
        fields.record(&mut visitor);
        writer.write_str(&visitor.render()?)
    }

    // Later `span.record(..)` values merge into the existing object.
    fn add_fields(&self, current: &'writer mut FormattedFields<Self>, fields: &Record<'_>) -> fmt::Result {
        let mut visitor = JsonVisitor::new(&self.0, parse_object(&current.fields));
        fields.record(&mut visitor);
        current.fields = visitor.render()?;
        Ok(())
    }
}

impl<S, N> FormatEvent<S, N> for RedactingJsonEvent
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();
        let mut line = JsonMap::new();

        let mut timestamp = String::new();
        SystemTime.format_time(&mut Writer::new(&mut timestamp))?;
        line.insert("timestamp".to_string(), JsonValue::String(timestamp));
        line.insert("level".to_string(), JsonValue::String(metadata.level().to_string()));

        let mut visitor = JsonVisitor::new(&self.rules, JsonMap::new());
        event.record(&mut visitor);
        line.insert("fields".to_string(), JsonValue::Object(visitor.object));

        if self.include_target {
            line.insert("target".to_string(), JsonValue::String(metadata.target().to_string()));
        }

        if let Some(scope) = ctx.event_scope() {
            let mut spans = Vec::new();
            for span in scope.from_root() {
                let mut object = span
                    .extensions()
                    .get::<FormattedFields<N>>()
                    .map(|fields| parse_object(&fields.fields))
                    .unwrap_or_default();
                object.insert("name".to_string(), JsonValue::String(span.name().to_string()));
                spans.push(JsonValue::Object(object));
            }
            if let Some(current) = spans.last() {
                line.insert("span".to_string(), current.clone());
            }
            line.insert("spans".to_string(), JsonValue::Array(spans));
        }

        let rendered = serde_json::to_string(&JsonValue::Object(line)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{rendered}")
    }
}

/// Span fields already rendered by [`RedactingJsonFields`]; anything else
/// yields an empty object.
fn parse_object(rendered: &str) -> JsonMap<String, JsonValue> {
    match serde_json::from_str(rendered) {
        Ok(JsonValue::Object(object)) => object,
        _ => JsonMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_tracks_configured_fields() {
        let rules = Redaction::new(&["params".to_string()], "###");
        assert!(!rules.is_empty());
        assert_eq!(&*rules.replacement, "###");
        assert!(rules.fields.contains("params"));
        assert!(!rules.fields.contains("region"));
    }

    #[test]
    fn empty_redaction_is_detected() {
        assert!(Redaction::new(&[], "x").is_empty());
    }

    #[test]
    fn rendered_span_fields_parse_back() {
        let object = parse_object(r#"{"region":"level1","params":"<redacted>"}"#);
        assert_eq!(object.get("region"), Some(&JsonValue::from("level1")));
        assert!(parse_object("").is_empty());
        assert!(parse_object("region=level1").is_empty());
    }
}
