use crate::record::{LogEntry, LogLevel};
use crate::timber::Timber;
use std::collections::BTreeMap;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

type Fields = BTreeMap<String, serde_json::Value>;

/// `tracing_subscriber` layer that turns every event into one
/// [`LogEntry`] and hands it to [`Timber::enqueue`].
///
/// The layer does no batching of its own. Events more verbose than the
/// configured maximum level are skipped. Metadata is merged from three
/// sources, later ones winning on key collision:
///
/// 1. default fields set with [`TimberLayer::with_default_field`],
/// 2. fields recorded on enclosing spans, root first,
/// 3. the event's own fields.
///
/// Events emitted by this crate (the sink worker's diagnostics) are
/// ignored so they never loop back into the sink.
#[derive(Clone)]
pub struct TimberLayer {
    timber: Timber,
    max_level: LevelFilter,
    default_fields: Fields,
}

impl TimberLayer {
    pub fn new(timber: Timber) -> Self {
        Self {
            timber,
            max_level: LevelFilter::INFO,
            default_fields: BTreeMap::new(),
        }
    }

    /// Most verbose level forwarded to the sink.
    pub fn with_max_level(mut self, max_level: impl Into<LevelFilter>) -> Self {
        self.max_level = max_level.into();
        self
    }

    /// Field attached to every entry unless the span or event sets the
    /// same key.
    pub fn with_default_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.default_fields.insert(key.into(), value.into());
        self
    }
}

/// Span fields stored in the span's extensions.
struct SpanFields(Fields);

impl<S> Layer<S> for TimberLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = BTreeMap::new();
        let mut message = None;
        attrs.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });
        if let Some(message) = message {
            fields.insert("span_message".to_string(), serde_json::Value::String(message));
        }

        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut message = None;
            values.record(&mut FieldVisitor { fields, message: &mut message });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.max_level {
            return;
        }
        if is_own_target(meta.target()) {
            return;
        }

        let mut entry = LogEntry::new(LogLevel::from(meta.level()), String::new());
        entry.merge_fields(self.default_fields.clone());

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    entry.merge_fields(fields.clone());
                }
            }
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });
        entry.merge_fields(fields);
        entry.message = message.unwrap_or_default();

        self.timber.enqueue(entry);
    }
}

fn is_own_target(target: &str) -> bool {
    target == env!("CARGO_CRATE_NAME") || target.starts_with(concat!(env!("CARGO_CRATE_NAME"), "::"))
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `info!("...")` passes its message as `fmt::Arguments` through here.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
