use crate::caller::{trim_path, CallerFrame};
use crate::entry::Entry;
use crate::field::{ErrorValue, FieldValue, Fields};
use crate::level::Level;
use crate::logger::Logger;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that feeds `tracing` events into a
/// [`Logger`], so they go through the same level gate, hooks, formatter and
/// sinks as direct facade calls.
///
/// The event's callsite metadata is used as the explicit call site, so the
/// `source` field never depends on stack walking for bridged events.
pub struct EnrichLayer {
    logger: Arc<Logger>,
}

impl EnrichLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        EnrichLayer { logger }
    }
}

impl<S> Layer<S> for EnrichLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Level::from(*meta.level());
        if !self.logger.is_enabled(level) {
            return;
        }

        let mut fields = Fields::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let caller = CallerFrame {
            file: meta.file().map(trim_path).unwrap_or_else(|| "?".to_string()),
            function: meta.module_path().unwrap_or("?()").to_string(),
            line: meta.line().unwrap_or(0),
        };
        let entry = Entry::new(level, message.unwrap_or_default())
            .with_fields(fields)
            .with_field("target", meta.target())
            .with_caller(caller);
        self.logger.emit(entry);
    }
}

/// Collects an event's fields as [`FieldValue`]s; `message` becomes the
/// entry message.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name(), value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name(), value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name(), value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name(), FieldValue::Error(ErrorValue::new(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name(), format!("{:?}", value));
        }
    }
}
