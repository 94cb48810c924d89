//! Span and trace data model. Owned entirely by the caller; the
//! evaluator only ever reads through these.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One unit of work in a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub status: String,
    /// Nanoseconds. The DSL exposes duration in nanoseconds too; unit
    /// conversion for display is the caller's concern.
    pub duration: i64,
    pub service_name: String,
    pub operation_name: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Span {
    /// Reads a reserved scalar field by name, or `None` for an unknown
    /// field (the caller decides whether that's a runtime error).
    /// `name` is the alias reserved for `operation_name`.
    pub fn scalar_field(&self, field: &str) -> Option<ScalarValue<'_>> {
        Some(match field {
            "status" => ScalarValue::Str(&self.status),
            "duration" => ScalarValue::Num(self.duration as f64),
            "service_name" => ScalarValue::Str(&self.service_name),
            "operation_name" | "name" => ScalarValue::Str(&self.operation_name),
            "trace_id" => ScalarValue::Str(&self.trace_id),
            "span_id" => ScalarValue::Str(&self.span_id),
            "parent_span_id" => ScalarValue::Str(&self.parent_span_id),
            "start_time" => ScalarValue::Num(self.start_time as f64),
            "end_time" => ScalarValue::Num(self.end_time as f64),
            _ => return None,
        })
    }
}

/// A scalar read off a [`Span`], not yet converted to an evaluator
/// [`crate::value::Value`] (keeps `span.rs` free of an evaluator
/// dependency).
#[derive(Debug, Clone, Copy)]
pub enum ScalarValue<'a> {
    Str(&'a str),
    Num(f64),
}

/// An ordered sequence of spans sharing a trace id. Order is the
/// caller's; the evaluator never depends on wall-clock ordering beyond
/// what the DSL's operators define.
#[derive(Debug, Clone)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn new(trace_id: impl Into<String>, spans: Vec<Span>) -> Self {
        Trace {
            trace_id: trace_id.into(),
            spans,
        }
    }

    /// `trace.has(name)`: true iff any span has this operation name.
    pub fn has_operation(&self, name: &str) -> bool {
        self.spans.iter().any(|s| s.operation_name == name)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Builds a minimal span for tests, defaulting every field a test
    /// doesn't care about to an empty/zero value.
    pub fn span(operation_name: &str) -> Span {
        Span {
            status: String::new(),
            duration: 0,
            service_name: String::new(),
            operation_name: operation_name.to_string(),
            trace_id: String::new(),
            span_id: String::new(),
            parent_span_id: String::new(),
            start_time: 0,
            end_time: 0,
            attributes: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::span;
    use super::*;

    #[test]
    fn scalar_field_reads_known_fields() {
        let mut s = span("checkout");
        s.status = "ERROR".to_string();
        s.duration = 2_000_000_000;
        assert!(matches!(s.scalar_field("status"), Some(ScalarValue::Str("ERROR"))));
        assert!(matches!(s.scalar_field("name"), Some(ScalarValue::Str("checkout"))));
        assert!(matches!(
            s.scalar_field("duration"),
            Some(ScalarValue::Num(n)) if n == 2_000_000_000.0
        ));
        assert!(s.scalar_field("nonexistent").is_none());
    }

    #[test]
    fn trace_has_operation() {
        let t = Trace::new("t1", vec![span("a"), span("b")]);
        assert!(t.has_operation("a"));
        assert!(!t.has_operation("c"));
    }
}
