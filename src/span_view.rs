//! The transient, rule-scoped lazy adapter over a span.
//!
//! A stack-allocated view with a small fixed memo — real spans carry
//! hundreds to thousands of attributes, and typical rules touch 1-5
//! fields, so untouched attributes must never be probed.

use crate::field_filter::FieldFilter;
use crate::span::{ScalarValue, Span};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;

/// One [`SpanView`] is created per (rule, span) evaluation and discarded
/// immediately after; it never outlives the span it wraps.
pub struct SpanView<'a> {
    span: &'a Span,
    filter: &'a FieldFilter,
    scalar_memo: RefCell<HashMap<&'static str, Value>>,
    attribute_memo: RefCell<HashMap<String, Value>>,
}

/// Every scalar name the evaluator may ask for, used to normalize
/// lookups to a single `'static` key for the memo map regardless of
/// which alias (`name` vs `operation_name`) the caller used.
const SCALAR_NAMES: &[&str] = &[
    "status",
    "duration",
    "service_name",
    "operation_name",
    "trace_id",
    "span_id",
    "parent_span_id",
    "start_time",
    "end_time",
];

pub(crate) fn canonical_scalar_name(field: &str) -> Option<&'static str> {
    let canonical = if field == "name" { "operation_name" } else { field };
    SCALAR_NAMES.iter().copied().find(|n| *n == canonical)
}

impl<'a> SpanView<'a> {
    pub fn new(span: &'a Span, filter: &'a FieldFilter) -> Self {
        SpanView {
            span,
            filter,
            scalar_memo: RefCell::new(HashMap::new()),
            attribute_memo: RefCell::new(HashMap::new()),
        }
    }

    /// Reads a reserved scalar field through the filter: fields the rule
    /// never referenced return a type-appropriate zero value *without*
    /// touching the underlying span. Unknown field names return `None`,
    /// which the evaluator turns into an `EvalError`.
    pub fn scalar(&self, field: &str) -> Option<Value> {
        let canonical = canonical_scalar_name(field)?;
        if let Some(cached) = self.scalar_memo.borrow().get(canonical) {
            return Some(cached.clone());
        }
        let value = if self.filter.wants_scalar(canonical) {
            match self.span.scalar_field(canonical)? {
                ScalarValue::Str(s) => Value::Str(s.to_string()),
                ScalarValue::Num(n) => Value::Num(n),
            }
        } else {
            zero_value_for(canonical)
        };
        self.scalar_memo
            .borrow_mut()
            .insert(canonical, value.clone());
        Some(value)
    }

    /// `span.attributes["key"]` / `span.attributes.key`: missing keys are
    /// not errors, they yield an empty string.
    pub fn attribute(&self, key: &str) -> Value {
        if let Some(cached) = self.attribute_memo.borrow().get(key) {
            return cached.clone();
        }
        let value = if self.filter.wants_attribute(key) {
            self.span
                .attributes
                .get(key)
                .map(|v| Value::Str(v.clone()))
                .unwrap_or(Value::Str(String::new()))
        } else {
            Value::Str(String::new())
        };
        self.attribute_memo
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        value
    }

    /// `span.attributes` alone, or an indexed/iterated access with a
    /// non-literal key: the full map, honoring the filter's all-attribute
    /// grant (empty map otherwise).
    pub fn all_attributes(&self) -> Value {
        if self.filter.accesses_all_attributes {
            Value::Map(self.span.attributes.clone())
        } else {
            Value::Map(HashMap::new())
        }
    }
}

fn zero_value_for(field: &str) -> Value {
    match field {
        "duration" | "start_time" | "end_time" => Value::Num(0.0),
        _ => Value::Str(String::new()),
    }
}
