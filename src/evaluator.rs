//! The AST walker: interprets a compiled rule's AST against either a
//! lazy single-span view or an ordered trace. Both entry points share
//! the same recursive expression walker; only the field-resolution
//! strategy differs.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::EvalError;
use crate::field_filter::FieldFilter;
use crate::span::Span;
use crate::span_view::SpanView;
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

/// Caches compiled `matches` patterns for one compiled rule, so a hot
/// rule evaluated against many spans does not recompile the same regex
/// every time. `Regex` clones are cheap (internally reference-counted).
#[derive(Default)]
pub struct RegexCache(RwLock<HashMap<String, Regex>>);

impl RegexCache {
    pub fn new() -> Self {
        RegexCache(RwLock::new(HashMap::new()))
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, EvalError> {
        if let Some(re) = self.0.read().unwrap().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| EvalError::InvalidRegex(e.to_string()))?;
        self.0
            .write()
            .unwrap()
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

/// Known trace-level predicates. Declared here, close to the
/// interpreter, so adding one is a one-line match arm plus a mention in
/// this doc comment.
fn call_requires_trace(function: &str) -> bool {
    matches!(function, "trace.has" | "trace.missing")
}

/// Evaluate a compiled rule's AST against one span. Constructs a
/// transient [`SpanView`] internally.
pub fn evaluate_span(
    ast: &Expr,
    filter: &FieldFilter,
    span: &Span,
    regex_cache: &RegexCache,
) -> Result<bool, EvalError> {
    let view = SpanView::new(span, filter);
    let ctx = Ctx::Span(&view);
    Ok(eval(ast, &ctx, regex_cache)?.to_bool())
}

/// Evaluate a compiled rule's AST against an ordered trace. ASTs using
/// trace-level predicates (`trace.has`, `trace.missing`, ...) are
/// evaluated directly against the whole span list; everything else falls
/// back to per-span evaluation, short-circuiting on the first span that
/// matches.
pub fn evaluate_trace(
    ast: &Expr,
    filter: &FieldFilter,
    spans: &[Span],
    regex_cache: &RegexCache,
) -> Result<bool, EvalError> {
    if uses_trace_predicate(ast) {
        let ctx = Ctx::Trace(spans);
        return Ok(eval(ast, &ctx, regex_cache)?.to_bool());
    }
    for span in spans {
        let view = SpanView::new(span, filter);
        let ctx = Ctx::Span(&view);
        if let Ok(value) = eval(ast, &ctx, regex_cache) {
            if value.to_bool() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn uses_trace_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::FieldAccess { .. } => false,
        Expr::IndexAccess { object, index } => {
            uses_trace_predicate(object) || uses_trace_predicate(index)
        }
        Expr::Unary { expr, .. } => uses_trace_predicate(expr),
        Expr::Binary { left, right, .. } => {
            uses_trace_predicate(left) || uses_trace_predicate(right)
        }
        Expr::Call { function, args } => {
            call_requires_trace(function) || args.iter().any(uses_trace_predicate)
        }
    }
}

enum Ctx<'a> {
    Span(&'a SpanView<'a>),
    Trace(&'a [Span]),
}

fn eval(expr: &Expr, ctx: &Ctx, regex_cache: &RegexCache) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::FieldAccess { root, fields } => eval_field_access(root, fields, ctx),
        Expr::IndexAccess { object, index } => eval_index(object, index, ctx, regex_cache),
        Expr::Unary { op, expr } => {
            let v = eval(expr, ctx, regex_cache)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.to_bool())),
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx, regex_cache),
        Expr::Call { function, args } => eval_call(function, args, ctx, regex_cache),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Num(n) => Value::Num(*n),
    }
}

fn eval_field_access(root: &str, fields: &[String], ctx: &Ctx) -> Result<Value, EvalError> {
    match (root, ctx) {
        ("span", Ctx::Span(view)) => match fields {
            [] => Err(EvalError::UnknownField("span".to_string())),
            [single] if single == "attributes" => Ok(view.all_attributes()),
            [first, rest @ ..] if first == "attributes" => Ok(view.attribute(&rest.join("."))),
            [single] => view
                .scalar(single)
                .ok_or_else(|| EvalError::UnknownField(single.clone())),
            _ => Err(EvalError::UnknownField(dotted("span", fields))),
        },
        ("span", Ctx::Trace(_)) => Err(EvalError::UnknownField(dotted("span", fields))),
        ("trace", _) => Err(EvalError::UnknownField(dotted("trace", fields))),
        _ => Err(EvalError::UnknownField(dotted(root, fields))),
    }
}

fn dotted(root: &str, fields: &[String]) -> String {
    if fields.is_empty() {
        root.to_string()
    } else {
        format!("{root}.{}", fields.join("."))
    }
}

fn eval_index(
    object: &Expr,
    index: &Expr,
    ctx: &Ctx,
    regex_cache: &RegexCache,
) -> Result<Value, EvalError> {
    if let (Ctx::Span(view), Expr::FieldAccess { root, fields }) = (ctx, object) {
        if root == "span" && fields.len() == 1 && fields[0] == "attributes" {
            return match index {
                Expr::Literal(Literal::Str(key)) => Ok(view.attribute(key)),
                other => {
                    let key_value = eval(other, ctx, regex_cache)?;
                    let key = key_value.as_str().ok_or(EvalError::NotIndexable)?;
                    Ok(view.attribute(key))
                }
            };
        }
    }
    let object_value = eval(object, ctx, regex_cache)?;
    let index_value = eval(index, ctx, regex_cache)?;
    match object_value {
        Value::Map(map) => {
            let key = index_value.as_str().ok_or(EvalError::NotIndexable)?;
            Ok(map
                .get(key)
                .map(|v| Value::Str(v.clone()))
                .unwrap_or(Value::Str(String::new())))
        }
        _ => Err(EvalError::NotIndexable),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &Ctx,
    regex_cache: &RegexCache,
) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => {
            let l = eval(left, ctx, regex_cache)?;
            if !l.to_bool() {
                return Ok(Value::Bool(false));
            }
            let r = eval(right, ctx, regex_cache)?;
            Ok(Value::Bool(r.to_bool()))
        }
        BinaryOp::Or => {
            let l = eval(left, ctx, regex_cache)?;
            if l.to_bool() {
                return Ok(Value::Bool(true));
            }
            let r = eval(right, ctx, regex_cache)?;
            Ok(Value::Bool(r.to_bool()))
        }
        BinaryOp::Eq => {
            let l = eval(left, ctx, regex_cache)?;
            let r = eval(right, ctx, regex_cache)?;
            Ok(Value::Bool(l.type_eq(&r)))
        }
        BinaryOp::NotEq => {
            let l = eval(left, ctx, regex_cache)?;
            let r = eval(right, ctx, regex_cache)?;
            Ok(Value::Bool(!l.type_eq(&r)))
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let l = eval(left, ctx, regex_cache)?;
            let r = eval(right, ctx, regex_cache)?;
            let ordering = l.compare(&r);
            use std::cmp::Ordering::*;
            let result = match (op, ordering) {
                (BinaryOp::Lt, Less) => true,
                (BinaryOp::LtEq, Less | Equal) => true,
                (BinaryOp::Gt, Greater) => true,
                (BinaryOp::GtEq, Greater | Equal) => true,
                _ => false,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => {
            let l = eval(left, ctx, regex_cache)?;
            let r = eval(right, ctx, regex_cache)?;
            Ok(Value::Bool(l.contains(&r)))
        }
        BinaryOp::Matches => {
            let l = eval(left, ctx, regex_cache)?;
            let r = eval(right, ctx, regex_cache)?;
            let pattern = r.as_str().ok_or(EvalError::NotIndexable)?;
            let haystack = l.as_str().unwrap_or_default();
            let re = regex_cache.get_or_compile(pattern)?;
            Ok(Value::Bool(re.is_match(haystack)))
        }
    }
}

fn eval_call(
    function: &str,
    args: &[Expr],
    ctx: &Ctx,
    regex_cache: &RegexCache,
) -> Result<Value, EvalError> {
    match function {
        "trace.has" | "trace.missing" => {
            if args.len() != 1 {
                return Err(EvalError::ArgumentCount {
                    function: function.to_string(),
                    expected: 1,
                    got: args.len(),
                });
            }
            let spans = match ctx {
                Ctx::Trace(spans) => spans,
                Ctx::Span(_) => return Err(EvalError::UndefinedFunction(function.to_string())),
            };
            let name = operation_name_literal(&args[0])?;
            let has = spans.iter().any(|s| s.operation_name == name);
            Ok(Value::Bool(if function == "trace.has" { has } else { !has }))
        }
        other => Err(EvalError::UndefinedFunction(other.to_string())),
    }
}

/// `trace.has(k8s.pod.name/app-v1@prod)` takes its argument as a bare
/// OTel-style identifier, which the parser turns into a `FieldAccess`
/// with no meaningful span to read — here it's just the operation name
/// being named, so fold it back to the dotted text it came from.
fn operation_name_literal(expr: &Expr) -> Result<String, EvalError> {
    match expr {
        Expr::Literal(Literal::Str(s)) => Ok(s.clone()),
        Expr::FieldAccess { root, fields } => Ok(dotted(root, fields)),
        _ => Err(EvalError::UndefinedFunction(
            "trace.has/trace.missing expects a literal or bare identifier".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_filter::analyze;
    use crate::parser::parse_str;
    use crate::span::test_support::span;

    fn run_span(src: &str, s: &Span) -> bool {
        let ast = parse_str(src).unwrap();
        let filter = analyze(&ast);
        let cache = RegexCache::new();
        evaluate_span(&ast, &filter, s, &cache).unwrap()
    }

    #[test]
    fn single_scalar_match() {
        let mut s = span("checkout");
        s.status = "ERROR".to_string();
        s.duration = 2_000_000_000;
        assert!(run_span(r#"span.status == "ERROR""#, &s));
    }

    #[test]
    fn compound_with_attribute() {
        let mut s = span("checkout");
        s.status = "ERROR".to_string();
        s.attributes.insert("http.method".into(), "POST".into());
        assert!(run_span(
            r#"span.status == "ERROR" and span.attributes["http.method"] == "POST""#,
            &s
        ));
        s.attributes.insert("http.method".into(), "GET".into());
        assert!(!run_span(
            r#"span.status == "ERROR" and span.attributes["http.method"] == "POST""#,
            &s
        ));
    }

    #[test]
    fn otel_style_identifier_in_trace_has() {
        let ast = parse_str("trace.has(k8s.pod.name/app-v1@prod)").unwrap();
        let filter = analyze(&ast);
        let cache = RegexCache::new();
        let mut s = span("k8s.pod.name/app-v1@prod");
        s.operation_name = "k8s.pod.name/app-v1@prod".to_string();
        assert!(evaluate_trace(&ast, &filter, std::slice::from_ref(&s), &cache).unwrap());
    }

    #[test]
    fn duration_zero_is_a_normal_numeric_compare() {
        let s = span("x");
        assert!(run_span("span.duration < 1", &s));
    }

    #[test]
    fn typed_equality_mismatch_is_false_not_error() {
        let s = span("x");
        assert!(!run_span(r#"span.duration == "0""#, &s));
    }

    #[test]
    fn ordering_falls_back_to_string_compare_on_non_numeric() {
        let mut s = span("x");
        s.status = "abc".to_string();
        assert!(run_span(r#"span.status < "abd""#, &s));
    }

    #[test]
    fn unknown_field_is_a_runtime_error() {
        let ast = parse_str("span.nonexistent").unwrap();
        let filter = analyze(&ast);
        let cache = RegexCache::new();
        let s = span("x");
        assert!(matches!(
            evaluate_span(&ast, &filter, &s, &cache),
            Err(EvalError::UnknownField(_))
        ));
    }

    #[test]
    fn matches_is_regex() {
        let mut s = span("x");
        s.operation_name = "payment.charge_card".to_string();
        assert!(run_span(r#"span.operation_name matches "^payment\\..*""#, &s));
        assert!(!run_span(r#"span.operation_name matches "^refund\\..*""#, &s));
    }

    #[test]
    fn empty_trace_evaluates_to_false_without_error() {
        let ast = parse_str(r#"span.status == "ERROR""#).unwrap();
        let filter = analyze(&ast);
        let cache = RegexCache::new();
        assert!(!evaluate_trace(&ast, &filter, &[], &cache).unwrap());
    }

    #[test]
    fn trace_missing_is_negation_of_has() {
        let ast = parse_str("trace.missing(checkout)").unwrap();
        let filter = analyze(&ast);
        let cache = RegexCache::new();
        let s = span("other");
        assert!(evaluate_trace(&ast, &filter, std::slice::from_ref(&s), &cache).unwrap());
    }
}
