//! Field-access analyzer: one linear AST walk that derives the set of
//! span fields a rule actually reads. Pure, run once per compiled rule,
//! and is what lets [`crate::span_view::SpanView`] skip every attribute
//! a rule never asked for.

use crate::ast::{Expr, Literal};
use crate::span_view::canonical_scalar_name;
use std::collections::HashSet;

/// The derived field filter for one compiled rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
    pub scalar_fields: HashSet<String>,
    pub attribute_keys: HashSet<String>,
    pub accesses_all_attributes: bool,
}

impl FieldFilter {
    pub fn wants_scalar(&self, name: &str) -> bool {
        self.scalar_fields.contains(name)
    }

    pub fn wants_attribute(&self, key: &str) -> bool {
        self.accesses_all_attributes || self.attribute_keys.contains(key)
    }
}

/// Derive a [`FieldFilter`] from an AST in one linear pass.
pub fn analyze(expr: &Expr) -> FieldFilter {
    let mut filter = FieldFilter::default();
    walk(expr, &mut filter);
    filter
}

fn walk(expr: &Expr, filter: &mut FieldFilter) {
    match expr {
        Expr::Literal(_) => {}
        Expr::FieldAccess { root, fields } => record_field_access(root, fields, filter),
        Expr::IndexAccess { object, index } => {
            if let Some(key) = attributes_index_key(object, index) {
                match key {
                    Some(literal_key) => {
                        filter.attribute_keys.insert(literal_key);
                    }
                    None => filter.accesses_all_attributes = true,
                }
                walk(index, filter);
            } else {
                walk(object, filter);
                walk(index, filter);
            }
        }
        Expr::Unary { expr, .. } => walk(expr, filter),
        Expr::Binary { left, right, .. } => {
            walk(left, filter);
            walk(right, filter);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                walk(arg, filter);
            }
        }
    }
}

fn record_field_access(root: &str, fields: &[String], filter: &mut FieldFilter) {
    if root != "span" {
        return;
    }
    match fields {
        [] => {}
        [single] if single == "attributes" => filter.accesses_all_attributes = true,
        [single] => {
            // canonicalize aliases (e.g. "name" -> "operation_name") so the
            // key agrees with what `SpanView::scalar` looks up.
            let key = canonical_scalar_name(single)
                .map(str::to_string)
                .unwrap_or_else(|| single.clone());
            filter.scalar_fields.insert(key);
        }
        [first, rest @ ..] if first == "attributes" => {
            filter.attribute_keys.insert(rest.join("."));
        }
        _ => {}
    }
}

/// If `object` is exactly `span.attributes`, returns `Some(literal_key)`
/// (the key, when `index` is a string literal) or `Some(None)` (when
/// `index` is anything else, i.e. accesses-all-attributes). Returns
/// `None` when `object` isn't `span.attributes` at all, signalling the
/// caller to recurse into both children generically instead.
fn attributes_index_key(object: &Expr, index: &Expr) -> Option<Option<String>> {
    match object {
        Expr::FieldAccess { root, fields }
            if root == "span" && fields.len() == 1 && fields[0] == "attributes" =>
        {
            match index {
                Expr::Literal(Literal::Str(key)) => Some(Some(key.clone())),
                _ => Some(None),
            }
        }
        _ => None,
    }
}
