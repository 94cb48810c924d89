//! The evaluator's dynamic value carrier and its coercion tables.
//!
//! A single place holds comparison and boolean-coercion rules so they
//! cannot drift apart — every evaluator decision about what counts as
//! "truthy" or "equal" goes through here.

use std::collections::HashMap;

/// A value flowing through expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(f64),
    Str(String),
    Map(HashMap<String, String>),
}

impl Value {
    /// Boolean coercion: nil -> false, bool -> itself, empty string ->
    /// false, nonzero number -> true, nonempty string -> true, anything
    /// else (maps) -> false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(_) => false,
        }
    }

    /// Attempts numeric coercion: numbers pass through, strings parseable
    /// as `f64` are promoted, everything else fails.
    pub fn to_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, String>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Typed equality: a type mismatch is `false`, never an error.
    pub fn type_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }

    /// Ordering comparison: numeric coercion first, falling back to a
    /// lexicographic string compare when either side can't be coerced.
    pub fn compare(&self, other: &Value) -> std::cmp::Ordering {
        match (self.to_num(), other.to_num()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            _ => self.display_string().cmp(&other.display_string()),
        }
    }

    fn display_string(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Map(_) => String::new(),
        }
    }

    /// `in`: substring containment when the right side is a string, key
    /// membership when it's a map.
    pub fn contains(&self, other: &Value) -> bool {
        match other {
            Value::Str(haystack) => self
                .as_str()
                .map(|needle| haystack.contains(needle))
                .unwrap_or(false),
            Value::Map(map) => self.as_str().map(|k| map.contains_key(k)).unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_coercion_table() {
        assert!(!Value::Nil.to_bool());
        assert!(Value::Bool(true).to_bool());
        assert!(!Value::Bool(false).to_bool());
        assert!(!Value::Str(String::new()).to_bool());
        assert!(Value::Str("x".into()).to_bool());
        assert!(!Value::Num(0.0).to_bool());
        assert!(Value::Num(1.0).to_bool());
        assert!(!Value::Map(HashMap::new()).to_bool());
    }

    #[test]
    fn typed_equality_never_errors_on_mismatch() {
        assert!(!Value::Num(1.0).type_eq(&Value::Str("1".into())));
        assert!(Value::Str("a".into()).type_eq(&Value::Str("a".into())));
    }

    #[test]
    fn ordering_falls_back_to_lexicographic() {
        use std::cmp::Ordering;
        assert_eq!(
            Value::Str("abc".into()).compare(&Value::Str("abd".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::Num(0.0).compare(&Value::Num(5.0)),
            Ordering::Less
        );
        assert_eq!(
            Value::Str("5".into()).compare(&Value::Num(10.0)),
            Ordering::Less
        );
    }

    #[test]
    fn membership_substring_and_map_key() {
        assert!(Value::Str("POST".into()).contains(&Value::Str("a POST request".into())));
        let mut m = HashMap::new();
        m.insert("http.method".to_string(), "POST".to_string());
        assert!(Value::Str("http.method".into()).contains(&Value::Map(m.clone())));
        assert!(!Value::Str("missing".into()).contains(&Value::Map(m)));
    }
}
