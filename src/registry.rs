//! The rule registry: the one public façade. Holds compiled rules and
//! parse errors behind a single readers-writer lock guarding both maps.

use crate::ast::Expr;
use crate::error::{LoadError, ParseError, RegistryError};
use crate::evaluator::{self, RegexCache};
use crate::field_filter::{self, FieldFilter};
use crate::parser;
use crate::span::Span;
use anyhow::{Context, Result as AnyResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A rule definition as handed to the registry by a caller.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub expression: String,
    pub enabled: bool,
    pub name: Option<String>,
}

impl Rule {
    pub fn new(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Rule {
            id: id.into(),
            expression: expression.into(),
            enabled: true,
            name: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RuleDef {
    id: String,
    expression: String,
    #[serde(default = "default_true")]
    enabled: bool,
    name: Option<String>,
}

/// A rule set loaded from TOML: one `[[rule]]` table per rule.
///
/// ```toml
/// [[rule]]
/// id = "r1"
/// expression = "span.status == \"ERROR\""
/// enabled = true
/// name = "error-status"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleSetFile {
    #[serde(default)]
    rule: Vec<RuleDef>,
}

impl RuleSetFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AnyResult<Self> {
        toml::from_str(content).context("failed to parse rule set TOML")
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rule
            .into_iter()
            .map(|d| Rule {
                id: d.id,
                expression: d.expression,
                enabled: d.enabled,
                name: d.name,
            })
            .collect()
    }
}

/// A successfully compiled rule. Immutable after construction; shared
/// via `Arc` so an in-flight evaluation keeps
/// working against the exact snapshot it took even if `Load` replaces
/// this id a moment later.
pub struct CompiledRule {
    pub id: String,
    pub expression: String,
    pub ast: Expr,
    pub filter: FieldFilter,
    pub enabled: bool,
    pub name: Option<String>,
    regex_cache: RegexCache,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Result<Self, ParseError> {
        let ast = parser::parse_str(&rule.expression)?;
        let filter = field_filter::analyze(&ast);
        Ok(CompiledRule {
            id: rule.id,
            expression: rule.expression,
            ast,
            filter,
            enabled: rule.enabled,
            name: rule.name,
            regex_cache: RegexCache::new(),
        })
    }
}

/// Snapshot returned by `Stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub parse_errors: usize,
}

/// Cooperative cancellation handed to a long-running `Evaluate`/
/// `EvaluateTrace` call; checked at per-rule boundaries, never per AST
/// node.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A per-evaluation wall-clock budget.
#[derive(Clone, Copy)]
pub struct EvalBudget {
    deadline: Option<Instant>,
}

impl EvalBudget {
    pub fn unbounded() -> Self {
        EvalBudget { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        EvalBudget {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Result of one `Evaluate`/`EvaluateTrace` call. `matched` never
/// contains duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOutcome {
    pub matched: Vec<String>,
    pub cancelled: bool,
    pub timed_out: bool,
}

/// The concurrent rule registry. Safe to share across threads behind an
/// `Arc<Registry>`; every method takes `&self`.
pub struct Registry {
    cap: usize,
    compiled: RwLock<HashMap<String, Arc<CompiledRule>>>,
    errors: RwLock<HashMap<String, ParseError>>,
}

impl Registry {
    pub fn new(cap: usize) -> Self {
        Registry {
            cap,
            compiled: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
        }
    }

    /// Parse and analyze `rule`'s expression. On success, atomically
    /// replaces any existing compiled entry with the same id and clears
    /// any prior parse error. On failure, records the parse error and
    /// leaves a previously compiled version of the same id live rather
    /// than evicting it, so a bad edit can't silently delete a working
    /// rule.
    pub fn load(&self, rule: Rule) -> Result<(), LoadError> {
        let id = rule.id.clone();
        match CompiledRule::compile(rule) {
            Ok(compiled) => {
                let mut map = self.compiled.write().unwrap();
                if !map.contains_key(&id) && map.len() >= self.cap {
                    warn!(rule_id = %id, cap = self.cap, "registry at capacity, rejecting new rule");
                    return Err(LoadError::Capacity(RegistryError {
                        rule_id: id,
                        cap: self.cap,
                    }));
                }
                map.insert(id.clone(), Arc::new(compiled));
                drop(map);
                debug!(rule_id = %id, "rule compiled");
                self.errors.write().unwrap().remove(&id);
                Ok(())
            }
            Err(e) => {
                warn!(rule_id = %id, error = %e, "rule failed to parse, retaining any prior compiled version");
                self.errors.write().unwrap().insert(id, e.clone());
                Err(LoadError::Parse(e))
            }
        }
    }

    /// Removes both the compiled entry and the parse error for `id`, if
    /// any. Idempotent.
    pub fn unload(&self, id: &str) {
        self.compiled.write().unwrap().remove(id);
        self.errors.write().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledRule>> {
        self.compiled.read().unwrap().get(id).cloned()
    }

    /// Snapshot of every compiled rule, in no particular order.
    pub fn list(&self) -> Vec<Arc<CompiledRule>> {
        self.compiled.read().unwrap().values().cloned().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let compiled = self.compiled.read().unwrap();
        let enabled = compiled.values().filter(|r| r.enabled).count();
        RegistryStats {
            total: compiled.len(),
            enabled,
            disabled: compiled.len() - enabled,
            parse_errors: self.errors.read().unwrap().len(),
        }
    }

    pub fn parse_errors(&self) -> HashMap<String, ParseError> {
        self.errors.read().unwrap().clone()
    }

    pub fn evaluate(&self, span: &Span) -> EvalOutcome {
        self.evaluate_with(span, None, None)
    }

    /// As [`Registry::evaluate`], but with optional cancellation and a
    /// wall-clock budget, both checked only at rule boundaries.
    pub fn evaluate_with(
        &self,
        span: &Span,
        cancel: Option<&CancellationToken>,
        budget: Option<&EvalBudget>,
    ) -> EvalOutcome {
        let snapshot = self.snapshot_enabled();
        let mut outcome = EvalOutcome::default();
        for rule in snapshot {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                outcome.cancelled = true;
                break;
            }
            if budget.is_some_and(|b| b.expired()) {
                outcome.timed_out = true;
                break;
            }
            match evaluator::evaluate_span(&rule.ast, &rule.filter, span, &rule.regex_cache) {
                Ok(true) => outcome.matched.push(rule.id.clone()),
                Ok(false) => {}
                Err(e) => warn!(rule_id = %rule.id, error = %e, "rule evaluation error, treating as no match"),
            }
        }
        outcome
    }

    pub fn evaluate_trace(&self, spans: &[Span]) -> EvalOutcome {
        self.evaluate_trace_with(spans, None, None)
    }

    pub fn evaluate_trace_with(
        &self,
        spans: &[Span],
        cancel: Option<&CancellationToken>,
        budget: Option<&EvalBudget>,
    ) -> EvalOutcome {
        let snapshot = self.snapshot_enabled();
        let mut outcome = EvalOutcome::default();
        for rule in snapshot {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                outcome.cancelled = true;
                break;
            }
            if budget.is_some_and(|b| b.expired()) {
                outcome.timed_out = true;
                break;
            }
            match evaluator::evaluate_trace(&rule.ast, &rule.filter, spans, &rule.regex_cache) {
                Ok(true) => outcome.matched.push(rule.id.clone()),
                Ok(false) => {}
                Err(e) => warn!(rule_id = %rule.id, error = %e, "rule evaluation error, treating as no match"),
            }
        }
        outcome
    }

    /// Takes the read lock only long enough to clone out the `Arc`
    /// pointers of enabled rules, then evaluates lock-free.
    fn snapshot_enabled(&self) -> Vec<Arc<CompiledRule>> {
        self.compiled
            .read()
            .unwrap()
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::test_support::span;

    #[test]
    fn single_scalar_match_end_to_end() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r1", r#"span.status == "ERROR""#)).unwrap();
        let mut s = span("checkout");
        s.status = "ERROR".to_string();
        s.duration = 2_000_000_000;
        let outcome = reg.evaluate(&s);
        assert_eq!(outcome.matched, vec!["r1".to_string()]);
    }

    #[test]
    fn disabled_rule_never_fires() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r1", r#"span.status == "ERROR""#).disabled())
            .unwrap();
        let mut s = span("checkout");
        s.status = "ERROR".to_string();
        assert!(reg.evaluate(&s).matched.is_empty());
        assert_eq!(reg.stats().disabled, 1);
    }

    #[test]
    fn parse_error_bookkeeping() {
        let reg = Registry::new(100);
        assert!(reg.load(Rule::new("r", "span.status ==")).is_err());
        assert_eq!(reg.stats().parse_errors, 1);
        assert!(reg.get("r").is_none());
        reg.load(Rule::new("r", r#"span.status == "OK""#)).unwrap();
        assert!(!reg.parse_errors().contains_key("r"));
        assert!(reg.get("r").is_some());
    }

    #[test]
    fn failed_reload_retains_previous_compiled_version() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r", r#"span.status == "OK""#)).unwrap();
        assert!(reg.load(Rule::new("r", "span.status ==")).is_err());
        // the old compiled rule is still live...
        assert!(reg.get("r").is_some());
        // ...and the failure is also visible via ParseErrors.
        assert!(reg.parse_errors().contains_key("r"));
    }

    #[test]
    fn unload_is_idempotent() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r", r#"span.status == "OK""#)).unwrap();
        reg.unload("r");
        reg.unload("r");
        assert!(reg.get("r").is_none());
    }

    #[test]
    fn capacity_cap_blocks_new_ids_but_not_replacement() {
        let reg = Registry::new(1);
        reg.load(Rule::new("r1", "true")).unwrap();
        assert!(reg.load(Rule::new("r2", "true")).is_err());
        // replacing the existing id still succeeds at cap
        assert!(reg.load(Rule::new("r1", "false")).is_ok());
    }

    #[test]
    fn empty_trace_matches_nothing_without_error() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r", r#"span.status == "ERROR""#)).unwrap();
        let outcome = reg.evaluate_trace(&[]);
        assert!(outcome.matched.is_empty());
        assert!(!outcome.timed_out);
    }

    #[test]
    fn cancellation_stops_before_any_further_rule_runs() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r1", "true")).unwrap();
        reg.load(Rule::new("r2", "true")).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = reg.evaluate_with(&span("x"), Some(&token), None);
        assert!(outcome.cancelled);
        assert!(outcome.matched.is_empty());
    }

    #[test]
    fn expired_budget_skips_remaining_rules() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r1", "true")).unwrap();
        let budget = EvalBudget::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let outcome = reg.evaluate_with(&span("x"), None, Some(&budget));
        assert!(outcome.timed_out);
    }

    #[test]
    fn rule_set_file_loads_and_applies() {
        let toml = r#"
            [[rule]]
            id = "r1"
            expression = "span.status == \"ERROR\""

            [[rule]]
            id = "r2"
            expression = "span.status == \"OK\""
            enabled = false
        "#;
        let rules = RuleSetFile::from_toml_str(toml).unwrap().into_rules();
        assert_eq!(rules.len(), 2);
        let reg = Registry::new(100);
        for rule in rules {
            reg.load(rule).unwrap();
        }
        let stats = reg.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.enabled, 1);
        assert_eq!(stats.disabled, 1);
    }

    #[test]
    fn trace_level_otel_identifier_match() {
        let reg = Registry::new(100);
        reg.load(Rule::new("r", "trace.has(k8s.pod.name/app-v1@prod)"))
            .unwrap();
        let mut s = span("x");
        s.operation_name = "k8s.pod.name/app-v1@prod".to_string();
        let outcome = reg.evaluate_trace(std::slice::from_ref(&s));
        assert_eq!(outcome.matched, vec!["r".to_string()]);
    }
}
