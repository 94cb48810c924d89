use anyhow::{Context, Result};
use clap::Parser;
use trace_rule_engine::cli::{Cli, Command};
use trace_rule_engine::config::EngineConfig;
use trace_rule_engine::registry::{Registry, RuleSetFile};
use trace_rule_engine::span::Span;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Validate { rules_file } => {
            let registry = load_registry(&rules_file, &config)?;
            report_stats(&registry);
            if registry.stats().parse_errors > 0 {
                anyhow::bail!("rule set has parse errors");
            }
        }
        Command::EvalSpan { rules_file, span_file } => {
            let registry = load_registry(&rules_file, &config)?;
            let span = read_span(&span_file)?;
            let outcome = registry.evaluate(&span);
            for id in &outcome.matched {
                println!("{id}");
            }
            report_stats(&registry);
        }
        Command::EvalTrace { rules_file, trace_file } => {
            let registry = load_registry(&rules_file, &config)?;
            let spans = read_spans(&trace_file)?;
            let outcome = registry.evaluate_trace(&spans);
            for id in &outcome.matched {
                println!("{id}");
            }
            report_stats(&registry);
        }
    }

    Ok(())
}

fn load_registry(rules_file: &std::path::Path, config: &EngineConfig) -> Result<Registry> {
    let registry = Registry::new(config.capacity_cap);
    let rules = RuleSetFile::from_file(rules_file)
        .with_context(|| format!("loading rule set from {}", rules_file.display()))?
        .into_rules();
    for rule in rules {
        let id = rule.id.clone();
        if let Err(e) = registry.load(rule) {
            tracing::warn!(rule_id = %id, error = %e, "rule failed to load");
        }
    }
    Ok(registry)
}

fn read_span(path: &std::path::Path) -> Result<Span> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading span file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing span JSON in {}", path.display()))
}

fn read_spans(path: &std::path::Path) -> Result<Vec<Span>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing trace JSON in {}", path.display()))
}

fn report_stats(registry: &Registry) {
    let stats = registry.stats();
    eprintln!(
        "rules: {} total, {} enabled, {} disabled, {} parse errors",
        stats.total, stats.enabled, stats.disabled, stats.parse_errors
    );
    for (id, err) in registry.parse_errors() {
        eprintln!("  {id}: {err}");
    }
}
