//! labelsync - keep issue labels consistent across GitHub and GitLab
//!
//! ## Commands
//!
//! - `check`: report every label that differs from the rules
//! - `fix`: apply one corrective call per violation
//! - `rules`: list the configured label rules
//! - `validate`: load the configuration and report what it contains

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use labelsync_core::{
    CheckReport, Config, FixReport, LabelsFile, Reconciler, RepoCheck, RepoFix, RuleSet, Service,
};

#[derive(Parser)]
#[command(name = "labelsync")]
#[command(version = labelsync_core::VERSION)]
#[command(about = "Declarative issue-label reconciliation for GitHub and GitLab", long_about = None)]
struct Cli {
    /// Main configuration file
    #[arg(short, long, global = true, env = "LABELSYNC_CONFIG", default_value = "labelsync.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List violations in every enabled repository (read-only)
    Check {
        /// Only check this service
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Resolve every violation in every enabled repository
    Fix {
        /// Only fix this service
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Print the label rules, sorted by name
    Rules,

    /// Load the configuration and labels file without contacting any service
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    labelsync_core::init_tracing(cli.json, level);

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    let labels = config
        .load_labels()
        .await
        .context("Failed to load labels file")?;

    match cli.command {
        Commands::Check { service } => cmd_check(&config, &labels, service.as_deref(), cli.json).await,
        Commands::Fix { service } => cmd_fix(&config, &labels, service.as_deref(), cli.json).await,
        Commands::Rules => cmd_rules(&labels.labels, cli.json),
        Commands::Validate => cmd_validate(&cli.config, &config, &labels),
    }
}

fn select_services(config: &Config, labels: &LabelsFile, only: Option<&str>) -> Result<Vec<Service>> {
    let services = config
        .build_services(labels)
        .context("Failed to build service connectors")?;
    match only {
        None => Ok(services),
        Some(name) => {
            let selected: Vec<Service> = services.into_iter().filter(|s| s.name == name).collect();
            if selected.is_empty() {
                anyhow::bail!("Service '{}' is not configured", name);
            }
            Ok(selected)
        }
    }
}

async fn cmd_check(config: &Config, labels: &LabelsFile, only: Option<&str>, json: bool) -> Result<()> {
    let services = select_services(config, labels, only)?;
    let reconciler = Reconciler::new(config.reconcile.options());
    let report = reconciler
        .check(&services, Arc::new(labels.labels.clone()))
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_check(&report));
    }

    if !report.is_compliant() {
        anyhow::bail!(
            "{} violation(s); non-compliant repositories: {}",
            report.violation_count(),
            report
                .non_compliant()
                .values()
                .map(Vec::len)
                .sum::<usize>()
        );
    }
    Ok(())
}

async fn cmd_fix(config: &Config, labels: &LabelsFile, only: Option<&str>, json: bool) -> Result<()> {
    let services = select_services(config, labels, only)?;
    let reconciler = Reconciler::new(config.reconcile.options());
    let report = reconciler.fix(&services, Arc::new(labels.labels.clone())).await;
    info!(pass_id = %report.pass_id, "fix pass complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_fix(&report));
    }

    if !report.all_succeeded() {
        anyhow::bail!("Some fixes failed");
    }
    Ok(())
}

fn cmd_rules(rules: &RuleSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rules)?);
        return Ok(());
    }
    if rules.is_empty() {
        println!("No label rules configured.");
        return Ok(());
    }
    let width = rules.names().map(str::len).max().unwrap_or(0);
    for (name, rule) in rules.iter() {
        println!("{:<width$}  #{}  {}", name, rule.normalized_color(), rule.description);
    }
    Ok(())
}

fn cmd_validate(path: &Path, config: &Config, labels: &LabelsFile) -> Result<()> {
    println!("Configuration {:?} is valid", path);
    println!("Label rules: {}", labels.labels.len());
    for name in config.services.keys() {
        let (total, enabled) = labels
            .repos
            .get(name)
            .map(|repos| (repos.len(), repos.enabled().count()))
            .unwrap_or((0, 0));
        println!("Service {}: {} repositories ({} enabled)", name, total, enabled);
    }
    Ok(())
}

fn render_check(report: &CheckReport) -> String {
    let mut out = String::new();
    for (service, repos) in &report.services {
        for (repo, check) in repos {
            match check {
                RepoCheck::Checked { violations } if violations.is_empty() => {
                    out.push_str(&format!("{service} {repo}: compliant\n"));
                }
                RepoCheck::Checked { violations } => {
                    out.push_str(&format!(
                        "{service} {repo}: {} violation(s)\n",
                        violations.len()
                    ));
                    for violation in violations {
                        out.push_str(&format!("  - {violation}\n"));
                    }
                }
                RepoCheck::Failed { error } => {
                    out.push_str(&format!("{service} {repo}: FAILED ({error})\n"));
                }
            }
        }
    }
    out
}

fn render_fix(report: &FixReport) -> String {
    let mut out = String::new();
    for (service, repos) in &report.services {
        for (repo, fix) in repos {
            match fix {
                RepoFix::Attempted { outcomes } if outcomes.is_empty() => {
                    out.push_str(&format!("{service} {repo}: nothing to fix\n"));
                }
                RepoFix::Attempted { outcomes } => {
                    let ok = outcomes.iter().filter(|o| o.success).count();
                    out.push_str(&format!(
                        "{service} {repo}: {ok}/{} fixed\n",
                        outcomes.len()
                    ));
                    for outcome in outcomes.iter().filter(|o| !o.success) {
                        out.push_str(&format!(
                            "  ! {} '{}': {}\n",
                            outcome.kind,
                            outcome.label,
                            outcome.error.as_deref().unwrap_or("failed")
                        ));
                    }
                }
                RepoFix::Failed { error } => {
                    out.push_str(&format!("{service} {repo}: FAILED ({error})\n"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use labelsync_core::{Label, RepoSlug, ResolutionOutcome, Violation, ViolationKind};
    use std::collections::BTreeMap;

    fn slug(s: &str) -> RepoSlug {
        RepoSlug::parse(s).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_parses_globally() {
        let cli = Cli::try_parse_from(["labelsync", "check", "--config", "/tmp/x.toml", "-s", "github"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/x.toml"));
        assert!(matches!(cli.command, Commands::Check { service: Some(ref s) } if s == "github"));
    }

    #[test]
    fn test_render_check_lists_violations() {
        let mut repos = BTreeMap::new();
        repos.insert(
            slug("octo/widgets"),
            RepoCheck::Checked {
                violations: vec![Violation::extra(Label::new("wontfix", "ffffff", ""))],
            },
        );
        repos.insert(slug("octo/gadgets"), RepoCheck::Checked { violations: vec![] });
        let mut services = BTreeMap::new();
        services.insert("github".to_string(), repos);
        let report = CheckReport {
            pass_id: Default::default(),
            generated_at: Default::default(),
            services,
        };

        let text = render_check(&report);
        assert_eq!(
            text,
            "github octo/gadgets: compliant\n\
             github octo/widgets: 1 violation(s)\n  - extra 'wontfix'\n"
        );
    }

    #[test]
    fn test_render_fix_shows_failures() {
        let mut repos = BTreeMap::new();
        repos.insert(
            slug("octo/widgets"),
            RepoFix::Attempted {
                outcomes: vec![ResolutionOutcome {
                    kind: ViolationKind::Missing,
                    label: "bug".to_string(),
                    success: false,
                    error: Some("HTTP 403".to_string()),
                }],
            },
        );
        let mut services = BTreeMap::new();
        services.insert("gitlab".to_string(), repos);
        let report = FixReport {
            pass_id: Default::default(),
            generated_at: Default::default(),
            services,
        };
        let text = render_fix(&report);
        assert!(text.starts_with("gitlab octo/widgets: 0/1 fixed\n"));
        assert!(text.contains("! missing 'bug': HTTP 403"));
    }
}
