//! Command surface: the `clap`-derived argument tree and the
//! dispatch glue between parsed flags and the component modules.
//!
//! A top-level dispatch over subcommands calling into the vcluster, deploy,
//! and status/diagnose subsystems. Dynamic completion is implemented as
//! a hidden `complete-names` subcommand the generated shell completion
//! scripts can shell out to — the same pattern `kubectl`/`argocd` use their
//! `__complete` plumbing command for, adapted to `clap_complete`'s static
//! generator plus one dynamic hook rather than a custom completion engine.
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hctl_core::error::{ErrorKind, Result};

use crate::context::CommandContext;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hctl", version, about = "Operator control plane for a GitOps homelab platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output rendering mode.
    #[arg(long, global = true, default_value = "text")]
    pub output: String,

    /// Override the kube context for this invocation.
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Disable interactive prompts; wizards and Prompt-mode commits fail closed.
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Expand the full error cause chain on failure.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Re-poll and re-render until interrupted (status/vcluster status).
    #[arg(long, global = true)]
    pub watch: bool,

    /// Polling interval for `--watch`, e.g. `5s`, `2m` (default 5s).
    #[arg(long, global = true)]
    pub interval: Option<String>,

    /// Command deadline, e.g. `30s`, `2m`.
    #[arg(long, global = true)]
    pub deadline: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a fresh config document with platform-sensible defaults.
    Init,
    /// Print the hctl version.
    Version,
    /// Collect and render a full platform status snapshot.
    Status,
    /// Show or switch the resolved kube context.
    Context {
        /// Switch the configured default context instead of just printing it.
        set: Option<String>,
    },
    /// Walk the resource lifecycle chain for a named platform resource.
    Diagnose { name: String },
    /// Trigger controller re-reconciliation for a named request.
    Reconcile {
        name: String,
        /// Also `argocd app sync` every linked application.
        #[arg(long)]
        force_all_linked: bool,
    },
    /// vCluster lifecycle operations.
    Vcluster {
        #[command(subcommand)]
        action: VclusterAction,
    },
    /// Translate a workload spec and write it per the configured git mode.
    Deploy {
        path: PathBuf,
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long)]
        auto_commit: bool,
    },
    /// Scale a workload's deployment up to its configured replica count.
    Up {
        workload: Option<String>,
        #[arg(long, default_value_t = 1)]
        replicas: i32,
    },
    /// Scale a workload's deployment down to zero.
    Down { workload: Option<String> },
    /// Open a workload's primary route in the default browser.
    Open { workload: Option<String> },
    /// Stream a workload's pod logs.
    Logs {
        workload: Option<String>,
        #[arg(long)]
        follow: bool,
        #[arg(long)]
        tail: Option<i64>,
        #[arg(long)]
        container: Option<String>,
    },
    /// Emit a shell completion script.
    Completion { shell: clap_complete::Shell },
    /// Hidden dynamic-completion hook invoked by the generated scripts (spec
    /// §4.J "dynamic argument completion is mandatory"). Not part of the
    /// documented surface.
    #[command(hide = true)]
    CompleteNames {
        /// Which resource namespace of names to list: `workload` or `vcluster`.
        kind: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum VclusterAction {
    /// Build and commit a vCluster request.
    Create {
        name: Option<String>,
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        isolation: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        replicas: Option<u32>,
        #[arg(long)]
        static_vip: Option<String>,
        #[arg(long)]
        subnet_cidr: Option<String>,
        #[arg(long)]
        chart_repo_url: Option<String>,
        #[arg(long)]
        chart_name: Option<String>,
        #[arg(long)]
        chart_version: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long = "annotation")]
        annotations: Vec<String>,
        #[arg(long = "egress")]
        egress: Vec<String>,
        #[arg(long)]
        enable_nfs: bool,
        #[arg(long)]
        auto_commit: bool,
        /// Skip the readiness watch after writing the request.
        #[arg(long)]
        no_wait: bool,
    },
    /// Print a vCluster's status contract.
    Status { name: String },
    /// Trigger a targeted re-sync.
    Sync {
        name: String,
        #[arg(long)]
        force_all_linked: bool,
    },
    /// Retrieve and persist a vCluster's kubeconfig.
    Kubeconfig { name: String },
    /// Delete a vCluster request by removing its manifest.
    Delete {
        name: String,
        #[arg(long)]
        auto_commit: bool,
    },
}

/// Parse `--output`/`--interval`/`--deadline` and build the shared
/// `CommandContext` + output format the rest of dispatch uses.
pub fn resolve_output_format(cli: &Cli) -> Result<OutputFormat> {
    cli.output
        .parse::<OutputFormat>()
        .map_err(|e| ErrorKind::validation(e).into())
}

/// Parse a duration flag of the shape `<number><unit>` where unit is one of
/// `s`/`m`/`h`. Hand-rolled rather than
/// pulling in a duration-parsing crate since the grammar is this narrow.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| raw.split_at(i))
        .ok_or_else(|| ErrorKind::validation(format!("invalid duration '{}': missing unit", raw)))?;
    let value: u64 = digits
        .parse()
        .map_err(|_| ErrorKind::validation(format!("invalid duration '{}': not a number", raw)))?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => return Err(ErrorKind::validation(format!("invalid duration unit '{}' (expected s, m, or h)", other)).into()),
    };
    Ok(Duration::from_secs(secs))
}

/// The workload-resolution helper shared by `up`/`down`/`open`/`logs`: load
/// a named workload off the cluster's labeled deployments, or fall back to
/// `score.yaml` in the current directory when NAME is omitted.
pub const LOCAL_SCORE_FILE: &str = "score.yaml";

pub fn resolve_workload_name(explicit: Option<&str>) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    let local = PathBuf::from(LOCAL_SCORE_FILE);
    if local.exists() {
        let workload = hctl_core::score::Workload::from_file(&local)?;
        return Ok(workload.metadata.name);
    }
    Err(ErrorKind::validation(format!(
        "no workload name given and no {} found in the current directory",
        LOCAL_SCORE_FILE
    ))
    .into())
}

/// `hctl up`/`hctl down`'s documented fallback: when a workload name
/// resolves to more than one deployment sharing its app label (no single
/// canonical one found), operate on all of them and say so loudly rather
/// than silently picking one.
pub fn warn_if_multiple_deployments(output: &crate::output::OutputAdapter, workload: &str, count: usize) {
    if count > 1 {
        output.line(&format!(
            "workload '{}' matches {} deployments; applying to all of them",
            workload, count
        ));
    }
}

/// `hctl open`'s best-effort host/port scrape off the addons values file
/// this workload last translated to (a line-oriented heuristic, not a full
/// YAML parse, since the translator's own `httpRoute` shape is the only
/// thing `open` cares about).
pub fn scrape_route_url(values_yaml: &str) -> Option<String> {
    let mut in_http_route = false;
    let mut block_indent = 0usize;
    for line in values_yaml.lines() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !in_http_route {
            if trimmed == "httpRoute:" {
                in_http_route = true;
                block_indent = indent;
            }
            continue;
        }
        // A line back at or above the `httpRoute:` header's own indentation
        // closes the block.
        if indent <= block_indent {
            break;
        }
        let Some((key, value)) = trimmed.split_once(':') else { continue };
        if key.trim() == "host" {
            let host = value.trim().trim_matches('"').trim_matches('\'');
            return if host.is_empty() { None } else { Some(format!("https://{}", host)) };
        }
    }
    None
}

/// Shell out to the platform's default URL opener.
pub fn open_url(url: &str) -> Result<()> {
    let (cmd, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(target_os = "windows") {
        ("cmd", &["/C", "start"])
    } else {
        ("xdg-open", &[])
    };
    let status = std::process::Command::new(cmd)
        .args(args)
        .arg(url)
        .status()
        .map_err(|e| ErrorKind::internal(format!("failed to invoke '{}' to open {}: {}", cmd, url, e)))?;
    if !status.success() {
        return Err(ErrorKind::internal(format!("'{}' exited with {} opening {}", cmd, status, url)).into());
    }
    Ok(())
}

/// Generate a static completion script for `shell`. The dynamic
/// half (resource-name completion) is wired up separately by each shell's
/// completion function invoking `hctl complete-names <kind>`.
pub fn generate_completion(shell: clap_complete::Shell, out: &mut dyn std::io::Write) {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

/// Serve the hidden `complete-names` hook: best-effort, never fails the shell's completion prompt —
/// an unreachable cluster just yields no suggestions.
pub async fn complete_names(ctx: &CommandContext, client: &crate::cluster::ClusterClient, kind: &str) {
    let names: Vec<String> = match kind {
        "vcluster" => client
            .list_custom_resources(
                "platform.hctl.io",
                "v1alpha1",
                "VClusterOrchestrator",
                &ctx.config.platform.requests_namespace,
            )
            .await
            .map(|items| items.into_iter().filter_map(|o| o.metadata.name).collect())
            .unwrap_or_default(),
        "workload" => client
            .list_deployments(&ctx.config.platform.platform_namespace)
            .await
            .map(|items| items.into_iter().map(|d| d.name).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    for name in names {
        let _ = writeln!(lock, "{}", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_seconds_minutes_hours() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_duration_rejects_bad_unit() {
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn parse_duration_rejects_missing_unit() {
        assert!(parse_duration("5").is_err());
    }

    #[test]
    fn resolve_workload_name_uses_explicit_over_local_file() {
        let name = resolve_workload_name(Some("explicit-name")).unwrap();
        assert_eq!(name, "explicit-name");
    }

    #[test]
    fn scrape_route_url_extracts_host() {
        let yaml = "httpRoute:\n  host: dev-1.platform.local\n  path: /\n";
        assert_eq!(scrape_route_url(yaml), Some("https://dev-1.platform.local".to_string()));
    }

    #[test]
    fn scrape_route_url_absent_is_none() {
        let yaml = "applicationName: hello\n";
        assert_eq!(scrape_route_url(yaml), None);
    }

    #[test]
    fn scrape_route_url_ignores_host_outside_the_http_route_block() {
        // A `host:` key at or above httpRoute's own indentation belongs to
        // a different section and must not be picked up.
        let yaml = "deployment:\n  host: wrong.example.com\nhttpRoute:\n  path: /\n";
        assert_eq!(scrape_route_url(yaml), None);
    }

    #[test]
    fn scrape_route_url_stops_at_next_top_level_key() {
        let yaml = "httpRoute:\n  path: /\ncertificate:\n  host: not-this-one\n";
        assert_eq!(scrape_route_url(yaml), None);
    }

    #[test]
    fn cli_parses_minimal_status_invocation() {
        let cli = Cli::try_parse_from(["hctl", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn cli_parses_vcluster_create_with_flags() {
        let cli = Cli::try_parse_from(["hctl", "vcluster", "create", "dev-1", "--preset", "dev"]).unwrap();
        match cli.command {
            Commands::Vcluster { action: VclusterAction::Create { name, preset, .. } } => {
                assert_eq!(name.as_deref(), Some("dev-1"));
                assert_eq!(preset.as_deref(), Some("dev"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
