//! Output/rendering adapter: the single place that decides
//! between human TTY rendering (tables, trees, colored statuses, spinners)
//! and structured `json`/`yaml` output.
//!
//! Structured output is a first-class, schema-stable mode rather than a
//! debug afterthought, so every command emits through this one adapter
//! instead of ad hoc `println!`s. Tabular human rendering uses
//! `comfy-table` + `colored`.
use colored::{Color, Colorize};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use hctl_core::error::{ErrorKind, HctlError};
use hctl_core::status::{DiagnosticReport, PlatformStatus, StepStatus, VClusterStatus};
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::Mutex;

/// Process-wide output mode. `Structured`
/// is accepted as a CLI spelling but always resolves to `Json` internally —
/// the default structured mode used in watch loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "structured" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// The rendering adapter, guarded by a single writer lock.
#[derive(Clone)]
pub struct OutputAdapter {
    format: OutputFormat,
    quiet: bool,
    /// Whether ANSI color/decoration is allowed. Fails closed to plain text
    /// when stdout is not a TTY.
    tty: bool,
    lock: std::sync::Arc<Mutex<()>>,
}

impl OutputAdapter {
    pub fn new(format: OutputFormat, quiet: bool) -> OutputAdapter {
        OutputAdapter {
            format,
            quiet,
            tty: std::io::stdout().is_terminal(),
            lock: std::sync::Arc::new(Mutex::new(())),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_structured(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::Yaml)
    }

    /// Render any serializable value in the current structured format, or
    /// fall through to `human` when in text mode. One call site per command
    /// keeps section order fixed regardless of output mode.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) {
        let _guard = self.lock.lock().unwrap();
        match self.format {
            OutputFormat::Text => human(),
            OutputFormat::Json => match serde_json::to_string_pretty(value) {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("failed to render JSON: {}", e),
            },
            OutputFormat::Yaml => match serde_yaml::to_string(value) {
                Ok(s) => print!("{}", s),
                Err(e) => eprintln!("failed to render YAML: {}", e),
            },
        }
    }

    pub fn line(&self, msg: &str) {
        if self.quiet {
            return;
        }
        let _guard = self.lock.lock().unwrap();
        println!("{}", msg);
    }

    pub fn success(&self, msg: &str) {
        if self.quiet {
            return;
        }
        let _guard = self.lock.lock().unwrap();
        println!("{}", self.color(msg, Color::Green));
    }

    /// Single leading error line: the classified kind and a terse
    /// cause. `verbose` expands the full cause chain underneath.
    pub fn error(&self, err: &HctlError, verbose: bool) {
        let _guard = self.lock.lock().unwrap();
        let head = format!("{}: {}", err.kind().label(), err);
        eprintln!("{}", self.color(&head, Color::Red));
        if verbose {
            for (i, cause) in err.causes().iter().enumerate().skip(1) {
                eprintln!("  caused by [{}]: {}", i, cause);
            }
        }
        if !self.quiet {
            if let Some(hint) = crate::remediation::default_table().lookup(err.kind().label(), None) {
                eprintln!("hint: {}", hint);
            }
        }
    }

    fn color(&self, s: &str, c: Color) -> String {
        if self.tty {
            s.color(c).to_string()
        } else {
            s.to_string()
        }
    }

    /// Render a platform-wide status snapshot.
    pub fn render_platform_status(&self, status: &PlatformStatus) {
        self.emit(status, || {
            self.section_table("Nodes", &status.nodes);
            self.section_table("ArgoCD Applications", &status.argocd_apps);
            self.section_table("Kratix Promises", &status.kratix_promises);
            self.vcluster_table(&status.vclusters);
            self.section_table("Workloads", &status.workloads);
            self.section_table("Addons", &status.addons);
        });
    }

    fn section_table(&self, title: &str, rows: &[hctl_core::status::StatusSection]) {
        if self.quiet {
            return;
        }
        println!("\n{}", self.color(title, Color::Cyan).bold());
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["NAME", "STATUS", "DETAIL"]);
        for row in rows {
            let status_cell = if row.healthy {
                Cell::new("Healthy").fg(comfy_table::Color::Green)
            } else {
                Cell::new("Unhealthy").fg(comfy_table::Color::Red)
            };
            let detail = row.error.clone().or_else(|| row.detail.clone()).unwrap_or_default();
            table.add_row(vec![Cell::new(&row.name), status_cell, Cell::new(detail)]);
        }
        println!("{table}");
    }

    fn vcluster_table(&self, vclusters: &[VClusterStatus]) {
        if self.quiet {
            return;
        }
        println!("\n{}", self.color("vClusters", Color::Cyan).bold());
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["NAME", "PHASE", "ARGOCD", "WORKLOADS"]);
        for v in vclusters {
            let phase_cell = if v.needs_attention() {
                Cell::new(v.phase.to_string()).fg(comfy_table::Color::Yellow)
            } else {
                Cell::new(v.phase.to_string()).fg(comfy_table::Color::Green)
            };
            table.add_row(vec![
                Cell::new(&v.name),
                phase_cell,
                Cell::new(&v.health.argocd),
                Cell::new(&v.health.workloads),
            ]);
        }
        println!("{table}");
    }

    /// Render a diagnostic step tree. Structured modes emit the report verbatim.
    pub fn render_diagnostic(&self, report: &DiagnosticReport) {
        self.emit(report, || {
            println!("{}", self.color(&format!("Diagnosing {}", report.workload), Color::Cyan).bold());
            for (i, step) in report.steps.iter().enumerate() {
                let connector = if i + 1 == report.steps.len() { "\u{2514}\u{2500}" } else { "\u{251c}\u{2500}" };
                let label = step.step.to_string();
                let status = match step.status {
                    StepStatus::Ok => self.color("OK", Color::Green),
                    StepStatus::Warn => self.color("Warn", Color::Yellow),
                    StepStatus::Error => self.color("Error", Color::Red),
                    StepStatus::Unknown => self.color("Unknown", Color::BrightBlack),
                };
                println!("{} {} [{}] {}", connector, label, status, step.detail);
            }
            if let Some(root) = report.root_cause() {
                println!(
                    "\n{} {}: {}",
                    self.color("root cause:", Color::Yellow),
                    root.step,
                    root.detail
                );
            }
        });
    }

    /// Render a spinner-driven readiness watch tick. In structured/quiet modes this is a no-op — the final
    /// snapshot is what gets emitted.
    pub fn spinner(&self, message: &str) -> Option<indicatif::ProgressBar> {
        if self.quiet || self.is_structured() || !self.tty {
            return None;
        }
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    }
}

/// Map an `ErrorKind` to a process exit code, the single point
/// `main.rs` calls on the way out.
pub fn exit_code_for(kind: &ErrorKind) -> i32 {
    kind.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_structured_alias() {
        assert_eq!("structured".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    }

    #[test]
    fn format_rejects_unknown() {
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
