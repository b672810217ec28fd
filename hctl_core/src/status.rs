//! The status contract: the shape every status-
//! reporting operation (`hctl status`, `hctl vcluster status`) converges on
//! before handing off to the output layer.
use serde_json::Value;
use std::collections::BTreeMap;

/// Coarse lifecycle phase reported for a vCluster.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    Scheduled,
    Progressing,
    Ready,
    Degraded,
    Failed,
    Deleting,
    Unknown,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Unknown
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Phase::Scheduled => "Scheduled",
            Phase::Progressing => "Progressing",
            Phase::Ready => "Ready",
            Phase::Degraded => "Degraded",
            Phase::Failed => "Failed",
            Phase::Deleting => "Deleting",
            Phase::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// A single named condition entry, modeled after
/// the `status.conditions` shape shared by ArgoCD applications, Kratix
/// `Work`/`WorkPlacement`, and the vCluster request CRD itself.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "lastTransitionTime", default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// A reachable endpoint exposed by a vCluster.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

/// Credential material a caller can retrieve, never the material itself.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CredentialRef {
    pub name: String,
    #[serde(rename = "secretRef")]
    pub secret_ref: String,
}

/// Health rollup across the three sub-systems the platform composes (spec
/// §3 `health`).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Health {
    pub argocd: String,
    pub workloads: String,
    #[serde(rename = "subApps")]
    pub sub_apps: String,
}

/// Status of a single vCluster, returned by `hctl vcluster status` and
/// embedded per-cluster in the platform-wide status.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VClusterStatus {
    pub name: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "lastReconciled", default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub credentials: Vec<CredentialRef>,
    pub health: Health,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VClusterStatus {
    /// Whether this status should be rendered in a visually "attention
    /// needed" style.
    pub fn needs_attention(&self) -> bool {
        !matches!(self.phase, Phase::Ready)
            || self.health.argocd != "Healthy"
            || self.health.workloads != "Healthy"
    }
}

/// One node in the platform-wide status tree: either a cluster
/// node, an ArgoCD application, a Kratix promise, or a workload — whatever
/// the collector found, since each section is allowed to fail
/// independently.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusSection {
    pub name: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full platform status document produced by `hctl status`:
/// one independently-collected section per subsystem, plus the raw per-
/// vCluster statuses.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PlatformStatus {
    pub nodes: Vec<StatusSection>,
    #[serde(rename = "argocdApps")]
    pub argocd_apps: Vec<StatusSection>,
    #[serde(rename = "kratixPromises")]
    pub kratix_promises: Vec<StatusSection>,
    pub vclusters: Vec<VClusterStatus>,
    pub workloads: Vec<StatusSection>,
    pub addons: Vec<StatusSection>,
}

impl PlatformStatus {
    /// Whether every section reported healthy. Used as the exit-code signal
    /// for `hctl status`.
    pub fn all_healthy(&self) -> bool {
        self.nodes.iter().all(|s| s.healthy)
            && self.argocd_apps.iter().all(|s| s.healthy)
            && self.kratix_promises.iter().all(|s| s.healthy)
            && self.workloads.iter().all(|s| s.healthy)
            && self.addons.iter().all(|s| s.healthy)
            && self.vclusters.iter().all(|v| matches!(v.phase, Phase::Ready))
    }
}

/// One step of the diagnostic walk: the six-stage chain from
/// `CustomResource` down to `Workloads`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "PascalCase")]
pub enum DiagnosticStep {
    CustomResource,
    PipelinePod,
    Work,
    WorkPlacement,
    ArgocdApplication,
    Workloads,
}

impl std::fmt::Display for DiagnosticStep {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            DiagnosticStep::CustomResource => "CustomResource",
            DiagnosticStep::PipelinePod => "PipelinePod",
            DiagnosticStep::Work => "Work",
            DiagnosticStep::WorkPlacement => "WorkPlacement",
            DiagnosticStep::ArgocdApplication => "ArgocdApplication",
            DiagnosticStep::Workloads => "Workloads",
        };
        write!(f, "{}", s)
    }
}

impl DiagnosticStep {
    /// The canonical chain order, first to last.
    pub const CHAIN: [DiagnosticStep; 6] = [
        DiagnosticStep::CustomResource,
        DiagnosticStep::PipelinePod,
        DiagnosticStep::Work,
        DiagnosticStep::WorkPlacement,
        DiagnosticStep::ArgocdApplication,
        DiagnosticStep::Workloads,
    ];
}

/// A diagnostic step's outcome (spec §4.G: `status ∈ {OK, Warn, Error,
/// Unknown}`). `Warn` is distinct from `Error` — a step that is not fully
/// healthy but not a failure either (e.g. WorkPlacement's "no files changed"
/// no-op) — and is not treated as a root cause.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum StepStatus {
    Ok,
    Warn,
    Error,
    Unknown,
}

impl StepStatus {
    /// Whether this step blocks the chain from being considered healthy —
    /// true only for `Error`. `Warn` and `Unknown` are surfaced but don't
    /// count as root causes.
    pub fn is_error(&self) -> bool {
        matches!(self, StepStatus::Error)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            StepStatus::Ok => "OK",
            StepStatus::Warn => "Warn",
            StepStatus::Error => "Error",
            StepStatus::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// The outcome recorded for one diagnostic step.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StepResult {
    pub step: DiagnosticStep,
    pub status: StepStatus,
    pub detail: String,
    /// The `ErrorKind::label()` this step's failure maps to, when `status`
    /// is `Error` (spec §6: "`hctl diagnose` … exits non-zero on the
    /// earliest terminal step's category"). `None` for non-`Error` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_label: Option<String>,
    /// Raw objects inspected for this step, kept for `--verbose`/`--output
    /// json` but omitted from the default text rendering.
    #[serde(default)]
    pub evidence: Vec<Value>,
}

/// The full diagnostic report: every step walked, in order,
/// plus a root-cause hint.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DiagnosticReport {
    pub workload: String,
    pub steps: Vec<StepResult>,
}

impl DiagnosticReport {
    /// The earliest terminal step — the walker's root-cause hint (spec
    /// §4.G: "the first terminal (non-healthy) step in the chain is the
    /// reported root cause; later steps are context, not culprits"). `Warn`
    /// and `Unknown` are not terminal; only `Error` is.
    pub fn root_cause(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status.is_error())
    }

    pub fn all_healthy(&self) -> bool {
        self.steps.iter().all(|s| !s.status.is_error())
    }
}

/// Per-kind/per-component remediation hints, keyed by
/// `ErrorKind::label()` and optionally refined by a component name.
#[derive(Clone, Debug, Default)]
pub struct RemediationTable {
    by_label: BTreeMap<String, String>,
    by_label_and_component: BTreeMap<(String, String), String>,
}

impl RemediationTable {
    pub fn insert(&mut self, label: &str, hint: &str) {
        self.by_label.insert(label.to_string(), hint.to_string());
    }

    pub fn insert_for_component(&mut self, label: &str, component: &str, hint: &str) {
        self.by_label_and_component
            .insert((label.to_string(), component.to_string()), hint.to_string());
    }

    /// Look up a hint, preferring a component-specific entry over the
    /// generic one for the same error label.
    pub fn lookup(&self, label: &str, component: Option<&str>) -> Option<&str> {
        if let Some(c) = component {
            if let Some(hint) = self.by_label_and_component.get(&(label.to_string(), c.to_string())) {
                return Some(hint.as_str());
            }
        }
        self.by_label.get(label).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_attention_when_not_ready() {
        let s = VClusterStatus {
            name: "dev-1".into(),
            phase: Phase::Progressing,
            message: None,
            last_reconciled: None,
            endpoints: vec![],
            credentials: vec![],
            health: Health::default(),
            conditions: vec![],
        };
        assert!(s.needs_attention());
    }

    #[test]
    fn ready_with_healthy_subsystems_does_not_need_attention() {
        let s = VClusterStatus {
            name: "dev-1".into(),
            phase: Phase::Ready,
            message: None,
            last_reconciled: None,
            endpoints: vec![],
            credentials: vec![],
            health: Health { argocd: "Healthy".into(), workloads: "Healthy".into(), sub_apps: "Healthy".into() },
            conditions: vec![],
        };
        assert!(!s.needs_attention());
    }

    #[test]
    fn platform_status_all_healthy_requires_every_section() {
        let mut status = PlatformStatus::default();
        status.nodes.push(StatusSection { name: "node-1".into(), healthy: true, detail: None, error: None });
        assert!(status.all_healthy());
        status.nodes.push(StatusSection { name: "node-2".into(), healthy: false, detail: None, error: Some("unreachable".into()) });
        assert!(!status.all_healthy());
    }

    #[test]
    fn root_cause_is_earliest_error_step() {
        let report = DiagnosticReport {
            workload: "hello".into(),
            steps: vec![
                StepResult { step: DiagnosticStep::CustomResource, status: StepStatus::Ok, detail: "found".into(), error_label: None, evidence: vec![] },
                StepResult { step: DiagnosticStep::PipelinePod, status: StepStatus::Error, detail: "pod CrashLoopBackOff".into(), error_label: Some("InternalError".into()), evidence: vec![] },
                StepResult { step: DiagnosticStep::Work, status: StepStatus::Error, detail: "never created".into(), error_label: Some("NotFoundError".into()), evidence: vec![] },
            ],
        };
        let root = report.root_cause().unwrap();
        assert_eq!(root.step, DiagnosticStep::PipelinePod);
        assert!(!report.all_healthy());
    }

    #[test]
    fn warn_step_is_not_a_root_cause() {
        let report = DiagnosticReport {
            workload: "hello".into(),
            steps: vec![
                StepResult { step: DiagnosticStep::CustomResource, status: StepStatus::Ok, detail: "found".into(), error_label: None, evidence: vec![] },
                StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Warn, detail: "no files changed".into(), error_label: None, evidence: vec![] },
            ],
        };
        assert!(report.root_cause().is_none());
        assert!(report.all_healthy());
    }

    #[test]
    fn remediation_prefers_component_specific_hint() {
        let mut table = RemediationTable::default();
        table.insert("NetworkError", "check connectivity");
        table.insert_for_component("NetworkError", "argocd", "check argocd-server service");
        assert_eq!(table.lookup("NetworkError", Some("argocd")), Some("check argocd-server service"));
        assert_eq!(table.lookup("NetworkError", Some("kubeapi")), Some("check connectivity"));
        assert_eq!(table.lookup("NetworkError", None), Some("check connectivity"));
    }
}
