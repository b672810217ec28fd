//! vCluster request builder's interactive half and the
//! vCluster lifecycle driver: commit the rendered request,
//! watch it to readiness, retrieve its kubeconfig, and trigger a targeted
//! re-sync.
//!
//! The wizard and the flag parser (`cli.rs`) both converge on
//! `hctl_core::request::RequestInput` and hand it to the same
//! `hctl_core::request::build_request` validator — this module owns only the
//! `dialoguer` prompts, none of the validation.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use dialoguer::{Confirm, Input, Select};
use hctl_core::config::{Config, GitMode};
use hctl_core::dynamic::{lookup_condition_status, lookup_slice, lookup_string};
use hctl_core::error::{ErrorKind, Result};
use hctl_core::request::{
    parse_egress_tuple, parse_kv_pair, EgressAllowance, Isolation, Preset, RequestInput, WorkloadRepository,
};
use hctl_core::status::{Condition, CredentialRef, Endpoint, Health, Phase, VClusterStatus};
use kube::api::DynamicObject;
use serde_json::Value;

use crate::cluster::ClusterClient;
use crate::context::CommandContext;
use crate::git::GitWorkspace;
use crate::output::OutputAdapter;

/// The annotation key the platform controller watches for a manual
/// reconciliation request. The value is a rotating timestamp so
/// repeated invocations are idempotent-but-distinguishable.
pub const MANUAL_RECONCILE_ANNOTATION: &str = "platform.hctl.io/manual-reconciliation";

/// Kind name for the platform's vCluster request custom resource.
pub const VCLUSTER_RESOURCE_KIND: &str = "VClusterOrchestrator";

/// Walk a line-editor wizard to gather a `RequestInput`. Produces exactly the same shape the flag parser
/// does; both are validated by `hctl_core::request::build_request`.
pub fn interactive_wizard(domain: &str) -> Result<RequestInput> {
    let dlg_err = |e: dialoguer::Error| ErrorKind::internal(format!("interactive prompt failed: {}", e));

    let name: String = Input::new()
        .with_prompt("vcluster name")
        .interact_text()
        .map_err(dlg_err)?;

    let preset_idx = Select::new()
        .with_prompt("preset")
        .items(&["dev", "prod"])
        .default(0)
        .interact()
        .map_err(dlg_err)?;
    let preset = if preset_idx == 0 { Preset::Dev } else { Preset::Prod };

    let isolation_idx = Select::new()
        .with_prompt("isolation")
        .items(&["standard", "strict"])
        .default(0)
        .interact()
        .map_err(dlg_err)?;
    let isolation = if isolation_idx == 0 { Isolation::Standard } else { Isolation::Strict };

    let hostname: String = Input::new()
        .with_prompt("exposure hostname")
        .default(format!("{}.{}", name, domain))
        .interact_text()
        .map_err(dlg_err)?;

    let chart_repo_url: String = Input::new()
        .with_prompt("ArgoCD chart repo URL")
        .default(hctl_core::request::DEFAULT_CHART_REPO_URL.to_string())
        .interact_text()
        .map_err(dlg_err)?;
    let chart_name: String = Input::new()
        .with_prompt("ArgoCD chart name")
        .default("vcluster".to_string())
        .interact_text()
        .map_err(dlg_err)?;
    let chart_version: String = Input::new()
        .with_prompt("ArgoCD chart version")
        .default(hctl_core::request::DEFAULT_CHART_VERSION.to_string())
        .interact_text()
        .map_err(dlg_err)?;

    let enable_nfs = Confirm::new()
        .with_prompt("allow well-known NFS server egress?")
        .default(false)
        .interact()
        .map_err(dlg_err)?;

    Ok(RequestInput {
        name,
        preset: Some(preset),
        isolation: Some(isolation),
        hostname: Some(hostname),
        chart_repo_url,
        chart_name,
        chart_version,
        enable_nfs,
        ..Default::default()
    })
}

/// Parse the repeatable `--label`/`--annotation` and `--egress` flags
/// into the maps/vec
/// `RequestInput` expects.
pub fn parse_labels_and_annotations(
    labels: &[String],
    annotations: &[String],
) -> Result<(BTreeMap<String, String>, BTreeMap<String, String>)> {
    let mut label_map = BTreeMap::new();
    for raw in labels {
        let (k, v) = parse_kv_pair(raw)?;
        label_map.insert(k, v);
    }
    let mut annotation_map = BTreeMap::new();
    for raw in annotations {
        let (k, v) = parse_kv_pair(raw)?;
        annotation_map.insert(k, v);
    }
    Ok((label_map, annotation_map))
}

pub fn parse_egress_allowances(raw: &[String]) -> Result<Vec<EgressAllowance>> {
    raw.iter().map(|s| parse_egress_tuple(s)).collect()
}

/// Optional `workloadRepository` block, built only when a URL is given.
pub fn workload_repository(
    url: Option<String>,
    base_path: Option<String>,
    manifest_path: Option<String>,
    revision: Option<String>,
) -> Option<WorkloadRepository> {
    url.map(|url| WorkloadRepository {
        url,
        base_path: base_path.unwrap_or_else(|| ".".to_string()),
        manifest_path: manifest_path.unwrap_or_else(|| "manifests".to_string()),
        revision: revision.unwrap_or_else(|| "main".to_string()),
    })
}

/// Coordinates H (request building) -> commit -> readiness watch -> day-two
/// operations, for one resolved cluster/git/config triple.
pub struct VClusterLifecycle<'a> {
    pub client: &'a ClusterClient,
    pub git: &'a GitWorkspace,
    pub config: &'a Config,
    pub output: &'a OutputAdapter,
}

impl<'a> VClusterLifecycle<'a> {
    /// Render `request` to YAML and write it at `platform/vclusters/<name>
    /// .yaml`, honoring `--auto-commit` as an override of the
    /// configured `GitMode`.
    pub fn render_and_write(
        &self,
        request: &hctl_core::request::VClusterRequest,
        auto_commit: bool,
    ) -> Result<PathBuf> {
        let rel = PathBuf::from(format!("platform/vclusters/{}.yaml", request.spec.name));
        let mut files = BTreeMap::new();
        files.insert(rel.clone(), request.to_yaml()?.into_bytes());
        let mode = if auto_commit { GitMode::Auto } else { self.config.git_mode };
        self.git.idempotent_write(&files, "Add vcluster request", &request.spec.name, mode, self.output)?;
        Ok(self.git.root().join(&rel))
    }

    /// Remove the manifest for `name`, the only supported deletion path.
    pub fn delete(&self, name: &str, auto_commit: bool) -> Result<PathBuf> {
        let rel = PathBuf::from(format!("platform/vclusters/{}.yaml", name));
        let abs = self.git.root().join(&rel);
        if !abs.exists() {
            return Err(ErrorKind::not_found(format!("no vcluster request manifest at {}", rel.display())).into());
        }
        let mode = if auto_commit { GitMode::Auto } else { self.config.git_mode };
        self.git.remove_and_commit(&rel, "Delete vcluster request", name, mode, self.output)?;
        Ok(abs)
    }

    /// Fetch the current status contract off the cluster.
    pub async fn fetch_status(&self, name: &str) -> Result<VClusterStatus> {
        let obj = self
            .client
            .get_custom_resource(
                "platform.hctl.io",
                "v1alpha1",
                VCLUSTER_RESOURCE_KIND,
                &self.config.platform.requests_namespace,
                name,
            )
            .await?;
        Ok(parse_status(name, &obj))
    }

    /// Poll every 3-10s with jitter/backoff until `Ready`, `Failed`, the
    /// context's deadline, or cancellation.
    pub async fn watch_readiness(&self, name: &str, ctx: &CommandContext, spinner_msg: &str) -> Result<VClusterStatus> {
        let spinner = self.output.spinner(spinner_msg);
        let mut consecutive_network_errors = 0u32;
        let result = loop {
            if ctx.is_cancelled() {
                break Err(ErrorKind::internal("readiness watch cancelled").into());
            }
            if ctx.deadline_exceeded() {
                break Err(ErrorKind::timeout(format!("vcluster {} did not become ready before the deadline", name)).into());
            }

            match self.fetch_status(name).await {
                Ok(status) => {
                    consecutive_network_errors = 0;
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{}: {}", spinner_msg, status.phase));
                    }
                    match status.phase {
                        Phase::Ready => break Ok(status),
                        Phase::Failed => {
                            break Err(ErrorKind::internal(format!(
                                "vcluster {} reconciliation failed: {}",
                                name,
                                status.message.clone().unwrap_or_else(|| "no message".to_string())
                            ))
                            .into())
                        }
                        _ => {}
                    }
                }
                Err(e) if e.kind().is_retryable() => {
                    consecutive_network_errors += 1;
                    if consecutive_network_errors > 3 {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e),
            }

            let backoff = Duration::from_secs(3 + (consecutive_network_errors as u64).min(7));
            let jitter = Duration::from_millis(rand::random::<u64>() % 1500);
            tokio::select! {
                _ = tokio::time::sleep(backoff + jitter) => {}
                _ = ctx.cancellation().cancelled() => {
                    break Err(ErrorKind::internal("readiness watch cancelled").into());
                }
            }
        };
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        result
    }

    /// Retrieve and persist the kubeconfig named in `status.credentials
    /// .kubeconfigSecret`. Never prints
    /// secret material; returns only the path it was written to, mode 0600.
    pub async fn fetch_kubeconfig(&self, name: &str, config_home: &Path) -> Result<PathBuf> {
        let status = self.fetch_status(name).await?;
        let secret_name = status
            .credentials
            .iter()
            .find(|c| c.name == "kubeconfigSecret")
            .map(|c| c.secret_ref.clone())
            .ok_or_else(|| {
                ErrorKind::not_found(format!(
                    "vcluster {} has no kubeconfigSecret in its status yet",
                    name
                ))
            })?;

        let data = self
            .client
            .get_secret_data(&self.config.platform.requests_namespace, &secret_name)
            .await?;
        let bytes = data
            .get("kubeconfig")
            .or_else(|| data.get("value"))
            .ok_or_else(|| ErrorKind::not_found(format!("secret {} has no kubeconfig/value key", secret_name)))?;

        let dest = config_home.join("hctl").join(format!("{}.yaml", name));
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ErrorKind::internal(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(&dest, bytes)
            .map_err(|e| ErrorKind::internal(format!("failed to write kubeconfig to {}: {}", dest.display(), e)))?;
        set_owner_only_permissions(&dest)?;
        Ok(dest)
    }

    /// Set the manual-reconciliation annotation, optionally also invoking `argocd app sync` via subprocess on
    /// every linked application (the "force all linked apps" mode).
    pub async fn resync(&self, name: &str, force_all_linked: bool) -> Result<()> {
        let value = Utc::now().to_rfc3339();
        self.client
            .annotate_resource(
                "platform.hctl.io",
                "v1alpha1",
                VCLUSTER_RESOURCE_KIND,
                &self.config.platform.requests_namespace,
                name,
                MANUAL_RECONCILE_ANNOTATION,
                &value,
            )
            .await?;

        if force_all_linked {
            let status = self.fetch_status(name).await?;
            for app in linked_argocd_apps(name, &status) {
                sync_via_argocd_cli(&app).await?;
            }
        }
        Ok(())
    }
}

/// Applications this vcluster's lifecycle is known to touch — itself plus
/// any endpoint named `argocd`. Best-effort:
/// an empty result just means "force-all degrades to the annotation alone".
fn linked_argocd_apps(name: &str, _status: &VClusterStatus) -> Vec<String> {
    vec![name.to_string()]
}

/// Invoke the external `argocd` binary.
async fn sync_via_argocd_cli(app_name: &str) -> Result<()> {
    let status = tokio::process::Command::new("argocd")
        .args(["app", "sync", app_name])
        .status()
        .await
        .map_err(|e| ErrorKind::network(format!("failed to invoke argocd CLI: {}", e)))?;
    if !status.success() {
        return Err(ErrorKind::network(format!("argocd app sync {} exited with {}", app_name, status)).into());
    }
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| ErrorKind::internal(format!("failed to set permissions on {}: {}", path.display(), e)).into())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Build the typed status contract out of the dynamic custom resource (spec
/// §3 "Status contract"), treating every field as possibly absent (design
/// notes §9: "absent fields as Unknown, not errors" — older controllers may
/// not populate the full shape yet).
fn parse_status(name: &str, obj: &DynamicObject) -> VClusterStatus {
    let raw: Value = serde_json::to_value(obj).unwrap_or(Value::Null);

    let (phase_str, _) = lookup_string(&raw, &["status", "phase"]);
    let (message, has_message) = lookup_string(&raw, &["status", "message"]);
    let (last_reconciled, has_last_reconciled) = lookup_string(&raw, &["status", "lastReconciled"]);

    let endpoints = raw
        .get("status")
        .and_then(|s| s.get("endpoints"))
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|u| Endpoint { name: k.clone(), url: u.to_string() }))
                .collect()
        })
        .unwrap_or_default();

    let mut credentials = Vec::new();
    if let (kubeconfig_secret, true) = lookup_string(&raw, &["status", "credentials", "kubeconfigSecret"]) {
        credentials.push(CredentialRef { name: "kubeconfigSecret".to_string(), secret_ref: kubeconfig_secret });
    }
    if let (item, true) = lookup_string(&raw, &["status", "credentials", "onePasswordItem"]) {
        credentials.push(CredentialRef { name: "onePasswordItem".to_string(), secret_ref: item });
    }

    let (argocd_sync, _) = lookup_string(&raw, &["status", "health", "argocd", "syncStatus"]);
    let (argocd_health, _) = lookup_string(&raw, &["status", "health", "argocd", "healthStatus"]);
    let (ready, ready_present) = lookup_string(&raw, &["status", "health", "workloads", "ready"]);
    let (total, total_present) = lookup_string(&raw, &["status", "health", "workloads", "total"]);
    let (healthy, healthy_present) = lookup_string(&raw, &["status", "health", "subApps", "healthy"]);
    let (sub_total, sub_total_present) = lookup_string(&raw, &["status", "health", "subApps", "total"]);

    let health = Health {
        argocd: blank_to_unknown(&argocd_health, &argocd_sync),
        workloads: if ready_present && total_present { format!("{}/{}", ready, total) } else { "Unknown".to_string() },
        sub_apps: if healthy_present && sub_total_present { format!("{}/{}", healthy, sub_total) } else { "Unknown".to_string() },
    };

    let (conditions, _) = lookup_slice(&raw, &["status", "conditions"]);
    let conditions = conditions
        .iter()
        .filter_map(|c| {
            let (kind, has_kind) = lookup_string(c, &["type"]);
            let (status, has_status) = lookup_string(c, &["status"]);
            if !has_kind || !has_status {
                return None;
            }
            let (reason, has_reason) = lookup_string(c, &["reason"]);
            let (message, has_message) = lookup_string(c, &["message"]);
            let (last_transition, has_last_transition) = lookup_string(c, &["lastTransitionTime"]);
            Some(Condition {
                kind,
                status,
                reason: has_reason.then_some(reason),
                message: has_message.then_some(message),
                last_transition_time: has_last_transition.then_some(last_transition),
            })
        })
        .collect();

    VClusterStatus {
        name: name.to_string(),
        phase: parse_phase(&phase_str),
        message: has_message.then_some(message),
        last_reconciled: has_last_reconciled.then_some(last_reconciled),
        endpoints,
        credentials,
        health,
        conditions,
    }
}

fn blank_to_unknown(primary: &str, fallback: &str) -> String {
    if !primary.is_empty() {
        primary.to_string()
    } else if !fallback.is_empty() {
        fallback.to_string()
    } else {
        "Unknown".to_string()
    }
}

fn parse_phase(s: &str) -> Phase {
    match s {
        "Scheduled" => Phase::Scheduled,
        "Progressing" => Phase::Progressing,
        "Ready" => Phase::Ready,
        "Degraded" => Phase::Degraded,
        "Failed" => Phase::Failed,
        "Deleting" => Phase::Deleting,
        _ => Phase::Unknown,
    }
}

/// Look for `lookup_condition_status`'s re-export so callers that only need
/// a single condition (e.g. a future `hctl vcluster status --condition`
/// flag) don't need to reach into `hctl_core::dynamic` directly.
pub fn condition_status(obj: &DynamicObject, condition_type: &str) -> (String, bool) {
    let raw: Value = serde_json::to_value(obj).unwrap_or(Value::Null);
    lookup_condition_status(&raw, condition_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_status_defaults_absent_fields_to_unknown() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "platform.hctl.io/v1alpha1",
            "kind": "VClusterOrchestrator",
            "metadata": {"name": "dev-1"},
        }))
        .unwrap();
        let status = parse_status("dev-1", &obj);
        assert_eq!(status.phase, Phase::Unknown);
        assert_eq!(status.health.argocd, "Unknown");
        assert_eq!(status.health.workloads, "Unknown");
        assert!(status.credentials.is_empty());
    }

    #[test]
    fn parse_status_reads_ready_phase_and_credentials() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "platform.hctl.io/v1alpha1",
            "kind": "VClusterOrchestrator",
            "metadata": {"name": "dev-1"},
            "status": {
                "phase": "Ready",
                "credentials": {"kubeconfigSecret": "dev-1-kubeconfig"},
                "health": {"argocd": {"syncStatus": "Synced", "healthStatus": "Healthy"}},
            },
        }))
        .unwrap();
        let status = parse_status("dev-1", &obj);
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.credentials[0].secret_ref, "dev-1-kubeconfig");
        assert_eq!(status.health.argocd, "Healthy");
    }

    #[test]
    fn parse_labels_and_annotations_splits_kv_pairs() {
        let (labels, annotations) = parse_labels_and_annotations(&["team=platform".to_string()], &[]).unwrap();
        assert_eq!(labels.get("team"), Some(&"platform".to_string()));
        assert!(annotations.is_empty());
    }

    #[test]
    fn parse_egress_allowances_rejects_bad_tuple() {
        assert!(parse_egress_allowances(&["bad".to_string()]).is_err());
    }
}
