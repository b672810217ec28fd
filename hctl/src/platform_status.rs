//! Platform status collector: fans out across the platform's
//! subsystems and assembles one `PlatformStatus` snapshot. Each section
//! collects independently — a failure in one never blocks the others —
//! and all sections are gathered concurrently via `tokio::join!` rather
//! than sequentially.
use hctl_core::dynamic::{lookup_condition_status, lookup_string};
use hctl_core::status::{Health, Phase, PlatformStatus, StatusSection, VClusterStatus};
use serde_json::Value;

use crate::cluster::ClusterClient;
use crate::vcluster::VCLUSTER_RESOURCE_KIND;

/// Labels applied by the platform's ArgoCD AppSet generators to workload
/// and addon applications.
const WORKLOAD_APP_LABEL: &str = "platform.hctl.io/kind=workload";
const ADDON_APP_LABEL: &str = "platform.hctl.io/kind=addon";

/// Collect a full platform status snapshot.
pub async fn collect(client: &ClusterClient, platform_namespace: &str, requests_namespace: &str) -> PlatformStatus {
    let (nodes, argocd_apps, kratix_promises, vclusters, workloads, addons) = tokio::join!(
        collect_nodes(client),
        collect_argocd_apps(client, platform_namespace),
        collect_kratix_promises(client),
        collect_vclusters(client, requests_namespace),
        collect_labeled_apps(client, platform_namespace, WORKLOAD_APP_LABEL),
        collect_labeled_apps(client, platform_namespace, ADDON_APP_LABEL),
    );

    PlatformStatus { nodes, argocd_apps, kratix_promises, vclusters, workloads, addons }
}

async fn collect_nodes(client: &ClusterClient) -> Vec<StatusSection> {
    match client.list_nodes().await {
        Ok(nodes) => nodes
            .into_iter()
            .map(|n| StatusSection {
                name: n.name,
                healthy: n.ready,
                detail: Some(format!("cpu={} mem={}", n.cpu_capacity.unwrap_or_default(), n.memory_capacity.unwrap_or_default())),
                error: None,
            })
            .collect(),
        Err(e) => vec![StatusSection { name: "nodes".into(), healthy: false, detail: None, error: Some(e.to_string()) }],
    }
}

/// ArgoCD applications in `namespace`, optionally filtered to those
/// carrying `label_selector`.
async fn collect_argocd_apps(client: &ClusterClient, namespace: &str) -> Vec<StatusSection> {
    match client.list_custom_resources("argoproj.io", "v1alpha1", "Application", namespace).await {
        Ok(apps) => apps.iter().map(argocd_app_section).collect(),
        Err(e) => vec![StatusSection { name: "argocd".into(), healthy: false, detail: None, error: Some(e.to_string()) }],
    }
}

fn argocd_app_section(app: &kube::api::DynamicObject) -> StatusSection {
    let name = app.metadata.name.clone().unwrap_or_default();
    let raw: Value = serde_json::to_value(app).unwrap_or(Value::Null);
    let (sync, _) = lookup_string(&raw, &["status", "sync", "status"]);
    let (health, _) = lookup_string(&raw, &["status", "health", "status"]);
    let healthy = sync == "Synced" && health == "Healthy";
    StatusSection {
        name,
        healthy,
        detail: Some(format!("sync={} health={}", blank_to_unknown(&sync), blank_to_unknown(&health))),
        error: None,
    }
}

/// Kratix promises: an "available" boolean from the `Available` condition.
async fn collect_kratix_promises(client: &ClusterClient) -> Vec<StatusSection> {
    match client.list_cluster_scoped_custom_resources("platform.kratix.io", "v1alpha1", "Promise").await {
        Ok(promises) => promises
            .iter()
            .map(|p| {
                let name = p.metadata.name.clone().unwrap_or_default();
                let raw: Value = serde_json::to_value(p).unwrap_or(Value::Null);
                let (status, present) = lookup_condition_status(&raw, "Available");
                let healthy = present && status == "True";
                StatusSection {
                    name,
                    healthy,
                    detail: Some(format!("available={}", blank_to_unknown(&status))),
                    error: None,
                }
            })
            .collect(),
        Err(e) => vec![StatusSection { name: "kratix".into(), healthy: false, detail: None, error: Some(e.to_string()) }],
    }
}

/// vCluster custom resources plus a best-effort lookup of the associated
/// ArgoCD application's health.
async fn collect_vclusters(client: &ClusterClient, requests_namespace: &str) -> Vec<VClusterStatus> {
    let crs = match client
        .list_custom_resources("platform.hctl.io", "v1alpha1", VCLUSTER_RESOURCE_KIND, requests_namespace)
        .await
    {
        Ok(items) => items,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    for cr in crs {
        let name = cr.metadata.name.clone().unwrap_or_default();
        let raw: Value = serde_json::to_value(&cr).unwrap_or(Value::Null);
        let (phase_str, _) = lookup_string(&raw, &["status", "phase"]);
        let (message, _) = lookup_string(&raw, &["status", "message"]);
        let (last_reconciled, _) = lookup_string(&raw, &["status", "lastReconciled"]);
        let (argocd_sync, _) = lookup_string(&raw, &["status", "health", "argocd", "syncStatus"]);
        let (argocd_health, _) = lookup_string(&raw, &["status", "health", "argocd", "healthStatus"]);
        let (ready, ready_present) = lookup_string(&raw, &["status", "health", "workloads", "ready"]);
        let (total, total_present) = lookup_string(&raw, &["status", "health", "workloads", "total"]);

        let health = Health {
            argocd: blank_to_unknown(&argocd_health),
            workloads: if ready_present && total_present { format!("{}/{}", ready, total) } else { "Unknown".into() },
            sub_apps: blank_to_unknown(&argocd_sync),
        };

        out.push(VClusterStatus {
            name,
            phase: parse_phase(&phase_str),
            message: if message.is_empty() { None } else { Some(message) },
            last_reconciled: if last_reconciled.is_empty() { None } else { Some(last_reconciled) },
            endpoints: Vec::new(),
            credentials: Vec::new(),
            health,
            conditions: Vec::new(),
        });
    }
    out
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

/// ArgoCD applications in `namespace` carrying the given `key=value` label,
/// grouped only by presence here — the caller's table rendering groups by
/// the cluster label when displaying.
async fn collect_labeled_apps(client: &ClusterClient, namespace: &str, label_selector: &str) -> Vec<StatusSection> {
    match client.list_custom_resources("argoproj.io", "v1alpha1", "Application", namespace).await {
        Ok(apps) => apps
            .iter()
            .filter(|a| has_label(a, label_selector))
            .map(argocd_app_section)
            .collect(),
        Err(e) => vec![StatusSection { name: label_selector.into(), healthy: false, detail: None, error: Some(e.to_string()) }],
    }
}

fn has_label(obj: &kube::api::DynamicObject, kv: &str) -> bool {
    let Some((key, value)) = kv.split_once('=') else { return false };
    obj.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(|v| v == value)
        .unwrap_or(false)
}

fn blank_to_unknown(s: &str) -> String {
    if s.is_empty() {
        "Unknown".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn argocd_app_section_healthy_requires_synced_and_healthy() {
        let obj: kube::api::DynamicObject = serde_json::from_value(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "hello"},
            "status": {"sync": {"status": "Synced"}, "health": {"status": "Healthy"}},
        }))
        .unwrap();
        let section = argocd_app_section(&obj);
        assert!(section.healthy);
    }

    #[test]
    fn argocd_app_section_out_of_sync_is_unhealthy() {
        let obj: kube::api::DynamicObject = serde_json::from_value(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "hello"},
            "status": {"sync": {"status": "OutOfSync"}, "health": {"status": "Healthy"}},
        }))
        .unwrap();
        let section = argocd_app_section(&obj);
        assert!(!section.healthy);
    }

    #[test]
    fn parse_phase_unrecognized_is_unknown() {
        assert_eq!(parse_phase("Bogus"), Phase::Unknown);
        assert_eq!(parse_phase("Ready"), Phase::Ready);
    }

    #[test]
    fn has_label_matches_key_value() {
        let obj: kube::api::DynamicObject = serde_json::from_value(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "hello", "labels": {"platform.hctl.io/kind": "workload"}},
        }))
        .unwrap();
        assert!(has_label(&obj, WORKLOAD_APP_LABEL));
        assert!(!has_label(&obj, ADDON_APP_LABEL));
    }
}
