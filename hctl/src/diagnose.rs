//! Diagnostic walker: a strictly sequential six-step walk from
//! the platform custom resource down to deployed pods, producing an
//! ordered report with a root-cause hint.
//!
//! Walks a fixed sequence of resource lookups, each annotated with a
//! human status line, across the platform's full resource-lifecycle
//! chain rather than stopping at the first unhealthy one.
use chrono::{DateTime, Utc};
use hctl_core::dynamic::{lookup_condition_status, lookup_slice, lookup_string};
use hctl_core::error::Result;
use hctl_core::status::{DiagnosticReport, DiagnosticStep, StepResult, StepStatus};
use kube::api::DynamicObject;
use serde_json::Value;

use crate::cluster::ClusterClient;

/// Label the platform's controllers stamp on every object in a request's
/// lifecycle chain, carrying the originating resource name.
const RESOURCE_NAME_LABEL: &str = "platform.hctl.io/resource-name";

pub struct DiagnoseContext<'a> {
    pub client: &'a ClusterClient,
    pub resource_kind: &'a str,
    pub platform_namespace: &'a str,
    pub requests_namespace: &'a str,
}

/// Walk the chain for `name`, in order, never short-circuiting on an
/// unhealthy step.
pub async fn diagnose(ctx: &DiagnoseContext<'_>, name: &str) -> Result<DiagnosticReport> {
    let mut steps = Vec::with_capacity(DiagnosticStep::CHAIN.len());

    steps.push(step_custom_resource(ctx, name).await);
    steps.push(step_pipeline_pod(ctx, name).await);
    steps.push(step_work(ctx, name).await);
    steps.push(step_work_placement(ctx, name).await);
    steps.push(step_argocd_application(ctx, name).await);
    steps.push(step_workloads(ctx, name).await);

    Ok(DiagnosticReport { workload: name.to_string(), steps })
}

async fn step_custom_resource(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    match ctx
        .client
        .get_custom_resource("platform.hctl.io", "v1alpha1", ctx.resource_kind, ctx.platform_namespace, name)
        .await
    {
        Ok(obj) => {
            let raw = to_value(&obj);
            let (phase, present) = lookup_string(&raw, &["status", "phase"]);
            let status = if !present {
                StepStatus::Unknown
            } else if phase == "Failed" {
                StepStatus::Error
            } else {
                StepStatus::Ok
            };
            let detail = if present { format!("phase={}", phase) } else { "found, phase unknown".to_string() };
            let error_label = if status.is_error() { Some("ValidationError".to_string()) } else { None };
            StepResult { step: DiagnosticStep::CustomResource, status, detail, error_label, evidence: vec![raw] }
        }
        Err(e) => StepResult {
            step: DiagnosticStep::CustomResource,
            status: StepStatus::Error,
            detail: format!("{}/{} not found: {}", ctx.resource_kind, name, e),
            error_label: Some(e.kind().label().to_string()),
            evidence: vec![],
        },
    }
}

async fn step_pipeline_pod(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    let selector = format!("{}={}", RESOURCE_NAME_LABEL, name);
    let pods = match ctx.client.list_pods(ctx.requests_namespace, &selector).await {
        Ok(p) => p,
        Err(e) => {
            return StepResult { step: DiagnosticStep::PipelinePod, status: StepStatus::Error, detail: format!("could not list pipeline pods: {}", e), error_label: Some(e.kind().label().to_string()), evidence: vec![] }
        }
    };

    let Some(pod) = most_recent_pod(&pods) else {
        return StepResult { step: DiagnosticStep::PipelinePod, status: StepStatus::Error, detail: "no pipeline pod found".to_string(), error_label: Some("NotFoundError".to_string()), evidence: vec![] };
    };

    let raw = serde_json::to_value(&pod).unwrap_or(Value::Null);
    let (phase, present) = lookup_string(&raw, &["status", "phase"]);
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let pending_too_long = phase == "Pending" && pending_duration_exceeds(&pod, 5 * 60);

    let (status, mut detail) = match phase.as_str() {
        "Succeeded" | "Running" => (StepStatus::Ok, format!("{} is {}", pod_name, phase)),
        "Failed" => (StepStatus::Error, format!("{} failed", pod_name)),
        "Pending" if pending_too_long => (StepStatus::Error, format!("{} pending for over 5m", pod_name)),
        other if present => (StepStatus::Ok, format!("{} is {}", pod_name, other)),
        _ => (StepStatus::Unknown, format!("{} phase unknown", pod_name)),
    };
    let error_label = if status.is_error() {
        detail.push_str(&format!(" — see 'hctl logs {}'", name));
        Some("InternalError".to_string())
    } else {
        None
    };
    StepResult { step: DiagnosticStep::PipelinePod, status, detail, error_label, evidence: vec![raw] }
}

async fn step_work(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    condition_backed_step(ctx, DiagnosticStep::Work, "platform.kratix.io", "Work", name, "Ready").await
}

async fn step_work_placement(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    let objs = match ctx.client.list_custom_resources("platform.kratix.io", "v1alpha1", "WorkPlacement", ctx.requests_namespace).await {
        Ok(items) => items,
        Err(e) => {
            return StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Error, detail: format!("could not list WorkPlacements: {}", e), error_label: Some(e.kind().label().to_string()), evidence: vec![] }
        }
    };
    let Some(wp) = objs.into_iter().find(|o| has_resource_name_label(o, name)) else {
        return StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Error, detail: "no WorkPlacement found".to_string(), error_label: Some("NotFoundError".to_string()), evidence: vec![] };
    };

    let raw = to_value(&wp);
    let (write_succeeded, present) = lookup_condition_status(&raw, "WriteSucceeded");
    let (reason, _) = condition_reason(&raw, "WriteSucceeded");

    if write_succeeded == "True" {
        StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Ok, detail: "write succeeded".to_string(), error_label: None, evidence: vec![raw] }
    } else if reason.to_lowercase().contains("no files changed") {
        // Spec §4.G: a false WriteSucceeded with this specific reason is a
        // benign no-op, classified Warn rather than Error.
        StepResult {
            step: DiagnosticStep::WorkPlacement,
            status: StepStatus::Warn,
            detail: "no files changed since last write (if this persists, restart the state-repo controller)".to_string(),
            error_label: None,
            evidence: vec![raw],
        }
    } else if !present {
        StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Unknown, detail: "WriteSucceeded condition not reported".to_string(), error_label: None, evidence: vec![raw] }
    } else {
        StepResult { step: DiagnosticStep::WorkPlacement, status: StepStatus::Error, detail: format!("write did not succeed: {}", blank(&reason)), error_label: Some("InternalError".to_string()), evidence: vec![raw] }
    }
}

async fn step_argocd_application(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    match ctx.client.get_custom_resource("argoproj.io", "v1alpha1", "Application", ctx.platform_namespace, name).await {
        Ok(obj) => {
            let raw = to_value(&obj);
            let (sync, sync_present) = lookup_string(&raw, &["status", "sync", "status"]);
            let (health, health_present) = lookup_string(&raw, &["status", "health", "status"]);
            let status = if !sync_present && !health_present {
                StepStatus::Unknown
            } else if sync == "Synced" && health == "Healthy" {
                StepStatus::Ok
            } else if health == "Progressing" || health == "Unknown" {
                StepStatus::Warn
            } else {
                StepStatus::Error
            };
            let error_label = if status.is_error() { Some("InternalError".to_string()) } else { None };
            StepResult {
                step: DiagnosticStep::ArgocdApplication,
                status,
                detail: format!("sync={} health={}", blank(&sync), blank(&health)),
                error_label,
                evidence: vec![raw],
            }
        }
        Err(e) => StepResult { step: DiagnosticStep::ArgocdApplication, status: StepStatus::Error, detail: format!("application not found: {}", e), error_label: Some(e.kind().label().to_string()), evidence: vec![] },
    }
}

async fn step_workloads(ctx: &DiagnoseContext<'_>, name: &str) -> StepResult {
    match ctx.client.list_pods(name, "").await {
        Ok(pods) => {
            let total = pods.len();
            let ready = pods.iter().filter(|p| pod_is_ready(p)).count();
            let status = if total == 0 {
                StepStatus::Unknown
            } else if ready == total {
                StepStatus::Ok
            } else if ready > 0 {
                StepStatus::Warn
            } else {
                StepStatus::Error
            };
            let error_label = if status.is_error() { Some("InternalError".to_string()) } else { None };
            StepResult {
                step: DiagnosticStep::Workloads,
                status,
                detail: format!("{}/{} ready", ready, total),
                error_label,
                evidence: vec![],
            }
        }
        Err(e) => StepResult { step: DiagnosticStep::Workloads, status: StepStatus::Error, detail: format!("could not list workload pods: {}", e), error_label: Some(e.kind().label().to_string()), evidence: vec![] },
    }
}

/// Shared shape for steps that just check one condition type's status.
async fn condition_backed_step(
    ctx: &DiagnoseContext<'_>,
    step: DiagnosticStep,
    group: &str,
    kind: &str,
    name: &str,
    condition_type: &str,
) -> StepResult {
    let objs = match ctx.client.list_custom_resources(group, "v1alpha1", kind, ctx.requests_namespace).await {
        Ok(items) => items,
        Err(e) => return StepResult { step, status: StepStatus::Error, detail: format!("could not list {}: {}", kind, e), error_label: Some(e.kind().label().to_string()), evidence: vec![] },
    };
    let Some(obj) = objs.into_iter().find(|o| has_resource_name_label(o, name)) else {
        return StepResult { step, status: StepStatus::Error, detail: format!("no {} found", kind), error_label: Some("NotFoundError".to_string()), evidence: vec![] };
    };
    let raw = to_value(&obj);
    let (condition_status, present) = lookup_condition_status(&raw, condition_type);
    let status = if !present {
        StepStatus::Unknown
    } else if condition_status == "True" {
        StepStatus::Ok
    } else {
        StepStatus::Error
    };
    let error_label = if status.is_error() { Some("InternalError".to_string()) } else { None };
    StepResult { step, status, detail: format!("{}={}", condition_type, if present { condition_status } else { "Unknown".to_string() }), error_label, evidence: vec![raw] }
}

fn has_resource_name_label(obj: &DynamicObject, name: &str) -> bool {
    obj.metadata.labels.as_ref().and_then(|l| l.get(RESOURCE_NAME_LABEL)).map(|v| v == name).unwrap_or(false)
}

fn condition_reason(raw: &Value, condition_type: &str) -> (String, bool) {
    let (conditions, present) = lookup_slice(raw, &["status", "conditions"]);
    if !present {
        return (String::new(), false);
    }
    for cond in conditions {
        let (ty, has_ty) = lookup_string(cond, &["type"]);
        if has_ty && ty == condition_type {
            return lookup_string(cond, &["reason"]);
        }
    }
    (String::new(), false)
}

fn most_recent_pod(pods: &[k8s_openapi::api::core::v1::Pod]) -> Option<&k8s_openapi::api::core::v1::Pod> {
    pods.iter().max_by_key(|p| p.metadata.creation_timestamp.as_ref().map(|t| t.0))
}

fn pending_duration_exceeds(pod: &k8s_openapi::api::core::v1::Pod, seconds: i64) -> bool {
    let Some(ts) = pod.metadata.creation_timestamp.as_ref() else { return false };
    let created: DateTime<Utc> = ts.0;
    Utc::now().signed_duration_since(created).num_seconds() > seconds
}

fn pod_is_ready(pod: &k8s_openapi::api::core::v1::Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

fn to_value(obj: &DynamicObject) -> Value {
    serde_json::to_value(obj).unwrap_or(Value::Null)
}

fn blank(s: &str) -> String {
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
    fn has_resource_name_label_matches() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "platform.kratix.io/v1alpha1",
            "kind": "Work",
            "metadata": {"name": "w1", "labels": {RESOURCE_NAME_LABEL: "hello"}},
        }))
        .unwrap();
        assert!(has_resource_name_label(&obj, "hello"));
        assert!(!has_resource_name_label(&obj, "other"));
    }

    #[test]
    fn condition_reason_extracts_named_condition() {
        let raw = json!({
            "status": {
                "conditions": [
                    {"type": "WriteSucceeded", "status": "False", "reason": "no files changed"},
                ]
            }
        });
        let (reason, present) = condition_reason(&raw, "WriteSucceeded");
        assert!(present);
        assert_eq!(reason, "no files changed");
    }

    #[test]
    fn no_files_changed_reason_is_recognized_as_benign() {
        let raw = json!({
            "status": {
                "conditions": [
                    {"type": "WriteSucceeded", "status": "False", "reason": "no files changed"},
                ]
            }
        });
        let (reason, _) = condition_reason(&raw, "WriteSucceeded");
        assert!(reason.to_lowercase().contains("no files changed"));
    }

    #[test]
    fn condition_reason_missing_condition_is_absent() {
        let raw = json!({"status": {"conditions": []}});
        let (_, present) = condition_reason(&raw, "WriteSucceeded");
        assert!(!present);
    }
}
