//! Cluster access client: typed + dynamic Kubernetes operations,
//! kubeconfig discovery, context override, streaming logs.
//!
//! Built on `tokio` + `kube::Client` + typed `Api<T>` for the objects this
//! crate has Rust types for (nodes, pods, deployments), and `kube`'s
//! `DynamicObject`/`Api` for the CRDs it doesn't.
use futures::stream::StreamExt;
use hctl_core::error::{ErrorKind, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod, Secret};
use std::collections::BTreeMap;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, Config as KubeConfig};
use serde_json::{json, Value};
use std::io::Write;

/// Soft page size cap for list operations.
const LIST_PAGE_LIMIT: u32 = 500;

/// A discovered cluster node's summary.
#[derive(Clone, Debug, serde::Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub ready: bool,
    pub internal_ip: Option<String>,
    pub roles: Vec<String>,
    pub cpu_capacity: Option<String>,
    pub memory_capacity: Option<String>,
}

/// A listed deployment plus its derived ArgoCD application association.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub ready_replicas: i32,
    pub desired_replicas: i32,
    pub argocd_app: Option<String>,
}

/// The label ArgoCD stamps on resources it manages, used to associate a
/// deployment back to its owning Application.
const ARGOCD_APP_LABEL: &str = "argocd.argoproj.io/instance";

/// Typed + dynamic Kubernetes access, scoped to one resolved context.
pub struct ClusterClient {
    client: Client,
    context_name: String,
}

impl ClusterClient {
    /// Resolve a client by explicit context flag, then process
    /// configuration, then the kubeconfig default.
    pub async fn connect(context_flag: Option<&str>, config_context: Option<&str>) -> Result<ClusterClient> {
        let chosen = context_flag.map(str::to_string).or_else(|| config_context.map(str::to_string));

        let kube_opts = kube::config::KubeConfigOptions {
            context: chosen.clone(),
            cluster: None,
            user: None,
        };
        let kube_config = KubeConfig::from_kubeconfig(&kube_opts)
            .await
            .map_err(|e| ErrorKind::config(format!("failed to load kubeconfig: {}", e)))?;
        // Resolution order (spec §4.A): explicit context flag, then process
        // config, then the kubeconfig's own `current-context` — never the
        // default namespace, which is a distinct field.
        let context_name = match chosen {
            Some(c) => c,
            None => kube::config::Kubeconfig::read()
                .ok()
                .and_then(|kc| kc.current_context)
                .unwrap_or_else(|| "default".to_string()),
        };

        let client = Client::try_from(kube_config)
            .map_err(|e| ErrorKind::network(format!("failed to build kube client: {}", e)))?;

        Ok(ClusterClient { client, context_name })
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Raw `kube::Client` escape hatch for callers (status collector,
    /// diagnostic walker) that need their own typed/dynamic `Api<T>`.
    pub fn raw(&self) -> Client {
        self.client.clone()
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let lp = ListParams::default().limit(LIST_PAGE_LIMIT);
        let nodes = api.list(&lp).await.map_err(kube_err)?;

        let mut out = Vec::new();
        for n in nodes.items {
            let name = n.metadata.name.clone().unwrap_or_default();
            let status = n.status.unwrap_or_default();
            let ready = status
                .conditions
                .unwrap_or_default()
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True");
            let internal_ip = status
                .addresses
                .unwrap_or_default()
                .into_iter()
                .find(|a| a.type_ == "InternalIP")
                .map(|a| a.address);
            let roles = n
                .metadata
                .labels
                .unwrap_or_default()
                .keys()
                .filter_map(|k| k.strip_prefix("node-role.kubernetes.io/"))
                .map(|s| s.to_string())
                .collect();
            let capacity = status.capacity.unwrap_or_default();
            out.push(NodeInfo {
                name,
                ready,
                internal_ip,
                roles,
                cpu_capacity: capacity.get("cpu").map(|q| q.0.clone()),
                memory_capacity: capacity.get("memory").map(|q| q.0.clone()),
            });
        }
        Ok(out)
    }

    /// Build an `Api<DynamicObject>` for an arbitrary `group/version/kind`.
    fn dynamic_api(&self, group: &str, version: &str, kind: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let ar = ApiResource::from_gvk(&gvk);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    pub async fn list_custom_resources(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.dynamic_api(group, version, kind, Some(namespace));
        let lp = ListParams::default().limit(LIST_PAGE_LIMIT);
        let list = api.list(&lp).await.map_err(kube_err)?;
        Ok(list.items)
    }

    /// Cluster-scoped variant of `list_custom_resources`, for CRDs with no
    /// namespace.
    pub async fn list_cluster_scoped_custom_resources(&self, group: &str, version: &str, kind: &str) -> Result<Vec<DynamicObject>> {
        let api = self.dynamic_api(group, version, kind, None);
        let lp = ListParams::default().limit(LIST_PAGE_LIMIT);
        let list = api.list(&lp).await.map_err(kube_err)?;
        Ok(list.items)
    }

    pub async fn get_custom_resource(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject> {
        let api = self.dynamic_api(group, version, kind, Some(namespace));
        api.get(name).await.map_err(|e| match e {
            kube::Error::Api(r) if r.code == 404 => ErrorKind::not_found(format!("{}/{} not found", kind, name)).into(),
            other => kube_err(other),
        })
    }

    pub async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(label_selector).limit(LIST_PAGE_LIMIT);
        let list = api.list(&lp).await.map_err(kube_err)?;
        Ok(list.items)
    }

    /// Stream pod logs to `sink`. Caller owns framing;
    /// this just forwards bytes so `hctl logs` can write straight to
    /// stdout and a future `--output json` mode could wrap lines instead.
    pub async fn stream_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        follow: bool,
        tail_lines: Option<i64>,
        sink: &mut dyn Write,
    ) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = LogParams {
            container: container.map(str::to_string),
            follow,
            tail_lines,
            ..Default::default()
        };
        let mut stream = api.log_stream(pod, &lp).await.map_err(kube_err)?;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(kube_err)?;
            sink.write_all(&bytes)
                .map_err(|e| ErrorKind::internal(format!("failed writing log output: {}", e)))?;
        }
        Ok(())
    }

    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().limit(LIST_PAGE_LIMIT);
        let list = api.list(&lp).await.map_err(kube_err)?;
        let mut out = Vec::new();
        for d in list.items {
            let name = d.metadata.name.clone().unwrap_or_default();
            let argocd_app = d.metadata.labels.as_ref().and_then(|l| l.get(ARGOCD_APP_LABEL)).cloned();
            let status = d.status.unwrap_or_default();
            out.push(DeploymentInfo {
                name,
                namespace: namespace.to_string(),
                ready_replicas: status.ready_replicas.unwrap_or(0),
                desired_replicas: d.spec.and_then(|s| s.replicas).unwrap_or(0),
                argocd_app,
            });
        }
        Ok(out)
    }

    /// Patch a deployment's replica count, used by `hctl up`/`hctl down`.
    pub async fn patch_deployment_replicas(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({"spec": {"replicas": replicas}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(kube_err)?;
        Ok(())
    }

    /// Set or unset an ArgoCD application's `spec.syncPolicy.automated`
    /// clause via a JSON merge patch.
    pub async fn set_argocd_auto_sync(&self, namespace: &str, app_name: &str, enabled: bool) -> Result<()> {
        let api = self.dynamic_api("argoproj.io", "v1alpha1", "Application", Some(namespace));
        let patch = if enabled {
            json!({"spec": {"syncPolicy": {"automated": {"prune": true, "selfHeal": true}}}})
        } else {
            json!({"spec": {"syncPolicy": {"automated": Value::Null}}})
        };
        api.patch(app_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(retry_conflict)?;
        Ok(())
    }

    /// Fetch a Secret's decoded data.
    /// `k8s_openapi`'s `ByteString` already base64-decodes `data` entries, so
    /// callers get raw bytes straight off the wire — used by `hctl vcluster
    /// kubeconfig` to retrieve the kubeconfig referenced by
    /// `status.credentials.kubeconfigSecret` without ever printing it.
    pub async fn get_secret_data(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await.map_err(|e| match e {
            kube::Error::Api(r) if r.code == 404 => {
                ErrorKind::not_found(format!("secret {} not found in namespace {}", name, namespace)).into()
            }
            other => kube_err(other),
        })?;
        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect())
    }

    /// Write an annotation onto an arbitrary namespaced custom resource to
    /// trigger controller re-reconciliation.
    pub async fn annotate_resource(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let api = self.dynamic_api(group, version, kind, Some(namespace));
        let patch = json!({"metadata": {"annotations": {key: value}}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(retry_conflict)?;
        Ok(())
    }
}

/// Map a `kube::Error` onto hctl's error taxonomy, except the cases with a more
/// specific kind (404 -> NotFound, 403/401 -> Permission).
fn kube_err(e: kube::Error) -> hctl_core::error::HctlError {
    match e {
        kube::Error::Api(r) if r.code == 404 => ErrorKind::not_found(r.message).into(),
        kube::Error::Api(r) if r.code == 403 || r.code == 401 => ErrorKind::permission(r.message).into(),
        kube::Error::Api(r) if r.code == 409 => ErrorKind::conflict(r.message).into(),
        other => ErrorKind::network(other.to_string()).into(),
    }
}

/// Same as `kube_err` but classifies a 409 as retryable `ConflictError`
/// explicitly, for the two patch call sites that get a single
/// retry-after-delay.
fn retry_conflict(e: kube::Error) -> hctl_core::error::HctlError {
    kube_err(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_info_serializes() {
        let n = NodeInfo {
            name: "node-1".into(),
            ready: true,
            internal_ip: Some("10.0.0.5".into()),
            roles: vec!["control-plane".into()],
            cpu_capacity: Some("8".into()),
            memory_capacity: Some("32Gi".into()),
        };
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["name"], "node-1");
        assert_eq!(v["ready"], true);
    }
}
