//! Score→platform translator: builds the platform chart's
//! `values.yaml`, the addons-index entry, and the full file set from a
//! workload spec plus its provisioners' outputs.
//!
//! Built as a tree of small, single-purpose builder functions over the
//! parsed workload: one Score workload becomes one chart values document
//! plus whatever provisioner manifests its resources need.
use hctl_core::error::{ErrorKind, Result};
use hctl_core::provisioner::{OutputValue, ProvisionResult, ProvisionerRegistry};
use hctl_core::score::{classify_variable, Container, VariableRef, Workload};
use serde_json::{json, Map, Value};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reserved top-level keys in `workloads/<cluster>/addons.yaml` that must
/// survive a merge untouched.
const RESERVED_ADDONS_KEYS: [&str; 3] = ["globalSelectors", "useAddonNameForValues", "appsetPrefix"];

/// The full output of one translation.
pub struct TranslateResult {
    pub workload_name: String,
    pub target_cluster: String,
    pub namespace: String,
    pub stakater_values: Value,
    pub addons_entry: Value,
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

/// Rule 1: target cluster resolution order: explicit flag >
/// workload annotation > configured default.
pub fn resolve_target_cluster(workload: &Workload, cli_flag: Option<&str>, default_cluster: Option<&str>) -> Result<String> {
    if let Some(c) = cli_flag {
        return Ok(c.to_string());
    }
    let annotated = workload.target_cluster();
    if !annotated.is_empty() {
        return Ok(annotated);
    }
    default_cluster
        .map(str::to_string)
        .ok_or_else(|| ErrorKind::config("no target cluster: pass --cluster, set the workload annotation, or configure defaultCluster").into())
}

/// Rule 1: namespace resolution: workload annotation > cluster
/// name.
pub fn resolve_namespace(workload: &Workload, cluster: &str) -> String {
    let overridden = workload.target_namespace_override();
    if overridden.is_empty() {
        cluster.to_string()
    } else {
        overridden
    }
}

/// Run the translator end to end.
pub fn translate(
    workload: &Workload,
    registry: &ProvisionerRegistry,
    cli_cluster_flag: Option<&str>,
    default_cluster: Option<&str>,
    repo_root: &Path,
) -> Result<TranslateResult> {
    let cluster = resolve_target_cluster(workload, cli_cluster_flag, default_cluster)?;
    let namespace = resolve_namespace(workload, &cluster);

    // Rule 2: run every provisioner exactly once, in sorted resource-name
    // order.
    let mut resource_outputs: BTreeMap<String, ProvisionResult> = BTreeMap::new();
    let mut extra_objects: Vec<Value> = Vec::new();
    let mut resource_names: Vec<&String> = workload.resources.keys().collect();
    resource_names.sort();
    for rname in resource_names {
        let rspec = &workload.resources[rname];
        let provisioner = registry.get(&rspec.kind)?;
        let result = provisioner.provision(rname, &rspec.params, &workload.metadata.name)?;
        for manifest in &result.manifests {
            extra_objects.push(inject_namespace(manifest.clone(), &namespace));
        }
        resource_outputs.insert(rname.clone(), result);
    }

    let deployment = build_deployment_section(workload, &resource_outputs)?;
    let additional_containers = build_additional_containers(workload, &resource_outputs)?;
    let service = build_service_section(workload);
    let (http_route, certificate) = build_route_sections(workload, &resource_outputs);

    let mut values = Map::new();
    values.insert("applicationName".into(), json!(workload.metadata.name));
    values.insert("deployment".into(), deployment);
    if !additional_containers.is_empty() {
        values.insert("additionalContainers".into(), Value::Array(additional_containers));
    }
    values.insert("service".into(), service);
    // Rule 6: persistence is always disabled in the chart; storage comes
    // exclusively from provisioner manifests in extraObjects.
    values.insert("persistence".into(), json!({"enabled": false}));
    if !extra_objects.is_empty() {
        values.insert("extraObjects".into(), Value::Array(extra_objects));
    }
    if let Some(route) = http_route {
        values.insert("httpRoute".into(), route);
    }
    if let Some(cert) = certificate {
        values.insert("certificate".into(), cert);
    }
    let stakater_values = Value::Object(values);

    let addons_entry = json!({ "enabled": true, "namespace": namespace });

    let mut files = BTreeMap::new();
    let values_path = PathBuf::from(format!("workloads/{}/addons/{}/values.yaml", cluster, workload.metadata.name));
    let values_yaml = yaml_bytes(&stakater_values)?;
    files.insert(values_path, values_yaml);

    let addons_index_path = PathBuf::from(format!("workloads/{}/addons.yaml", cluster));
    let merged_index = merge_addons_index(repo_root, &addons_index_path, &workload.metadata.name, &addons_entry)?;
    files.insert(addons_index_path, yaml_bytes(&merged_index)?);

    Ok(TranslateResult {
        workload_name: workload.metadata.name.clone(),
        target_cluster: cluster,
        namespace,
        stakater_values,
        addons_entry,
        files,
    })
}

fn yaml_bytes(v: &Value) -> Result<Vec<u8>> {
    serde_yaml::to_string(v)
        .map(|s| s.into_bytes())
        .map_err(|e| ErrorKind::internal(format!("failed to render YAML: {}", e)).into())
}

/// Rule 2: inject the target namespace into a provisioner manifest if it's
/// missing one.
fn inject_namespace(mut manifest: Value, namespace: &str) -> Value {
    if let Some(meta) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.entry("namespace").or_insert_with(|| json!(namespace));
    }
    manifest
}

/// Rule 3: build the chart's `deployment` section from the primary
/// container (lexicographically smallest name).
fn build_deployment_section(workload: &Workload, outputs: &BTreeMap<String, ProvisionResult>) -> Result<Value> {
    let (name, container) = workload
        .primary_container()
        .ok_or_else(|| ErrorKind::validation("workload has no containers"))?;

    let (repository, tag) = split_image(&container.image);
    let ports = build_service_ports(workload);
    let env = build_env_map(container, outputs)?;

    let mut deployment = Map::new();
    deployment.insert("name".into(), json!(name));
    deployment.insert("image".into(), json!({"repository": repository, "tag": tag}));
    if !container.command.is_empty() {
        deployment.insert("command".into(), json!(container.command));
    }
    if !container.args.is_empty() {
        deployment.insert("args".into(), json!(container.args));
    }
    deployment.insert("ports".into(), Value::Array(ports));
    deployment.insert("env".into(), env);
    if !container.resources.requests.is_empty() || !container.resources.limits.is_empty() {
        deployment.insert(
            "resources".into(),
            json!({
                "requests": container.resources.requests,
                "limits": container.resources.limits,
            }),
        );
    }
    let volume_mounts = build_volume_mounts(container, outputs);
    if !volume_mounts.is_empty() {
        deployment.insert("volumeMounts".into(), Value::Array(volume_mounts));
    }
    Ok(Value::Object(deployment))
}

/// Rule 4: remaining containers, with a simpler `[{name, value|valueFrom}]`
/// env shape.
fn build_additional_containers(workload: &Workload, outputs: &BTreeMap<String, ProvisionResult>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for (name, container) in workload.additional_containers() {
        let (repository, tag) = split_image(&container.image);
        let mut env_list = Vec::new();
        for (key, raw) in &container.variables {
            let resolved = resolve_variable_value(raw, outputs);
            let mut entry = Map::new();
            entry.insert("name".into(), json!(key));
            merge_resolved_into(&mut entry, &resolved);
            env_list.push(Value::Object(entry));
        }
        out.push(json!({
            "name": name,
            "image": {"repository": repository, "tag": tag},
            "env": env_list,
        }));
    }
    Ok(out)
}

/// Rule 5: service section mirrors container ports, `targetPort` falling
/// back to `port`.
fn build_service_section(workload: &Workload) -> Value {
    json!({ "ports": build_service_ports(workload) })
}

fn build_service_ports(workload: &Workload) -> Vec<Value> {
    workload
        .service
        .ports
        .iter()
        .map(|(name, p)| {
            json!({
                "name": name,
                "port": p.port,
                "targetPort": p.target_port.unwrap_or(p.port),
                "protocol": p.protocol.unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Rule 7: the first `route` resource (by name order) populates
/// `httpRoute`/`certificate` from its provisioner outputs; a route with no
/// `host` parameter emits neither.
fn build_route_sections(workload: &Workload, outputs: &BTreeMap<String, ProvisionResult>) -> (Option<Value>, Option<Value>) {
    let routes = workload.resources_by_type("route");
    let Some((name, _rspec)) = routes.first() else {
        return (None, None);
    };
    let Some(route_outputs) = outputs.get(*name) else {
        return (None, None);
    };
    let Some(host) = route_outputs.outputs.get("host").and_then(OutputValue::as_str) else {
        return (None, None);
    };
    let path = route_outputs.outputs.get("path").and_then(OutputValue::as_str).unwrap_or("/");
    let port = route_outputs.outputs.get("port").and_then(OutputValue::as_str).unwrap_or("8080");

    let route = json!({ "host": host, "path": path, "port": port });
    let cert = json!({
        "host": host,
        "issuer": "letsencrypt-production",
    });
    (Some(route), Some(cert))
}

/// Primary-container env map (`{KEY: resolved}` form in the chart's
/// `deployment.env`).
fn build_env_map(container: &Container, outputs: &BTreeMap<String, ProvisionResult>) -> Result<Value> {
    let mut map = Map::new();
    for (key, raw) in &container.variables {
        map.insert(key.clone(), resolve_variable_value(raw, outputs));
    }
    Ok(Value::Object(map))
}

fn build_volume_mounts(container: &Container, outputs: &BTreeMap<String, ProvisionResult>) -> Vec<Value> {
    container
        .volumes
        .iter()
        .map(|(mount_name, vol)| {
            let pvc = outputs
                .get(&vol.source)
                .and_then(|r| r.outputs.get("source"))
                .and_then(OutputValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| vol.source.clone());
            json!({
                "name": mount_name,
                "claimName": pvc,
                "mountPath": vol.path,
                "readOnly": vol.read_only,
            })
        })
        .collect()
}

/// Variable resolution: exactly one of `{value}`,
/// `{valueFrom: {secretKeyRef}}`, or the literal placeholder preserved.
pub fn resolve_variable_value(raw: &str, outputs: &BTreeMap<String, ProvisionResult>) -> Value {
    match classify_variable(raw) {
        VariableRef::DirectSecret { secret, key } => secret_ref_value(&secret, &key),
        VariableRef::ResourceOutput { resource, key } => {
            match outputs.get(&resource).and_then(|r| r.outputs.get(&key)) {
                Some(OutputValue::Literal(s)) => json!({ "value": s }),
                Some(OutputValue::SecretRef { secret, key }) => secret_ref_value(secret, key),
                None => json!({ "value": raw }),
            }
        }
        VariableRef::Literal(s) => json!({ "value": s }),
    }
}

fn secret_ref_value(secret: &str, key: &str) -> Value {
    json!({ "valueFrom": { "secretKeyRef": { "name": secret, "key": key } } })
}

fn merge_resolved_into(entry: &mut Map<String, Value>, resolved: &Value) {
    if let Some(obj) = resolved.as_object() {
        for (k, v) in obj {
            entry.insert(k.clone(), v.clone());
        }
    }
}

/// Split `repo:tag` on the last `:`, defaulting the tag to `latest` (spec
/// §4.E rule 3).
fn split_image(image: &str) -> (String, String) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.is_empty() => (repo.to_string(), tag.to_string()),
        _ => (image.to_string(), "latest".to_string()),
    }
}

/// Merge this workload's entry into the on-disk addons index, preserving
/// the reserved top-level keys.
fn merge_addons_index(repo_root: &Path, rel_path: &Path, workload_name: &str, entry: &Value) -> Result<Value> {
    let abs = repo_root.join(rel_path);
    let mut root: Map<String, Value> = match std::fs::read_to_string(&abs) {
        Ok(raw) => {
            let existing: YamlValue = serde_yaml::from_str(&raw)
                .map_err(|e| ErrorKind::internal(format!("invalid existing addons index at {}: {}", abs.display(), e)))?;
            let existing: Value = serde_json::to_value(existing)
                .map_err(|e| ErrorKind::internal(format!("failed to normalize addons index: {}", e)))?;
            existing.as_object().cloned().unwrap_or_default()
        }
        Err(_) => Map::new(),
    };
    for key in RESERVED_ADDONS_KEYS {
        root.entry(key).or_insert_with(|| json!(null));
    }
    root.insert(workload_name.to_string(), entry.clone());
    Ok(Value::Object(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hctl_core::provisioner::ProvisionerRegistry;

    fn workload_from(raw: &str) -> Workload {
        Workload::from_str(raw).unwrap()
    }

    #[test]
    fn s1_minimal_workload_translation() {
        let raw = r#"
metadata: {name: "hello"}
containers: {web: {image: "nginx:1.25", variables: {GREETING: "hi"}}}
service: {ports: {http: {port: 80}}}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = translate(&wl, &registry, None, Some("the-cluster"), &dir).unwrap();
        assert_eq!(result.target_cluster, "the-cluster");
        assert_eq!(result.stakater_values["applicationName"], "hello");
        assert_eq!(result.stakater_values["deployment"]["image"]["repository"], "nginx");
        assert_eq!(result.stakater_values["deployment"]["image"]["tag"], "1.25");
        assert_eq!(result.stakater_values["deployment"]["env"]["GREETING"]["value"], "hi");
        assert_eq!(result.stakater_values["service"]["ports"][0]["port"], 80);
        assert!(result.stakater_values.get("httpRoute").is_none());
        assert!(result
            .files
            .contains_key(&PathBuf::from("workloads/the-cluster/addons/hello/values.yaml")));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn s2_secret_reference_resolution() {
        let raw = r#"
metadata: {name: "hello"}
containers:
  web:
    image: "x"
    variables:
      DB_PASS: "${resources.db.password}"
resources:
  db: {type: postgres}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-s2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = translate(&wl, &registry, None, Some("the-cluster"), &dir).unwrap();
        let env = &result.stakater_values["deployment"]["env"]["DB_PASS"];
        assert_eq!(env["valueFrom"]["secretKeyRef"]["key"], "password");
        assert!(env["valueFrom"]["secretKeyRef"]["name"].as_str().unwrap().contains("hello"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unresolved_reference_preserved_as_literal() {
        let outputs = BTreeMap::new();
        let v = resolve_variable_value("${resources.missing.key}", &outputs);
        assert_eq!(v["value"], "${resources.missing.key}");
    }

    #[test]
    fn zero_resources_produces_no_extra_objects() {
        let raw = r#"
metadata: {name: "hello"}
containers: {web: {image: "x"}}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-zero-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = translate(&wl, &registry, None, Some("the-cluster"), &dir).unwrap();
        assert!(result.stakater_values.get("extraObjects").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_resource_type_is_fatal() {
        let raw = r#"
metadata: {name: "hello"}
containers: {web: {image: "x"}}
resources:
  thing: {type: nonexistent}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-unknown-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let err = translate(&wl, &registry, None, Some("the-cluster"), &dir).unwrap_err();
        assert_eq!(err.exit_code(), 20);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_default_cluster_is_config_error() {
        let raw = r#"
metadata: {name: "hello"}
containers: {web: {image: "x"}}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-nocluster-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let err = translate(&wl, &registry, None, None, &dir).unwrap_err();
        assert_eq!(err.exit_code(), 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn route_without_host_emits_no_route_sections() {
        let raw = r#"
metadata: {name: "hello"}
containers: {web: {image: "x"}}
resources:
  web-route: {type: route}
"#;
        let wl = workload_from(raw);
        let registry = ProvisionerRegistry::with_builtins();
        let dir = std::env::temp_dir().join(format!("hctl-translate-route-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = translate(&wl, &registry, None, Some("the-cluster"), &dir).unwrap();
        assert!(result.stakater_values.get("httpRoute").is_none());
        assert!(result.stakater_values.get("certificate").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
