//! Provisioner registry and the built-in provisioners (spec
//! §4.D "Required built-in provisioners").
//!
//! Modeled as a capability abstraction: a trait with
//! `provision`/`schema` operations keyed by a string type name, kept in a
//! process-wide registry that's initialized once at startup and extensible
//! via a single registration function, keyed the same way a static lookup
//! table would be, but behind a trait object instead, since provisioner
//! behavior (not just data) varies per type.
use crate::error::{ErrorKind, Result};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;

/// A provisioner output value: either a literal string or a secret-reference
/// string of the form `$(<secret-name>:<key>)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputValue {
    Literal(String),
    SecretRef { secret: String, key: String },
}

impl OutputValue {
    pub fn literal<S: Into<String>>(s: S) -> Self {
        OutputValue::Literal(s.into())
    }

    pub fn secret_ref<S: Into<String>, K: Into<String>>(secret: S, key: K) -> Self {
        OutputValue::SecretRef { secret: secret.into(), key: key.into() }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OutputValue::Literal(s) => Some(s),
            OutputValue::SecretRef { .. } => None,
        }
    }
}

/// The result of running one provisioner against one `resources` entry.
#[derive(Clone, Debug, Default)]
pub struct ProvisionResult {
    /// Output key -> value, consumed by variable resolution.
    pub outputs: BTreeMap<String, OutputValue>,
    /// Fully-formed Kubernetes objects to emit alongside the chart
    /// (namespace is injected later by the translator if absent).
    pub manifests: Vec<JsonValue>,
}

/// A pluggable resource-type provisioner.
pub trait Provisioner: Send + Sync {
    /// Produce outputs + manifests for one `resources` entry.
    ///
    /// `resource_name` is the key in the workload's `resources` map,
    /// `params` is that entry's opaque `params` mapping, and `workload_name`
    /// is the owning workload's name (used to derive manifest/object names).
    fn provision(
        &self,
        resource_name: &str,
        params: &BTreeMap<String, YamlValue>,
        workload_name: &str,
    ) -> Result<ProvisionResult>;

    /// Human-readable description of the parameters this provisioner
    /// accepts, surfaced by `hctl` help/introspection commands.
    fn schema(&self) -> &'static str;
}

/// Process-wide provisioner registry.
pub struct ProvisionerRegistry {
    provisioners: BTreeMap<String, Box<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    /// An empty registry with no provisioners registered.
    pub fn empty() -> Self {
        ProvisionerRegistry { provisioners: BTreeMap::new() }
    }

    /// The registry pre-loaded with the required built-in provisioners:
    /// `postgres`, `redis`, `mysql`, `volume`, `route`, `config`, `secret`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register("postgres", Box::new(builtins::SqlProvisioner::new("postgres", 5432)));
        reg.register("mysql", Box::new(builtins::SqlProvisioner::new("mysql", 3306)));
        reg.register("redis", Box::new(builtins::SqlProvisioner::new("redis", 6379)));
        reg.register("volume", Box::new(builtins::VolumeProvisioner));
        reg.register("route", Box::new(builtins::RouteProvisioner));
        reg.register("config", Box::new(builtins::ConfigProvisioner));
        reg.register("secret", Box::new(builtins::SecretProvisioner));
        reg
    }

    /// Register (or replace) the provisioner for a given type name.
    pub fn register(&mut self, type_name: &str, provisioner: Box<dyn Provisioner>) {
        self.provisioners.insert(type_name.to_string(), provisioner);
    }

    /// Look up the provisioner for a type name. An unknown type is a
    /// `ValidationError` at the call site.
    pub fn get(&self, type_name: &str) -> Result<&dyn Provisioner> {
        self.provisioners
            .get(type_name)
            .map(|b| b.as_ref())
            .ok_or_else(|| {
                ErrorKind::validation(format!("unknown provisioner type '{}'", type_name)).into()
            })
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.provisioners.keys().map(|s| s.as_str()).collect()
    }
}

/// Fetch a string parameter out of a provisioner's opaque `params` mapping.
pub fn param_str(params: &BTreeMap<String, YamlValue>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

pub mod builtins {
    use super::*;
    use serde_json::json;

    /// Shared shape for `postgres`/`mysql`/`redis`: an ExternalSecret bound
    /// to a named credential-store item, with `host`/`port`/`username`/
    /// `password` outputs.
    pub struct SqlProvisioner {
        engine: &'static str,
        default_port: u16,
    }

    impl SqlProvisioner {
        pub fn new(engine: &'static str, default_port: u16) -> Self {
            SqlProvisioner { engine, default_port }
        }

        fn secret_name(&self, workload_name: &str, resource_name: &str) -> String {
            format!("{}-{}-{}", workload_name, resource_name, self.engine)
        }
    }

    impl Provisioner for SqlProvisioner {
        fn provision(
            &self,
            resource_name: &str,
            params: &BTreeMap<String, YamlValue>,
            workload_name: &str,
        ) -> Result<ProvisionResult> {
            let secret_name = self.secret_name(workload_name, resource_name);
            let store_item = param_str(params, "item").unwrap_or_else(|| secret_name.clone());
            let host = param_str(params, "host")
                .unwrap_or_else(|| format!("{}.{}.svc.cluster.local", resource_name, workload_name));
            let port = params
                .get("port")
                .and_then(|v| v.as_u64())
                .map(|p| p as u16)
                .unwrap_or(self.default_port);

            let manifest = json!({
                "apiVersion": "external-secrets.io/v1beta1",
                "kind": "ExternalSecret",
                "metadata": {"name": secret_name},
                "spec": {
                    "secretStoreRef": {"name": "default", "kind": "ClusterSecretStore"},
                    "target": {"name": secret_name},
                    "dataFrom": [{"extract": {"key": store_item}}],
                },
            });

            let mut outputs = BTreeMap::new();
            outputs.insert("host".to_string(), OutputValue::literal(host));
            outputs.insert("port".to_string(), OutputValue::literal(port.to_string()));
            outputs.insert("username".to_string(), OutputValue::secret_ref(&secret_name, "username"));
            outputs.insert("password".to_string(), OutputValue::secret_ref(&secret_name, "password"));

            Ok(ProvisionResult { outputs, manifests: vec![manifest] })
        }

        fn schema(&self) -> &'static str {
            "params: { host?: string, port?: number, item?: string (credential-store item name) }"
        }
    }

    /// `volume`: a PersistentVolumeClaim; `source` output is the PVC name.
    pub struct VolumeProvisioner;

    impl Provisioner for VolumeProvisioner {
        fn provision(
            &self,
            resource_name: &str,
            params: &BTreeMap<String, YamlValue>,
            workload_name: &str,
        ) -> Result<ProvisionResult> {
            let pvc_name = format!("{}-{}", workload_name, resource_name);
            let size = param_str(params, "size").unwrap_or_else(|| "1Gi".to_string());
            let storage_class = param_str(params, "storageClass");

            let mut spec = json!({
                "accessModes": ["ReadWriteOnce"],
                "resources": {"requests": {"storage": size}},
            });
            if let Some(sc) = storage_class {
                spec["storageClassName"] = json!(sc);
            }

            let manifest = json!({
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": {"name": pvc_name},
                "spec": spec,
            });

            let mut outputs = BTreeMap::new();
            outputs.insert("source".to_string(), OutputValue::literal(pvc_name));
            Ok(ProvisionResult { outputs, manifests: vec![manifest] })
        }

        fn schema(&self) -> &'static str {
            "params: { size?: string (default 1Gi), storageClass?: string }"
        }
    }

    /// `route`: no manifest; `host`/`path`/`port` outputs echoed from
    /// parameters.
    pub struct RouteProvisioner;

    impl Provisioner for RouteProvisioner {
        fn provision(
            &self,
            _resource_name: &str,
            params: &BTreeMap<String, YamlValue>,
            _workload_name: &str,
        ) -> Result<ProvisionResult> {
            let mut outputs = BTreeMap::new();
            if let Some(host) = param_str(params, "host") {
                outputs.insert("host".to_string(), OutputValue::literal(host));
            }
            let path = param_str(params, "path").unwrap_or_else(|| "/".to_string());
            outputs.insert("path".to_string(), OutputValue::literal(path));
            let port = params.get("port").and_then(|v| v.as_u64()).unwrap_or(8080);
            outputs.insert("port".to_string(), OutputValue::literal(port.to_string()));
            Ok(ProvisionResult { outputs, manifests: vec![] })
        }

        fn schema(&self) -> &'static str {
            "params: { host?: string, path?: string (default /), port?: number (default 8080) }"
        }
    }

    /// `config`: a ConfigMap; outputs are the named keys verbatim.
    pub struct ConfigProvisioner;

    impl Provisioner for ConfigProvisioner {
        fn provision(
            &self,
            resource_name: &str,
            params: &BTreeMap<String, YamlValue>,
            workload_name: &str,
        ) -> Result<ProvisionResult> {
            let cm_name = format!("{}-{}", workload_name, resource_name);
            let mut data = serde_json::Map::new();
            let mut outputs = BTreeMap::new();
            for (k, v) in params {
                let s = match v {
                    YamlValue::String(s) => s.clone(),
                    other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
                };
                data.insert(k.clone(), json!(s.clone()));
                outputs.insert(k.clone(), OutputValue::literal(s));
            }
            let manifest = json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": cm_name},
                "data": JsonValue::Object(data),
            });
            Ok(ProvisionResult { outputs, manifests: vec![manifest] })
        }

        fn schema(&self) -> &'static str {
            "params: arbitrary key -> string entries, copied verbatim into a ConfigMap"
        }
    }

    /// `secret`: an ExternalSecret; every output is a secret reference.
    pub struct SecretProvisioner;

    impl Provisioner for SecretProvisioner {
        fn provision(
            &self,
            resource_name: &str,
            params: &BTreeMap<String, YamlValue>,
            workload_name: &str,
        ) -> Result<ProvisionResult> {
            let secret_name = format!("{}-{}", workload_name, resource_name);
            let item = param_str(params, "item").unwrap_or_else(|| secret_name.clone());
            let keys: Vec<String> = params
                .get("keys")
                .and_then(|v| v.as_sequence())
                .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();

            let manifest = json!({
                "apiVersion": "external-secrets.io/v1beta1",
                "kind": "ExternalSecret",
                "metadata": {"name": secret_name},
                "spec": {
                    "secretStoreRef": {"name": "default", "kind": "ClusterSecretStore"},
                    "target": {"name": secret_name},
                    "dataFrom": [{"extract": {"key": item}}],
                },
            });

            let mut outputs = BTreeMap::new();
            for key in keys {
                outputs.insert(key.clone(), OutputValue::secret_ref(&secret_name, key));
            }
            Ok(ProvisionResult { outputs, manifests: vec![manifest] })
        }

        fn schema(&self) -> &'static str {
            "params: { item?: string, keys?: [string] (secret keys to expose as outputs) }"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_required_builtins() {
        let reg = ProvisionerRegistry::with_builtins();
        for ty in ["postgres", "redis", "mysql", "volume", "route", "config", "secret"] {
            assert!(reg.get(ty).is_ok(), "missing builtin provisioner {}", ty);
        }
    }

    #[test]
    fn unknown_type_is_validation_error() {
        let reg = ProvisionerRegistry::with_builtins();
        let err = reg.get("nonexistent").unwrap_err();
        assert_eq!(err.exit_code(), 20);
    }

    #[test]
    fn postgres_password_is_a_secret_ref() {
        let reg = ProvisionerRegistry::with_builtins();
        let p = reg.get("postgres").unwrap();
        let res = p.provision("db", &BTreeMap::new(), "hello").unwrap();
        match &res.outputs["password"] {
            OutputValue::SecretRef { secret, key } => {
                assert_eq!(key, "password");
                assert!(secret.contains("hello"));
            }
            _ => panic!("expected secret ref"),
        }
        assert_eq!(res.manifests.len(), 1);
    }

    #[test]
    fn volume_source_output_is_pvc_name() {
        let reg = ProvisionerRegistry::with_builtins();
        let p = reg.get("volume").unwrap();
        let res = p.provision("data", &BTreeMap::new(), "hello").unwrap();
        assert_eq!(res.outputs["source"].as_str(), Some("hello-data"));
    }

    #[test]
    fn route_without_host_has_no_manifest() {
        let reg = ProvisionerRegistry::with_builtins();
        let p = reg.get("route").unwrap();
        let res = p.provision("web", &BTreeMap::new(), "hello").unwrap();
        assert!(res.manifests.is_empty());
        assert!(!res.outputs.contains_key("host"));
        assert_eq!(res.outputs["path"].as_str(), Some("/"));
    }
}
