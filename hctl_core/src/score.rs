//! Score model & loader: parses and validates a workload
//! specification from a YAml file.
//!
//! A `#[serde(deny_unknown_fields)]` struct tree plus a handful of small
//! accessor and validation methods, rather than a generic schema validator.
use crate::error::{ErrorKind, HctlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Annotation key that overrides the target cluster for a workload.
pub const CLUSTER_ANNOTATION_KEY: &str = "platform.hctl.io/cluster";
/// Annotation key that overrides the target namespace for a workload.
pub const NAMESPACE_ANNOTATION_KEY: &str = "platform.hctl.io/namespace";

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?$").unwrap());

/// A parsed, validated workload specification ("Score file").
///
/// ```yaml
/// metadata:
///   name: hello
/// containers:
///   web:
///     image: "nginx:1.25"
///     variables:
///       GREETING: "hi"
/// service:
///   ports:
///     http: { port: 80 }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    pub metadata: Metadata,
    #[serde(default)]
    pub containers: BTreeMap<String, Container>,
    #[serde(default)]
    pub service: Service,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Container {
    /// Image reference, or `.` to mean "inherit".
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ContainerResources,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeMount>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ContainerResources {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct VolumeMount {
    pub source: String,
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Service {
    #[serde(default)]
    pub ports: BTreeMap<String, ServicePort>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ServicePort {
    pub port: u16,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
        };
        write!(f, "{}", s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

/// How a container variable's value expression resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariableRef {
    /// A literal string, used as-is.
    Literal(String),
    /// `${resources.<name>.<key>}` — references a provisioner output.
    ResourceOutput { resource: String, key: String },
    /// `$(<secret-name>:<key>)` — a direct secret reference.
    DirectSecret { secret: String, key: String },
}

static RESOURCE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{resources\.([^.}]+)\.([^.}]+)\}$").unwrap());
static SECRET_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\(([^:)]+):([^)]+)\)$").unwrap());

/// Classify a container variable's literal value expression.
///
/// Unresolved `${resources...}` references (naming a resource absent from
/// `resources`) are intentionally NOT classified as `ResourceOutput` — the
/// caller (the translator) is responsible for falling back to a literal
/// placeholder; this function only describes syntactic shape.
pub fn classify_variable(value: &str) -> VariableRef {
    if let Some(caps) = RESOURCE_REF_RE.captures(value) {
        return VariableRef::ResourceOutput {
            resource: caps[1].to_string(),
            key: caps[2].to_string(),
        };
    }
    if let Some(caps) = SECRET_REF_RE.captures(value) {
        return VariableRef::DirectSecret {
            secret: caps[1].to_string(),
            key: caps[2].to_string(),
        };
    }
    VariableRef::Literal(value.to_string())
}

impl Workload {
    /// Parse and validate a workload spec from a YAML file on disk.
    pub fn from_file(path: &Path) -> Result<Workload> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HctlError::from(ErrorKind::validation(format!(
                "could not read workload file {}: {}",
                path.display(),
                e
            )))
        })?;
        Workload::from_str(&raw)
    }

    /// Parse and validate a workload spec from a YAML string.
    pub fn from_str(raw: &str) -> Result<Workload> {
        let wl: Workload = serde_yaml::from_str(raw)
            .map_err(|e| ErrorKind::validation(format!("invalid workload spec: {}", e)))?;
        wl.validate()?;
        Ok(wl)
    }

    fn validate(&self) -> Result<()> {
        if !NAME_RE.is_match(&self.metadata.name) {
            return Err(ErrorKind::validation(format!(
                "workload name '{}' must be lowercase alphanumerics and '-'",
                self.metadata.name
            ))
            .into());
        }
        if self.containers.is_empty() {
            return Err(ErrorKind::validation("workload must declare at least one container").into());
        }
        for (cname, c) in &self.containers {
            if c.image.is_empty() {
                return Err(ErrorKind::validation(format!(
                    "container '{}' must set image (or '.' to inherit)",
                    cname
                ))
                .into());
            }
            for (mount, vol) in &c.volumes {
                if !self.resources.contains_key(&vol.source) {
                    return Err(ErrorKind::validation(format!(
                        "container '{}' volume '{}' references undefined resource '{}'",
                        cname, mount, vol.source
                    ))
                    .into());
                }
            }
        }
        for (rname, rspec) in &self.resources {
            if rspec.kind.is_empty() {
                return Err(
                    ErrorKind::validation(format!("resource '{}' is missing a type", rname)).into(),
                );
            }
        }
        Ok(())
    }

    /// The primary container: the lexicographically smallest name. `BTreeMap` already iterates in key order so this is just
    /// the first entry.
    pub fn primary_container(&self) -> Option<(&String, &Container)> {
        self.containers.iter().next()
    }

    /// Containers other than the primary one, in name order.
    pub fn additional_containers(&self) -> Vec<(&String, &Container)> {
        self.containers.iter().skip(1).collect()
    }

    /// Value of the `<platform>/cluster` annotation, or empty string if unset.
    pub fn target_cluster(&self) -> String {
        self.metadata
            .annotations
            .get(CLUSTER_ANNOTATION_KEY)
            .cloned()
            .unwrap_or_default()
    }

    /// Value of the `<platform>/namespace` annotation, or empty string.
    pub fn target_namespace_override(&self) -> String {
        self.metadata
            .annotations
            .get(NAMESPACE_ANNOTATION_KEY)
            .cloned()
            .unwrap_or_default()
    }

    /// The ordered subset of `resources` whose declared type equals `kind`.
    /// Resource names are iterated in sorted order, deliberately, rather
    /// than the source mapping's insertion order, so provisioning is
    /// reproducible.
    pub fn resources_by_type<'a>(&'a self, kind: &str) -> Vec<(&'a String, &'a ResourceSpec)> {
        self.resources.iter().filter(|(_, r)| r.kind == kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
metadata: {name: "hello"}
containers: {web: {image: "nginx:1.25", variables: {GREETING: "hi"}}}
service: {ports: {http: {port: 80}}}
"#;

    #[test]
    fn parses_minimal_workload() {
        let wl = Workload::from_str(MINIMAL).unwrap();
        assert_eq!(wl.metadata.name, "hello");
        assert_eq!(wl.containers["web"].image, "nginx:1.25");
        assert_eq!(wl.service.ports["http"].port, 80);
    }

    #[test]
    fn rejects_invalid_name() {
        let bad = MINIMAL.replace("hello", "Hello_World");
        assert!(Workload::from_str(&bad).is_err());
    }

    #[test]
    fn rejects_zero_containers() {
        let bad = r#"
metadata: {name: "hello"}
containers: {}
"#;
        assert!(Workload::from_str(bad).is_err());
    }

    #[test]
    fn primary_container_is_lexicographically_smallest() {
        let raw = r#"
metadata: {name: "hello"}
containers:
  zeta: {image: "a"}
  alpha: {image: "b"}
"#;
        let wl = Workload::from_str(raw).unwrap();
        let (name, _) = wl.primary_container().unwrap();
        assert_eq!(name, "alpha");
        assert_eq!(wl.additional_containers().len(), 1);
        assert_eq!(wl.additional_containers()[0].0, "zeta");
    }

    #[test]
    fn classifies_variable_shapes() {
        assert_eq!(classify_variable("literal"), VariableRef::Literal("literal".into()));
        assert_eq!(
            classify_variable("${resources.db.password}"),
            VariableRef::ResourceOutput { resource: "db".into(), key: "password".into() }
        );
        assert_eq!(
            classify_variable("$(my-secret:token)"),
            VariableRef::DirectSecret { secret: "my-secret".into(), key: "token".into() }
        );
    }

    #[test]
    fn target_cluster_annotation() {
        let raw = format!(
            "metadata: {{name: \"hello\", annotations: {{{}: \"the-cluster\"}}}}\ncontainers: {{web: {{image: \"x\"}}}}",
            CLUSTER_ANNOTATION_KEY
        );
        let wl = Workload::from_str(&raw).unwrap();
        assert_eq!(wl.target_cluster(), "the-cluster");
    }

    #[test]
    fn volume_must_reference_declared_resource() {
        let raw = r#"
metadata: {name: "hello"}
containers:
  web:
    image: "x"
    volumes:
      data: {source: "missing", path: "/data"}
"#;
        assert!(Workload::from_str(raw).is_err());
    }
}
