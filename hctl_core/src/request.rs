//! The platform vCluster request data model.
//!
//! Field order in each struct below is deliberate: serde (and `serde_yaml`
//! on top of it) serializes struct fields in declaration order, which keeps
//! rendered-YAML field ordering stable and diffs readable. Don't reorder
//! these fields to "tidy them up".
use crate::error::{ErrorKind, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static DNS_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").unwrap());
static FQDN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").unwrap());
static CIDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}/\d{1,2}$").unwrap());
static IPV4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").unwrap());

pub fn is_dns_label(s: &str) -> bool {
    s.len() <= 63 && DNS_LABEL_RE.is_match(s)
}

pub fn is_fqdn(s: &str) -> bool {
    FQDN_RE.is_match(s)
}

pub fn is_cidr(s: &str) -> bool {
    if !CIDR_RE.is_match(s) {
        return false;
    }
    let (addr, prefix) = s.split_once('/').unwrap();
    is_ipv4(addr) && prefix.parse::<u8>().map(|p| p <= 32).unwrap_or(false)
}

pub fn is_ipv4(s: &str) -> bool {
    IPV4_RE.is_match(s) && s.split('.').all(|o| o.parse::<u16>().map(|n| n <= 255).unwrap_or(false))
}

/// The `vcluster create` preset, which supplies defaults for replicas,
/// persistence, and CoreDNS replica count.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Dev,
    Prod,
}

impl Preset {
    pub fn default_replicas(&self) -> u32 {
        match self {
            Preset::Dev => 1,
            Preset::Prod => 3,
        }
    }
    pub fn default_coredns_replicas(&self) -> u32 {
        match self {
            Preset::Dev => 1,
            Preset::Prod => 2,
        }
    }
    pub fn default_persistence(&self) -> bool {
        match self {
            Preset::Dev => false,
            Preset::Prod => true,
        }
    }
    pub fn default_persistence_size(&self) -> String {
        match self {
            Preset::Dev => "2Gi".to_string(),
            Preset::Prod => "20Gi".to_string(),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Preset::Dev),
            "prod" => Ok(Preset::Prod),
            other => Err(format!("unknown preset '{}' (expected dev or prod)", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    Standard,
    Strict,
}

impl std::str::FromStr for Isolation {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Isolation::Standard),
            "strict" => Ok(Isolation::Strict),
            other => Err(format!("unknown isolation '{}' (expected standard or strict)", other)),
        }
    }
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

impl std::str::FromStr for Protocol {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "SCTP" => Ok(Protocol::Sctp),
            other => Err(format!("unknown protocol '{}' (expected TCP, UDP, or SCTP)", other)),
        }
    }
}

/// The platform vCluster request custom resource.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VClusterRequest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: RequestMetadata,
    pub spec: RequestSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestMetadata {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestSpec {
    pub name: String,
    #[serde(rename = "targetNamespace")]
    pub target_namespace: String,
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub vcluster: VClusterSpec,
    pub integrations: Integrations,
    pub exposure: Exposure,
    #[serde(rename = "argocdApplication")]
    pub argocd_application: ArgocdApplicationSpec,
    #[serde(rename = "networkPolicies")]
    pub network_policies: NetworkPolicies,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VClusterSpec {
    pub preset: Preset,
    pub isolation: Isolation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(rename = "coreDnsReplicas", skip_serializing_if = "Option::is_none")]
    pub coredns_replicas: Option<u32>,
    pub persistence: PersistenceSpec,
    #[serde(rename = "staticVIP", skip_serializing_if = "Option::is_none")]
    pub static_vip: Option<String>,
    #[serde(rename = "subnetCIDR", skip_serializing_if = "Option::is_none")]
    pub subnet_cidr: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PersistenceSpec {
    pub enabled: bool,
    pub size: String,
    #[serde(rename = "storageClass", skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Integrations {
    #[serde(rename = "externalSecretStore", skip_serializing_if = "Option::is_none")]
    pub external_secret_store: Option<String>,
    #[serde(rename = "tlsIssuer", skip_serializing_if = "Option::is_none")]
    pub tls_issuer: Option<String>,
    #[serde(rename = "argocdEnvironment", skip_serializing_if = "Option::is_none")]
    pub argocd_environment: Option<String>,
    #[serde(rename = "workloadRepository", skip_serializing_if = "Option::is_none")]
    pub workload_repository: Option<WorkloadRepository>,
    #[serde(default, rename = "clusterLabels")]
    pub cluster_labels: BTreeMap<String, String>,
    #[serde(default, rename = "clusterAnnotations")]
    pub cluster_annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkloadRepository {
    pub url: String,
    #[serde(rename = "basePath")]
    pub base_path: String,
    #[serde(rename = "manifestPath")]
    pub manifest_path: String,
    pub revision: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Exposure {
    pub hostname: String,
    #[serde(rename = "apiPort")]
    pub api_port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArgocdApplicationSpec {
    #[serde(rename = "chartRepoURL")]
    pub chart_repo_url: String,
    #[serde(rename = "chartName")]
    pub chart_name: String,
    #[serde(rename = "chartVersion")]
    pub chart_version: String,
    #[serde(rename = "syncPolicy")]
    pub sync_policy: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NetworkPolicies {
    #[serde(default, rename = "egressAllowances")]
    pub egress_allowances: Vec<EgressAllowance>,
    #[serde(default, rename = "enableNFS")]
    pub enable_nfs: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EgressAllowance {
    pub name: String,
    pub cidr: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Default ArgoCD chart coordinates used when `vcluster create` is invoked
/// without `--chart-repo-url`/`--chart-version` (flag path) or the
/// corresponding wizard prompt is left blank (spec §6 S5: `vcluster create`
/// with only `--preset`/`--auto-commit` must still succeed).
pub const DEFAULT_CHART_REPO_URL: &str = "https://charts.loft.sh";
pub const DEFAULT_CHART_VERSION: &str = "0.19.5";

/// Well-known NFS server egress allowance inserted when `enableNFS` is set.
pub fn nfs_egress_allowance() -> EgressAllowance {
    EgressAllowance {
        name: "nfs".to_string(),
        cidr: "10.0.0.0/8".to_string(),
        port: 2049,
        protocol: Protocol::Tcp,
    }
}

/// Builder input: everything a caller (flag parser or wizard) must supply
/// before defaults and validation apply.
#[derive(Clone, Debug, Default)]
pub struct RequestInput {
    pub name: String,
    pub preset: Option<Preset>,
    pub isolation: Option<Isolation>,
    pub replicas: Option<u32>,
    pub coredns_replicas: Option<u32>,
    pub persistence: Option<bool>,
    pub persistence_size: Option<String>,
    pub storage_class: Option<String>,
    pub static_vip: Option<String>,
    pub subnet_cidr: Option<String>,
    pub external_secret_store: Option<String>,
    pub tls_issuer: Option<String>,
    pub argocd_environment: Option<String>,
    pub workload_repository: Option<WorkloadRepository>,
    pub cluster_labels: BTreeMap<String, String>,
    pub cluster_annotations: BTreeMap<String, String>,
    pub hostname: Option<String>,
    pub api_port: Option<u16>,
    pub chart_repo_url: String,
    pub chart_name: String,
    pub chart_version: String,
    pub sync_policy: Option<String>,
    pub egress_allowances: Vec<EgressAllowance>,
    pub enable_nfs: bool,
}

/// Parse a repeatable `<k>=<v>` flag into a label/annotation pair (spec
/// §4.H).
pub fn parse_kv_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(ErrorKind::validation(format!(
            "invalid key=value pair '{}': expected <k>=<v>",
            raw
        ))
        .into()),
    }
}

/// Parse a repeatable `<name>:<cidr>:<port>[:<proto>]` flag into an egress
/// allowance.
pub fn parse_egress_tuple(raw: &str) -> Result<EgressAllowance> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() < 3 || parts.len() > 4 {
        return Err(ErrorKind::validation(format!(
            "invalid egress tuple '{}': expected <name>:<cidr>:<port>[:<proto>]",
            raw
        ))
        .into());
    }
    let name = parts[0];
    if name.is_empty() {
        return Err(ErrorKind::validation("egress allowance name must not be empty").into());
    }
    let cidr = parts[1];
    if !is_cidr(cidr) {
        return Err(ErrorKind::validation(format!("invalid CIDR '{}'", cidr)).into());
    }
    let port: u16 = parts[2]
        .parse()
        .ok()
        .filter(|p| (1..=65535u32).contains(&(*p as u32)))
        .ok_or_else(|| ErrorKind::validation(format!("invalid port '{}': expected 1..65535", parts[2])))?;
    let protocol = if parts.len() == 4 {
        parts[3]
            .parse::<Protocol>()
            .map_err(ErrorKind::validation)?
    } else {
        Protocol::Tcp
    };
    Ok(EgressAllowance { name: name.to_string(), cidr: cidr.to_string(), port, protocol })
}

/// Render a `RequestInput` into the typed `VClusterRequest` the CLI writes
/// to Git.
///
/// This is the single validator shared by the one-shot flag path and the
/// interactive wizard:
/// both converge on a `RequestInput` and call this function.
pub fn build_request(input: RequestInput, platform_domain: &str) -> Result<VClusterRequest> {
    if !is_dns_label(&input.name) {
        return Err(ErrorKind::validation(format!(
            "vcluster name '{}' must be a valid DNS-1123 label",
            input.name
        ))
        .into());
    }
    let preset = input.preset.unwrap_or(Preset::Dev);
    let isolation = input.isolation.unwrap_or(Isolation::Standard);

    if input.static_vip.is_some() && input.subnet_cidr.is_none() {
        return Err(ErrorKind::validation(
            "a static VIP requires an explicit subnet CIDR",
        )
        .into());
    }
    if let Some(vip) = &input.static_vip {
        if !is_ipv4(vip) {
            return Err(ErrorKind::validation(format!("invalid static VIP '{}'", vip)).into());
        }
    }
    if let Some(cidr) = &input.subnet_cidr {
        if !is_cidr(cidr) {
            return Err(ErrorKind::validation(format!("invalid subnet CIDR '{}'", cidr)).into());
        }
    }

    let hostname = input.hostname.unwrap_or_else(|| format!("{}.{}", input.name, platform_domain));
    if !is_fqdn(&hostname) {
        return Err(ErrorKind::validation(format!(
            "exposure hostname '{}' must be a fully qualified DNS name",
            hostname
        ))
        .into());
    }

    url::Url::parse(&input.chart_repo_url).map_err(|e| {
        ErrorKind::validation(format!("chart repo URL '{}' is not a valid URL: {}", input.chart_repo_url, e))
    })?;

    let mut network_policies = NetworkPolicies {
        egress_allowances: input.egress_allowances,
        enable_nfs: input.enable_nfs,
    };
    if network_policies.enable_nfs
        && !network_policies.egress_allowances.iter().any(|a| a.name == "nfs")
    {
        network_policies.egress_allowances.push(nfs_egress_allowance());
    }

    Ok(VClusterRequest {
        api_version: "platform.hctl.io/v1alpha1".to_string(),
        kind: "VClusterOrchestrator".to_string(),
        metadata: RequestMetadata { name: input.name.clone() },
        spec: RequestSpec {
            name: input.name.clone(),
            target_namespace: input.name.clone(),
            project_name: input.name.clone(),
            vcluster: VClusterSpec {
                preset,
                isolation,
                replicas: Some(input.replicas.unwrap_or_else(|| preset.default_replicas())),
                coredns_replicas: Some(
                    input.coredns_replicas.unwrap_or_else(|| preset.default_coredns_replicas()),
                ),
                persistence: PersistenceSpec {
                    enabled: input.persistence.unwrap_or_else(|| preset.default_persistence()),
                    size: input
                        .persistence_size
                        .unwrap_or_else(|| preset.default_persistence_size()),
                    storage_class: input.storage_class,
                },
                static_vip: input.static_vip,
                subnet_cidr: input.subnet_cidr,
            },
            integrations: Integrations {
                external_secret_store: input.external_secret_store,
                tls_issuer: input.tls_issuer,
                argocd_environment: input.argocd_environment,
                workload_repository: input.workload_repository,
                cluster_labels: input.cluster_labels,
                cluster_annotations: input.cluster_annotations,
            },
            exposure: Exposure { hostname, api_port: input.api_port.unwrap_or(6443) },
            argocd_application: ArgocdApplicationSpec {
                chart_repo_url: input.chart_repo_url,
                chart_name: input.chart_name,
                chart_version: input.chart_version,
                sync_policy: input.sync_policy.unwrap_or_else(|| "automated".to_string()),
            },
            network_policies,
        },
    })
}

impl VClusterRequest {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ErrorKind::internal(format!("failed to render request YAML: {}", e)).into())
    }

    pub fn from_yaml(raw: &str) -> Result<VClusterRequest> {
        serde_yaml::from_str(raw)
            .map_err(|e| ErrorKind::validation(format!("invalid vcluster request YAML: {}", e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_input(name: &str) -> RequestInput {
        RequestInput {
            name: name.to_string(),
            chart_repo_url: "https://charts.example.com".to_string(),
            chart_name: "vcluster".to_string(),
            chart_version: "0.19.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn preset_determines_defaults() {
        let req = build_request(minimal_input("dev-1"), "platform.example.com").unwrap();
        assert_eq!(req.spec.vcluster.replicas, Some(1));
        assert!(!req.spec.vcluster.persistence.enabled);
        assert_eq!(req.spec.exposure.hostname, "dev-1.platform.example.com");
    }

    #[test]
    fn prod_preset_defaults_differ() {
        let mut input = minimal_input("prod-1");
        input.preset = Some(Preset::Prod);
        let req = build_request(input, "platform.example.com").unwrap();
        assert_eq!(req.spec.vcluster.replicas, Some(3));
        assert!(req.spec.vcluster.persistence.enabled);
    }

    #[test]
    fn rejects_invalid_dns_label() {
        let err = build_request(minimal_input("Not_Valid"), "platform.example.com").unwrap_err();
        assert_eq!(err.exit_code(), 20);
    }

    #[test]
    fn vip_without_subnet_is_rejected() {
        let mut input = minimal_input("dev-1");
        input.static_vip = Some("10.0.0.5".to_string());
        assert!(build_request(input, "platform.example.com").is_err());
    }

    #[test]
    fn subnet_without_vip_succeeds() {
        let mut input = minimal_input("dev-1");
        input.subnet_cidr = Some("10.0.0.0/24".to_string());
        assert!(build_request(input, "platform.example.com").is_ok());
    }

    #[test]
    fn neither_vip_nor_subnet_succeeds() {
        assert!(build_request(minimal_input("dev-1"), "platform.example.com").is_ok());
    }

    #[test]
    fn create_with_only_preset_uses_default_chart_coordinates() {
        // spec §6 S5: `vcluster create dev-1 --preset dev --auto-commit` must
        // succeed with no --chart-repo-url/--chart-version given.
        let input = RequestInput {
            name: "dev-1".to_string(),
            preset: Some(Preset::Dev),
            chart_repo_url: DEFAULT_CHART_REPO_URL.to_string(),
            chart_name: "vcluster".to_string(),
            chart_version: DEFAULT_CHART_VERSION.to_string(),
            ..Default::default()
        };
        let req = build_request(input, "platform.example.com").unwrap();
        assert_eq!(req.spec.name, "dev-1");
        assert_eq!(req.spec.vcluster.preset, Preset::Dev);
        assert_eq!(req.spec.exposure.hostname, "dev-1.platform.example.com");
        assert_eq!(req.spec.argocd_application.chart_repo_url, DEFAULT_CHART_REPO_URL);
    }

    #[test]
    fn round_trips_through_yaml() {
        let req = build_request(minimal_input("dev-1"), "platform.example.com").unwrap();
        let yaml = req.to_yaml().unwrap();
        let back = VClusterRequest::from_yaml(&yaml).unwrap();
        assert_eq!(back.spec.name, req.spec.name);
        assert_eq!(back.spec.vcluster.replicas, req.spec.vcluster.replicas);
        assert_eq!(back.spec.exposure.hostname, req.spec.exposure.hostname);
    }

    #[test]
    fn enable_nfs_adds_well_known_allowance() {
        let mut input = minimal_input("dev-1");
        input.enable_nfs = true;
        let req = build_request(input, "platform.example.com").unwrap();
        assert!(req.spec.network_policies.egress_allowances.iter().any(|a| a.name == "nfs"));
    }

    #[test]
    fn egress_tuple_parses_with_default_protocol() {
        let a = parse_egress_tuple("web:10.0.0.0/24:443").unwrap();
        assert_eq!(a.protocol, Protocol::Tcp);
        assert_eq!(a.port, 443);
    }

    #[test]
    fn egress_tuple_rejects_bad_port() {
        assert!(parse_egress_tuple("web:10.0.0.0/24:99999").is_err());
    }

    #[test]
    fn egress_tuple_rejects_bad_protocol() {
        assert!(parse_egress_tuple("web:10.0.0.0/24:443:ICMP").is_err());
    }

    #[test]
    fn kv_pair_parses() {
        assert_eq!(parse_kv_pair("team=platform").unwrap(), ("team".to_string(), "platform".to_string()));
        assert!(parse_kv_pair("noequals").is_err());
    }
}
