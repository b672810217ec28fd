//! Persisted configuration: the `<config-home>/hctl/config.yaml`
//! file `hctl init` writes and every other command reads.
//!
//! Uses `dirs` to locate a per-user config directory, with a real
//! load/save round trip, since hctl has no single "current directory is
//! the manifest checkout" convention to fall back on.
use crate::error::{ErrorKind, Result};
use std::path::{Path, PathBuf};

/// How `hctl` should push generated/modified manifests back to Git (spec
/// §4.B "Git workspace helper").
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GitMode {
    /// Commit and push without asking.
    Auto,
    /// Show a diff and ask for confirmation before committing/pushing.
    Prompt,
    /// Write the files and stop; the operator commits by hand.
    Manual,
}

impl Default for GitMode {
    fn default() -> Self {
        GitMode::Prompt
    }
}

impl std::str::FromStr for GitMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(GitMode::Auto),
            "prompt" => Ok(GitMode::Prompt),
            "manual" => Ok(GitMode::Manual),
            other => Err(format!("unknown git mode '{}' (expected auto, prompt, or manual)", other)),
        }
    }
}

/// How `hctl` renders command output.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown output format '{}' (expected text, json, or yaml)", other)),
        }
    }
}

/// Platform-wide defaults: values that describe
/// the homelab installation itself rather than this particular invocation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PlatformDefaults {
    /// Base DNS domain new vCluster hostnames are suffixed with.
    pub domain: String,
    #[serde(rename = "platformNamespace")]
    pub platform_namespace: String,
    #[serde(rename = "requestsNamespace")]
    pub requests_namespace: String,
}

impl Default for PlatformDefaults {
    fn default() -> Self {
        PlatformDefaults {
            domain: "platform.local".to_string(),
            platform_namespace: "platform-system".to_string(),
            requests_namespace: "platform-requests".to_string(),
        }
    }
}

/// The persisted `hctl` configuration document.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(rename = "repoPath")]
    pub repo_path: PathBuf,
    #[serde(rename = "kubeContext", default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    #[serde(rename = "defaultCluster", default, skip_serializing_if = "Option::is_none")]
    pub default_cluster: Option<String>,
    #[serde(rename = "argocdURL")]
    pub argocd_url: String,
    #[serde(rename = "gitMode", default)]
    pub git_mode: GitMode,
    #[serde(default = "default_true")]
    pub interactive: bool,
    #[serde(rename = "outputFormat", default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub quiet: bool,
    pub platform: PlatformDefaults,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            repo_path: PathBuf::from("."),
            kube_context: None,
            default_cluster: None,
            argocd_url: "https://argocd.platform.local".to_string(),
            git_mode: GitMode::default(),
            interactive: true,
            output_format: OutputFormat::default(),
            verbose: false,
            quiet: false,
            platform: PlatformDefaults::default(),
        }
    }
}

impl Config {
    /// The path `hctl` reads and writes config from, honoring `$HCTL_CONFIG`
    /// when set and falling back to `<config-home>/hctl/config.yaml`
    /// (`dirs::config_dir()`).
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(over) = std::env::var("HCTL_CONFIG") {
            return Ok(PathBuf::from(over));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| ErrorKind::config("could not determine a config directory for this user"))?;
        Ok(base.join("hctl").join("config.yaml"))
    }

    /// Load config from `path`, writing a fresh default document if the
    /// file doesn't exist yet.
    pub fn load_or_init(path: &Path) -> Result<Config> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let cfg: Config = serde_yaml::from_str(&raw)
                    .map_err(|e| ErrorKind::config(format!("invalid config at {}: {}", path.display(), e)))?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Config::default();
                cfg.save(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ErrorKind::config(format!("could not read config at {}: {}", path.display(), e)).into()),
        }
    }

    /// Load config from `path`, failing if it doesn't exist (used by every
    /// command except `hctl init`).
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::config(format!(
                    "no config found at {} — run 'hctl init' first",
                    path.display()
                ))
            } else {
                ErrorKind::config(format!("could not read config at {}: {}", path.display(), e))
            }
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| ErrorKind::config(format!("invalid config at {}: {}", path.display(), e)).into())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ErrorKind::config(format!("could not create {}: {}", parent.display(), e)))?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ErrorKind::internal(format!("failed to render config: {}", e)))?;
        std::fs::write(path, yaml)
            .map_err(|e| ErrorKind::config(format!("could not write config to {}: {}", path.display(), e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_creates_defaults() {
        let dir = std::env::temp_dir().join(format!("hctl-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let _ = std::fs::remove_file(&path);

        let cfg = Config::load_or_init(&path).unwrap();
        assert_eq!(cfg.output_format, OutputFormat::Text);
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_rejects_missing_file() {
        let path = PathBuf::from("/nonexistent/hctl-config-does-not-exist.yaml");
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn round_trips_through_yaml() {
        let dir = std::env::temp_dir().join(format!("hctl-cfg-roundtrip-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut cfg = Config::default();
        cfg.git_mode = GitMode::Auto;
        cfg.default_cluster = Some("homelab-1".to_string());
        cfg.save(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f).unwrap();

        let back = Config::load(&path).unwrap();
        assert_eq!(back.git_mode, GitMode::Auto);
        assert_eq!(back.default_cluster, Some("homelab-1".to_string()));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn git_mode_parses_from_str() {
        assert_eq!("auto".parse::<GitMode>().unwrap(), GitMode::Auto);
        assert!("bogus".parse::<GitMode>().is_err());
    }
}
