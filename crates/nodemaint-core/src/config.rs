use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/nodemaint/nodemaint.toml";
pub const DEFAULT_SPOOL_PATH: &str = "/var/spool/nodemaint";
pub const DEFAULT_PREPARE_DIR: &str = "/etc/nodemaint/prepare.d";
pub const DEFAULT_FINISH_DIR: &str = "/etc/nodemaint/finish.d";
pub const DEFAULT_DIRECTORY_TIMEOUT_SECS: u64 = 30;

/// Top-level config (nodemaint.toml + NODEMAINT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeMaintConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub snippets: SnippetsConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node is known by in the directory.
    #[serde(default = "default_node_id")]
    pub id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
        }
    }
}

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Root holding `requests/`, `archive/`, `.lock` and `.SEQ`.
    #[serde(default = "default_spool_path")]
    pub path: PathBuf,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: default_spool_path(),
        }
    }
}

/// Hook directories run around a maintenance window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetsConfig {
    /// Executables that take the node out of service.
    #[serde(default = "default_prepare_dir")]
    pub prepare_dir: PathBuf,
    /// Executables that bring the node back into service.
    #[serde(default = "default_finish_dir")]
    pub finish_dir: PathBuf,
}

impl Default for SnippetsConfig {
    fn default() -> Self {
        Self {
            prepare_dir: default_prepare_dir(),
            finish_dir: default_finish_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory API, without trailing slash.
    #[serde(default = "default_directory_url")]
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub token: Option<String>,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            token: None,
            timeout_secs: DEFAULT_DIRECTORY_TIMEOUT_SECS,
        }
    }
}

fn default_node_id() -> String {
    NodeId::local().0
}
fn default_spool_path() -> PathBuf {
    PathBuf::from(DEFAULT_SPOOL_PATH)
}
fn default_prepare_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PREPARE_DIR)
}
fn default_finish_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FINISH_DIR)
}
fn default_directory_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_directory_timeout() -> u64 {
    DEFAULT_DIRECTORY_TIMEOUT_SECS
}

impl NodeMaintConfig {
    /// Load config from a TOML file with NODEMAINT_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `NODEMAINT_SPOOL__PATH`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let config: NodeMaintConfig = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NODEMAINT_").split("__"))
            .extract()
            .map_err(|e| crate::error::NodeMaintError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = NodeMaintConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.spool.path, PathBuf::from(DEFAULT_SPOOL_PATH));
        assert_eq!(cfg.snippets.prepare_dir, PathBuf::from(DEFAULT_PREPARE_DIR));
        assert_eq!(cfg.directory.timeout_secs, DEFAULT_DIRECTORY_TIMEOUT_SECS);
        assert!(cfg.directory.token.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[node]
id = "web-12"

[spool]
path = "/tmp/nm-spool"

[directory]
base_url = "https://directory.example.org"
token = "s3cret"
"#
        )
        .unwrap();

        let cfg = NodeMaintConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.node.node_id().as_str(), "web-12");
        assert_eq!(cfg.spool.path, PathBuf::from("/tmp/nm-spool"));
        assert_eq!(cfg.directory.base_url, "https://directory.example.org");
        assert_eq!(cfg.directory.token.as_deref(), Some("s3cret"));
        // untouched section keeps its defaults
        assert_eq!(cfg.snippets.finish_dir, PathBuf::from(DEFAULT_FINISH_DIR));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[spool\npath = ").unwrap();
        let err = NodeMaintConfig::load(file.path().to_str()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
