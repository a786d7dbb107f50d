// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Any invalid field results in a ConfigError before anything touches the node.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::backend::RuntimeKind;
use crate::error::{ConfigError, PodmigError, PodmigResult};

/// Raw runtime section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuntimeConfig {
    #[serde(default = "default_runtime_kind")]
    kind: String,
    #[serde(default = "default_endpoint")]
    endpoint: String,
}

fn default_runtime_kind() -> String {
    "containerd".to_string()
}

fn default_endpoint() -> String {
    "unix:///run/containerd/containerd.sock".to_string()
}

impl Default for RawRuntimeConfig {
    fn default() -> Self {
        Self {
            kind: default_runtime_kind(),
            endpoint: default_endpoint(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheckpointConfig {
    #[serde(default = "default_tmp_dir")]
    tmp_dir: String,
    #[serde(default)]
    retain_checkpoint_images: bool,
    #[serde(default = "default_true")]
    export_pod_dir: bool,
    #[serde(default = "default_kubelet_pods_dir")]
    kubelet_pods_dir: String,
}

fn default_tmp_dir() -> String {
    "/tmp".to_string()
}

fn default_true() -> bool {
    true
}

fn default_kubelet_pods_dir() -> String {
    "/var/lib/kubelet/pods".to_string()
}

impl Default for RawCheckpointConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            retain_checkpoint_images: false,
            export_pod_dir: true,
            kubelet_pods_dir: default_kubelet_pods_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRestoreConfig {
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default)]
    ready_timeout_ms: Option<u64>,
    #[serde(default = "default_fs_root")]
    fs_root: String,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_fs_root() -> String {
    "/".to_string()
}

impl Default for RawRestoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            ready_timeout_ms: None,
            fs_root: default_fs_root(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    runtime: RawRuntimeConfig,
    #[serde(default)]
    checkpoint: RawCheckpointConfig,
    #[serde(default)]
    restore: RawRestoreConfig,
}

/// Validated runtime connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,
    /// Address of the runtime's API socket.
    ///
    /// Advisory: podmig drives already connected [`NodeServices`]; embedders
    /// read this to build their sandbox and runtime clients.
    ///
    /// [`NodeServices`]: crate::backend::NodeServices
    pub endpoint: String,
}

/// Validated checkpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointConfig {
    /// Parent of the per-run staging directory.
    pub tmp_dir: PathBuf,
    pub retain_checkpoint_images: bool,
    pub export_pod_dir: bool,
    pub kubelet_pods_dir: PathBuf,
}

/// Validated restore settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreConfig {
    pub poll_interval: Duration,
    /// `None` waits for readiness until the caller cancels.
    pub ready_timeout: Option<Duration>,
    /// Prefix applied to replayed pod directory paths.
    pub fs_root: PathBuf,
}

/// Complete validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub checkpoint: CheckpointConfig,
    pub restore: RestoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Containerd,
            endpoint: default_endpoint(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            tmp_dir: PathBuf::from(default_tmp_dir()),
            retain_checkpoint_images: false,
            export_pod_dir: true,
            kubelet_pods_dir: PathBuf::from(default_kubelet_pods_dir()),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            ready_timeout: None,
            fs_root: PathBuf::from(default_fs_root()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            checkpoint: CheckpointConfig::default(),
            restore: RestoreConfig::default(),
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> PodmigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PodmigError::io(format!("reading config file {}", path.display()), e))?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> PodmigResult<Config> {
        // An empty or comment-only document deserializes to nothing.
        let raw: Option<RawConfig> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                message: format!("YAML parse error: {}", e),
            })?;

        Ok(Self::validate(raw.unwrap_or_default())?)
    }

    fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
        Ok(Config {
            runtime: Self::validate_runtime(raw.runtime)?,
            checkpoint: Self::validate_checkpoint(raw.checkpoint)?,
            restore: Self::validate_restore(raw.restore)?,
        })
    }

    fn validate_runtime(raw: RawRuntimeConfig) -> Result<RuntimeConfig, ConfigError> {
        let kind: RuntimeKind = raw.kind.parse()?;

        if raw.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "runtime.endpoint",
                value: raw.endpoint,
                reason: "must not be empty".to_string(),
            });
        }

        Ok(RuntimeConfig {
            kind,
            endpoint: raw.endpoint,
        })
    }

    fn validate_checkpoint(raw: RawCheckpointConfig) -> Result<CheckpointConfig, ConfigError> {
        Ok(CheckpointConfig {
            tmp_dir: absolute_path("checkpoint.tmp_dir", raw.tmp_dir)?,
            retain_checkpoint_images: raw.retain_checkpoint_images,
            export_pod_dir: raw.export_pod_dir,
            kubelet_pods_dir: absolute_path("checkpoint.kubelet_pods_dir", raw.kubelet_pods_dir)?,
        })
    }

    fn validate_restore(raw: RawRestoreConfig) -> Result<RestoreConfig, ConfigError> {
        if raw.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "restore.poll_interval_ms",
                value: "0".to_string(),
                reason: "Poll interval must be greater than 0".to_string(),
            });
        }

        if raw.ready_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "restore.ready_timeout_ms",
                value: "0".to_string(),
                reason: "Timeout must be greater than 0; omit it to wait until cancelled"
                    .to_string(),
            });
        }

        Ok(RestoreConfig {
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            ready_timeout: raw.ready_timeout_ms.map(Duration::from_millis),
            fs_root: absolute_path("restore.fs_root", raw.fs_root)?,
        })
    }
}

fn absolute_path(field: &'static str, value: String) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(&value);
    if !path.is_absolute() {
        return Err(ConfigError::InvalidField {
            field,
            value,
            reason: "must be an absolute path".to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
runtime:
  kind: containerd
  endpoint: unix:///run/k3s/containerd/containerd.sock
checkpoint:
  tmp_dir: /var/tmp
  retain_checkpoint_images: true
  export_pod_dir: false
  kubelet_pods_dir: /var/lib/kubelet/pods
restore:
  poll_interval_ms: 250
  ready_timeout_ms: 60000
  fs_root: /mnt/node
"#;

    #[test]
    fn test_full_config() {
        let config = ConfigLoader::load_string(FULL_CONFIG).unwrap();
        assert_eq!(config.runtime.kind, RuntimeKind::Containerd);
        assert_eq!(
            config.runtime.endpoint,
            "unix:///run/k3s/containerd/containerd.sock"
        );
        assert_eq!(config.checkpoint.tmp_dir, PathBuf::from("/var/tmp"));
        assert!(config.checkpoint.retain_checkpoint_images);
        assert!(!config.checkpoint.export_pod_dir);
        assert_eq!(config.restore.poll_interval, Duration::from_millis(250));
        assert_eq!(config.restore.ready_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.restore.fs_root, PathBuf::from("/mnt/node"));
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.runtime.kind, RuntimeKind::Containerd);
        assert_eq!(
            config.runtime.endpoint,
            "unix:///run/containerd/containerd.sock"
        );
        assert_eq!(config.checkpoint.tmp_dir, PathBuf::from("/tmp"));
        assert!(!config.checkpoint.retain_checkpoint_images);
        assert!(config.checkpoint.export_pod_dir);
        assert_eq!(config.restore.poll_interval, Duration::from_secs(1));
        assert_eq!(config.restore.ready_timeout, None);
        assert_eq!(config.restore.fs_root, PathBuf::from("/"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ConfigLoader::load_string("restore:\n  poll_interval_ms: 10\n").unwrap();
        assert_eq!(config.restore.poll_interval, Duration::from_millis(10));
        assert_eq!(config.restore.fs_root, PathBuf::from("/"));
        assert!(config.checkpoint.export_pod_dir);
    }

    #[test]
    fn test_unsupported_runtime() {
        let err = ConfigLoader::load_string("runtime:\n  kind: cri-o\n").unwrap_err();
        assert!(matches!(
            err,
            PodmigError::Configuration(ConfigError::UnsupportedRuntime { .. })
        ));
    }

    #[test]
    fn test_invalid_fields() {
        for yaml in [
            "runtime:\n  endpoint: \"\"\n",
            "restore:\n  poll_interval_ms: 0\n",
            "restore:\n  ready_timeout_ms: 0\n",
            "restore:\n  fs_root: relative\n",
            "checkpoint:\n  tmp_dir: tmp\n",
        ] {
            let err = ConfigLoader::load_string(yaml).unwrap_err();
            assert!(
                matches!(
                    err,
                    PodmigError::Configuration(ConfigError::InvalidField { .. })
                ),
                "{yaml}"
            );
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::load_string("checkpoint:\n  retain: true\n");
        assert!(matches!(
            result,
            Err(PodmigError::Configuration(ConfigError::Parse { .. }))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podmig.yaml");
        std::fs::write(&path, FULL_CONFIG).unwrap();
        let config = ConfigLoader::load_file(&path).unwrap();
        assert!(config.checkpoint.retain_checkpoint_images);

        let missing = ConfigLoader::load_file(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(
            missing,
            PodmigError::Configuration(ConfigError::NotFound { .. })
        ));
    }
}
