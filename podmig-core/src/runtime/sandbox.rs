// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sandbox lifecycle service interface and sandbox metadata.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::Labels;
use crate::error::{IntegrityError, RemoteResult};
use crate::spec::SandboxIdentity;
use crate::types::{PodRef, SandboxId};

/// Label carrying the pod name on a sandbox.
pub const LABEL_POD_NAME: &str = "io.kubernetes.pod.name";
/// Label carrying the pod namespace on a sandbox.
pub const LABEL_POD_NAMESPACE: &str = "io.kubernetes.pod.namespace";
/// Key of the verbose status entry holding the sandbox info document.
pub const STATUS_INFO_KEY: &str = "info";

/// Sandbox lifecycle service (list, inspect, create).
#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Sandboxes whose labels contain every entry of `selector`.
    async fn list_sandboxes(&self, selector: &Labels) -> RemoteResult<Vec<SandboxRef>>;

    /// Current state; `verbose` additionally fills `info`.
    async fn sandbox_status(&self, id: &SandboxId, verbose: bool) -> RemoteResult<SandboxStatus>;

    /// Create and start a sandbox from a portable configuration.
    async fn run_sandbox(&self, config: &SandboxConfig) -> RemoteResult<SandboxId>;
}

/// Portable sandbox configuration, opaque apart from `metadata.uid`.
pub type SandboxConfig = serde_json::Map<String, serde_json::Value>;

/// Label selector matching one pod's sandboxes.
pub fn pod_selector(pod: &PodRef) -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_POD_NAME.to_string(), pod.name.clone());
    labels.insert(LABEL_POD_NAMESPACE.to_string(), pod.namespace.clone());
    labels
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRef {
    pub id: SandboxId,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxState {
    Ready,
    NotReady,
    Unknown(String),
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "SANDBOX_READY"),
            Self::NotReady => write!(f, "SANDBOX_NOTREADY"),
            Self::Unknown(state) => write!(f, "{}", state),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxStatus {
    pub state: SandboxState,
    pub info: HashMap<String, String>,
}

/// Sandbox metadata captured at checkpoint time.
///
/// `id` and `pid` are only meaningful on the node and boot that produced
/// them; `config` is portable and recreates an equivalent sandbox elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: SandboxId,
    pub pid: u32,
    pub config: SandboxConfig,
    #[serde(rename = "runtimeSpec", default, skip_serializing_if = "Option::is_none")]
    pub runtime_spec: Option<serde_json::Value>,
}

/// Shape of the verbose `info` document. Anything else is refused.
#[derive(Debug, Deserialize)]
struct RawSandboxInfo {
    pid: u32,
    config: SandboxConfig,
    #[serde(rename = "runtimeSpec", default)]
    runtime_spec: Option<serde_json::Value>,
}

impl SandboxInfo {
    /// Parse the verbose status of sandbox `id`.
    ///
    /// The document is an unversioned side channel, so a missing key, a
    /// missing field or a zero pid is an integrity error rather than a
    /// partially filled value.
    pub fn from_status(id: SandboxId, status: &SandboxStatus) -> Result<Self, IntegrityError> {
        let raw = status
            .info
            .get(STATUS_INFO_KEY)
            .ok_or_else(|| IntegrityError::Malformed {
                what: "sandbox info",
                reason: format!("status of {} has no {:?} entry", id, STATUS_INFO_KEY),
            })?;

        let parsed: RawSandboxInfo =
            serde_json::from_str(raw).map_err(|e| IntegrityError::Malformed {
                what: "sandbox info",
                reason: e.to_string(),
            })?;

        if parsed.pid == 0 {
            return Err(IntegrityError::Malformed {
                what: "sandbox info",
                reason: "pid must be non-zero".to_string(),
            });
        }

        Ok(Self {
            id,
            pid: parsed.pid,
            config: parsed.config,
            runtime_spec: parsed.runtime_spec,
        })
    }

    /// Pod UID recorded in the sandbox config.
    pub fn pod_uid(&self) -> Option<&str> {
        config_pod_uid(&self.config)
    }

    pub fn identity(&self) -> SandboxIdentity {
        SandboxIdentity {
            id: self.id.clone(),
            pid: self.pid,
            pod_uid: self.pod_uid().map(str::to_string),
        }
    }
}

/// `metadata.uid` of a sandbox config.
pub fn config_pod_uid(config: &SandboxConfig) -> Option<&str> {
    config
        .get("metadata")?
        .get("uid")?
        .as_str()
        .filter(|uid| !uid.is_empty())
}

/// Replace `metadata.uid` of a sandbox config, creating `metadata` if needed.
pub fn set_config_pod_uid(config: &mut SandboxConfig, uid: &str) {
    let metadata = config
        .entry("metadata")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.insert(
            "uid".to_string(),
            serde_json::Value::String(uid.to_string()),
        );
    }
}
