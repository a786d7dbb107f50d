// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container runtime spec rewriting.
//!
//! A checkpoint image embeds the container's runtime spec, which refers to the
//! sandbox it was created in by id (annotations, mount sources) and by pid
//! (`/proc/<pid>/ns/*` namespace paths). Restoring into a new sandbox requires
//! substituting those identities. Only the fields below are touched:
//!
//! - annotations whose value is exactly the old sandbox id
//! - sources of the `/etc/hostname`, `/etc/resolv.conf` and `/dev/shm` mounts
//! - namespace paths under `/proc/<old pid>`
//! - mount sources containing the old pod UID, when the pod UID changes
//!
//! This is the known minimum for containerd checkpoints, not an exhaustive
//! list of every identity a spec can carry.

use std::collections::BTreeMap;

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::IntegrityError;
use crate::types::SandboxId;

/// Type URL of a runtime spec wrapped in a protobuf `Any`.
pub const RUNTIME_SPEC_TYPE_URL: &str = "types.containerd.io/opencontainers/runtime-spec/1/Spec";

/// Mount destinations whose source directory is scoped to the sandbox id.
const SANDBOX_SCOPED_MOUNTS: [&str; 3] = ["/etc/hostname", "/etc/resolv.conf", "/dev/shm"];

/// Runtime spec, modelled only as far as it is rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Linux {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<LinuxNamespace>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RuntimeSpec {
    /// Source of the mount at `destination`, if there is one.
    pub fn mount_source(&self, destination: &str) -> Option<&str> {
        self.mounts
            .iter()
            .find(|m| m.destination == destination)
            .and_then(|m| m.source.as_deref())
    }

    /// Path of the namespace of the given type, if it joins an existing one.
    pub fn namespace_path(&self, kind: &str) -> Option<&str> {
        self.linux
            .as_ref()?
            .namespaces
            .iter()
            .find(|ns| ns.kind == kind)
            .and_then(|ns| ns.path.as_deref())
    }
}

/// Host-local identity of a sandbox, the subject of a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxIdentity {
    pub id: SandboxId,
    pub pid: u32,
    pub pod_uid: Option<String>,
}

/// Rewrite `spec` so it refers to `new` wherever it referred to `old`.
///
/// Pure: the same inputs always produce an identical spec, and therefore an
/// identical encoded blob.
pub fn rewrite(spec: &RuntimeSpec, old: &SandboxIdentity, new: &SandboxIdentity) -> RuntimeSpec {
    let mut spec = spec.clone();
    let old_id = old.id.as_str();
    let new_id = new.id.as_str();

    if old_id != new_id {
        for value in spec.annotations.values_mut() {
            if value == old_id {
                *value = new_id.to_string();
            }
        }

        for mount in spec
            .mounts
            .iter_mut()
            .filter(|m| SANDBOX_SCOPED_MOUNTS.contains(&m.destination.as_str()))
        {
            if let Some(source) = mount.source.as_mut() {
                *source = source.replace(old_id, new_id);
            }
        }
    }

    if old.pid != new.pid && old.pid != 0 {
        let old_prefix = format!("/proc/{}", old.pid);
        let new_prefix = format!("/proc/{}", new.pid);
        if let Some(linux) = spec.linux.as_mut() {
            for ns in linux.namespaces.iter_mut() {
                if let Some(path) = ns.path.as_mut() {
                    if let Some(rest) = strip_path_prefix(path, &old_prefix) {
                        *path = format!("{}{}", new_prefix, rest);
                    }
                }
            }
        }
    }

    if let (Some(old_uid), Some(new_uid)) = (old.pod_uid.as_deref(), new.pod_uid.as_deref()) {
        if !old_uid.is_empty() && old_uid != new_uid {
            for source in spec.mounts.iter_mut().filter_map(|m| m.source.as_mut()) {
                *source = source.replace(old_uid, new_uid);
            }
        }
    }

    spec
}

/// `path` minus `prefix`, only when the prefix ends on a path component.
fn strip_path_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Decode a runtime configuration blob (protobuf `Any` around the JSON spec).
pub fn decode_config_blob(data: &[u8]) -> Result<RuntimeSpec, IntegrityError> {
    let any = prost_types::Any::decode(data).map_err(|e| IntegrityError::Malformed {
        what: "runtime config envelope",
        reason: e.to_string(),
    })?;

    if any.type_url != RUNTIME_SPEC_TYPE_URL {
        return Err(IntegrityError::Malformed {
            what: "runtime config envelope",
            reason: format!(
                "unexpected type url {:?}, must be {:?}",
                any.type_url, RUNTIME_SPEC_TYPE_URL
            ),
        });
    }

    serde_json::from_slice(&any.value).map_err(|e| IntegrityError::Malformed {
        what: "runtime spec",
        reason: e.to_string(),
    })
}

/// Encode a runtime spec as a runtime configuration blob.
pub fn encode_config_blob(spec: &RuntimeSpec) -> Result<Vec<u8>, IntegrityError> {
    let value = serde_json::to_vec(spec).map_err(|e| IntegrityError::Malformed {
        what: "runtime spec",
        reason: e.to_string(),
    })?;

    let any = prost_types::Any {
        type_url: RUNTIME_SPEC_TYPE_URL.to_string(),
        value,
    };
    Ok(any.encode_to_vec())
}
