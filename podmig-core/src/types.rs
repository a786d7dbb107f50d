// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated identities.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Length of the abbreviated identifiers used in log lines.
const SHORT_ID_LEN: usize = 13;

/// Maximum length of a container or checkpoint name.
const MAX_NAME_LEN: usize = 253;

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            value: String::new(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Names end up inside archive entry names and image references, so they are
/// restricted to a conservative character set.
fn require_plain_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    require_non_empty(field, value)?;

    if value.len() > MAX_NAME_LEN {
        return Err(ConfigError::InvalidField {
            field,
            value: value.to_string(),
            reason: format!("too long: {} chars (max {})", value.len(), MAX_NAME_LEN),
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must contain only ASCII alphanumerics, '-', '_' and '.'".to_string(),
        });
    }

    if value == "." || value == ".." {
        return Err(ConfigError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must not be a relative path component".to_string(),
        });
    }

    Ok(())
}

fn abbreviate(value: &str) -> &str {
    match value.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Host-local sandbox identifier assigned by the sandbox service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SandboxId(String);

impl SandboxId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        require_non_empty("sandbox_id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        abbreviate(&self.0)
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SandboxId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SandboxId> for String {
    fn from(id: SandboxId) -> Self {
        id.0
    }
}

/// Runtime-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        require_non_empty("container_id", &id)?;
        Ok(Self(id))
    }

    /// Identity built by an id generator; never empty.
    pub(crate) fn from_generated(id: String) -> Self {
        debug_assert!(!id.is_empty());
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        abbreviate(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Container name as declared in the pod, stable across checkpoint and restore.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        require_plain_name("container_name", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

/// Caller-chosen identifier of one checkpoint run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        require_plain_name("checkpoint_id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an image record in the runtime's image store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageName(String);

impl ImageName {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        require_non_empty("image_name", &name)?;
        Ok(Self(name))
    }

    /// Image name for a container checkpoint taken in run `checkpoint_id`.
    pub fn for_checkpoint(
        checkpoint_id: &CheckpointId,
        pod: &PodRef,
        container: &ContainerName,
    ) -> Self {
        Self(format!(
            "checkpoint-{}:{}_{}_{}",
            checkpoint_id, pod.namespace, pod.name, container
        ))
    }

    /// Derived name under which a rewritten copy of this image is registered.
    pub fn restore_variant(&self) -> Self {
        Self(format!("restore-{}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ImageName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageName> for String {
    fn from(name: ImageName) -> Self {
        name.0
    }
}

/// Namespaced pod reference, displayed as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, ConfigError> {
        let namespace = namespace.into();
        let name = name.into();
        require_non_empty("pod_namespace", &namespace)?;
        require_non_empty("pod_name", &name)?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
