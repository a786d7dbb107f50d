// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pod checkpoint archive format.
//!
//! A gzip-compressed tar stream. Entries, in emission order:
//!
//! 1. `sandbox_info.json` - the captured [`SandboxInfo`] (exactly one;
//!    `sandbox_config.json` holding only the sandbox config is accepted on
//!    read)
//! 2. `container_<name>.tar` - one exported checkpoint image per container,
//!    most recently created container first; opaque to this module
//! 3. `kubelet_pod<absolute path>` - the pod's working directory, replayed at
//!    the same absolute location on restore
//!
//! Entries are written and read strictly in stream order.

mod reader;
mod replay;
mod writer;

use std::path::{Component, Path, PathBuf};

use crate::error::ArchiveError;
use crate::runtime::{SandboxConfig, SandboxInfo};
use crate::types::ContainerName;

pub use reader::{ArchiveReader, ArchiveSummary, EntrySink, ListingSink, PodFile, PodFileKind};
pub use replay::{DiskSink, StagedCheckpoint};
pub use writer::ArchiveWriter;

/// Entry holding the full sandbox info.
pub const SANDBOX_INFO_ENTRY: &str = "sandbox_info.json";
/// Entry holding only the portable sandbox config.
pub const SANDBOX_CONFIG_ENTRY: &str = "sandbox_config.json";
/// Prefix of container checkpoint entries.
pub const CONTAINER_ENTRY_PREFIX: &str = "container_";
/// Suffix of container checkpoint entries.
pub const CONTAINER_ENTRY_SUFFIX: &str = ".tar";
/// Prefix of pod working directory entries.
pub const POD_DIR_ENTRY_PREFIX: &str = "kubelet_pod";

/// Archive entry name of a container's checkpoint image.
pub fn container_entry_name(name: &ContainerName) -> String {
    format!("{}{}{}", CONTAINER_ENTRY_PREFIX, name, CONTAINER_ENTRY_SUFFIX)
}

/// Archive entry name of a pod working directory path.
pub fn pod_dir_entry_name(path: &Path) -> String {
    format!("{}{}", POD_DIR_ENTRY_PREFIX, path.display())
}

/// Sandbox metadata found in an archive.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxMetadata {
    /// Full info, including the source sandbox identity.
    Info(SandboxInfo),
    /// Reduced variant: the portable config only.
    Config(SandboxConfig),
}

impl SandboxMetadata {
    pub fn config(&self) -> &SandboxConfig {
        match self {
            Self::Info(info) => &info.config,
            Self::Config(config) => config,
        }
    }

    pub fn info(&self) -> Option<&SandboxInfo> {
        match self {
            Self::Info(info) => Some(info),
            Self::Config(_) => None,
        }
    }
}

/// What an entry name denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    SandboxInfo,
    SandboxConfig,
    ContainerCheckpoint(ContainerName),
    PodFile(PathBuf),
    Unknown,
}

/// Classify an entry by its name.
pub fn classify(name: &str) -> Result<EntryKind, ArchiveError> {
    if name == SANDBOX_INFO_ENTRY {
        return Ok(EntryKind::SandboxInfo);
    }
    if name == SANDBOX_CONFIG_ENTRY {
        return Ok(EntryKind::SandboxConfig);
    }

    if let Some(rest) = name.strip_prefix(CONTAINER_ENTRY_PREFIX) {
        let container = rest
            .strip_suffix(CONTAINER_ENTRY_SUFFIX)
            .ok_or_else(|| ArchiveError::InvalidEntry {
                name: name.to_string(),
                reason: format!("container entries must end with {}", CONTAINER_ENTRY_SUFFIX),
            })?;
        let container =
            ContainerName::new(container).map_err(|e| ArchiveError::InvalidEntry {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(EntryKind::ContainerCheckpoint(container));
    }

    if let Some(path) = name.strip_prefix(POD_DIR_ENTRY_PREFIX) {
        let path = PathBuf::from(path);
        if !path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return Err(ArchiveError::UnsafePath {
                name: name.to_string(),
            });
        }
        return Ok(EntryKind::PodFile(path));
    }

    Ok(EntryKind::Unknown)
}
