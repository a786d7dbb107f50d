// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Replaying archive entries onto the local filesystem.

use std::collections::HashSet;
use std::fs::{self, File, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use super::reader::{EntrySink, PodFile, PodFileKind};
use super::{container_entry_name, SandboxMetadata};
use crate::error::{ArchiveError, PodmigError, PodmigResult};
use crate::runtime::config_pod_uid;
use crate::types::ContainerName;

/// A container checkpoint staged to a local file, awaiting import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCheckpoint {
    pub name: ContainerName,
    pub path: PathBuf,
    pub size: u64,
}

/// Sink that stages container checkpoints under a scratch directory and
/// recreates pod working directory entries under `fs_root`.
#[derive(Debug)]
pub struct DiskSink {
    staging_dir: PathBuf,
    fs_root: PathBuf,
    target_pod_uid: Option<String>,
    uid_remap: Option<(String, String)>,
    staged: Vec<StagedCheckpoint>,
    replayed: usize,
    /// Symlinks created under `fs_root` so far.
    links: HashSet<PathBuf>,
}

impl DiskSink {
    pub fn new(staging_dir: impl Into<PathBuf>, fs_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            fs_root: fs_root.into(),
            target_pod_uid: None,
            uid_remap: None,
            staged: Vec::new(),
            replayed: 0,
            links: HashSet::new(),
        }
    }

    /// Replay pod files under `uid` instead of the archived pod UID.
    ///
    /// Path components equal to the UID recorded in the sandbox metadata are
    /// replaced; the metadata entry precedes the pod files in the stream.
    pub fn with_target_pod_uid(mut self, uid: impl Into<String>) -> Self {
        self.target_pod_uid = Some(uid.into());
        self
    }

    /// Checkpoints staged so far, in stream order.
    pub fn staged(&self) -> &[StagedCheckpoint] {
        &self.staged
    }

    pub fn into_staged(self) -> Vec<StagedCheckpoint> {
        self.staged
    }

    /// Number of pod directory entries recreated.
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    fn remap(&self, path: &Path) -> PathBuf {
        match &self.uid_remap {
            Some((old, new)) => path
                .components()
                .map(|c| match c {
                    Component::Normal(part) if part == old.as_str() => {
                        Component::Normal(new.as_ref())
                    }
                    other => other,
                })
                .collect(),
            None => path.to_path_buf(),
        }
    }

    /// Local location of an absolute archived path.
    fn target_path(&self, path: &Path) -> PathBuf {
        let path = self.remap(path);
        let relative = path.strip_prefix("/").unwrap_or(&path);
        self.fs_root.join(relative)
    }

    /// Refuse `target` when it lies below a symlink replayed by this sink,
    /// so archived links cannot redirect later entries out of `fs_root`.
    fn ensure_contained(&self, file: &PodFile, target: &Path) -> PodmigResult<()> {
        match target.ancestors().skip(1).find(|dir| self.links.contains(*dir)) {
            Some(link) => {
                tracing::warn!(
                    entry = %file.path.display(),
                    through = %link.display(),
                    "Refusing pod file below a replayed symlink"
                );
                Err(unsafe_path(file))
            }
            None => Ok(()),
        }
    }
}

fn unsafe_path(file: &PodFile) -> PodmigError {
    ArchiveError::UnsafePath {
        name: super::pod_dir_entry_name(&file.path),
    }
    .into()
}

/// Remove a non-directory entry at `path` so it is not followed on write.
fn remove_existing(path: &Path) -> PodmigResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path)
            .map_err(|e| PodmigError::io(format!("replace {}", path.display()), e)),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PodmigError::io(format!("inspect {}", path.display()), e)),
    }
}

fn ensure_parent(path: &Path) -> PodmigResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PodmigError::io(format!("create {}", parent.display()), e))?;
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> PodmigResult<()> {
    fs::set_permissions(path, Permissions::from_mode(mode & 0o7777))
        .map_err(|e| PodmigError::io(format!("chmod {}", path.display()), e))
}

impl EntrySink for DiskSink {
    fn sandbox_metadata(&mut self, metadata: &SandboxMetadata) -> PodmigResult<()> {
        let Some(new) = self.target_pod_uid.as_deref() else {
            return Ok(());
        };
        match config_pod_uid(metadata.config()) {
            Some(old) if old != new => {
                tracing::debug!(from = %old, to = %new, "Remapping pod UID in replayed paths");
                self.uid_remap = Some((old.to_string(), new.to_string()));
            }
            Some(_) => {}
            None => tracing::warn!("Archived sandbox config has no pod UID, paths are not remapped"),
        }
        Ok(())
    }

    fn container_checkpoint(
        &mut self,
        name: &ContainerName,
        body: &mut dyn Read,
    ) -> PodmigResult<()> {
        let path = self.staging_dir.join(container_entry_name(name));
        let mut file = File::create(&path)
            .map_err(|e| PodmigError::io(format!("create {}", path.display()), e))?;
        let size = io::copy(body, &mut file)
            .map_err(|e| PodmigError::io(format!("stage checkpoint of {}", name), e))?;

        tracing::debug!(container = %name, size, "Staged container checkpoint");
        self.staged.push(StagedCheckpoint {
            name: name.clone(),
            path,
            size,
        });
        Ok(())
    }

    fn pod_file(&mut self, file: &PodFile, body: &mut dyn Read) -> PodmigResult<()> {
        let target = self.target_path(&file.path);
        self.ensure_contained(file, &target)?;

        match &file.kind {
            PodFileKind::Directory => {
                if self.links.contains(&target) {
                    return Err(unsafe_path(file));
                }
                fs::create_dir_all(&target)
                    .map_err(|e| PodmigError::io(format!("create {}", target.display()), e))?;
                set_mode(&target, file.mode)?;
            }
            PodFileKind::File => {
                ensure_parent(&target)?;
                remove_existing(&target)?;
                self.links.remove(&target);
                let mut out = File::create(&target)
                    .map_err(|e| PodmigError::io(format!("create {}", target.display()), e))?;
                io::copy(body, &mut out)
                    .map_err(|e| PodmigError::io(format!("write {}", target.display()), e))?;
                set_mode(&target, file.mode)?;
            }
            PodFileKind::Symlink(link) => {
                ensure_parent(&target)?;
                remove_existing(&target)?;
                let link = if link.is_absolute() {
                    self.remap(link)
                } else {
                    link.clone()
                };
                symlink(&link, &target)
                    .map_err(|e| PodmigError::io(format!("symlink {}", target.display()), e))?;
                self.links.insert(target);
            }
        }

        self.replayed += 1;
        Ok(())
    }
}
