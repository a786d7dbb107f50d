// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pod checkpoint orchestration.
//!
//! Freezes a pod's containers one at a time, newest first, turns each into a
//! checkpoint image and streams everything into a pod checkpoint archive.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::archive::{container_entry_name, ArchiveWriter};
use crate::cleanup::OnExit;
use crate::config::CheckpointConfig;
use crate::error::{ensure_active, PodmigError, PodmigResult};
use crate::runtime::{
    pod_selector, ContainerRuntime, ContainerSummary, SandboxInfo, SandboxService,
};
use crate::types::{CheckpointId, ContainerId, ContainerName, ImageName, PodRef, SandboxId};

/// Mount whose source lives in the pod's kubelet working directory.
const HOSTS_MOUNT: &str = "/etc/hosts";

/// What to checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRequest {
    pub pod: PodRef,
    /// Distinguishes the checkpoint images of this run from other runs.
    pub checkpoint_id: CheckpointId,
}

/// One archived container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointedContainer {
    pub name: ContainerName,
    pub id: ContainerId,
    pub image: ImageName,
    /// Size of the exported checkpoint image entry.
    pub size: u64,
}

/// Outcome of a successful checkpoint run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointReport {
    pub sandbox_id: SandboxId,
    /// Containers in archive order, most recently created first.
    pub containers: Vec<CheckpointedContainer>,
    /// Pod working directory included in the archive.
    pub pod_dir: Option<PathBuf>,
}

/// Resolve the single sandbox of `pod`.
///
/// # Errors
/// `SandboxNotFound` for no match, `AmbiguousSandbox` for more than one.
pub async fn resolve_sandbox(
    cancel: &CancellationToken,
    sandboxes: &dyn SandboxService,
    pod: &PodRef,
) -> PodmigResult<SandboxId> {
    ensure_active(cancel)?;
    let mut matches = sandboxes
        .list_sandboxes(&pod_selector(pod))
        .await
        .map_err(|e| PodmigError::remote("list sandboxes", pod, e))?;

    match matches.len() {
        0 => Err(PodmigError::SandboxNotFound { pod: pod.clone() }),
        1 => Ok(matches.remove(0).id),
        _ => Err(PodmigError::AmbiguousSandbox {
            pod: pod.clone(),
            ids: matches.into_iter().map(|s| s.id.to_string()).collect(),
        }),
    }
}

/// Order containers by creation time, oldest first. Ties keep listing order.
pub fn creation_order(mut containers: Vec<ContainerSummary>) -> Vec<ContainerSummary> {
    containers.sort_by_key(|c| c.created_at);
    containers
}

/// Drives a checkpoint run against the node's services.
pub struct Checkpointer<'a> {
    sandboxes: &'a dyn SandboxService,
    runtime: &'a dyn ContainerRuntime,
    settings: &'a CheckpointConfig,
}

impl<'a> Checkpointer<'a> {
    pub fn new(
        sandboxes: &'a dyn SandboxService,
        runtime: &'a dyn ContainerRuntime,
        settings: &'a CheckpointConfig,
    ) -> Self {
        Self {
            sandboxes,
            runtime,
            settings,
        }
    }

    /// Checkpoint `request.pod` into `out`.
    ///
    /// Nothing is written to `out` unless the pod resolves to exactly one
    /// sandbox. A failure after that leaves a truncated archive behind which
    /// the caller must discard.
    pub async fn checkpoint<W: Write + Send>(
        &self,
        cancel: &CancellationToken,
        request: &CheckpointRequest,
        out: W,
    ) -> PodmigResult<CheckpointReport> {
        let start = Instant::now();
        let pod = &request.pod;

        let sandbox_id = resolve_sandbox(cancel, self.sandboxes, pod).await?;

        ensure_active(cancel)?;
        let status = self
            .sandboxes
            .sandbox_status(&sandbox_id, true)
            .await
            .map_err(|e| PodmigError::remote("get sandbox status", &sandbox_id, e))?;
        let info = SandboxInfo::from_status(sandbox_id.clone(), &status)?;

        ensure_active(cancel)?;
        let listed = self
            .runtime
            .list_containers(&sandbox_id)
            .await
            .map_err(|e| PodmigError::remote("list containers", &sandbox_id, e))?;
        let containers = creation_order(listed);

        tracing::info!(
            pod = %pod,
            sandbox = %sandbox_id.short(),
            pid = info.pid,
            containers = containers.len(),
            "Checkpointing pod"
        );

        let pod_dir = self.pod_dir(cancel, &info, &containers).await?;

        let staging = tempfile::Builder::new()
            .prefix("podmig-checkpoint-")
            .tempdir_in(&self.settings.tmp_dir)
            .map_err(|e| {
                PodmigError::io(
                    format!("create staging dir in {}", self.settings.tmp_dir.display()),
                    e,
                )
            })?;

        let mut writer = ArchiveWriter::new(out);
        writer.write_sandbox_info(&info)?;

        let mut archived = Vec::with_capacity(containers.len());
        for container in containers.iter().rev() {
            let image = ImageName::for_checkpoint(&request.checkpoint_id, pod, &container.name);
            let size = self
                .checkpoint_container(cancel, container, &image, staging.path(), &mut writer)
                .await?;
            archived.push(CheckpointedContainer {
                name: container.name.clone(),
                id: container.id.clone(),
                image,
                size,
            });
        }

        if let Some(dir) = &pod_dir {
            let entries = writer.append_pod_dir(dir)?;
            tracing::info!(pod = %pod, dir = %dir.display(), entries, "Archived pod directory");
        }

        writer.finish()?;

        tracing::info!(
            pod = %pod,
            sandbox = %sandbox_id.short(),
            containers = archived.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Pod checkpoint completed"
        );

        Ok(CheckpointReport {
            sandbox_id,
            containers: archived,
            pod_dir,
        })
    }

    /// Pause, checkpoint, resume, export and archive one container.
    async fn checkpoint_container<W: Write + Send>(
        &self,
        cancel: &CancellationToken,
        container: &ContainerSummary,
        image: &ImageName,
        staging: &Path,
        writer: &mut ArchiveWriter<W>,
    ) -> PodmigResult<u64> {
        let id = &container.id;

        ensure_active(cancel)?;
        tracing::info!(container = %container.name, id = %id.short(), "Pausing task");
        self.runtime
            .pause_task(id)
            .await
            .map_err(|e| PodmigError::remote("pause task", id, e))?;

        let mut on_exit = OnExit::new();
        let runtime = self.runtime;
        let resume_id = id.clone();
        on_exit.defer(format!("resume task {}", id.short()), async move {
            runtime
                .resume_task(&resume_id)
                .await
                .map_err(|e| PodmigError::remote("resume task", &resume_id, e))
        });

        tracing::info!(container = %container.name, image = %image, "Checkpointing container");
        let checkpointed = self
            .runtime
            .checkpoint_container(id, image)
            .await
            .map_err(|e| PodmigError::remote("checkpoint container", id, e));
        on_exit.run().await;
        let record = checkpointed?;

        let export_path = staging.join(container_entry_name(&container.name));
        ensure_active(cancel)?;
        self.runtime
            .export_image(&record.name, &export_path)
            .await
            .map_err(|e| PodmigError::remote("export image", &record.name, e))?;

        let size = writer.append_container_checkpoint(&container.name, &export_path)?;
        if let Err(e) = std::fs::remove_file(&export_path) {
            tracing::debug!(path = %export_path.display(), error = %e, "Export file not removed");
        }

        tracing::info!(
            container = %container.name,
            image = %record.name,
            digest = %record.target.digest,
            size,
            "Archived container checkpoint"
        );

        if !self.settings.retain_checkpoint_images {
            ensure_active(cancel)?;
            self.runtime
                .delete_image(&record.name)
                .await
                .map_err(|e| PodmigError::remote("delete image", &record.name, e))?;
        }

        Ok(size)
    }

    /// Locate the pod's kubelet working directory.
    ///
    /// Taken from the `/etc/hosts` mount of the oldest container, falling back
    /// to `<kubelet_pods_dir>/<pod uid>`.
    async fn pod_dir(
        &self,
        cancel: &CancellationToken,
        info: &SandboxInfo,
        containers: &[ContainerSummary],
    ) -> PodmigResult<Option<PathBuf>> {
        if !self.settings.export_pod_dir {
            return Ok(None);
        }

        let mut dir = None;
        if let Some(first) = containers.first() {
            ensure_active(cancel)?;
            let spec = self
                .runtime
                .container_spec(&first.id)
                .await
                .map_err(|e| PodmigError::remote("get container spec", &first.id, e))?;
            dir = spec
                .mount_source(HOSTS_MOUNT)
                .and_then(|source| Path::new(source).parent())
                .filter(|parent| parent.is_absolute())
                .map(Path::to_path_buf);
        }

        if dir.is_none() {
            dir = info
                .pod_uid()
                .map(|uid| self.settings.kubelet_pods_dir.join(uid));
        }

        match dir {
            Some(dir) if dir.is_dir() => Ok(Some(dir)),
            Some(dir) => {
                tracing::warn!(dir = %dir.display(), "Pod directory not found, skipping");
                Ok(None)
            }
            None => {
                tracing::warn!("Pod directory unknown, skipping");
                Ok(None)
            }
        }
    }
}
