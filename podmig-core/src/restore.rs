// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pod restore orchestration.
//!
//! Reads a pod checkpoint archive, recreates the sandbox from its portable
//! config and restores the containers oldest first, each from a checkpoint
//! image rewritten for the new sandbox.

use std::io::Read;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveReader, DiskSink, SandboxMetadata, StagedCheckpoint};
use crate::config::RestoreConfig;
use crate::convert::convert_checkpoint_image;
use crate::error::{ensure_active, IntegrityError, PodmigError, PodmigResult, RemoteError};
use crate::identity::IdGenerator;
use crate::image::ImageRecord;
use crate::runtime::{
    set_config_pod_uid, ContainerRuntime, SandboxConfig, SandboxInfo, SandboxService,
    SandboxState,
};
use crate::spec::SandboxIdentity;
use crate::types::{ContainerId, ContainerName, ImageName, SandboxId};

/// Caller choices for one restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Recreate the pod under this UID instead of the archived one.
    pub target_pod_uid: Option<String>,
}

/// One restored, running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredContainer {
    pub name: ContainerName,
    pub id: ContainerId,
    /// Image the container was restored from.
    pub image: ImageName,
}

/// Outcome of a successful restore run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub sandbox_id: SandboxId,
    /// Containers in start order, oldest first.
    pub containers: Vec<RestoredContainer>,
    pub pod_files: usize,
}

/// Drives a restore run against the node's services.
pub struct Restorer<'a> {
    sandboxes: &'a dyn SandboxService,
    runtime: &'a dyn ContainerRuntime,
    settings: &'a RestoreConfig,
    ids: &'a dyn IdGenerator,
}

impl<'a> Restorer<'a> {
    pub fn new(
        sandboxes: &'a dyn SandboxService,
        runtime: &'a dyn ContainerRuntime,
        settings: &'a RestoreConfig,
        ids: &'a dyn IdGenerator,
    ) -> Self {
        Self {
            sandboxes,
            runtime,
            settings,
            ids,
        }
    }

    /// Restore the pod archived in `input`.
    ///
    /// # Errors
    /// Any failure aborts the run without undoing what was already created.
    /// A container that was created but whose task did not start is reported
    /// as `PartialRestore` carrying its id.
    pub async fn restore<R: Read + Send>(
        &self,
        cancel: &CancellationToken,
        input: R,
        options: &RestoreOptions,
    ) -> PodmigResult<RestoreReport> {
        let start = Instant::now();
        ensure_active(cancel)?;

        let staging = tempfile::Builder::new()
            .prefix("podmig-restore-")
            .tempdir()
            .map_err(|e| PodmigError::io("create restore staging dir", e))?;

        let mut sink = DiskSink::new(staging.path(), &self.settings.fs_root);
        if let Some(uid) = &options.target_pod_uid {
            sink = sink.with_target_pod_uid(uid.clone());
        }
        let summary = ArchiveReader::new(input).read_into(&mut sink)?;
        let pod_files = sink.replayed();
        let staged = sink.into_staged();

        tracing::info!(
            containers = staged.len(),
            pod_files,
            "Read pod checkpoint archive"
        );

        let imported = self.import_checkpoints(cancel, &staged).await?;
        drop(staging);

        let mut config = summary.sandbox.config().clone();
        if let Some(uid) = &options.target_pod_uid {
            set_config_pod_uid(&mut config, uid);
        }

        let new_info = self.recreate_sandbox(cancel, &config).await?;
        let mut new_identity = new_info.identity();
        if let Some(uid) = &options.target_pod_uid {
            new_identity.pod_uid = Some(uid.clone());
        }

        let old_identity = match &summary.sandbox {
            SandboxMetadata::Info(info) => Some(info.identity()),
            SandboxMetadata::Config(_) => {
                tracing::warn!("Archive carries no source sandbox identity, images are not rewritten");
                None
            }
        };

        let mut restored = Vec::with_capacity(imported.len());
        for (name, image) in imported.iter().rev() {
            let container = self
                .restore_container(cancel, name, image, old_identity.as_ref(), &new_identity)
                .await?;
            restored.push(container);
        }

        tracing::info!(
            sandbox = %new_info.id.short(),
            containers = restored.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Pod restore completed"
        );

        Ok(RestoreReport {
            sandbox_id: new_info.id,
            containers: restored,
            pod_files,
        })
    }

    /// Import staged checkpoints in stream order.
    async fn import_checkpoints(
        &self,
        cancel: &CancellationToken,
        staged: &[StagedCheckpoint],
    ) -> PodmigResult<Vec<(ContainerName, ImageRecord)>> {
        let mut imported = Vec::with_capacity(staged.len());
        for checkpoint in staged {
            ensure_active(cancel)?;
            let mut images = self
                .runtime
                .import_image(&checkpoint.path)
                .await
                .map_err(|e| PodmigError::remote("import image", &checkpoint.name, e))?;

            if images.is_empty() {
                return Err(IntegrityError::Malformed {
                    what: "checkpoint image archive",
                    reason: format!("checkpoint of {} contains no image", checkpoint.name),
                }
                .into());
            }
            if images.len() > 1 {
                tracing::warn!(
                    container = %checkpoint.name,
                    images = images.len(),
                    "Checkpoint archive holds several images, using the first"
                );
            }
            let image = images.swap_remove(0);

            tracing::info!(
                container = %checkpoint.name,
                image = %image.name,
                digest = %image.target.digest,
                "Imported checkpoint image"
            );
            imported.push((checkpoint.name.clone(), image));
        }
        Ok(imported)
    }

    /// Run a sandbox from `config`, wait until it is ready and read back its
    /// host-local identity.
    async fn recreate_sandbox(
        &self,
        cancel: &CancellationToken,
        config: &SandboxConfig,
    ) -> PodmigResult<SandboxInfo> {
        ensure_active(cancel)?;
        let id = self
            .sandboxes
            .run_sandbox(config)
            .await
            .map_err(|e| PodmigError::remote("run sandbox", describe_config(config), e))?;
        tracing::info!(sandbox = %id.short(), "Created sandbox");

        match self.settings.ready_timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait_ready(cancel, &id))
                .await
                .map_err(|_| {
                    PodmigError::remote(
                        "wait for sandbox",
                        &id,
                        RemoteError::Unavailable(format!(
                            "not ready after {}ms",
                            limit.as_millis()
                        )),
                    )
                })??,
            None => self.wait_ready(cancel, &id).await?,
        }

        ensure_active(cancel)?;
        let status = self
            .sandboxes
            .sandbox_status(&id, true)
            .await
            .map_err(|e| PodmigError::remote("get sandbox status", &id, e))?;
        let info = SandboxInfo::from_status(id, &status)?;

        tracing::info!(sandbox = %info.id.short(), pid = info.pid, "Sandbox ready");
        Ok(info)
    }

    /// Poll until the sandbox reports ready, honouring `cancel` between polls.
    async fn wait_ready(&self, cancel: &CancellationToken, id: &SandboxId) -> PodmigResult<()> {
        loop {
            ensure_active(cancel)?;
            let status = self
                .sandboxes
                .sandbox_status(id, false)
                .await
                .map_err(|e| PodmigError::remote("get sandbox status", id, e))?;

            if status.state == SandboxState::Ready {
                return Ok(());
            }
            tracing::debug!(sandbox = %id.short(), state = %status.state, "Waiting for sandbox");

            tokio::select! {
                _ = cancel.cancelled() => return Err(PodmigError::Cancelled),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    async fn restore_container(
        &self,
        cancel: &CancellationToken,
        name: &ContainerName,
        image: &ImageRecord,
        old: Option<&SandboxIdentity>,
        new: &SandboxIdentity,
    ) -> PodmigResult<RestoredContainer> {
        let image = match old {
            Some(old) => convert_checkpoint_image(cancel, self.runtime, image, old, new).await?,
            None => image.clone(),
        };

        let id = self.ids.next_id();
        ensure_active(cancel)?;
        tracing::info!(container = %name, id = %id.short(), image = %image.name, "Restoring container");
        self.runtime
            .restore_container(&id, &image)
            .await
            .map_err(|e| PodmigError::remote("restore container", &id, e))?;

        // From here on the container exists and is left in place on failure.
        self.start_restored(cancel, &id, &image)
            .await
            .map_err(|source| PodmigError::PartialRestore {
                container_id: id.clone(),
                source: Box::new(source),
            })?;

        tracing::info!(container = %name, id = %id.short(), "Container started");
        Ok(RestoredContainer {
            name: name.clone(),
            id,
            image: image.name,
        })
    }

    async fn start_restored(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        image: &ImageRecord,
    ) -> PodmigResult<()> {
        ensure_active(cancel)?;
        self.runtime
            .restore_task(id, image)
            .await
            .map_err(|e| PodmigError::remote("restore task", id, e))?;

        ensure_active(cancel)?;
        self.runtime
            .start_task(id)
            .await
            .map_err(|e| PodmigError::remote("start task", id, e))
    }
}

/// `namespace/name` of the pod a sandbox config describes, for error context.
fn describe_config(config: &SandboxConfig) -> String {
    let metadata = config.get("metadata");
    let field = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string()
    };
    format!("{}/{}", field("namespace"), field("name"))
}
