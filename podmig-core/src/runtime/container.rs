// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container runtime service interface.

use std::path::Path;

use async_trait::async_trait;

use crate::content::ContentStore;
use crate::error::RemoteResult;
use crate::image::ImageRecord;
use crate::spec::RuntimeSpec;
use crate::types::{ContainerId, ContainerName, ImageName, SandboxId};

/// A container as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: ContainerName,
    /// Creation time in nanoseconds since the epoch.
    pub created_at: i64,
}

/// Container runtime service: tasks, images and content.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Containers belonging to a sandbox, in listing order.
    async fn list_containers(&self, sandbox: &SandboxId) -> RemoteResult<Vec<ContainerSummary>>;

    /// Runtime spec the container was created with.
    async fn container_spec(&self, id: &ContainerId) -> RemoteResult<RuntimeSpec>;

    async fn pause_task(&self, id: &ContainerId) -> RemoteResult<()>;

    async fn resume_task(&self, id: &ContainerId) -> RemoteResult<()>;

    /// Checkpoint task state, runtime spec and writable layer diff into a
    /// new image named `image`.
    async fn checkpoint_container(
        &self,
        id: &ContainerId,
        image: &ImageName,
    ) -> RemoteResult<ImageRecord>;

    /// Export an image as an archive written to `dest`.
    async fn export_image(&self, image: &ImageName, dest: &Path) -> RemoteResult<()>;

    /// Import every image contained in the archive at `src`.
    async fn import_image(&self, src: &Path) -> RemoteResult<Vec<ImageRecord>>;

    async fn get_image(&self, name: &ImageName) -> RemoteResult<ImageRecord>;

    async fn create_image(&self, image: &ImageRecord) -> RemoteResult<ImageRecord>;

    async fn delete_image(&self, name: &ImageName) -> RemoteResult<()>;

    /// The runtime's content store.
    fn content(&self) -> &dyn ContentStore;

    /// Recreate container `id` (image, spec, runtime, writable layer) from a
    /// checkpoint image.
    async fn restore_container(&self, id: &ContainerId, image: &ImageRecord) -> RemoteResult<()>;

    /// Create the container's task from the checkpointed task state.
    async fn restore_task(&self, id: &ContainerId, image: &ImageRecord) -> RemoteResult<()>;

    async fn start_task(&self, id: &ContainerId) -> RemoteResult<()>;
}
