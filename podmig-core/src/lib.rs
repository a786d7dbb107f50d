// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Podmig Core Library
//!
//! Checkpoint and restore of multi-container pods. Provides the pod checkpoint
//! archive format, the checkpoint and restore orchestrators, runtime spec and
//! checkpoint image rewriting, and configuration parsing. The sandbox and
//! container runtime services are consumed through the traits in [`runtime`].

pub mod archive;
pub mod backend;
pub mod checkpoint;
pub mod cleanup;
pub mod config;
pub mod content;
pub mod convert;
pub mod error;
pub mod identity;
pub mod image;
pub mod restore;
pub mod runtime;
pub mod spec;
pub mod types;

// Re-export commonly used types
pub use archive::{ArchiveReader, ArchiveSummary, ArchiveWriter, SandboxMetadata};
pub use backend::{connect, connect_with, ContainerdRestorer, NodeServices, PodCheckpointRestorer, RuntimeKind};
pub use checkpoint::{CheckpointReport, CheckpointRequest, Checkpointer};
pub use config::{CheckpointConfig, Config, ConfigLoader, RestoreConfig, RuntimeConfig};
pub use content::{ContentAdapter, ContentStore, Descriptor, Digest, MemoryContentStore};
pub use error::{
    ArchiveError, ConfigError, IntegrityError, PodmigError, PodmigResult, RemoteError,
};
pub use identity::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use image::{ImageIndex, ImageRecord};
pub use restore::{RestoreOptions, RestoreReport, Restorer};
pub use runtime::{ContainerRuntime, SandboxInfo, SandboxService};
pub use spec::{RuntimeSpec, SandboxIdentity};
pub use types::{CheckpointId, ContainerId, ContainerName, ImageName, PodRef, SandboxId};
