// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Runtime backends.
//!
//! Checkpoint and restore are written once against [`PodCheckpointRestorer`];
//! each supported container runtime kind provides one implementation.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointReport, CheckpointRequest, Checkpointer};
use crate::config::Config;
use crate::error::{ConfigError, PodmigResult};
use crate::identity::{IdGenerator, RandomIdGenerator};
use crate::restore::{RestoreOptions, RestoreReport, Restorer};
use crate::runtime::{ContainerRuntime, SandboxService};

/// Supported container runtime kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    Containerd,
}

impl FromStr for RuntimeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "containerd" => Ok(Self::Containerd),
            other => Err(ConfigError::UnsupportedRuntime {
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Containerd => write!(f, "containerd"),
        }
    }
}

/// Pod checkpoint and restore against one node's runtime.
#[async_trait]
pub trait PodCheckpointRestorer: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Checkpoint a pod into an archive written to `out`.
    async fn checkpoint(
        &self,
        cancel: &CancellationToken,
        request: &CheckpointRequest,
        out: &mut (dyn Write + Send),
    ) -> PodmigResult<CheckpointReport>;

    /// Restore the pod archived in `input`.
    async fn restore(
        &self,
        cancel: &CancellationToken,
        input: &mut (dyn Read + Send),
        options: &RestoreOptions,
    ) -> PodmigResult<RestoreReport>;
}

/// Connected node services a backend drives.
#[derive(Clone)]
pub struct NodeServices {
    pub sandboxes: Arc<dyn SandboxService>,
    pub runtime: Arc<dyn ContainerRuntime>,
}

/// containerd backend.
pub struct ContainerdRestorer {
    services: NodeServices,
    config: Config,
    ids: Arc<dyn IdGenerator>,
}

impl ContainerdRestorer {
    pub fn new(services: NodeServices, config: Config) -> Self {
        Self {
            services,
            config,
            ids: Arc::new(RandomIdGenerator),
        }
    }

    /// Use `ids` for restored container identities.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl PodCheckpointRestorer for ContainerdRestorer {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Containerd
    }

    async fn checkpoint(
        &self,
        cancel: &CancellationToken,
        request: &CheckpointRequest,
        out: &mut (dyn Write + Send),
    ) -> PodmigResult<CheckpointReport> {
        Checkpointer::new(
            self.services.sandboxes.as_ref(),
            self.services.runtime.as_ref(),
            &self.config.checkpoint,
        )
        .checkpoint(cancel, request, out)
        .await
    }

    async fn restore(
        &self,
        cancel: &CancellationToken,
        input: &mut (dyn Read + Send),
        options: &RestoreOptions,
    ) -> PodmigResult<RestoreReport> {
        Restorer::new(
            self.services.sandboxes.as_ref(),
            self.services.runtime.as_ref(),
            &self.config.restore,
            self.ids.as_ref(),
        )
        .restore(cancel, input, options)
        .await
    }
}

/// Build the backend for `kind` over already connected services.
pub fn connect_with(
    kind: RuntimeKind,
    services: NodeServices,
    config: Config,
) -> Box<dyn PodCheckpointRestorer> {
    tracing::info!(
        runtime = %kind,
        endpoint = %config.runtime.endpoint,
        "Using runtime backend"
    );
    match kind {
        RuntimeKind::Containerd => Box::new(ContainerdRestorer::new(services, config)),
    }
}

/// Parse `kind` and build its backend.
///
/// # Errors
/// `UnsupportedRuntime` for anything but a known kind, before any service
/// is touched.
pub fn connect(
    kind: &str,
    services: NodeServices,
    config: Config,
) -> PodmigResult<Box<dyn PodCheckpointRestorer>> {
    let kind: RuntimeKind = kind.parse()?;
    Ok(connect_with(kind, services, config))
}
