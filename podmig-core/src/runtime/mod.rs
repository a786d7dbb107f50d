// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Interfaces of the node services podmig drives.
//!
//! The sandbox lifecycle service and the container runtime service are remote
//! collaborators; podmig only consumes them through these traits.

mod container;
mod sandbox;

pub use container::{ContainerRuntime, ContainerSummary};
pub use sandbox::{
    config_pod_uid, pod_selector, set_config_pod_uid, SandboxConfig, SandboxInfo, SandboxRef,
    SandboxService, SandboxState, SandboxStatus, LABEL_POD_NAME, LABEL_POD_NAMESPACE,
    STATUS_INFO_KEY,
};
