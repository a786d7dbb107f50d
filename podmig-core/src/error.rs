// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for podmig.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.
//!
//! Soft failures (a task that could not be resumed after its checkpoint) are
//! deliberately absent: they are logged and never surface as an error value.

use std::path::PathBuf;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{ContainerId, PodRef};

/// Top-level error type for checkpoint and restore runs.
#[derive(Debug, Error)]
pub enum PodmigError {
    // =========================================================================
    // Configuration Errors - Fatal Before Any Side Effect
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    // =========================================================================
    // Resolution Errors - No Side Effects Performed
    // =========================================================================
    #[error("Pod sandbox {pod} not found")]
    SandboxNotFound { pod: PodRef },

    #[error("Pod {pod} has more than one sandbox: {ids:?}")]
    AmbiguousSandbox { pod: PodRef, ids: Vec<String> },

    // =========================================================================
    // Remote Call Errors - Wrapped With Operation And Target
    // =========================================================================
    #[error("{operation} {target} failed: {source}")]
    Remote {
        operation: &'static str,
        target: String,
        #[source]
        source: RemoteError,
    },

    // =========================================================================
    // Partial State - Container Exists But Its Task Did Not Start
    // =========================================================================
    #[error("Container {container_id} was created but its task did not start: {source}")]
    PartialRestore {
        container_id: ContainerId,
        #[source]
        source: Box<PodmigError>,
    },

    // =========================================================================
    // Integrity Errors - Never Silently Repaired
    // =========================================================================
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl PodmigError {
    /// Wrap a remote failure with the operation and the identity it targeted.
    pub fn remote(operation: &'static str, target: impl ToString, source: RemoteError) -> Self {
        Self::Remote {
            operation,
            target: target.to_string(),
            source,
        }
    }

    /// Wrap an IO failure with a human readable context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The container left behind by a partially restored pod, if any.
    pub fn partial_container(&self) -> Option<&ContainerId> {
        match self {
            Self::PartialRestore { container_id, .. } => Some(container_id),
            _ => None,
        }
    }
}

/// Configuration errors are detected before anything touches the node.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported container runtime: {kind}")]
    UnsupportedRuntime { kind: String },

    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    Parse { message: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Failure reported by a sandbox or container-runtime service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{message}")]
    Failed { message: String },
}

impl RemoteError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Content and metadata that does not match what it claims to be.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Content {digest} size mismatch: descriptor says {expected} bytes, got {actual}")]
    SizeMismatch {
        digest: String,
        expected: u64,
        actual: u64,
    },

    #[error("Content digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Malformed digest {value:?}: {reason}")]
    MalformedDigest { value: String, reason: String },

    #[error("Unexpected media type {actual:?}, must be {expected:?}")]
    UnexpectedMediaType { expected: String, actual: String },

    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
}

/// Structural problems in a checkpoint archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive contains no sandbox metadata entry")]
    MissingSandboxMetadata,

    #[error("Archive contains more than one sandbox metadata entry: {name}")]
    DuplicateSandboxMetadata { name: String },

    #[error("Unsafe entry path in archive: {name}")]
    UnsafePath { name: String },

    #[error("Invalid entry {name}: {reason}")]
    InvalidEntry { name: String, reason: String },
}

/// Result type alias using PodmigError.
pub type PodmigResult<T> = Result<T, PodmigError>;

/// Fail with [`PodmigError::Cancelled`] once `cancel` has fired.
pub fn ensure_active(cancel: &CancellationToken) -> PodmigResult<()> {
    if cancel.is_cancelled() {
        return Err(PodmigError::Cancelled);
    }
    Ok(())
}

/// Result type returned by consumed service traits.
pub type RemoteResult<T> = Result<T, RemoteError>;
