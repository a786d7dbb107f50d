// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container identity generation for restored containers.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;

use crate::types::ContainerId;

/// Produces identities for containers created during restore.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ContainerId;
}

/// 32 random bytes rendered as 64 lowercase hex characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> ContainerId {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        ContainerId::from_generated(hex::encode(bytes))
    }
}

/// Deterministic identities: `<prefix>-0`, `<prefix>-1`, ...
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> ContainerId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ContainerId::from_generated(format!("{}-{}", self.prefix, n))
    }
}
