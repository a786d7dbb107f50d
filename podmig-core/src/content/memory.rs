// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process content store using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ContentStore, Descriptor, Digest, Labels};
use crate::error::{RemoteError, RemoteResult};

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    labels: Labels,
}

/// Thread-safe content store kept in memory.
///
/// Commits are verified the same way a real store verifies them: the bytes
/// must hash to the descriptor digest and match its size.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: DashMap<Digest, StoredBlob>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under `digest` without verifying them.
    ///
    /// Used to model content that was damaged after it was committed.
    pub fn put_unverified(&self, digest: Digest, data: Vec<u8>) {
        let labels = self
            .blobs
            .get(&digest)
            .map(|b| b.labels.clone())
            .unwrap_or_default();
        self.blobs.insert(digest, StoredBlob { data, labels });
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.blobs.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All digests currently stored.
    pub fn digests(&self) -> Vec<Digest> {
        self.blobs.iter().map(|r| r.key().clone()).collect()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn read(&self, digest: &Digest) -> RemoteResult<Vec<u8>> {
        self.blobs
            .get(digest)
            .map(|b| b.data.clone())
            .ok_or_else(|| RemoteError::NotFound(digest.to_string()))
    }

    async fn write(
        &self,
        descriptor: &Descriptor,
        data: Vec<u8>,
        labels: Labels,
    ) -> RemoteResult<()> {
        descriptor
            .verify(&data)
            .map_err(|e| RemoteError::failed(format!("commit rejected: {}", e)))?;

        // Identical bytes share one entry; labels accumulate.
        self.blobs
            .entry(descriptor.digest.clone())
            .and_modify(|blob| blob.labels.extend(labels.clone()))
            .or_insert(StoredBlob { data, labels });

        Ok(())
    }

    async fn labels(&self, digest: &Digest) -> RemoteResult<Labels> {
        self.blobs
            .get(digest)
            .map(|b| b.labels.clone())
            .ok_or_else(|| RemoteError::NotFound(digest.to_string()))
    }
}
