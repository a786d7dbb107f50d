// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Content-addressable blob access.
//!
//! The runtime owns the content store; this module only addresses blobs in it
//! by descriptor. Every read is verified against its descriptor and every
//! write is addressed by the hash of its exact bytes.

mod digest;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IntegrityError, PodmigError, PodmigResult, RemoteResult};

pub use digest::{Descriptor, Digest};
pub use memory::MemoryContentStore;

/// Labels attached to a blob in the content store.
pub type Labels = BTreeMap<String, String>;

/// Label prefix that tells the store's garbage collector a blob references
/// another one.
pub const GC_REF_CONTENT_PREFIX: &str = "containerd.io/gc.ref.content.";

/// Raw blob store of the container runtime.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read the full content addressed by `digest`.
    async fn read(&self, digest: &Digest) -> RemoteResult<Vec<u8>>;

    /// Commit `data` under `descriptor`, attaching `labels`.
    async fn write(&self, descriptor: &Descriptor, data: Vec<u8>, labels: Labels)
        -> RemoteResult<()>;

    /// Labels currently attached to a blob.
    async fn labels(&self, digest: &Digest) -> RemoteResult<Labels>;
}

/// Typed, verifying access to a [`ContentStore`].
pub struct ContentAdapter<'a> {
    store: &'a dyn ContentStore,
}

impl<'a> ContentAdapter<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self { store }
    }

    /// Read a blob and verify it is exactly what `descriptor` addresses.
    pub async fn read_blob(&self, descriptor: &Descriptor) -> PodmigResult<Vec<u8>> {
        let data = self
            .store
            .read(&descriptor.digest)
            .await
            .map_err(|e| PodmigError::remote("read content", &descriptor.digest, e))?;

        descriptor.verify(&data)?;
        Ok(data)
    }

    /// Read a blob of the expected media type.
    pub async fn read_typed(
        &self,
        descriptor: &Descriptor,
        media_type: &str,
    ) -> PodmigResult<Vec<u8>> {
        if descriptor.media_type != media_type {
            return Err(IntegrityError::UnexpectedMediaType {
                expected: media_type.to_string(),
                actual: descriptor.media_type.clone(),
            }
            .into());
        }
        self.read_blob(descriptor).await
    }

    /// Read and decode a JSON blob of the expected media type.
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        descriptor: &Descriptor,
        media_type: &str,
    ) -> PodmigResult<T> {
        let data = self.read_typed(descriptor, media_type).await?;
        serde_json::from_slice(&data).map_err(|e| {
            IntegrityError::Malformed {
                what: "json content",
                reason: format!("{}: {}", descriptor.digest, e),
            }
            .into()
        })
    }

    /// Write `data` addressed by its own hash and return its descriptor.
    pub async fn write_blob(
        &self,
        media_type: &str,
        data: Vec<u8>,
        labels: Labels,
    ) -> PodmigResult<Descriptor> {
        let descriptor = Descriptor::for_bytes(media_type, &data);

        tracing::debug!(
            digest = %descriptor.digest,
            size = descriptor.size,
            labels = labels.len(),
            "Writing content"
        );

        self.store
            .write(&descriptor, data, labels)
            .await
            .map_err(|e| PodmigError::remote("write content", &descriptor.digest, e))?;

        Ok(descriptor)
    }

    /// Encode `value` as JSON and write it.
    pub async fn write_json<T: Serialize>(
        &self,
        media_type: &str,
        value: &T,
        labels: Labels,
    ) -> PodmigResult<Descriptor> {
        let data = serde_json::to_vec(value).map_err(|e| IntegrityError::Malformed {
            what: "json content",
            reason: e.to_string(),
        })?;
        self.write_blob(media_type, data, labels).await
    }
}

/// Garbage-collector reference labels for every descriptor in `targets`.
pub fn gc_ref_labels<'d>(targets: impl IntoIterator<Item = &'d Descriptor>) -> Labels {
    targets
        .into_iter()
        .enumerate()
        .map(|(i, desc)| {
            (
                format!("{}{}", GC_REF_CONTENT_PREFIX, i),
                desc.digest.to_string(),
            )
        })
        .collect()
}
