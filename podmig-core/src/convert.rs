// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Content rewrite of checkpoint images.
//!
//! Patches the runtime spec embedded in a checkpoint image so it refers to a
//! new sandbox, writes the result as new content and registers it as a
//! derived image. The source image and its blobs are never modified.

use tokio_util::sync::CancellationToken;

use crate::content::{gc_ref_labels, ContentAdapter, Labels};
use crate::error::{ensure_active, IntegrityError, PodmigError, PodmigResult, RemoteError};
use crate::image::{
    ImageIndex, ImageRecord, MEDIA_TYPE_CHECKPOINT_CONFIG, MEDIA_TYPE_IMAGE_INDEX,
};
use crate::runtime::ContainerRuntime;
use crate::spec::{decode_config_blob, encode_config_blob, rewrite, SandboxIdentity};

/// Rewrite `image` for the sandbox `new` and register the result as
/// `restore-<image name>`.
///
/// Images without a runtime configuration manifest are returned unchanged.
/// Re-running with the same inputs yields the same content and replaces any
/// stale registration under the derived name.
pub async fn convert_checkpoint_image(
    cancel: &CancellationToken,
    runtime: &dyn ContainerRuntime,
    image: &ImageRecord,
    old: &SandboxIdentity,
    new: &SandboxIdentity,
) -> PodmigResult<ImageRecord> {
    let adapter = ContentAdapter::new(runtime.content());

    ensure_active(cancel)?;
    let mut index: ImageIndex = adapter
        .read_json(&image.target, MEDIA_TYPE_IMAGE_INDEX)
        .await?;

    let Some(position) = index.runtime_config_position() else {
        tracing::info!(image = %image.name, "Image has no runtime config, nothing to rewrite");
        return Ok(image.clone());
    };

    ensure_active(cancel)?;
    let config = adapter
        .read_typed(&index.manifests[position], MEDIA_TYPE_CHECKPOINT_CONFIG)
        .await?;
    let spec = decode_config_blob(&config)?;
    let patched = encode_config_blob(&rewrite(&spec, old, new))?;

    ensure_active(cancel)?;
    let config_desc = adapter
        .write_blob(MEDIA_TYPE_CHECKPOINT_CONFIG, patched, Labels::new())
        .await?;

    let manifest = &mut index.manifests[position];
    manifest.digest = config_desc.digest;
    manifest.size = config_desc.size;

    let index_bytes = serde_json::to_vec(&index).map_err(|e| IntegrityError::Malformed {
        what: "image index",
        reason: e.to_string(),
    })?;

    ensure_active(cancel)?;
    let index_desc = adapter
        .write_blob(
            MEDIA_TYPE_IMAGE_INDEX,
            index_bytes,
            gc_ref_labels(&index.manifests),
        )
        .await?;

    let mut target = image.target.clone();
    target.digest = index_desc.digest;
    target.size = index_desc.size;

    let name = image.name.restore_variant();

    ensure_active(cancel)?;
    match runtime.get_image(&name).await {
        Ok(_) => {
            tracing::info!(image = %name, "Removing stale restore image");
            runtime
                .delete_image(&name)
                .await
                .map_err(|e| PodmigError::remote("delete image", &name, e))?;
        }
        Err(RemoteError::NotFound(_)) => {}
        Err(e) => return Err(PodmigError::remote("get image", &name, e)),
    }

    ensure_active(cancel)?;
    let created = runtime
        .create_image(&ImageRecord { name, target })
        .await
        .map_err(|e| PodmigError::remote("create image", &image.name.restore_variant(), e))?;

    tracing::info!(
        image = %created.name,
        digest = %created.target.digest,
        source = %image.name,
        "Registered rewritten checkpoint image"
    );
    Ok(created)
}
