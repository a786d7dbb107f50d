// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Checkpoint image index model.

use serde::{Deserialize, Serialize};

use crate::content::Descriptor;
use crate::types::ImageName;

/// OCI image index media type.
pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Manifest entry holding the container's runtime configuration.
pub const MEDIA_TYPE_CHECKPOINT_CONFIG: &str =
    "application/vnd.containerd.container.checkpoint.config.v1+proto";

/// A named image pointing at its root descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub name: ImageName,
    pub target: Descriptor,
}

/// Root of a checkpoint image: an ordered list of manifests.
///
/// Only `manifests` is interpreted; every other field is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(
        rename = "mediaType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageIndex {
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_IMAGE_INDEX.to_string()),
            manifests,
            extra: serde_json::Map::new(),
        }
    }

    /// Position of the runtime configuration manifest, if the image has one.
    pub fn runtime_config_position(&self) -> Option<usize> {
        self.manifests
            .iter()
            .position(|m| m.media_type == MEDIA_TYPE_CHECKPOINT_CONFIG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_position() {
        let rootfs = Descriptor::for_bytes("application/vnd.oci.image.layer.v1.tar", b"rw");
        let config = Descriptor::for_bytes(MEDIA_TYPE_CHECKPOINT_CONFIG, b"cfg");

        assert_eq!(ImageIndex::new(vec![rootfs.clone()]).runtime_config_position(), None);
        assert_eq!(
            ImageIndex::new(vec![rootfs, config]).runtime_config_position(),
            Some(1)
        );
    }

    #[test]
    fn test_index_preserves_unknown_fields() {
        let raw = r#"{"schemaVersion":2,"manifests":[],"annotations":{"io.x":"y"}}"#;
        let index: ImageIndex = serde_json::from_str(raw).unwrap();
        assert!(index.media_type.is_none());
        let encoded = serde_json::to_string(&index).unwrap();
        assert_eq!(encoded, r#"{"schemaVersion":2,"manifests":[],"annotations":{"io.x":"y"}}"#);
    }
}
