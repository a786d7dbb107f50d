// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Streaming archive writer.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header, HeaderMode};

use super::{container_entry_name, pod_dir_entry_name, SANDBOX_INFO_ENTRY};
use crate::error::{ArchiveError, PodmigError, PodmigResult};
use crate::runtime::SandboxInfo;
use crate::types::ContainerName;

/// Mode of entries podmig synthesizes itself.
const ENTRY_MODE: u32 = 0o644;

/// Writes a pod checkpoint archive into `W`.
///
/// The sandbox info must be written before anything else.
pub struct ArchiveWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
    entries: Vec<String>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        let mut builder = Builder::new(GzEncoder::new(inner, Compression::default()));
        builder.follow_symlinks(false);
        Self {
            builder,
            entries: Vec::new(),
        }
    }

    /// Names of the entries written so far, in stream order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn require_sandbox_info(&self, name: &str) -> PodmigResult<()> {
        if self.entries.is_empty() {
            return Err(ArchiveError::InvalidEntry {
                name: name.to_string(),
                reason: format!("{} must be the first entry", SANDBOX_INFO_ENTRY),
            }
            .into());
        }
        Ok(())
    }

    pub fn write_sandbox_info(&mut self, info: &SandboxInfo) -> PodmigResult<()> {
        if !self.entries.is_empty() {
            return Err(ArchiveError::DuplicateSandboxMetadata {
                name: SANDBOX_INFO_ENTRY.to_string(),
            }
            .into());
        }

        let data = serde_json::to_vec(info).map_err(|e| {
            PodmigError::io(
                "encode sandbox info",
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(ENTRY_MODE);
        self.builder
            .append_data(&mut header, SANDBOX_INFO_ENTRY, data.as_slice())
            .map_err(|e| PodmigError::io("write sandbox info entry", e))?;

        self.entries.push(SANDBOX_INFO_ENTRY.to_string());
        Ok(())
    }

    /// Copy an exported checkpoint image file into the archive.
    pub fn append_container_checkpoint(
        &mut self,
        name: &ContainerName,
        src: &Path,
    ) -> PodmigResult<u64> {
        let entry = container_entry_name(name);
        self.require_sandbox_info(&entry)?;

        let file = File::open(src)
            .map_err(|e| PodmigError::io(format!("open {}", src.display()), e))?;
        let size = file
            .metadata()
            .map_err(|e| PodmigError::io(format!("stat {}", src.display()), e))?
            .len();

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(ENTRY_MODE);
        self.builder
            .append_data(&mut header, &entry, file)
            .map_err(|e| PodmigError::io(format!("write {}", entry), e))?;

        tracing::debug!(entry = %entry, size, "Archived container checkpoint");
        self.entries.push(entry);
        Ok(size)
    }

    /// Walk the pod working directory at `root` and archive every entry
    /// under its absolute path. Directories and symlinks are header-only.
    ///
    /// Returns the number of entries written.
    pub fn append_pod_dir(&mut self, root: &Path) -> PodmigResult<usize> {
        self.require_sandbox_info(&pod_dir_entry_name(root))?;
        if !root.is_absolute() {
            return Err(ArchiveError::UnsafePath {
                name: root.display().to_string(),
            }
            .into());
        }

        let before = self.entries.len();
        self.append_tree(root)?;
        let written = self.entries.len() - before;
        tracing::debug!(root = %root.display(), entries = written, "Archived pod directory");
        Ok(written)
    }

    fn append_tree(&mut self, path: &Path) -> PodmigResult<()> {
        let meta = fs::symlink_metadata(path)
            .map_err(|e| PodmigError::io(format!("stat {}", path.display()), e))?;
        let entry = pod_dir_entry_name(path);

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&meta, HeaderMode::Complete);

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| PodmigError::io(format!("readlink {}", path.display()), e))?;
            header.set_size(0);
            self.builder
                .append_link(&mut header, &entry, &target)
                .map_err(|e| PodmigError::io(format!("write {}", entry), e))?;
            self.entries.push(entry);
        } else if file_type.is_dir() {
            header.set_size(0);
            self.builder
                .append_data(&mut header, &entry, io::empty())
                .map_err(|e| PodmigError::io(format!("write {}", entry), e))?;
            self.entries.push(entry);

            let mut children = fs::read_dir(path)
                .map_err(|e| PodmigError::io(format!("read dir {}", path.display()), e))?
                .map(|child| child.map(|c| c.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PodmigError::io(format!("read dir {}", path.display()), e))?;
            children.sort();
            for child in children {
                self.append_tree(&child)?;
            }
        } else if file_type.is_file() {
            let file = File::open(path)
                .map_err(|e| PodmigError::io(format!("open {}", path.display()), e))?;
            self.builder
                .append_data(&mut header, &entry, file)
                .map_err(|e| PodmigError::io(format!("write {}", entry), e))?;
            self.entries.push(entry);
        } else {
            // Sockets, fifos and devices are recreated by the kubelet.
            tracing::warn!(path = %path.display(), "Skipping special file in pod directory");
        }

        Ok(())
    }

    /// Finish the tar stream and the gzip member, returning the sink.
    pub fn finish(self) -> PodmigResult<W> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| PodmigError::io("finish archive", e))?;
        encoder
            .finish()
            .map_err(|e| PodmigError::io("finish archive compression", e))
    }
}
