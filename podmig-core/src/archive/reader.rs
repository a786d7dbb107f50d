// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Streaming archive reader and entry dispatch.

use std::collections::HashSet;
use std::io::{self, Read};
use std::path::PathBuf;

use flate2::read::GzDecoder;
use tar::Archive;

use super::{classify, EntryKind, SandboxMetadata};
use crate::error::{ArchiveError, IntegrityError, PodmigError, PodmigResult};
use crate::runtime::{SandboxConfig, SandboxInfo};
use crate::types::ContainerName;

/// Kind of a pod working directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodFileKind {
    Directory,
    File,
    Symlink(PathBuf),
}

/// A pod working directory entry, addressed by its absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodFile {
    pub path: PathBuf,
    pub mode: u32,
    pub kind: PodFileKind,
}

/// Receives entry bodies while the archive is streamed.
///
/// Bodies are only readable during the call; the stream moves on afterwards.
pub trait EntrySink {
    /// Called once the sandbox metadata entry has been decoded.
    fn sandbox_metadata(&mut self, _metadata: &SandboxMetadata) -> PodmigResult<()> {
        Ok(())
    }

    fn container_checkpoint(&mut self, name: &ContainerName, body: &mut dyn Read)
        -> PodmigResult<()>;

    fn pod_file(&mut self, file: &PodFile, body: &mut dyn Read) -> PodmigResult<()>;
}

/// What a full pass over an archive found.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub sandbox: SandboxMetadata,
    /// Container checkpoints in stream order.
    pub containers: Vec<ContainerName>,
    pub pod_files: usize,
    /// Entries with unrecognized names, ignored.
    pub skipped: Vec<String>,
}

/// Reads a pod checkpoint archive from `R` in one pass.
pub struct ArchiveReader<R: Read> {
    archive: Archive<GzDecoder<R>>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            archive: Archive::new(GzDecoder::new(inner)),
        }
    }

    /// Stream every entry, handing bodies to `sink` as they arrive.
    ///
    /// Fails if the sandbox metadata is missing or present more than once, or
    /// if any entry name is unsafe.
    pub fn read_into(mut self, sink: &mut dyn EntrySink) -> PodmigResult<ArchiveSummary> {
        let mut sandbox: Option<SandboxMetadata> = None;
        let mut containers = Vec::new();
        let mut seen = HashSet::new();
        let mut pod_files = 0;
        let mut skipped = Vec::new();

        let entries = self
            .archive
            .entries()
            .map_err(|e| PodmigError::io("read archive", e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| PodmigError::io("read archive entry", e))?;
            let name = entry
                .path()
                .map_err(|e| PodmigError::io("read archive entry name", e))?
                .to_string_lossy()
                .into_owned();

            match classify(&name)? {
                EntryKind::SandboxInfo => {
                    if sandbox.is_some() {
                        return Err(ArchiveError::DuplicateSandboxMetadata { name }.into());
                    }
                    let info: SandboxInfo = decode_json(&mut entry)?;
                    let metadata = SandboxMetadata::Info(info);
                    sink.sandbox_metadata(&metadata)?;
                    sandbox = Some(metadata);
                }
                EntryKind::SandboxConfig => {
                    if sandbox.is_some() {
                        return Err(ArchiveError::DuplicateSandboxMetadata { name }.into());
                    }
                    let config: SandboxConfig = decode_json(&mut entry)?;
                    let metadata = SandboxMetadata::Config(config);
                    sink.sandbox_metadata(&metadata)?;
                    sandbox = Some(metadata);
                }
                EntryKind::ContainerCheckpoint(container) => {
                    if !seen.insert(container.clone()) {
                        return Err(ArchiveError::InvalidEntry {
                            name,
                            reason: "container appears more than once".to_string(),
                        }
                        .into());
                    }
                    sink.container_checkpoint(&container, &mut entry)?;
                    containers.push(container);
                }
                EntryKind::PodFile(path) => {
                    let header = entry.header();
                    let entry_type = header.entry_type();
                    let mode = header
                        .mode()
                        .map_err(|e| PodmigError::io(format!("read mode of {}", name), e))?;

                    let kind = if entry_type.is_dir() {
                        PodFileKind::Directory
                    } else if entry_type.is_symlink() {
                        let target = entry
                            .link_name()
                            .map_err(|e| PodmigError::io(format!("read link of {}", name), e))?
                            .ok_or_else(|| ArchiveError::InvalidEntry {
                                name: name.clone(),
                                reason: "symlink without a target".to_string(),
                            })?;
                        PodFileKind::Symlink(target.into_owned())
                    } else if entry_type.is_file() {
                        PodFileKind::File
                    } else {
                        return Err(ArchiveError::InvalidEntry {
                            name,
                            reason: format!("unsupported entry type {:?}", entry_type),
                        }
                        .into());
                    };

                    let file = PodFile { path, mode, kind };
                    sink.pod_file(&file, &mut entry)?;
                    pod_files += 1;
                }
                EntryKind::Unknown => {
                    tracing::debug!(entry = %name, "Ignoring unknown archive entry");
                    skipped.push(name);
                }
            }
        }

        let sandbox = sandbox.ok_or(ArchiveError::MissingSandboxMetadata)?;
        Ok(ArchiveSummary {
            sandbox,
            containers,
            pod_files,
            skipped,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(body: &mut dyn Read) -> PodmigResult<T> {
    serde_json::from_reader(body).map_err(|e| {
        IntegrityError::Malformed {
            what: "sandbox metadata",
            reason: e.to_string(),
        }
        .into()
    })
}

/// Sink that only measures entries, for listing an archive.
#[derive(Debug, Default)]
pub struct ListingSink {
    pub containers: Vec<(ContainerName, u64)>,
    pub pod_files: Vec<PodFile>,
}

impl EntrySink for ListingSink {
    fn container_checkpoint(
        &mut self,
        name: &ContainerName,
        body: &mut dyn Read,
    ) -> PodmigResult<()> {
        let size = io::copy(body, &mut io::sink())
            .map_err(|e| PodmigError::io(format!("read checkpoint of {}", name), e))?;
        self.containers.push((name.clone(), size));
        Ok(())
    }

    fn pod_file(&mut self, file: &PodFile, _body: &mut dyn Read) -> PodmigResult<()> {
        self.pod_files.push(file.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::types::SandboxId;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;

    fn info() -> SandboxInfo {
        SandboxInfo {
            id: SandboxId::new("sb-old").unwrap(),
            pid: 100,
            config: SandboxConfig::new(),
            runtime_spec: None,
        }
    }

    fn raw_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_read_back_written_archive() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img.tar");
        fs::write(&image, b"checkpoint-bytes").unwrap();
        let pod = dir.path().join("pod");
        fs::create_dir(&pod).unwrap();
        fs::write(pod.join("etc-hosts"), b"hosts").unwrap();

        let mut writer = ArchiveWriter::new(Vec::new());
        writer.write_sandbox_info(&info()).unwrap();
        for name in ["app", "init"] {
            writer
                .append_container_checkpoint(&ContainerName::new(name).unwrap(), &image)
                .unwrap();
        }
        writer.append_pod_dir(&pod).unwrap();
        let bytes = writer.finish().unwrap();

        let mut sink = ListingSink::default();
        let summary = ArchiveReader::new(bytes.as_slice())
            .read_into(&mut sink)
            .unwrap();

        assert_eq!(summary.sandbox, SandboxMetadata::Info(info()));
        assert_eq!(
            summary.containers,
            vec![
                ContainerName::new("app").unwrap(),
                ContainerName::new("init").unwrap()
            ]
        );
        assert_eq!(summary.pod_files, 2);
        assert_eq!(sink.containers[0].1, 16);
        assert_eq!(sink.pod_files[0].kind, PodFileKind::Directory);
        assert_eq!(sink.pod_files[1].path, pod.join("etc-hosts"));
    }

    #[test]
    fn test_missing_sandbox_metadata() {
        let bytes = raw_archive(&[("container_app.tar", b"x")]);
        let err = ArchiveReader::new(bytes.as_slice())
            .read_into(&mut ListingSink::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PodmigError::Archive(ArchiveError::MissingSandboxMetadata)
        ));
    }

    #[test]
    fn test_duplicate_sandbox_metadata() {
        let json = serde_json::to_vec(&info()).unwrap();
        let bytes = raw_archive(&[
            ("sandbox_info.json", &json),
            ("sandbox_config.json", b"{}"),
        ]);
        let err = ArchiveReader::new(bytes.as_slice())
            .read_into(&mut ListingSink::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PodmigError::Archive(ArchiveError::DuplicateSandboxMetadata { .. })
        ));
    }

    #[test]
    fn test_reduced_config_variant_and_unknown_entries() {
        let bytes = raw_archive(&[
            ("sandbox_config.json", br#"{"metadata":{"uid":"u1"}}"#),
            ("notes.txt", b"hello"),
        ]);
        let summary = ArchiveReader::new(bytes.as_slice())
            .read_into(&mut ListingSink::default())
            .unwrap();
        assert!(summary.sandbox.info().is_none());
        assert_eq!(
            crate::runtime::config_pod_uid(summary.sandbox.config()),
            Some("u1")
        );
        assert_eq!(summary.skipped, vec!["notes.txt".to_string()]);
    }

    #[test]
    fn test_malformed_sandbox_info() {
        let bytes = raw_archive(&[("sandbox_info.json", b"{not json")]);
        let err = ArchiveReader::new(bytes.as_slice())
            .read_into(&mut ListingSink::default())
            .unwrap_err();
        assert!(matches!(err, PodmigError::Integrity(_)));
    }

    #[test]
    fn test_duplicate_container_entry() {
        let json = serde_json::to_vec(&info()).unwrap();
        let bytes = raw_archive(&[
            ("sandbox_info.json", &json),
            ("container_app.tar", b"a"),
            ("container_app.tar", b"b"),
        ]);
        assert!(ArchiveReader::new(bytes.as_slice())
            .read_into(&mut ListingSink::default())
            .is_err());
    }
}
