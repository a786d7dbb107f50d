// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `podmig inspect` command - List a pod checkpoint archive.

use std::fs::File;
use std::io::BufReader;

use podmig_core::archive::{
    container_entry_name, pod_dir_entry_name, ListingSink, PodFileKind, SANDBOX_CONFIG_ENTRY,
    SANDBOX_INFO_ENTRY,
};
use podmig_core::{ArchiveReader, PodmigError, SandboxMetadata};

pub async fn execute(archive: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(archive = %archive, "Inspecting pod checkpoint archive");

    let file = File::open(archive)
        .map_err(|e| PodmigError::io(format!("open archive {}", archive), e))?;
    let mut sink = ListingSink::default();
    let summary = ArchiveReader::new(BufReader::new(file)).read_into(&mut sink)?;

    println!("Entries:");
    match &summary.sandbox {
        SandboxMetadata::Info(_) => println!("  {}", SANDBOX_INFO_ENTRY),
        SandboxMetadata::Config(_) => println!("  {}", SANDBOX_CONFIG_ENTRY),
    }
    for (name, size) in &sink.containers {
        println!("  {:<40} {:>12} bytes", container_entry_name(name), size);
    }
    for file in &sink.pod_files {
        let name = pod_dir_entry_name(&file.path);
        match &file.kind {
            PodFileKind::Directory => println!("  {}/ ({:o})", name, file.mode),
            PodFileKind::File => println!("  {} ({:o})", name, file.mode),
            PodFileKind::Symlink(target) => println!("  {} -> {}", name, target.display()),
        }
    }
    for skipped in &summary.skipped {
        println!("  {} (ignored)", skipped);
    }

    println!();
    match summary.sandbox.info() {
        Some(info) => {
            println!("Sandbox:        {}", info.id);
            println!("Sandbox PID:    {}", info.pid);
            if let Some(uid) = info.pod_uid() {
                println!("Pod UID:        {}", uid);
            }
        }
        None => println!("Sandbox:        (portable config only)"),
    }
    println!("Containers:     {}", summary.containers.len());
    println!("Pod files:      {}", summary.pod_files);

    Ok(())
}
