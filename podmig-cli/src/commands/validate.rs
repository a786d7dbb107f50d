// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `podmig validate` command - Validate configuration file.

use podmig_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Runtime:");
            println!("  Kind:     {}", config.runtime.kind);
            println!("  Endpoint: {}", config.runtime.endpoint);
            println!();
            println!("Checkpoint:");
            println!(
                "  Staging Directory:  {}",
                config.checkpoint.tmp_dir.display()
            );
            println!(
                "  Retain Images:      {}",
                config.checkpoint.retain_checkpoint_images
            );
            println!(
                "  Export Pod Dir:     {}",
                config.checkpoint.export_pod_dir
            );
            println!(
                "  Kubelet Pods Dir:   {}",
                config.checkpoint.kubelet_pods_dir.display()
            );
            println!();
            println!("Restore:");
            println!(
                "  Poll Interval:      {}ms",
                config.restore.poll_interval.as_millis()
            );
            match config.restore.ready_timeout {
                Some(limit) => println!("  Ready Timeout:      {}ms", limit.as_millis()),
                None => println!("  Ready Timeout:      none"),
            }
            println!(
                "  Filesystem Root:    {}",
                config.restore.fs_root.display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
