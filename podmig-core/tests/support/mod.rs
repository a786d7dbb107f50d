// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-memory node used by the integration tests.
//!
//! Implements both the sandbox service and the container runtime over a
//! `MemoryContentStore`, and records every mutating call in an event log.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use podmig_core::content::{gc_ref_labels, ContentAdapter, Labels};
use podmig_core::error::{RemoteError, RemoteResult};
use podmig_core::image::{ImageIndex, MEDIA_TYPE_CHECKPOINT_CONFIG, MEDIA_TYPE_IMAGE_INDEX};
use podmig_core::runtime::{
    config_pod_uid, ContainerSummary, SandboxConfig, SandboxRef, SandboxState, SandboxStatus,
    LABEL_POD_NAME, LABEL_POD_NAMESPACE, STATUS_INFO_KEY,
};
use podmig_core::spec::{decode_config_blob, encode_config_blob, Linux, LinuxNamespace, Mount};
use podmig_core::{
    ContainerId, ContainerName, ContainerRuntime, ContentStore, Descriptor, Digest, ImageName,
    ImageRecord, MemoryContentStore, RuntimeSpec, SandboxId, SandboxService,
};

pub const MEDIA_TYPE_CRIU_STATE: &str =
    "application/vnd.containerd.container.criu.checkpoint.criu.tar";
pub const MEDIA_TYPE_RW_LAYER: &str = "application/vnd.containerd.container.rw.tar";

const EXPORT_INDEX: &str = "index.json";
const EXPORT_BLOBS: &str = "blobs/sha256/";

#[derive(Debug, Clone)]
pub struct FakeSandbox {
    pub id: SandboxId,
    pub pid: u32,
    pub labels: Labels,
    pub config: SandboxConfig,
    pub polls: u32,
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: ContainerId,
    pub name: ContainerName,
    pub sandbox: Option<SandboxId>,
    pub created_at: i64,
    pub spec: RuntimeSpec,
    /// Whether its checkpoint images carry a runtime config manifest.
    pub with_config: bool,
    pub image: Option<ImageName>,
    pub running: bool,
}

#[derive(Default)]
struct State {
    sandboxes: Vec<FakeSandbox>,
    containers: Vec<FakeContainer>,
    images: BTreeMap<ImageName, ImageRecord>,
    events: Vec<String>,
    failures: HashSet<String>,
    ready_after: u32,
    next_sandbox: u32,
    pods_dir: Option<String>,
}

/// A fake node: sandbox service, container runtime and content store.
#[derive(Default)]
pub struct FakeNode {
    state: Mutex<State>,
    content: MemoryContentStore,
}

/// Runtime spec as containerd generates it for a pod container.
pub fn pod_container_spec(
    sandbox: &SandboxId,
    pid: u32,
    pods_dir: &str,
    pod_uid: &str,
) -> RuntimeSpec {
    let sandbox_dir = format!(
        "/var/lib/containerd/io.containerd.grpc.v1.cri/sandboxes/{}",
        sandbox
    );
    let mount = |destination: &str, source: String| Mount {
        destination: destination.to_string(),
        source: Some(source),
        options: vec!["rbind".to_string(), "rw".to_string()],
        ..Default::default()
    };
    let ns = |kind: &str, path: Option<String>| LinuxNamespace {
        kind: kind.to_string(),
        path,
    };

    let mut spec = RuntimeSpec::default();
    spec.annotations.insert(
        "io.kubernetes.cri.sandbox-id".to_string(),
        sandbox.to_string(),
    );
    spec.annotations.insert(
        "io.kubernetes.cri.container-type".to_string(),
        "container".to_string(),
    );
    spec.mounts = vec![
        mount(
            "/etc/hosts",
            format!("{}/{}/etc-hosts", pods_dir, pod_uid),
        ),
        mount("/etc/hostname", format!("{}/hostname", sandbox_dir)),
        mount("/etc/resolv.conf", format!("{}/resolv.conf", sandbox_dir)),
        mount(
            "/dev/shm",
            format!("/run/containerd/io.containerd.grpc.v1.cri/sandboxes/{}/shm", sandbox),
        ),
    ];
    spec.linux = Some(Linux {
        namespaces: vec![
            ns("pid", None),
            ns("ipc", Some(format!("/proc/{}/ns/ipc", pid))),
            ns("uts", Some(format!("/proc/{}/ns/uts", pid))),
            ns("network", Some(format!("/proc/{}/ns/net", pid))),
        ],
        ..Default::default()
    });
    spec.extra.insert("ociVersion".to_string(), json!("1.1.0"));
    spec.extra
        .insert("process".to_string(), json!({"args": ["/app"], "cwd": "/"}));
    spec
}

fn pod_config(namespace: &str, name: &str, uid: &str) -> SandboxConfig {
    match json!({
        "metadata": {"name": name, "namespace": namespace, "uid": uid, "attempt": 0},
        "hostname": name,
        "log_directory": format!("/var/log/pods/{}_{}_{}", namespace, name, uid),
    }) {
        serde_json::Value::Object(map) => map,
        _ => SandboxConfig::new(),
    }
}

fn remote(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::failed(e.to_string())
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_store(&self) -> &MemoryContentStore {
        &self.content
    }

    /// Add a ready sandbox for pod `namespace/name`.
    pub fn add_sandbox(&self, namespace: &str, name: &str, uid: &str, pid: u32) -> SandboxId {
        let mut state = self.state.lock().unwrap();
        state.next_sandbox += 1;
        let id = SandboxId::new(format!("sandbox-{}-{}", name, state.next_sandbox)).unwrap();
        let mut labels = Labels::new();
        labels.insert(LABEL_POD_NAME.to_string(), name.to_string());
        labels.insert(LABEL_POD_NAMESPACE.to_string(), namespace.to_string());
        state.sandboxes.push(FakeSandbox {
            id: id.clone(),
            pid,
            labels,
            config: pod_config(namespace, name, uid),
            polls: 0,
        });
        id
    }

    /// Add a running container to `sandbox`.
    pub fn add_container(
        &self,
        sandbox: &SandboxId,
        name: &str,
        created_at: i64,
        with_config: bool,
    ) -> ContainerId {
        let mut state = self.state.lock().unwrap();
        let sb = state
            .sandboxes
            .iter()
            .find(|s| &s.id == sandbox)
            .cloned()
            .unwrap();
        let uid = config_pod_uid(&sb.config).unwrap_or("").to_string();
        let pods_dir = state
            .pods_dir
            .clone()
            .unwrap_or_else(|| "/var/lib/kubelet/pods".to_string());
        let id = ContainerId::new(format!("{}-{}", name, sandbox)).unwrap();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: ContainerName::new(name).unwrap(),
            sandbox: Some(sandbox.clone()),
            created_at,
            spec: pod_container_spec(sandbox, sb.pid, &pods_dir, &uid),
            with_config,
            image: None,
            running: true,
        });
        id
    }

    /// Kubelet pods directory used for `/etc/hosts` mounts of new containers.
    pub fn set_pods_dir(&self, dir: &Path) {
        self.state.lock().unwrap().pods_dir = Some(dir.display().to_string());
    }

    /// Sandboxes created by `run_sandbox` report not-ready this many times.
    pub fn set_ready_after(&self, polls: u32) {
        self.state.lock().unwrap().ready_after = polls;
    }

    /// Make every call of `operation` fail.
    pub fn fail_on(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn sandboxes(&self) -> Vec<FakeSandbox> {
        self.state.lock().unwrap().sandboxes.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn images(&self) -> BTreeMap<ImageName, ImageRecord> {
        self.state.lock().unwrap().images.clone()
    }

    /// Register an image directly.
    pub fn put_image(&self, record: ImageRecord) {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(record.name.clone(), record);
    }

    /// Runtime spec embedded in a registered image.
    pub async fn image_spec(&self, name: &ImageName) -> Option<RuntimeSpec> {
        let record = self.images().get(name).cloned()?;
        let adapter = ContentAdapter::new(&self.content);
        let raw = adapter.read_blob(&record.target).await.ok()?;
        let index: ImageIndex = serde_json::from_slice(&raw).ok()?;
        let pos = index.runtime_config_position()?;
        let blob = adapter.read_blob(&index.manifests[pos]).await.ok()?;
        decode_config_blob(&blob).ok()
    }

    fn record(&self, operation: &str, target: impl std::fmt::Display) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failures.contains(operation) {
            state.events.push(format!("{}-failed:{}", operation, target));
            return Err(RemoteError::failed(format!("{} failed", operation)));
        }
        state.events.push(format!("{}:{}", operation, target));
        Ok(())
    }

    fn container(&self, id: &ContainerId) -> RemoteResult<FakeContainer> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    fn image(&self, name: &ImageName) -> RemoteResult<ImageRecord> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl SandboxService for FakeNode {
    async fn list_sandboxes(&self, selector: &Labels) -> RemoteResult<Vec<SandboxRef>> {
        self.record("list-sandboxes", selector.len())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .sandboxes
            .iter()
            .filter(|s| selector.iter().all(|(k, v)| s.labels.get(k) == Some(v)))
            .map(|s| SandboxRef {
                id: s.id.clone(),
                labels: s.labels.clone(),
            })
            .collect())
    }

    async fn sandbox_status(&self, id: &SandboxId, verbose: bool) -> RemoteResult<SandboxStatus> {
        if self.state.lock().unwrap().failures.contains("sandbox-status") {
            return Err(RemoteError::Unavailable("status".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let ready_after = state.ready_after;
        let sandbox = state
            .sandboxes
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        let ready = sandbox.polls >= ready_after;
        if !verbose {
            sandbox.polls += 1;
        }

        let mut info = HashMap::new();
        if verbose {
            let doc = json!({
                "pid": sandbox.pid,
                "config": sandbox.config,
                "runtimeSpec": {"ociVersion": "1.1.0"},
            });
            info.insert(STATUS_INFO_KEY.to_string(), doc.to_string());
        }

        Ok(SandboxStatus {
            state: if ready {
                SandboxState::Ready
            } else {
                SandboxState::NotReady
            },
            info,
        })
    }

    async fn run_sandbox(&self, config: &SandboxConfig) -> RemoteResult<SandboxId> {
        let field = |key: &str| {
            config
                .get("metadata")
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let (namespace, name) = (field("namespace"), field("name"));

        self.record("run-sandbox", format!("{}/{}", namespace, name))?;

        let mut state = self.state.lock().unwrap();
        state.next_sandbox += 1;
        let seq = state.next_sandbox;
        let id = SandboxId::new(format!("restored-{}-{}", name, seq)).unwrap();
        let mut labels = Labels::new();
        labels.insert(LABEL_POD_NAME.to_string(), name);
        labels.insert(LABEL_POD_NAMESPACE.to_string(), namespace);
        state.sandboxes.push(FakeSandbox {
            id: id.clone(),
            pid: 5000 + seq,
            labels,
            config: config.clone(),
            polls: 0,
        });
        Ok(id)
    }
}

#[async_trait]
impl ContainerRuntime for FakeNode {
    async fn list_containers(&self, sandbox: &SandboxId) -> RemoteResult<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.sandbox.as_ref() == Some(sandbox))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                created_at: c.created_at,
            })
            .collect())
    }

    async fn container_spec(&self, id: &ContainerId) -> RemoteResult<RuntimeSpec> {
        Ok(self.container(id)?.spec)
    }

    async fn pause_task(&self, id: &ContainerId) -> RemoteResult<()> {
        self.record("pause", id)
    }

    async fn resume_task(&self, id: &ContainerId) -> RemoteResult<()> {
        self.record("resume", id)
    }

    async fn checkpoint_container(
        &self,
        id: &ContainerId,
        image: &ImageName,
    ) -> RemoteResult<ImageRecord> {
        self.record("checkpoint", id)?;
        let container = self.container(id)?;
        let adapter = ContentAdapter::new(&self.content);

        let mut manifests = Vec::new();
        manifests.push(
            adapter
                .write_blob(
                    MEDIA_TYPE_CRIU_STATE,
                    format!("criu-images-of-{}", id).into_bytes(),
                    Labels::new(),
                )
                .await
                .map_err(remote)?,
        );
        if container.with_config {
            let blob = encode_config_blob(&container.spec).map_err(remote)?;
            manifests.push(
                adapter
                    .write_blob(MEDIA_TYPE_CHECKPOINT_CONFIG, blob, Labels::new())
                    .await
                    .map_err(remote)?,
            );
        }
        manifests.push(
            adapter
                .write_blob(
                    MEDIA_TYPE_RW_LAYER,
                    format!("rw-layer-of-{}", id).into_bytes(),
                    Labels::new(),
                )
                .await
                .map_err(remote)?,
        );

        let index = ImageIndex::new(manifests);
        let labels = gc_ref_labels(&index.manifests);
        let target = adapter
            .write_json(MEDIA_TYPE_IMAGE_INDEX, &index, labels)
            .await
            .map_err(remote)?;

        let record = ImageRecord {
            name: image.clone(),
            target,
        };
        self.put_image(record.clone());
        Ok(record)
    }

    async fn export_image(&self, image: &ImageName, dest: &Path) -> RemoteResult<()> {
        self.record("export", image)?;
        let record = self.image(image)?;
        let raw_index = self.content.read(&record.target.digest).await?;
        let index: ImageIndex = serde_json::from_slice(&raw_index).map_err(remote)?;

        let file = File::create(dest).map_err(remote)?;
        let mut builder = tar::Builder::new(file);
        let mut append = |name: String, data: &[u8]| -> RemoteResult<()> {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, data).map_err(remote)
        };

        append(
            EXPORT_INDEX.to_string(),
            &serde_json::to_vec(&record).map_err(remote)?,
        )?;
        append(
            format!("{}{}", EXPORT_BLOBS, record.target.digest.encoded()),
            &raw_index,
        )?;
        for manifest in &index.manifests {
            let data = self.content.read(&manifest.digest).await?;
            append(
                format!("{}{}", EXPORT_BLOBS, manifest.digest.encoded()),
                &data,
            )?;
        }
        drop(append);
        builder.finish().map_err(remote)
    }

    async fn import_image(&self, src: &Path) -> RemoteResult<Vec<ImageRecord>> {
        let file_name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record("import", file_name)?;

        let mut record: Option<ImageRecord> = None;
        let mut blobs = Vec::new();
        {
            let mut archive = tar::Archive::new(File::open(src).map_err(remote)?);
            for entry in archive.entries().map_err(remote)? {
                let mut entry = entry.map_err(remote)?;
                let name = entry.path().map_err(remote)?.to_string_lossy().into_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(remote)?;
                if name == EXPORT_INDEX {
                    record = Some(serde_json::from_slice(&data).map_err(remote)?);
                } else if let Some(hex) = name.strip_prefix(EXPORT_BLOBS) {
                    let digest = Digest::parse(format!("sha256:{}", hex)).map_err(remote)?;
                    blobs.push((digest, data));
                }
            }
        }

        for (digest, data) in blobs {
            let descriptor = Descriptor {
                media_type: "application/octet-stream".to_string(),
                digest,
                size: data.len() as u64,
                extra: Default::default(),
            };
            self.content.write(&descriptor, data, Labels::new()).await?;
        }

        let record = record.ok_or_else(|| RemoteError::failed("export has no index"))?;
        self.put_image(record.clone());
        Ok(vec![record])
    }

    async fn get_image(&self, name: &ImageName) -> RemoteResult<ImageRecord> {
        self.image(name)
    }

    async fn create_image(&self, image: &ImageRecord) -> RemoteResult<ImageRecord> {
        self.record("create-image", &image.name)?;
        let mut state = self.state.lock().unwrap();
        if state.images.contains_key(&image.name) {
            return Err(RemoteError::failed(format!(
                "image {} already exists",
                image.name
            )));
        }
        state.images.insert(image.name.clone(), image.clone());
        Ok(image.clone())
    }

    async fn delete_image(&self, name: &ImageName) -> RemoteResult<()> {
        self.record("delete-image", name)?;
        self.state
            .lock()
            .unwrap()
            .images
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    fn content(&self) -> &dyn ContentStore {
        &self.content
    }

    async fn restore_container(&self, id: &ContainerId, image: &ImageRecord) -> RemoteResult<()> {
        self.record("restore-container", format!("{}@{}", id, image.name))?;

        let spec = self.image_spec(&image.name).await.unwrap_or_default();
        let name = image
            .name
            .as_str()
            .rsplit('_')
            .next()
            .and_then(|n| ContainerName::new(n).ok())
            .ok_or_else(|| RemoteError::failed("image name carries no container name"))?;
        let sandbox = spec
            .annotations
            .get("io.kubernetes.cri.sandbox-id")
            .and_then(|s| SandboxId::new(s.clone()).ok());

        self.state.lock().unwrap().containers.push(FakeContainer {
            id: id.clone(),
            name,
            sandbox,
            created_at: 0,
            spec,
            with_config: true,
            image: Some(image.name.clone()),
            running: false,
        });
        Ok(())
    }

    async fn restore_task(&self, id: &ContainerId, image: &ImageRecord) -> RemoteResult<()> {
        self.container(id)?;
        self.record("restore-task", format!("{}@{}", id, image.name))
    }

    async fn start_task(&self, id: &ContainerId) -> RemoteResult<()> {
        self.record("start", id)?;
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.iter_mut().find(|c| &c.id == id) {
            c.running = true;
        }
        Ok(())
    }
}
