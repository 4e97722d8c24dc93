//! Docker Engine backend.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::TryStreamExt;
use labbox_shared::errors::{LabboxError, LabboxResult};

use super::spec::{PublishedPort, WorkloadInspect, WorkloadSpec};
use super::WorkloadRuntime;

/// Seconds bollard waits on a single Engine API call.
const API_TIMEOUT_SECS: u64 = 120;

/// [`WorkloadRuntime`] backed by a Docker Engine.
#[derive(Clone, Debug)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the engine at `docker_host`.
    ///
    /// An empty host uses the local defaults (`DOCKER_HOST` or the default
    /// socket). `unix://` paths and `tcp://`/`http://` addresses are accepted.
    pub fn connect(docker_host: &str) -> LabboxResult<Self> {
        let docker = if docker_host.is_empty() {
            Docker::connect_with_local_defaults()
        } else if docker_host.starts_with("unix://") {
            Docker::connect_with_unix(docker_host, API_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(docker_host, API_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(|e| LabboxError::Config(format!("docker connect {docker_host:?}: {e}")))?;

        tracing::debug!(docker_host = %docker_host, "Connected to docker engine");
        Ok(Self { docker })
    }
}

/// Map a bollard error, classifying 404 as a missing workload.
fn map_err(id: &str, op: &str, err: bollard::errors::Error) -> LabboxError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => LabboxError::WorkloadNotFound(id.to_string()),
        other => LabboxError::Runtime(format!("docker {op} {id}: {other}")),
    }
}

/// Split `repo[:tag]` into repo and tag, defaulting to `latest`.
///
/// A colon inside the registry host (`host:5000/repo`) is not a tag.
fn split_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.rfind(':') {
        Some(pos) => {
            let split = image.len() - last_segment.len() + pos;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

#[async_trait]
impl WorkloadRuntime for DockerRuntime {
    fn backend_name(&self) -> &'static str {
        "docker"
    }

    async fn create(&self, spec: &WorkloadSpec) -> LabboxResult<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (p.clone(), HashMap::new()))
            .collect();
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                (
                    p.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        // Empty host port: the engine picks a free one.
                        host_port: Some(String::new()),
                    }]),
                )
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_strings()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                memory: Some(spec.memory_bytes),
                nano_cpus: Some(spec.nano_cpus),
                port_bindings: Some(port_bindings),
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => LabboxError::Runtime(format!("image {} not available", spec.image)),
                other => LabboxError::Runtime(format!("docker create {}: {}", spec.name, other)),
            })?;

        for warning in &response.warnings {
            tracing::warn!(workload = %spec.name, warning = %warning, "Docker create warning");
        }
        tracing::debug!(workload = %spec.name, id = %response.id, "Created container");
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> LabboxResult<()> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already started
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_err(id, "start", e)),
        }
    }

    async fn inspect(&self, id: &str) -> LabboxResult<WorkloadInspect> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_err(id, "inspect", e))?;

        let running = info
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        let mut ports: Vec<PublishedPort> = info
            .network_settings
            .and_then(|n| n.ports)
            .unwrap_or_default()
            .into_iter()
            .map(|(container_port, bindings)| {
                let host_port = bindings
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|b| b.host_port.as_deref())
                    .filter_map(|p| p.parse::<u16>().ok())
                    .find(|p| *p != 0)
                    .unwrap_or(0);
                PublishedPort {
                    container_port,
                    host_port,
                }
            })
            .collect();
        ports.sort_by(|a, b| a.container_port.cmp(&b.container_port));

        Ok(WorkloadInspect { running, ports })
    }

    async fn remove(&self, id: &str, force: bool) -> LabboxResult<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_err(id, "remove", e))?;
        tracing::debug!(workload = %id, "Removed container");
        Ok(())
    }

    async fn pull(&self, image: &str) -> LabboxResult<()> {
        let (from_image, tag) = split_image_ref(image);
        let options = CreateImageOptions {
            from_image: from_image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        tracing::info!(image = %image, "Pulling image");
        let progress: Vec<_> = self
            .docker
            .create_image(Some(options), None, None)
            .try_collect()
            .await
            .map_err(|e| LabboxError::Runtime(format!("docker pull {image}: {e}")))?;

        if let Some(status) = progress.last().and_then(|p| p.status.as_deref()) {
            tracing::info!(image = %image, status = %status, "Pulled image");
        }
        Ok(())
    }
}
