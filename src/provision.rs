//! Environment provisioning: one container per batch, created and
//! started with the artifact directory mounted and resource limits
//! applied.

use bollard::container::{Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions};
use bollard::service::HostConfig;
use bollard::Docker;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ResourceLimits;
use crate::error::ProvisionError;
use crate::image;

/// Fixed in-environment path the artifact directory is mounted at.
pub const ARTIFACT_MOUNT: &str = "/app";

/// Identity of a provisioned, running environment.
///
/// Exclusively owned by one batch; never reused across batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Backend-assigned container id.
    pub id: String,
    /// Human-readable container name.
    pub name: String,
}

impl std::fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Creates and starts isolated environments bound to artifact
/// directories.
pub(crate) struct ContainerProvisioner {
    docker: Docker,
    image: String,
}

impl ContainerProvisioner {
    pub(crate) fn new(docker: Docker, image: String) -> Self {
        Self { docker, image }
    }

    /// Provision one environment: verify the image, create the
    /// container with limits and the artifact bind mount, and start
    /// it. On success the environment is running, not merely created.
    pub(crate) async fn provision(
        &self,
        artifact_dir: &Path,
        limits: &ResourceLimits,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ProvisionError::backend_unavailable(e.to_string()))?;

        image::ensure_available(&self.docker, &self.image).await?;

        let name = container_name();
        let config = build_container_config(&self.image, artifact_dir, limits)?;

        debug!("creating container: {name}");
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| ProvisionError::create_failed(e.to_string()))?;

        let handle = EnvironmentHandle {
            id: created.id,
            name,
        };

        debug!(environment = %handle, "starting container");
        if let Err(e) = self
            .docker
            .start_container::<String>(&handle.id, None)
            .await
        {
            // Partially created resource: remove it before surfacing.
            let _ = self
                .docker
                .remove_container(
                    &handle.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(ProvisionError::start_failed(e.to_string()));
        }

        info!(environment = %handle, "environment provisioned");
        Ok(handle)
    }
}

fn container_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("judgebox-{}", &id[..12])
}

fn build_container_config(
    image: &str,
    artifact_dir: &Path,
    limits: &ResourceLimits,
) -> Result<ContainerConfig<String>, ProvisionError> {
    let bind = bind_spec(artifact_dir)?;

    Ok(ContainerConfig {
        image: Some(image.to_string()),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        // The image's default shell holds the environment open
        // between command executions.
        tty: Some(true),
        network_disabled: Some(limits.network_disabled),
        host_config: Some(HostConfig {
            binds: Some(vec![bind]),
            memory: Some(limits.memory_bytes),
            memory_swap: Some(limits.swap_bytes),
            nano_cpus: Some(limits.cpu_count.saturating_mul(1_000_000_000)),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn bind_spec(artifact_dir: &Path) -> Result<String, ProvisionError> {
    let host = artifact_dir
        .to_str()
        .ok_or_else(|| ProvisionError::invalid_artifact_path(artifact_dir))?;
    Ok(format!("{host}:{ARTIFACT_MOUNT}:rw"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ResourceLimits {
        ResourceLimits {
            memory_bytes: 100 * 1024 * 1024,
            swap_bytes: 0,
            cpu_count: 1,
            network_disabled: true,
        }
    }

    #[test]
    fn test_bind_spec() {
        let bind = bind_spec(Path::new("/tmp/artifact")).unwrap();
        assert_eq!(bind, "/tmp/artifact:/app:rw");
    }

    #[test]
    fn test_container_name_shape() {
        let name = container_name();
        assert!(name.starts_with("judgebox-"));
        assert_eq!(name.len(), "judgebox-".len() + 12);
        assert_ne!(name, container_name());
    }

    #[test]
    fn test_container_config_applies_limits() {
        let config =
            build_container_config("openjdk:8-alpine", Path::new("/tmp/artifact"), &limits())
                .unwrap();
        assert_eq!(config.image.as_deref(), Some("openjdk:8-alpine"));
        assert_eq!(config.network_disabled, Some(true));

        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(100 * 1024 * 1024));
        assert_eq!(host.memory_swap, Some(0));
        assert_eq!(host.nano_cpus, Some(1_000_000_000));
        assert_eq!(host.binds, Some(vec!["/tmp/artifact:/app:rw".to_string()]));
    }

    #[test]
    fn test_handle_display_uses_name() {
        let handle = EnvironmentHandle {
            id: "deadbeef".to_string(),
            name: "judgebox-abc123def456".to_string(),
        };
        assert_eq!(handle.to_string(), "judgebox-abc123def456");
    }
}
