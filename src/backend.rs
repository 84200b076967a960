//! The environment-backend seam.
//!
//! [`EnvironmentBackend`] is the capability surface the runtime needs
//! from an isolation provider: create/start, execute, sample, and
//! destroy. [`DockerBackend`] is the production implementation; tests
//! substitute a mock to exercise the orchestration invariants without
//! a daemon.

use async_trait::async_trait;
use bollard::Docker;
use std::path::Path;
use std::time::Duration;

use crate::config::{ResourceLimits, SandboxConfig};
use crate::error::{ConfigError, ExecError, ProvisionError};
use crate::exec::{ExecutionSupervisor, RawExecution};
use crate::monitor::{ResourceMonitor, SamplingSession};
use crate::provision::{ContainerProvisioner, EnvironmentHandle};
use crate::teardown;

/// Capability surface the sandbox runtime needs from an
/// isolated-environment backend.
#[async_trait]
pub trait EnvironmentBackend: Send + Sync {
    /// Creates and starts one isolated environment with the artifact
    /// directory mounted at a fixed in-environment path.
    async fn provision(&self, artifact_dir: &Path) -> Result<EnvironmentHandle, ProvisionError>;

    /// Subscribes to the environment's resource-usage stream. Must
    /// not block; sampling proceeds concurrently with execution.
    fn start_sampling(&self, handle: &EnvironmentHandle) -> SamplingSession;

    /// Runs the configured command once, delivering `input` on
    /// standard input.
    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        input: &str,
    ) -> Result<RawExecution, ExecError>;

    /// Stops and removes the environment. Returns `false` if either
    /// step failed; never raises.
    async fn destroy(&self, handle: &EnvironmentHandle) -> bool;
}

/// Docker implementation of [`EnvironmentBackend`], built on bollard.
pub struct DockerBackend {
    docker: Docker,
    provisioner: ContainerProvisioner,
    monitor: ResourceMonitor,
    supervisor: ExecutionSupervisor,
    command: Vec<String>,
    limits: ResourceLimits,
    timeout: Duration,
}

impl DockerBackend {
    /// Builds a backend from a Docker client and a sandbox config.
    pub fn new(docker: Docker, config: &SandboxConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limits = config.limits()?;

        Ok(Self {
            provisioner: ContainerProvisioner::new(docker.clone(), config.image.clone()),
            monitor: ResourceMonitor::new(docker.clone()),
            supervisor: ExecutionSupervisor::new(docker.clone()),
            docker,
            command: config.command.clone(),
            limits,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl EnvironmentBackend for DockerBackend {
    async fn provision(&self, artifact_dir: &Path) -> Result<EnvironmentHandle, ProvisionError> {
        self.provisioner.provision(artifact_dir, &self.limits).await
    }

    fn start_sampling(&self, handle: &EnvironmentHandle) -> SamplingSession {
        self.monitor.start_sampling(handle)
    }

    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        input: &str,
    ) -> Result<RawExecution, ExecError> {
        self.supervisor
            .execute(handle, &self.command, input, self.timeout)
            .await
    }

    async fn destroy(&self, handle: &EnvironmentHandle) -> bool {
        teardown::destroy(&self.docker, handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_rejects_empty_command() {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let config = SandboxConfig {
            command: Vec::new(),
            ..SandboxConfig::default()
        };
        assert!(matches!(
            DockerBackend::new(docker, &config),
            Err(ConfigError::EmptyCommand)
        ));
    }

    #[test]
    fn test_backend_rejects_bad_memory_limit() {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let mut config = SandboxConfig::default();
        config.resources.memory = "plenty".to_string();
        assert!(matches!(
            DockerBackend::new(docker, &config),
            Err(ConfigError::InvalidMemoryLimit { .. })
        ));
    }
}
