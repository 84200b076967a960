//! Batch orchestration: one environment per batch, sequential
//! executions in input order, teardown exactly once on every exit
//! path.

use bollard::Docker;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::backend::{DockerBackend, EnvironmentBackend};
use crate::config::SandboxConfig;
use crate::error::{ExecError, ProvisionError, SandboxError};
use crate::exec::ExecutionOutcome;
use crate::provision::EnvironmentHandle;

/// Runs batches of test inputs against a staged artifact, one isolated
/// environment per batch.
///
/// Each runtime owns its own backend; multiple runtimes can operate
/// concurrently with no shared state. Within one batch, executions are
/// strictly sequential and outcomes preserve input order.
pub struct SandboxRuntime<B: EnvironmentBackend = DockerBackend> {
    backend: B,
}

impl SandboxRuntime<DockerBackend> {
    /// Creates a runtime backed by the local Docker daemon.
    pub fn new(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ProvisionError::backend_unavailable(e.to_string()))?;
        Ok(Self {
            backend: DockerBackend::new(docker, config)?,
        })
    }
}

impl<B: EnvironmentBackend> SandboxRuntime<B> {
    /// Creates a runtime over an arbitrary environment backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Runs the artifact once per input inside a single freshly
    /// provisioned environment, then tears the environment down.
    ///
    /// On success, returns exactly one [`ExecutionOutcome`] per input,
    /// in input order. On a per-input failure the remaining inputs are
    /// skipped and the outcomes already computed travel inside the
    /// returned [`SandboxError::Execution`]. Teardown is attempted
    /// exactly once on every path once provisioning has succeeded.
    pub async fn run_batch(
        &self,
        artifact_dir: &Path,
        inputs: &[String],
    ) -> Result<Vec<ExecutionOutcome>, SandboxError> {
        let handle = self.backend.provision(artifact_dir).await?;
        info!(environment = %handle, inputs = inputs.len(), "starting batch");

        // No early return between here and destroy: the batch result
        // is carried as a value so teardown runs on every path.
        let result = self.run_inputs(&handle, inputs).await;

        let clean = self.backend.destroy(&handle).await;
        if !clean {
            warn!(
                environment = %handle,
                "teardown reported failure; environment may need external cleanup"
            );
        }

        match result {
            Ok(outcomes) => {
                info!(environment = %handle, outcomes = outcomes.len(), "batch complete");
                Ok(outcomes)
            }
            Err((input_index, outcomes, source)) => Err(SandboxError::Execution {
                input_index,
                environment: handle.id.clone(),
                outcomes,
                source,
            }),
        }
    }

    async fn run_inputs(
        &self,
        handle: &EnvironmentHandle,
        inputs: &[String],
    ) -> Result<Vec<ExecutionOutcome>, (usize, Vec<ExecutionOutcome>, ExecError)> {
        let mut outcomes = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let session = self.backend.start_sampling(handle);
            let executed = self.backend.execute(handle, input).await;
            // The session is stopped on the error path too, so the
            // stats stream never leaks.
            let peak_memory_bytes = session.stop().await;

            match executed {
                Ok(raw) => {
                    debug!(
                        environment = %handle,
                        input = index,
                        elapsed_ms = raw.elapsed.as_millis(),
                        peak_memory_bytes,
                        timed_out = raw.timed_out,
                        "execution finished"
                    );
                    outcomes.push(ExecutionOutcome {
                        stdout: raw.stdout,
                        elapsed: raw.elapsed,
                        peak_memory_bytes,
                        timed_out: raw.timed_out,
                    });
                }
                Err(e) => return Err((index, outcomes, e)),
            }
        }

        Ok(outcomes)
    }
}
