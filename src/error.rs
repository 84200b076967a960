//! Domain-specific error types for the sandbox execution core.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings. Teardown failure is
//! deliberately not an error type: it is reported as a boolean and
//! logged, because it must never mask the batch result.

use crate::exec::ExecutionOutcome;

/// Errors raised while provisioning an isolated environment.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The environment backend (Docker daemon) is not reachable.
    #[error("environment backend is not available: {message}")]
    BackendUnavailable {
        /// Underlying failure description.
        message: String,
    },

    /// The runtime image could not be made available locally.
    #[error("image '{image}' is unavailable: {message}")]
    ImageUnavailable {
        /// Image reference that failed to resolve.
        image: String,
        /// Underlying failure description.
        message: String,
    },

    /// The artifact directory path cannot be expressed as a bind mount.
    #[error("artifact directory path is not valid UTF-8: {path}")]
    InvalidArtifactPath {
        /// Lossy rendering of the offending path.
        path: String,
    },

    /// Environment creation failed.
    #[error("failed to create environment: {message}")]
    CreateFailed {
        /// Underlying failure description.
        message: String,
    },

    /// The environment was created but could not be started.
    #[error("failed to start environment: {message}")]
    StartFailed {
        /// Underlying failure description.
        message: String,
    },
}

impl ProvisionError {
    /// Creates a `BackendUnavailable` error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageUnavailable` error.
    pub fn image_unavailable(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageUnavailable {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvalidArtifactPath` error.
    pub fn invalid_artifact_path(path: &std::path::Path) -> Self {
        Self::InvalidArtifactPath {
            path: path.display().to_string(),
        }
    }

    /// Creates a `CreateFailed` error.
    pub fn create_failed(message: impl Into<String>) -> Self {
        Self::CreateFailed {
            message: message.into(),
        }
    }

    /// Creates a `StartFailed` error.
    pub fn start_failed(message: impl Into<String>) -> Self {
        Self::StartFailed {
            message: message.into(),
        }
    }

    /// Returns true if the backend itself was unreachable.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Errors raised while creating or attaching a command execution
/// inside a running environment.
///
/// A timeout is *not* an `ExecError`: it is a terminal outcome state
/// recorded on the [`ExecutionOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The exec instance could not be created.
    #[error("failed to create command execution: {message}")]
    CreateFailed {
        /// Underlying failure description.
        message: String,
    },

    /// The exec instance started but its streams were not attached.
    #[error("failed to attach to command execution: {message}")]
    AttachFailed {
        /// Underlying failure description.
        message: String,
    },
}

impl ExecError {
    /// Creates a `CreateFailed` error.
    pub fn create_failed(message: impl Into<String>) -> Self {
        Self::CreateFailed {
            message: message.into(),
        }
    }

    /// Creates an `AttachFailed` error.
    pub fn attach_failed(message: impl Into<String>) -> Self {
        Self::AttachFailed {
            message: message.into(),
        }
    }
}

/// Errors raised while loading or validating sandbox configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config file {path}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config file {path}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A memory limit string could not be parsed to bytes.
    #[error("invalid memory limit: '{value}'")]
    InvalidMemoryLimit {
        /// The offending value.
        value: String,
    },

    /// The configured command vector is empty.
    #[error("sandbox command must not be empty")]
    EmptyCommand,
}

/// Batch-level error returned by the sandbox runtime.
///
/// Execution failures carry the outcomes already computed before the
/// failing input, so callers never lose finished work.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Configuration was invalid.
    #[error("invalid sandbox configuration")]
    Config(#[from] ConfigError),

    /// Provisioning failed; no executions were attempted.
    #[error("environment provisioning failed")]
    Provision(#[from] ProvisionError),

    /// An execution failed mid-batch. Remaining inputs were skipped
    /// and the environment was torn down before this was surfaced.
    #[error("execution failed for input {input_index} in environment {environment}")]
    Execution {
        /// Zero-based index of the failing input.
        input_index: usize,
        /// Identifier of the environment the batch ran in.
        environment: String,
        /// Outcomes completed before the failure, in input order.
        outcomes: Vec<ExecutionOutcome>,
        /// The underlying execution failure.
        #[source]
        source: ExecError,
    },
}

impl SandboxError {
    /// Returns the outcomes completed before the batch failed.
    ///
    /// Empty for configuration and provisioning failures.
    pub fn completed_outcomes(&self) -> &[ExecutionOutcome] {
        match self {
            Self::Execution { outcomes, .. } => outcomes,
            _ => &[],
        }
    }

    /// Returns true if the batch failed before any execution started.
    pub fn is_provision(&self) -> bool {
        matches!(self, Self::Provision(_))
    }

    /// Returns true if the batch failed during an execution.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_error_display() {
        let err = ProvisionError::backend_unavailable("daemon not running");
        assert!(err.is_backend_unavailable());
        assert_eq!(
            err.to_string(),
            "environment backend is not available: daemon not running"
        );

        let err = ProvisionError::image_unavailable("openjdk:8-alpine", "pull failed");
        assert_eq!(
            err.to_string(),
            "image 'openjdk:8-alpine' is unavailable: pull failed"
        );
    }

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::create_failed("container is not running");
        assert_eq!(
            err.to_string(),
            "failed to create command execution: container is not running"
        );

        let err = ExecError::attach_failed("exec started detached");
        assert_eq!(
            err.to_string(),
            "failed to attach to command execution: exec started detached"
        );
    }

    #[test]
    fn test_sandbox_error_wraps_provision() {
        let err = SandboxError::from(ProvisionError::create_failed("no space left"));
        assert!(err.is_provision());
        assert!(!err.is_execution());
        assert!(err.completed_outcomes().is_empty());
    }

    #[test]
    fn test_execution_error_keeps_partial_outcomes() {
        let done = ExecutionOutcome {
            stdout: "sum=6".to_string(),
            elapsed: std::time::Duration::from_millis(12),
            peak_memory_bytes: 4096,
            timed_out: false,
        };
        let err = SandboxError::Execution {
            input_index: 1,
            environment: "judgebox-abc123".to_string(),
            outcomes: vec![done.clone()],
            source: ExecError::create_failed("gone"),
        };
        assert!(err.is_execution());
        assert_eq!(err.completed_outcomes(), &[done]);
        assert_eq!(
            err.to_string(),
            "execution failed for input 1 in environment judgebox-abc123"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidMemoryLimit {
            value: "lots".to_string(),
        };
        assert_eq!(err.to_string(), "invalid memory limit: 'lots'");
        assert_eq!(ConfigError::EmptyCommand.to_string(), "sandbox command must not be empty");
    }
}
