//! Execution core for a Docker-backed code-judging sandbox.
//!
//! Given a staged, runnable artifact directory and an ordered list of
//! test inputs, [`SandboxRuntime`] provisions one isolated container,
//! runs the artifact once per input under CPU, memory, and network
//! limits, captures per-run stdout, elapsed time, and peak memory,
//! and guarantees the container is torn down afterward on every
//! control path.
//!
//! Out of scope by design: producing the artifact (compilation,
//! staging), image selection policy, and the service layer that
//! compares outputs to expected answers.
//!
//! ```no_run
//! use judgebox::{SandboxConfig, SandboxRuntime};
//!
//! # async fn demo() -> Result<(), judgebox::SandboxError> {
//! let config = SandboxConfig::default();
//! let runtime = SandboxRuntime::new(&config)?;
//!
//! let inputs = vec!["3".to_string(), "10".to_string()];
//! let outcomes = runtime
//!     .run_batch("/tmp/artifact".as_ref(), &inputs)
//!     .await?;
//!
//! for outcome in &outcomes {
//!     println!(
//!         "{} ({} ms, {} bytes peak, timed out: {})",
//!         outcome.stdout.trim(),
//!         outcome.elapsed_ms(),
//!         outcome.peak_memory_bytes,
//!         outcome.timed_out,
//!     );
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod error;
mod exec;
mod image;
mod monitor;
mod provision;
mod runtime;
mod teardown;

pub use backend::{DockerBackend, EnvironmentBackend};
pub use config::{ResourceConfig, ResourceLimits, SandboxConfig};
pub use error::{ConfigError, ExecError, ProvisionError, SandboxError};
pub use exec::{ExecutionOutcome, RawExecution};
pub use image::invalidate_image;
pub use monitor::SamplingSession;
pub use provision::{EnvironmentHandle, ARTIFACT_MOUNT};
pub use runtime::SandboxRuntime;
