//! Guaranteed stop-and-remove for isolated environments.
//!
//! Both steps are attempted even if the first fails. Failure is
//! reported as `false` and logged, never raised: a teardown problem
//! must not mask the batch result, but it does mean the container may
//! need external reaping.

use bollard::container::RemoveContainerOptions;
use bollard::Docker;
use tracing::{debug, error};

use crate::provision::EnvironmentHandle;

/// Stops and removes the environment. Returns `false` if either step
/// failed.
pub(crate) async fn destroy(docker: &Docker, handle: &EnvironmentHandle) -> bool {
    debug!(environment = %handle, "tearing down environment");
    let mut clean = true;

    if let Err(e) = docker.stop_container(&handle.id, None).await {
        error!(environment = %handle, "failed to stop container: {e}");
        clean = false;
    }

    if let Err(e) = docker
        .remove_container(
            &handle.id,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        error!(environment = %handle, "failed to remove container: {e}");
        clean = false;
    }

    if clean {
        debug!(environment = %handle, "environment removed");
    }
    clean
}
