//! Peak-memory tracking over an environment's usage-statistics stream.
//!
//! Each execution gets its own [`SamplingSession`]: a spawned consumer
//! of the backend's push stream that keeps a running maximum of the
//! memory field. The stream reports usage for the whole environment,
//! not per process, so the peak attributed to one execution includes
//! environment baseline overhead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bollard::container::StatsOptions;
use bollard::Docker;
use futures_util::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::provision::EnvironmentHandle;

/// Subscribes to per-environment resource statistics.
pub(crate) struct ResourceMonitor {
    docker: Docker,
}

impl ResourceMonitor {
    pub(crate) fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Starts consuming the stats stream for `handle`. Returns
    /// immediately; sampling happens on a spawned task until the
    /// session is stopped.
    pub(crate) fn start_sampling(&self, handle: &EnvironmentHandle) -> SamplingSession {
        let stats = self.docker.stats(
            &handle.id,
            Some(StatsOptions {
                stream: true,
                one_shot: false,
            }),
        );

        let memory = stats.filter_map(|snapshot| async move {
            match snapshot {
                Ok(stats) => stats.memory_stats.usage,
                Err(e) => {
                    debug!("stats stream error: {e}");
                    None
                }
            }
        });

        SamplingSession::spawn(memory)
    }
}

/// A running subscription to an environment's usage stream, scoped to
/// one execution window.
///
/// [`stop`](Self::stop) consumes the session, so it can only be
/// stopped once; dropping the session without stopping it also ends
/// the subscription.
pub struct SamplingSession {
    peak: Arc<AtomicU64>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SamplingSession {
    /// Spawns a consumer that tracks the running maximum of `samples`.
    pub(crate) fn spawn<S>(samples: S) -> Self
    where
        S: Stream<Item = u64> + Send + 'static,
    {
        let peak = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn({
            let peak = Arc::clone(&peak);
            async move {
                futures_util::pin_mut!(samples);
                loop {
                    tokio::select! {
                        // Ready samples are consumed before the stop
                        // signal is honored, so nothing observed up to
                        // the stop point is lost.
                        biased;
                        sample = samples.next() => match sample {
                            Some(bytes) => {
                                peak.fetch_max(bytes, Ordering::Relaxed);
                            }
                            None => break,
                        },
                        _ = &mut stop_rx => break,
                    }
                }
            }
        });

        Self {
            peak,
            stop: stop_tx,
            task,
        }
    }

    /// The running maximum observed so far, in bytes.
    pub fn peak_so_far(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Unsubscribes from the stream and returns the peak memory
    /// observed, in bytes.
    pub async fn stop(self) -> u64 {
        // Receiver may already be gone if the stream ended on its own.
        let _ = self.stop.send(());
        let _ = self.task.await;
        self.peak.load(Ordering::Relaxed)
    }
}
