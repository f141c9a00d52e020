use crate::snapshot::job_config::JobConfiguration;
use crate::snapshot::orchestrator::{SnapshotOrchestrator, SnapshotSummary};
use crate::snapshot::progress::ProgressSink;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::AddMsg;
use crate::snapshot::upload::RemoteUploader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub static JOB_THREAD_NAME: &str = "snapshot-job";

/// Runs snapshot jobs on a background thread, one at a time.
pub struct SnapshotRunner<U: RemoteUploader + 'static> {
    orchestrator: Arc<SnapshotOrchestrator<U>>,
    busy: Arc<AtomicBool>,
}

/// Busy claim of one job. Only the first `release` clears the runner flag,
/// so a late release cannot free a job started afterwards.
struct JobClaim {
    busy: Arc<AtomicBool>,
    released: AtomicBool,
}

impl JobClaim {
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.busy.store(false, Ordering::Release);
            debug!("Snapshot runner is idle");
        }
    }
}

/// Releases the claim before the outcome reaches the caller's sink.
struct ReleasingSink {
    inner: Arc<dyn ProgressSink>,
    claim: Arc<JobClaim>,
}

impl ProgressSink for ReleasingSink {
    fn on_progress(&self, message: &str) {
        self.inner.on_progress(message);
    }

    fn on_outcome(&self, success: bool) {
        self.claim.release();
        self.inner.on_outcome(success);
    }
}

/// Releases the claim when the job thread ends, panics included.
struct BusyGuard(Arc<JobClaim>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl<U: RemoteUploader + 'static> SnapshotRunner<U> {
    pub fn new(orchestrator: SnapshotOrchestrator<U>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts a job unless one is already in flight.
    ///
    /// Progress and the outcome go to `sink`; the handle yields the run's
    /// result. A trigger while busy fails with [`Error::JobInProgress`] and
    /// leaves the running job alone. The runner is idle again by the time the
    /// outcome is delivered.
    pub fn trigger(
        &self,
        config: JobConfiguration,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<JoinHandle<Result<SnapshotSummary>>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Snapshot trigger rejected, a job is already running");
            return Err(Error::job_in_progress());
        }
        let claim = Arc::new(JobClaim {
            busy: self.busy.clone(),
            released: AtomicBool::new(false),
        });
        let guard = BusyGuard(claim.clone());
        let sink = ReleasingSink { inner: sink, claim };

        let orchestrator = self.orchestrator.clone();
        std::thread::Builder::new()
            .name(JOB_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                orchestrator.run(&config, &sink)
            })
            .map_err(Error::from)
            .add_msg("Spawning snapshot job thread failed")
    }
}
