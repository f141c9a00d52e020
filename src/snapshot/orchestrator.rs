use crate::snapshot::archive::{Archive, ArchiveBuilder, ArchiveRole};
use crate::snapshot::function_path;
use crate::snapshot::job_config::JobConfiguration;
use crate::snapshot::progress::ProgressSink;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, AddMsg};
use crate::snapshot::snapshot_id::{CollisionPolicy, SnapshotId};
use crate::snapshot::upload::RemoteUploader;
use bon::Builder;
use chrono::{DateTime, Local};
use derive_more::Display;
use function_name::named;
use getset::Getters;
use std::path::PathBuf;
use tracing::{debug, error, info};
use validator::Validate;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum JobState {
    Idle,
    FolderCreated,
    #[display("Archiving({_0})")]
    Archiving(ArchiveRole),
    Uploading,
    Completed,
    Failed,
}

/// One run, from trigger to outcome. Never outlives [`SnapshotOrchestrator::run`].
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct SnapshotJob {
    config: JobConfiguration,
    snapshot_id: Option<SnapshotId>,
    snapshot_dir: Option<PathBuf>,
    archives: Vec<Archive>,
    state: JobState,
}

impl SnapshotJob {
    fn new(config: JobConfiguration) -> Self {
        Self {
            config,
            snapshot_id: None,
            snapshot_dir: None,
            archives: Vec::with_capacity(ArchiveRole::ALL.len()),
            state: JobState::Idle,
        }
    }

    fn transition(&mut self, next: JobState) {
        debug!("Snapshot job {} -> {}", self.state, next);
        self.state = next;
    }
}

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct SnapshotSummary {
    snapshot_id: SnapshotId,
    snapshot_dir: PathBuf,
    archives: Vec<Archive>,
    /// Whether the archives were handed to the uploader
    uploaded: bool,
}

/// Drives one snapshot: folder creation, the three archives in order, then
/// the upload when a remote target is configured.
///
/// Every run ends with exactly one outcome on the sink. Nothing is retried
/// and nothing written locally is removed on failure.
#[derive(Builder, Getters)]
#[getset(get = "pub")]
pub struct SnapshotOrchestrator<U: RemoteUploader> {
    #[builder(default)]
    archive_builder: ArchiveBuilder,
    uploader: U,
    #[builder(default)]
    collision_policy: CollisionPolicy,
}

impl<U: RemoteUploader> SnapshotOrchestrator<U> {
    pub fn run(&self, config: &JobConfiguration, sink: &dyn ProgressSink) -> Result<SnapshotSummary> {
        self.run_at(config, Local::now(), sink)
    }

    /// [`Self::run`] with the snapshot identifier taken from `now`.
    pub fn run_at(
        &self,
        config: &JobConfiguration,
        now: DateTime<Local>,
        sink: &dyn ProgressSink,
    ) -> Result<SnapshotSummary> {
        let mut job = SnapshotJob::new(config.clone());
        let result = self.drive(&mut job, now, sink);

        match &result {
            Ok(summary) => {
                job.transition(JobState::Completed);
                info!("Snapshot {} completed in {:?}", summary.snapshot_id, summary.snapshot_dir);
                sink.on_progress(if summary.uploaded {
                    "Snapshot creation and upload completed successfully!"
                } else {
                    "Snapshot creation completed successfully!"
                });
                sink.on_outcome(true);
            }
            Err(e) => {
                error!("Snapshot job failed in state {}: {}", job.state, e);
                job.transition(JobState::Failed);
                sink.on_progress(&format!("Error: {e}"));
                sink.on_outcome(false);
            }
        }

        result
    }

    #[named]
    fn drive(
        &self,
        job: &mut SnapshotJob,
        now: DateTime<Local>,
        sink: &dyn ProgressSink,
    ) -> Result<SnapshotSummary> {
        job.config
            .validate()
            .map_err(Error::from)
            .add_msg("Job configuration is incomplete")?;

        let (snapshot_id, snapshot_dir) = self
            .collision_policy
            .create_snapshot_dir(job.config.snapshot_folder(), SnapshotId::from_date_time(&now))
            .add_fn_name(function_path!())?;
        job.snapshot_id = Some(snapshot_id.clone());
        job.snapshot_dir = Some(snapshot_dir.clone());
        job.transition(JobState::FolderCreated);
        sink.on_progress(&format!("Created snapshot folder: {}", snapshot_dir.display()));

        for role in ArchiveRole::ALL {
            job.transition(JobState::Archiving(role));
            let archive = self
                .archive_builder
                .build_in(job.config.source_for(role), &snapshot_dir, role, sink)
                .add_fn_name(function_path!())?;
            job.archives.push(archive);
        }

        let uploaded = match job.config.remote().clone() {
            Some(target) if self.uploader.is_remote() => {
                job.transition(JobState::Uploading);
                self.uploader
                    .upload(&job.archives, &snapshot_id, &target, sink)
                    .add_fn_name(function_path!())?;
                true
            }
            Some(_) => {
                info!("Uploader is local only, skipping remote upload");
                false
            }
            None => false,
        };

        Ok(SnapshotSummary {
            snapshot_id,
            snapshot_dir,
            archives: job.archives.clone(),
            uploaded,
        })
    }
}
