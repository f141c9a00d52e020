pub mod b2;

use crate::snapshot::archive::Archive;
use crate::snapshot::function_path;
use crate::snapshot::job_config::RemoteTarget;
use crate::snapshot::progress::ProgressSink;
use crate::snapshot::redacted::RedactedString;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::{convert_error_vec, Result};
use crate::snapshot::result_error::{AddFunctionName, AddMsg};
use crate::snapshot::snapshot_id::SnapshotId;
use derive_more::From;
use function_name::named;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::result;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

/// Pushes the archives of one snapshot to remote storage.
pub trait RemoteUploader: Send + Sync {
    fn upload(
        &self,
        archives: &[Archive],
        snapshot_id: &SnapshotId,
        target: &RemoteTarget,
        sink: &dyn ProgressSink,
    ) -> Result<()>;

    /// Whether `upload` sends anything off the machine.
    fn is_remote(&self) -> bool {
        true
    }
}

/// Uploader of the local-only mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopUploader;

impl RemoteUploader for NoopUploader {
    fn upload(
        &self,
        archives: &[Archive],
        snapshot_id: &SnapshotId,
        _target: &RemoteTarget,
        _sink: &dyn ProgressSink,
    ) -> Result<()> {
        info!(
            "Remote upload disabled, keeping {} archives of {} local",
            archives.len(),
            snapshot_id
        );
        Ok(())
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// `{prefix}/{snapshot_id}/{file_name}` without a leading separator.
pub fn remote_key(prefix: &str, snapshot_id: &SnapshotId, file_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    format!("{prefix}/{snapshot_id}/{file_name}")
        .trim_start_matches('/')
        .to_string()
}

/// An object as stored remotely; enough to delete it again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub id: String,
}

/// Authorization and bucket lookup of an object storage service.
pub trait ObjectStore {
    type Session;
    type Bucket: ObjectBucket;

    /// Shown in progress text, e.g. `B2`.
    fn service_name(&self) -> &'static str;

    fn authorize(&self, key_id: &str, key_secret: &RedactedString) -> Result<Self::Session>;

    fn resolve_bucket(&self, session: &Self::Session, bucket_name: &str) -> Result<Self::Bucket>;
}

pub trait ObjectBucket {
    /// Stores the whole file at `path` as a single object under `key`.
    fn upload_file(&self, key: &str, path: &Path, content_type: &str) -> Result<RemoteObject>;

    fn delete(&self, object: &RemoteObject) -> Result<()>;
}

/// Sequential all-or-nothing upload on top of an [`ObjectStore`].
///
/// When an archive fails to upload, the objects uploaded before it in the same
/// call are deleted again, best effort. Rollback failures are chained onto the
/// upload error.
#[derive(Clone, Debug)]
pub struct ObjectStoreUploader<S> {
    store: S,
}

impl<S: ObjectStore> ObjectStoreUploader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn rollback(&self, bucket: &S::Bucket, uploaded: &[RemoteObject], sink: &dyn ProgressSink) -> Vec<Error> {
        sink.on_progress(&format!(
            "Removing {} already uploaded objects from {}...",
            uploaded.len(),
            self.store.service_name()
        ));
        uploaded
            .iter()
            .rev()
            .filter_map(|object| match bucket.delete(object) {
                Ok(()) => {
                    info!("Rolled back remote object {}", object.key);
                    None
                }
                Err(e) => {
                    warn!("Rollback of remote object {} failed: {}", object.key, e);
                    Some(e.add_msg(format!("Removing {} failed", object.key)))
                }
            })
            .collect()
    }
}

impl<S> RemoteUploader for ObjectStoreUploader<S>
where
    S: ObjectStore + Send + Sync,
{
    #[named]
    fn upload(
        &self,
        archives: &[Archive],
        snapshot_id: &SnapshotId,
        target: &RemoteTarget,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let service = self.store.service_name();
        sink.on_progress(&format!("Initializing {service} upload..."));

        let session = self
            .store
            .authorize(target.key_id(), target.key_secret())
            .map_err(|e| {
                sink.on_progress(&format!("{service} Authentication Error: {e}"));
                Error::authorization(e)
            })
            .add_fn_name(function_path!())?;

        let bucket = self
            .store
            .resolve_bucket(&session, target.bucket_name())
            .map_err(|e| {
                sink.on_progress(&format!("{service} Bucket Error: {e}"));
                Error::bucket_resolution(e)
            })
            .add_msg(format!("Bucket {:?}", target.bucket_name()))
            .add_fn_name(function_path!())?;

        let mut uploaded = Vec::with_capacity(archives.len());
        for archive in archives {
            let file_name = archive.file_name();
            let key = remote_key(target.key_prefix(), snapshot_id, &file_name);
            sink.on_progress(&format!("Uploading {file_name} to {service}..."));

            match bucket.upload_file(&key, archive.path(), archive.media_type()) {
                Ok(object) => {
                    info!("Uploaded {:?} as {}", archive.path(), object.key);
                    sink.on_progress(&format!("Uploaded {file_name} to {service}"));
                    uploaded.push(object);
                }
                Err(e) => {
                    sink.on_progress(&format!("{service} Upload Error: {e}"));
                    let error = Error::upload_failure(e)
                        .add_msg(format!("Uploading {:?} as {key} failed", archive.path()))
                        .add_fn_name(function_path!());
                    if uploaded.is_empty() {
                        return Err(error);
                    }
                    let rollback_errors = self.rollback(&bucket, &uploaded, sink);
                    return match convert_error_vec(rollback_errors) {
                        Ok(()) => Err(error),
                        Err(rollback) => Err(error.chain(rollback)),
                    };
                }
            }
        }

        Ok(())
    }
}

/// Remote storage backend selected in the application config.
#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "uploader_type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum UploaderConfig {
    /// Local-only snapshots
    None,
    B2(b2::B2Config),
}

impl Default for UploaderConfig {
    fn default() -> Self {
        UploaderConfig::B2(b2::B2Config::default())
    }
}

impl Validate for UploaderConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            UploaderConfig::None => Ok(()),
            UploaderConfig::B2(b2) => b2.validate(),
        }
    }
}

impl UploaderConfig {
    pub fn is_remote(&self) -> bool {
        !matches!(self, UploaderConfig::None)
    }

    pub fn build_uploader(&self) -> Result<Uploader> {
        match self {
            UploaderConfig::None => Ok(Uploader::Noop(NoopUploader)),
            UploaderConfig::B2(config) => Ok(Uploader::B2(ObjectStoreUploader::new(
                b2::B2Store::new(config)?,
            ))),
        }
    }
}

pub enum Uploader {
    Noop(NoopUploader),
    B2(ObjectStoreUploader<b2::B2Store>),
}

impl RemoteUploader for Uploader {
    fn upload(
        &self,
        archives: &[Archive],
        snapshot_id: &SnapshotId,
        target: &RemoteTarget,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        match self {
            Uploader::Noop(inner) => inner.upload(archives, snapshot_id, target, sink),
            Uploader::B2(inner) => inner.upload(archives, snapshot_id, target, sink),
        }
    }

    fn is_remote(&self) -> bool {
        match self {
            Uploader::Noop(inner) => inner.is_remote(),
            Uploader::B2(inner) => inner.is_remote(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Bucket kept in memory, with injectable failures.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        pub(crate) objects: Arc<Mutex<BTreeMap<String, (String, Vec<u8>)>>>,
        pub(crate) attempts: Arc<Mutex<Vec<String>>>,
        pub(crate) reject_key: bool,
        pub(crate) missing_bucket: bool,
        /// Uploads of keys ending with this fail
        pub(crate) fail_upload_of: Option<String>,
        pub(crate) fail_delete: bool,
    }

    impl MemoryStore {
        pub(crate) fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        pub(crate) fn content_type(&self, key: &str) -> Option<String> {
            self.objects.lock().unwrap().get(key).map(|(ct, _)| ct.clone())
        }

        pub(crate) fn content(&self, key: &str) -> Option<Vec<u8>> {
            self.objects.lock().unwrap().get(key).map(|(_, c)| c.clone())
        }

        /// Keys in the order uploads were attempted.
        pub(crate) fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl ObjectStore for MemoryStore {
        type Session = ();
        type Bucket = MemoryStore;

        fn service_name(&self) -> &'static str {
            "Memory"
        }

        fn authorize(&self, key_id: &str, _key_secret: &RedactedString) -> Result<()> {
            if self.reject_key {
                return Err(Error::b2_api(
                    401u16,
                    "unauthorized",
                    format!("key {key_id} rejected"),
                ));
            }
            Ok(())
        }

        fn resolve_bucket(&self, _session: &(), bucket_name: &str) -> Result<MemoryStore> {
            if self.missing_bucket {
                return Err(Error::bucket_not_found(bucket_name));
            }
            Ok(self.clone())
        }
    }

    impl ObjectBucket for MemoryStore {
        fn upload_file(&self, key: &str, path: &Path, content_type: &str) -> Result<RemoteObject> {
            self.attempts.lock().unwrap().push(key.to_string());
            if self
                .fail_upload_of
                .as_deref()
                .is_some_and(|suffix| key.ends_with(suffix))
            {
                return Err(Error::b2_api(503u16, "service_unavailable", "try again later"));
            }
            let content = std::fs::read(path)?;
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (content_type.to_string(), content));
            Ok(RemoteObject {
                key: key.to_string(),
                id: format!("id-{key}"),
            })
        }

        fn delete(&self, object: &RemoteObject) -> Result<()> {
            if self.fail_delete {
                return Err(Error::b2_api(500u16, "internal_error", "delete failed"));
            }
            self.objects.lock().unwrap().remove(&object.key);
            Ok(())
        }
    }
}
