use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::AddMsg;
use chrono::{DateTime, TimeZone};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Day, month, two-digit year, then time of day, all zero padded.
pub static SNAPSHOT_ID_FORMAT: &str = "%d%m%y%H%M%S";

/// Name of one snapshot, used as local directory name and remote key segment.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SnapshotId(Arc<str>);

impl SnapshotId {
    pub fn from_date_time<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(dt.format(SNAPSHOT_ID_FORMAT).to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}_{}", self.0, n).into())
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for SnapshotId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// What to do when the snapshot directory for a timestamp already exists.
#[derive(Clone, Copy, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Append `_1`, `_2`, ... until an unused directory name is found.
    #[default]
    Disambiguate,
    /// Reuse the existing directory; archives of the earlier run are replaced.
    Overwrite,
}

impl CollisionPolicy {
    /// Creates `{root}/{id}` (and `root` itself when missing) and returns the
    /// identifier actually used.
    pub fn create_snapshot_dir(&self, root: &Path, base: SnapshotId) -> Result<(SnapshotId, PathBuf)> {
        match self {
            CollisionPolicy::Overwrite => {
                let dir = root.join(base.as_str());
                std::fs::create_dir_all(&dir)
                    .map_err(Error::from)
                    .add_msg(format!("Creating snapshot folder {:?} failed", dir))?;
                Ok((base, dir))
            }
            CollisionPolicy::Disambiguate => {
                std::fs::create_dir_all(root)
                    .map_err(Error::from)
                    .add_msg(format!("Creating snapshot root {:?} failed", root))?;
                let mut n = 0;
                loop {
                    let id = if n == 0 { base.clone() } else { base.with_suffix(n) };
                    let dir = root.join(id.as_str());
                    match std::fs::create_dir(&dir) {
                        Ok(()) => return Ok((id, dir)),
                        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                            debug!("Snapshot folder {:?} already exists", dir);
                            n += 1;
                        }
                        Err(e) => {
                            return Err(Error::from(e)
                                .add_msg(format!("Creating snapshot folder {:?} failed", dir)))
                        }
                    }
                }
            }
        }
    }
}
