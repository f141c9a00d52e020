//! Persisted secrets record: folder paths plus B2 credentials.
//!
//! The record is a flat JSON object. In upload-capable mode it lives under the
//! user's home (`~/secrets/obsidian-to-b2.json`), away from the application
//! config; the local-only mode keeps the folder paths in a project-relative
//! `config.json` instead.

use crate::snapshot::function_path;
use crate::snapshot::job_config::{JobConfiguration, RemoteTarget};
use crate::snapshot::redacted::{serialize_exposed, RedactedString};
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, AddMsg};
use crate::snapshot::upload::UploaderConfig;
use function_name::named;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub static SECRETS_DIR_NAME: &str = "secrets";
pub static SECRETS_FILE_NAME: &str = "obsidian-to-b2.json";
pub static LOCAL_CONFIG_FILE_NAME: &str = "config.json";

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub agent_folder: Option<String>,
    pub prompt_folder: Option<String>,
    pub output_folder: Option<String>,
    pub snapshot_folder: Option<String>,
    pub b2_key_id: Option<String>,
    #[serde(serialize_with = "serialize_exposed")]
    pub b2_key_secret: Option<RedactedString>,
    pub b2_bucket_name: Option<String>,
    /// Key prefix inside the bucket, bucket root when absent
    pub b2_folder: Option<String>,
    /// Keys written by other tools, kept as-is on save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Credentials {
    /// Overwrites every field that is set in `other`.
    pub fn merge(&mut self, other: Credentials) {
        fn take(dst: &mut Option<String>, src: Option<String>) {
            if src.is_some() {
                *dst = src;
            }
        }

        take(&mut self.agent_folder, other.agent_folder);
        take(&mut self.prompt_folder, other.prompt_folder);
        take(&mut self.output_folder, other.output_folder);
        take(&mut self.snapshot_folder, other.snapshot_folder);
        take(&mut self.b2_key_id, other.b2_key_id);
        if other.b2_key_secret.is_some() {
            self.b2_key_secret = other.b2_key_secret;
        }
        take(&mut self.b2_bucket_name, other.b2_bucket_name);
        take(&mut self.b2_folder, other.b2_folder);
        self.extra.extend(other.extra);
    }

    /// Snapshots the record into an immutable job configuration.
    ///
    /// Absent fields become empty values so that validation of the returned
    /// configuration reports them.
    pub fn job_configuration(&self, with_remote: bool) -> JobConfiguration {
        fn path(value: &Option<String>) -> PathBuf {
            value.as_deref().map(PathBuf::from).unwrap_or_default()
        }

        let remote = with_remote.then(|| {
            RemoteTarget::builder()
                .key_id(self.b2_key_id.clone().unwrap_or_default())
                .key_secret(
                    self.b2_key_secret
                        .clone()
                        .unwrap_or_else(|| RedactedString::from("")),
                )
                .bucket_name(self.b2_bucket_name.clone().unwrap_or_default())
                .key_prefix(self.b2_folder.clone().unwrap_or_default())
                .build()
        });

        JobConfiguration::builder()
            .agent_folder(path(&self.agent_folder))
            .prompt_folder(path(&self.prompt_folder))
            .output_folder(path(&self.output_folder))
            .snapshot_folder(path(&self.snapshot_folder))
            .maybe_remote(remote)
            .build()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/secrets/obsidian-to-b2.json`
    pub fn user_default() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::from(std::io::Error::new(
                ErrorKind::NotFound,
                "cannot determine the home directory",
            ))
        })?;
        Ok(Self::new(home.join(SECRETS_DIR_NAME).join(SECRETS_FILE_NAME)))
    }

    /// Project-relative `config.json` of the local-only mode
    pub fn local_only() -> Self {
        Self::new(LOCAL_CONFIG_FILE_NAME)
    }

    pub fn for_uploader(uploader: &UploaderConfig) -> Result<Self> {
        if uploader.is_remote() {
            Self::user_default()
        } else {
            Ok(Self::local_only())
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record; a missing file yields an empty record.
    #[named]
    pub fn load(&self) -> Result<Credentials> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(Error::from)
                .add_msg(format!("Parse credentials failed: {:?}", self.path))
                .add_fn_name(function_path!()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No saved credentials at {:?}", self.path);
                Ok(Credentials::default())
            }
            Err(e) => Err(Error::from(e))
                .add_msg(format!("Read credentials failed: {:?}", self.path))
                .add_fn_name(function_path!()),
        }
    }

    /// Replaces the stored record with `credentials`.
    ///
    /// The record is written to a temporary file next to the target and
    /// renamed over it, so readers see either the old or the new record. The
    /// temporary file is created owner-only on Unix and keeps that mode.
    #[named]
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .map_err(Error::from)
            .add_msg(format!("Create credentials folder failed: {:?}", parent))
            .add_fn_name(function_path!())?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, credentials)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(Error::from)
            .add_msg(format!("Replace credentials failed: {:?}", self.path))
            .add_fn_name(function_path!())?;
        debug!("Saved credentials to {:?}", self.path);
        Ok(())
    }
}
