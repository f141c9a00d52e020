use crate::snapshot::archive::ArchiveBuilder;
use crate::snapshot::compress::CompressorConfig;
use crate::snapshot::credentials::CredentialStore;
use crate::snapshot::orchestrator::SnapshotOrchestrator;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::AddMsg;
use crate::snapshot::snapshot_id::CollisionPolicy;
use crate::snapshot::upload::{Uploader, UploaderConfig};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use validator::Validate;

/// Application settings, kept apart from the secrets record.
///
/// ```yaml
/// compressor:
///   compressor_type: xz
///   level: 9
/// collision_policy: disambiguate
/// uploader:
///   uploader_type: b2
///   timeout: 10m
/// ```
#[skip_serializing_none]
#[derive(Clone, Default, Serialize, Deserialize, Debug, Validate, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Overrides the default location of the secrets record
    pub credentials_file: Option<PathBuf>,
    #[serde(default)]
    #[validate(nested)]
    pub compressor: CompressorConfig,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    #[serde(default)]
    #[validate(nested)]
    pub uploader: UploaderConfig,
}

impl AppConfig {
    /// Parses and validates `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match File::open(path) {
            Ok(f) => serde_yml::from_reader::<_, AppConfig>(f)
                .map_err(Error::from)
                .add_msg(format!("Parse YAML config failed: {:?}", path))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config file at {:?}, using defaults", path);
                AppConfig::default()
            }
            Err(e) => {
                return Err(Error::from(e).add_msg(format!("Open config failed: {:?}", path)))
            }
        };

        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }

    pub fn credential_store(&self) -> Result<CredentialStore> {
        match &self.credentials_file {
            Some(path) => Ok(CredentialStore::new(path)),
            None => CredentialStore::for_uploader(&self.uploader),
        }
    }

    pub fn build_orchestrator(&self) -> Result<SnapshotOrchestrator<Uploader>> {
        Ok(SnapshotOrchestrator::builder()
            .archive_builder(
                ArchiveBuilder::builder()
                    .compressor(self.compressor.clone())
                    .build(),
            )
            .uploader(self.uploader.build_uploader()?)
            .collision_policy(self.collision_policy)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::compress::xz::XzConfig;
    use crate::snapshot::result_error::error::ErrorKind as SnapshotErrorKind;
    use crate::snapshot::upload::b2::B2Config;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("app.yml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.uploader.is_remote());
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yml");
        std::fs::write(
            &path,
            "credentials_file: /etc/vault/creds.json
compressor:
  compressor_type: xz
  level: 9
  thread: 2
collision_policy: overwrite
uploader:
  uploader_type: b2
  api_url: http://127.0.0.1:9000
  timeout: 10m
",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(
            config,
            AppConfig {
                credentials_file: Some("/etc/vault/creds.json".into()),
                compressor: CompressorConfig::Xz(XzConfig::new(Some(9), Some(2))),
                collision_policy: CollisionPolicy::Overwrite,
                uploader: UploaderConfig::B2(B2Config {
                    api_url: "http://127.0.0.1:9000".into(),
                    timeout: Duration::from_secs(600),
                }),
            }
        );
        assert_eq!(
            config.credential_store().unwrap().path(),
            Path::new("/etc/vault/creds.json")
        );
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yml");
        std::fs::write(&path, "cron: '0 * * * *'\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::Config);
    }

    #[test]
    fn test_invalid_level_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yml");
        std::fs::write(&path, "compressor:\n  compressor_type: gzip\n  level: 12\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), SnapshotErrorKind::Validation);
    }

    #[test]
    fn test_local_only_uses_project_config() {
        let config = AppConfig {
            uploader: UploaderConfig::None,
            ..Default::default()
        };
        assert_eq!(
            config.credential_store().unwrap(),
            CredentialStore::local_only()
        );
        assert!(config.build_orchestrator().is_ok());
    }
}
