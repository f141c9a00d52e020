use crate::snapshot::archive::ArchiveRole;
use crate::snapshot::redacted::RedactedString;
use crate::snapshot::validate::validate_non_empty_path;
use bon::Builder;
use getset::Getters;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Immutable input of one snapshot run.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct JobConfiguration {
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    agent_folder: PathBuf,
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    prompt_folder: PathBuf,
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    output_folder: PathBuf,
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    snapshot_folder: PathBuf,
    /// Upload target, `None` in local-only mode
    #[validate(nested)]
    remote: Option<RemoteTarget>,
}

impl JobConfiguration {
    pub fn source_for(&self, role: ArchiveRole) -> &Path {
        match role {
            ArchiveRole::Agents => &self.agent_folder,
            ArchiveRole::Prompts => &self.prompt_folder,
            ArchiveRole::Outputs => &self.output_folder,
        }
    }
}

/// Bucket and key pair the archives of a run are uploaded with.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct RemoteTarget {
    #[validate(length(min = 1))]
    #[builder(into)]
    key_id: String,
    #[validate(nested)]
    #[builder(into)]
    key_secret: RedactedString,
    #[validate(length(min = 1))]
    #[builder(into)]
    bucket_name: String,
    #[builder(into, default)]
    key_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteTarget {
        RemoteTarget::builder()
            .key_id("0051234")
            .key_secret("K005secret")
            .bucket_name("vault-backups")
            .build()
    }

    fn job(remote: Option<RemoteTarget>) -> JobConfiguration {
        JobConfiguration::builder()
            .agent_folder("/vault/agents")
            .prompt_folder("/vault/prompts")
            .output_folder("/vault/outputs")
            .snapshot_folder("/snapshots")
            .maybe_remote(remote)
            .build()
    }

    #[test]
    fn test_valid_configurations() {
        assert!(job(None).validate().is_ok());
        assert!(job(Some(remote())).validate().is_ok());
        assert_eq!(remote().key_prefix(), "");
    }

    #[test]
    fn test_empty_folder_is_invalid() {
        let config = JobConfiguration::builder()
            .agent_folder("/vault/agents")
            .prompt_folder("")
            .output_folder("/vault/outputs")
            .snapshot_folder("/snapshots")
            .build();

        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("prompt_folder"));
    }

    #[test]
    fn test_empty_remote_fields_are_invalid() {
        let target = RemoteTarget::builder()
            .key_id("0051234")
            .key_secret("")
            .bucket_name("vault-backups")
            .build();
        assert!(job(Some(target)).validate().is_err());

        let target = RemoteTarget::builder()
            .key_id("")
            .key_secret("K005secret")
            .bucket_name("vault-backups")
            .build();
        assert!(job(Some(target)).validate().is_err());
    }

    #[test]
    fn test_source_for_role() {
        let config = job(None);
        assert_eq!(config.source_for(ArchiveRole::Agents), Path::new("/vault/agents"));
        assert_eq!(config.source_for(ArchiveRole::Prompts), Path::new("/vault/prompts"));
        assert_eq!(config.source_for(ArchiveRole::Outputs), Path::new("/vault/outputs"));
    }
}
