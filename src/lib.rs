//! # vault-snapshot
//!
//! Bundles the agents, prompts and outputs folders of an LLM vault into
//! compressed tar archives under a timestamped snapshot directory, and
//! optionally pushes the archives to a Backblaze B2 bucket.
//!
//! ## Features
//!
//! - **Snapshots**: one `{snapshot_folder}/{id}/` directory per run
//! - **Compression**: gzip by default, XZ (LZMA) with parallel processing
//! - **Remote upload**: B2 native API with all-or-nothing rollback
//! - **Credential store**: JSON secrets record kept outside the app config
//! - **Background runs**: one job at a time, progress delivered through a sink
//!
//! ## Quick Start
//!
//! ```no_run
//! use vault_snapshot::snapshot::credentials::CredentialStore;
//! use vault_snapshot::snapshot::orchestrator::SnapshotOrchestrator;
//! use vault_snapshot::snapshot::progress::TracingSink;
//! use vault_snapshot::snapshot::upload::UploaderConfig;
//!
//! let uploader_config = UploaderConfig::default();
//! let credentials = CredentialStore::for_uploader(&uploader_config)?.load()?;
//! let job = credentials.job_configuration(uploader_config.is_remote());
//!
//! let orchestrator = SnapshotOrchestrator::builder()
//!     .uploader(uploader_config.build_uploader()?)
//!     .build();
//! orchestrator.run(&job, &TracingSink)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod snapshot;
