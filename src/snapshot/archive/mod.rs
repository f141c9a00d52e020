pub mod folder;

use crate::snapshot::archive::folder::FolderSource;
use crate::snapshot::compress::CompressorConfig;
use crate::snapshot::file_ext::{FileExtProvider, MediaTypeProvider};
use crate::snapshot::function_path;
use crate::snapshot::progress::ProgressSink;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, AddMsg};
use crate::snapshot::tar::write_tar_archive;
use bon::Builder;
use derive_more::Display;
use dyn_iter::DynIter;
use function_name::named;
use getset::Getters;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Logical role of a source folder; decides the archive file name.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ArchiveRole {
    #[display("agents")]
    Agents,
    #[display("prompts")]
    Prompts,
    #[display("outputs")]
    Outputs,
}

impl ArchiveRole {
    /// Archiving and upload order of a snapshot.
    pub const ALL: [ArchiveRole; 3] = [ArchiveRole::Agents, ArchiveRole::Prompts, ArchiveRole::Outputs];

    pub fn title(&self) -> &'static str {
        match self {
            ArchiveRole::Agents => "Agents",
            ArchiveRole::Prompts => "Prompts",
            ArchiveRole::Outputs => "Outputs",
        }
    }

    /// `agents.tar.gz` and friends, extension following the compressor.
    pub fn archive_file_name(&self, compressor: &CompressorConfig) -> String {
        match compressor.file_ext() {
            Some(ext) => format!("{self}.tar.{ext}"),
            None => format!("{self}.tar"),
        }
    }
}

/// A finished archive of one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Archive {
    role: ArchiveRole,
    path: PathBuf,
    media_type: &'static str,
}

impl Archive {
    pub fn new(role: ArchiveRole, path: impl Into<PathBuf>, media_type: &'static str) -> Self {
        Self {
            role,
            path: path.into(),
            media_type,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A single filesystem node to be written into a tar archive
#[derive(Debug)]
pub struct ArchiveEntry {
    /// Node on the filesystem
    pub src: Arc<Path>,

    /// Path of the node inside the archive
    pub dst: Arc<Path>,
}

impl ArchiveEntry {
    pub fn new<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(src: A, dst: B) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Source of archive entries
///
/// The iterator yields Results so scanning errors (permission denied,
/// vanished files) surface at the entry that caused them.
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}

/// Streams one source folder into one compressed tar archive.
#[derive(Clone, Debug, Default, Builder, Getters)]
#[getset(get = "pub")]
pub struct ArchiveBuilder {
    #[builder(default)]
    compressor: CompressorConfig,
}

impl ArchiveBuilder {
    /// Archives `source` into `destination`.
    ///
    /// The archive has a single root entry named after the base name of
    /// `source`. `role` is only used for progress text. The file at
    /// `destination` only appears once the archive is complete.
    #[named]
    pub fn build(
        &self,
        source: &Path,
        destination: &Path,
        role: ArchiveRole,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        sink.on_progress(&format!("Creating {role} archive..."));

        let entries = FolderSource::new(source)
            .archive_entry_iterator()
            .add_msg(format!("Reading {role} folder {:?} failed", source))
            .add_fn_name(function_path!())?;
        let entry_count = write_tar_archive(entries, destination, &self.compressor)
            .add_msg(format!("Writing {role} archive {:?} failed", destination))
            .add_fn_name(function_path!())?;
        info!("Archived {} entries of {:?} into {:?}", entry_count, source, destination);

        sink.on_progress(&format!(
            "{} archive created: {}",
            role.title(),
            destination.display()
        ));
        Ok(destination.to_path_buf())
    }

    /// Archives `source` into `snapshot_dir` under the role's file name.
    pub fn build_in(
        &self,
        source: &Path,
        snapshot_dir: &Path,
        role: ArchiveRole,
        sink: &dyn ProgressSink,
    ) -> Result<Archive> {
        let destination = snapshot_dir.join(role.archive_file_name(&self.compressor));
        let path = self.build(source, &destination, role, sink)?;
        Ok(Archive::new(role, path, self.compressor.media_type()))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{create_test_tree, snapshot_tree};
    use super::*;
    use crate::snapshot::compress::gzip::GzipConfig;
    use crate::snapshot::compress::xz::XzConfig;
    use crate::snapshot::progress::testing::RecordingSink;
    use crate::snapshot::result_error::error::ErrorKind;
    use flate2::read::GzDecoder;
    use liblzma::read::XzDecoder;
    use std::fs::File;
    use std::io::Read;
    use tempfile::TempDir;

    fn extract<R: Read>(reader: R, into: &Path) {
        ::tar::Archive::new(reader).unpack(into).unwrap();
    }

    #[test]
    fn test_archive_file_names() {
        let gzip = CompressorConfig::default();
        assert_eq!(ArchiveRole::Agents.archive_file_name(&gzip), "agents.tar.gz");
        assert_eq!(ArchiveRole::Prompts.archive_file_name(&gzip), "prompts.tar.gz");
        assert_eq!(ArchiveRole::Outputs.archive_file_name(&gzip), "outputs.tar.gz");
        assert_eq!(
            ArchiveRole::Outputs.archive_file_name(&CompressorConfig::Xz(XzConfig::default())),
            "outputs.tar.xz"
        );
        assert_eq!(
            ArchiveRole::Agents.archive_file_name(&CompressorConfig::None),
            "agents.tar"
        );
    }

    #[test]
    fn test_gzip_archive_round_trip() {
        let src_parent = TempDir::new().unwrap();
        let source = src_parent.path().join("my-agents");
        create_test_tree(&source).unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("agents.tar.gz");

        let builder = ArchiveBuilder::default();
        let sink = RecordingSink::default();
        let path = builder
            .build(&source, &destination, ArchiveRole::Agents, &sink)
            .unwrap();
        assert_eq!(path, destination);

        let extracted = TempDir::new().unwrap();
        extract(GzDecoder::new(File::open(&destination).unwrap()), extracted.path());

        // single root entry named after the source folder
        let roots: Vec<_> = std::fs::read_dir(extracted.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(roots, vec![std::ffi::OsString::from("my-agents")]);
        assert_eq!(
            snapshot_tree(&extracted.path().join("my-agents")),
            snapshot_tree(&source)
        );
    }

    #[test]
    fn test_xz_archive_round_trip() {
        let src_parent = TempDir::new().unwrap();
        let source = src_parent.path().join("prompts");
        create_test_tree(&source).unwrap();
        let out = TempDir::new().unwrap();

        let builder = ArchiveBuilder::builder()
            .compressor(CompressorConfig::Xz(XzConfig::new(Some(1), Some(1))))
            .build();
        let archive = builder
            .build_in(&source, out.path(), ArchiveRole::Prompts, &RecordingSink::default())
            .unwrap();
        assert_eq!(archive.file_name(), "prompts.tar.xz");
        assert_eq!(*archive.media_type(), "application/x-xz");

        let extracted = TempDir::new().unwrap();
        extract(XzDecoder::new(File::open(archive.path()).unwrap()), extracted.path());
        assert_eq!(
            snapshot_tree(&extracted.path().join("prompts")),
            snapshot_tree(&source)
        );
    }

    #[test]
    fn test_trailing_separator_keeps_base_name() {
        let src_parent = TempDir::new().unwrap();
        let source = src_parent.path().join("outputs-vault");
        create_test_tree(&source).unwrap();
        let out = TempDir::new().unwrap();

        let with_slash = PathBuf::from(format!("{}/", source.display()));
        let archive = ArchiveBuilder::builder()
            .compressor(CompressorConfig::Gzip(GzipConfig::with_level(1)))
            .build()
            .build_in(&with_slash, out.path(), ArchiveRole::Outputs, &RecordingSink::default())
            .unwrap();

        let extracted = TempDir::new().unwrap();
        extract(GzDecoder::new(File::open(archive.path()).unwrap()), extracted.path());
        assert!(extracted.path().join("outputs-vault/agent.yaml").is_file());
    }

    #[test]
    fn test_build_emits_creating_and_created() {
        let src_parent = TempDir::new().unwrap();
        let source = src_parent.path().join("agents");
        create_test_tree(&source).unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("agents.tar.gz");

        let sink = RecordingSink::default();
        ArchiveBuilder::default()
            .build(&source, &destination, ArchiveRole::Agents, &sink)
            .unwrap();

        assert_eq!(
            sink.messages(),
            vec![
                "Creating agents archive...".to_string(),
                format!("Agents archive created: {}", destination.display()),
            ]
        );
        assert!(sink.outcomes().is_empty());
        assert!(!out.path().join("agents.tar.gz.tmp").exists());
    }

    #[test]
    fn test_missing_source_is_file_access_error() {
        let out = TempDir::new().unwrap();
        let destination = out.path().join("agents.tar.gz");
        let sink = RecordingSink::default();

        let err = ArchiveBuilder::default()
            .build(
                &out.path().join("does-not-exist"),
                &destination,
                ArchiveRole::Agents,
                &sink,
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FileAccess);
        assert!(!destination.exists());
        assert_eq!(sink.messages(), vec!["Creating agents archive...".to_string()]);
    }

    #[test]
    fn test_empty_folder_archives_root_only() {
        let src_parent = TempDir::new().unwrap();
        let source = src_parent.path().join("empty-outputs");
        std::fs::create_dir(&source).unwrap();
        let out = TempDir::new().unwrap();
        let destination = out.path().join("outputs.tar.gz");

        ArchiveBuilder::default()
            .build(&source, &destination, ArchiveRole::Outputs, &RecordingSink::default())
            .unwrap();

        let extracted = TempDir::new().unwrap();
        extract(GzDecoder::new(File::open(&destination).unwrap()), extracted.path());
        assert!(extracted.path().join("empty-outputs").is_dir());
        assert!(snapshot_tree(&extracted.path().join("empty-outputs")).is_empty());
    }
}
