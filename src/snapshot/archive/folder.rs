use crate::snapshot::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::snapshot::function_path;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, AddMsg};

use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A whole directory tree, rooted in the archive at the directory's base name
///
/// Walks in file-name order without following symlinks below the root, so
/// links are archived as links and the archive layout is deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderSource {
    src_dir: PathBuf,
}

impl FolderSource {
    pub fn new(src_dir: impl Into<PathBuf>) -> Self {
        Self {
            src_dir: src_dir.into(),
        }
    }

    /// Base name of the folder as the user named it, falling back to the
    /// resolved path for names like `..`.
    fn root_name(&self, resolved: &Path) -> Result<PathBuf> {
        self.src_dir
            .file_name()
            .or_else(|| resolved.file_name())
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::from(std::io::Error::other(format!(
                    "cannot derive an archive root name from {:?}",
                    self.src_dir
                )))
            })
    }
}

impl ArchiveEntryIterable for FolderSource {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        let resolved = std::fs::canonicalize(&self.src_dir)
            .map_err(Error::from)
            .add_msg(format!("Cannot access source folder {:?}", self.src_dir))?;
        if !resolved.is_dir() {
            tracing::error!("Source folder is not a directory: {:?}", self.src_dir);
            return Err(Error::not_a_directory(self.src_dir.clone()));
        }

        let root_name = self.root_name(&resolved)?;
        tracing::info!("Starting folder scan: {:?} as {:?}", resolved, root_name);

        let walk_root = resolved.clone();
        let entries = WalkDir::new(&resolved)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(move |res| {
                res.map_err(Error::from)
                    .and_then(|de| process_dir_entry(de, &walk_root, &root_name))
                    .add_fn_name(function_path!())
            });

        Ok(entries.into_dyn_iter())
    }
}

fn process_dir_entry(de: DirEntry, walk_root: &Path, root_name: &Path) -> Result<ArchiveEntry> {
    let src = de.into_path();
    let relative = src
        .strip_prefix(walk_root)
        .map_err(Error::from)
        .add_msg(format!("Stripping {:?} from {:?} failed", walk_root, src))?;
    let dst = if relative.as_os_str().is_empty() {
        root_name.to_path_buf()
    } else {
        root_name.join(relative)
    };
    tracing::trace!("Including {:?} -> {:?}", src, dst);
    Ok(ArchiveEntry::new(src, dst))
}
