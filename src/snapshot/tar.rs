use crate::snapshot::archive::ArchiveEntry;
use crate::snapshot::compress::{CompressorBuilder, CompressorConfig};
use crate::snapshot::finish::Finish;
use crate::snapshot::result_error::result::Result;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};

/// Sibling path the archive is written to before being renamed into place
pub fn tmp_path_for(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes entries as a TAR stream through the compressor into `destination`
///
/// Returns the number of entries written. The stream goes to a `.tmp`
/// sibling first; the final name only exists once every layer has been
/// flushed. A failed write leaves the `.tmp` file behind.
pub fn write_tar_archive<I>(
    entries: I,
    destination: &Path,
    compressor: &CompressorConfig,
) -> Result<usize>
where
    I: IntoIterator<Item = Result<ArchiveEntry>>,
{
    let tmp_path = tmp_path_for(destination);
    let file = File::create(&tmp_path)?;
    let mut writer = compressor
        .build_compressor(BufWriter::new(file))
        .map(BufWriter::new)
        .map(tar::Builder::new)?;
    writer.follow_symlinks(false);

    let mut entry_count = 0;
    for entry in entries {
        let entry = entry?;
        writer.append_path_with_name(&entry.src, &entry.dst)?;
        entry_count += 1;
    }
    tracing::debug!("Wrote {} archive entries to {:?}", entry_count, tmp_path);

    writer
        .into_inner()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    std::fs::rename(&tmp_path, destination)?;
    Ok(entry_count)
}
