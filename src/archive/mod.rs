//! Archive extraction for downloaded package payloads.
//!
//! GitHub tarballs wrap everything in one `<owner>-<repo>-<sha>/` directory;
//! extractors unpack into a scratch directory next to the target and then
//! lift the contents of that single top-level directory into place.

mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`, which must already exist.
    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Scratch directory used while unpacking into `extract_to`.
fn scratch_dir_for(extract_to: &Path) -> Result<PathBuf> {
    let name = extract_to
        .file_name()
        .ok_or_else(|| anyhow!("Invalid extraction target {:?}", extract_to))?;
    Ok(extract_to.with_file_name(format!("{}_unpack", name.to_string_lossy())))
}

/// Create an empty scratch directory for `extract_to`.
fn prepare_scratch_dir<R: Runtime + ?Sized>(runtime: &R, extract_to: &Path) -> Result<PathBuf> {
    let scratch = scratch_dir_for(extract_to)?;
    if runtime.exists(&scratch) {
        runtime.remove_dir_all(&scratch)?;
    }
    runtime.create_dir_all(&scratch)?;
    debug!("Unpacking to scratch dir: {:?}", scratch);
    Ok(scratch)
}

/// Move the unpacked contents into `extract_to`, lifting a lone top-level
/// directory, then remove the scratch directory.
fn finish_extraction<R: Runtime + ?Sized>(runtime: &R, scratch: &Path, extract_to: &Path) -> Result<()> {
    let entries = runtime
        .read_dir(scratch)
        .context("Failed to read scratch extraction directory")?;

    let Some(first) = entries.first() else {
        runtime.remove_dir_all(scratch)?;
        return Err(anyhow!("Archive appears to be empty."));
    };

    let source_dir = if entries.len() == 1 && runtime.is_dir(first) {
        first.clone()
    } else {
        scratch.to_path_buf()
    };

    debug!("Moving contents from {:?} to {:?}", source_dir, extract_to);
    for item in runtime.read_dir(&source_dir)? {
        let file_name = item
            .file_name()
            .ok_or_else(|| anyhow!("Unexpected entry {:?} in archive", item))?;
        runtime.rename(&item, &extract_to.join(file_name))?;
    }

    runtime.remove_dir_all(scratch)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_archives {
    //! Archive builders shared by the extractor and installer tests.

    use anyhow::Result;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    /// Build a `.tar.gz` in memory from `(path, content)` pairs.
    pub fn tar_gz(files: &[(&str, &str)]) -> Result<Vec<u8>> {
        let enc = GzEncoder::new(Vec::new(), Compression::default());
        let mut tar = tar::Builder::new(enc);

        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path)?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, content.as_bytes())?;
        }

        Ok(tar.into_inner()?.finish()?)
    }

    /// Build a `.zip` in memory from `(path, content)` pairs.
    pub fn zip(files: &[(&str, &str)]) -> Result<Vec<u8>> {
        use ::zip::CompressionMethod;
        use ::zip::ZipWriter;
        use ::zip::write::FileOptions;

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extractor_impl_can_handle() {
        let extractor = ArchiveExtractorImpl::new();
        assert!(extractor.can_handle(Path::new("file.tar.gz")));
        assert!(extractor.can_handle(Path::new("file.tgz")));
        assert!(extractor.can_handle(Path::new("file.zip")));
        assert!(!extractor.can_handle(Path::new("file.unknown")));
    }

    #[test]
    fn test_extractor_impl_dispatches_to_tar_gz() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("archive.tar.gz");
        let extract_path = dir.path().join("contents");
        fs::create_dir(&extract_path)?;
        fs::write(
            &archive_path,
            test_archives::tar_gz(&[("madler-zlib-abc123/zlib.h", "header")])?,
        )?;

        ArchiveExtractorImpl::new().extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(fs::read_to_string(extract_path.join("zlib.h"))?, "header");
        Ok(())
    }

    #[test]
    fn test_extractor_impl_dispatches_to_zip() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("archive.zip");
        let extract_path = dir.path().join("contents");
        fs::create_dir(&extract_path)?;
        fs::write(
            &archive_path,
            test_archives::zip(&[("pkg/file1.txt", "test content from zip")])?,
        )?;

        ArchiveExtractorImpl::new().extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(
            fs::read_to_string(extract_path.join("file1.txt"))?,
            "test content from zip"
        );
        Ok(())
    }

    #[test]
    fn test_extractor_impl_unsupported_format() {
        let result = ArchiveExtractorImpl::new().extract(
            &RealRuntime,
            Path::new("/tmp/file.unknown"),
            Path::new("/tmp/out"),
        );
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported archive format")
        );
    }

    #[test]
    fn test_scratch_dir_is_sibling_of_target() -> Result<()> {
        assert_eq!(
            scratch_dir_for(Path::new("/root/.staging/zlib/contents"))?,
            PathBuf::from("/root/.staging/zlib/contents_unpack")
        );
        Ok(())
    }
}
