use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveExtractor, finish_extraction, prepare_scratch_dir};

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // ZipArchive needs Read + Seek; Runtime::open only gives Read
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| "Failed to parse ZIP archive")?;

        let scratch = prepare_scratch_dir(runtime, extract_to)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with invalid path");
                    continue;
                }
            };

            let full_path = scratch.join(&entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
            } else {
                if let Some(parent) = full_path.parent() {
                    runtime.create_dir_all(parent)?;
                }
                let mut dest_file = runtime.create_file(&full_path)?;
                std::io::copy(&mut entry, &mut dest_file)
                    .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                drop(dest_file);

                // Set file permissions from archive metadata (Unix only)
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode()
                    && let Err(e) = runtime.set_permissions(&full_path, mode)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }

        finish_extraction(runtime, &scratch, extract_to)?;

        info!("Extraction complete.");
        Ok(())
    }
}
