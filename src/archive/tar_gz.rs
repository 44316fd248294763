use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, finish_extraction, prepare_scratch_dir};

/// Extractor for .tar.gz / .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        let scratch = prepare_scratch_dir(runtime, extract_to)?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let entries = archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

        for entry in entries {
            let mut entry = entry.context("Failed to read tar entry")?;

            let entry_path = match enclosed_path(&entry.path()?) {
                Some(path) => path,
                None => {
                    debug!("Skipping entry with invalid path");
                    continue;
                }
            };
            let full_path = scratch.join(&entry_path);

            match entry.header().entry_type() {
                EntryType::Directory => runtime.create_dir_all(&full_path)?,
                EntryType::Regular | EntryType::Continuous => {
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    let mut dest_file = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest_file)
                        .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                    drop(dest_file);

                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                }
                // pax headers, links and devices carry no package content
                other => debug!("Skipping {:?} entry {:?}", other, entry_path),
            }
        }

        finish_extraction(runtime, &scratch, extract_to)?;

        info!("Extraction complete.");
        Ok(())
    }
}

/// Keep only entries that stay inside the extraction directory.
fn enclosed_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!result.as_os_str().is_empty()).then_some(result)
}
