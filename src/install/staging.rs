//! Download, verify and unpack one package under `<root>/.staging/<name>/`.

use anyhow::Context;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, ArchiveExtractorImpl};
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::locator::PackageLocator;
use crate::runtime::Runtime;
use crate::source::request_error;

pub const STAGING_DIR: &str = ".staging";
const CONTENTS_DIR: &str = "contents";

/// A package unpacked in staging, ready to be moved into place.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPackage {
    pub package_name: String,
    pub locator: PackageLocator,
    /// Staging directory for this package
    pub dir: PathBuf,
    /// Extracted payload
    pub contents_dir: PathBuf,
    /// SHA-256 of the archive, hex encoded
    pub checksum: String,
    pub bytes: u64,
}

/// Archive file name for a download URL, chosen so the extractor can dispatch on it.
pub(crate) fn archive_file_name(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".zip") {
        "archive.zip"
    } else {
        "archive.tar.gz"
    }
}

/// Hex SHA-256 of a file.
pub(crate) fn sha256_file<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> anyhow::Result<String> {
    let mut reader = runtime.open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Stage one package. On error the package's staging directory may be left
/// behind; the caller removes the whole staging root.
#[tracing::instrument(skip(runtime, http_client, extractor, staging_root))]
pub async fn stage<R: Runtime + ?Sized>(
    runtime: &R,
    http_client: &HttpClient,
    extractor: &ArchiveExtractorImpl,
    staging_root: &Path,
    package_name: &str,
    locator: &PackageLocator,
    url: &str,
) -> Result<StagedPackage, PackageError> {
    let dir = staging_root.join(package_name);
    if runtime.exists(&dir) {
        runtime
            .remove_dir_all(&dir)
            .map_err(|e| PackageError::write_failure(package_name, e))?;
    }
    runtime
        .create_dir_all(&dir)
        .map_err(|e| PackageError::write_failure(package_name, e))?;

    let archive_path = dir.join(archive_file_name(url));
    println!(" downloading {}", locator);
    let download = http_client
        .download_file(url, || {
            runtime
                .create_file(&archive_path)
                .with_context(|| format!("Failed to create {:?}", archive_path))
        })
        .await
        .map_err(|e| request_error(e, &locator.to_string()))?;

    if download.bytes == 0 {
        return Err(PackageError::NetworkFailure(format!(
            "{}: downloaded archive is empty",
            url
        )));
    }

    let checksum = sha256_file(runtime, &archive_path)
        .map_err(|e| PackageError::write_failure(package_name, e))?;
    debug!("{} sha256 {}", archive_path.display(), checksum);

    let contents_dir = dir.join(CONTENTS_DIR);
    runtime
        .create_dir_all(&contents_dir)
        .map_err(|e| PackageError::write_failure(package_name, e))?;
    extractor
        .extract(runtime, &archive_path, &contents_dir)
        .map_err(|e| {
            PackageError::NetworkFailure(format!(
                "Archive for {} could not be unpacked: {:#}",
                locator, e
            ))
        })?;

    info!("Staged {} ({} bytes)", locator, download.bytes);
    Ok(StagedPackage {
        package_name: package_name.to_string(),
        locator: locator.clone(),
        dir,
        contents_dir,
        checksum,
        bytes: download.bytes,
    })
}
