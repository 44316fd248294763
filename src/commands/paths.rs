use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use crate::runtime::Runtime;

/// Directory under the project (or home) holding the tool's state
pub const STATE_DIR: &str = ".ghpm";
const PACKAGES_DIR: &str = "packages";

/// Pick the install root: an explicit override wins, then `~/.ghpm/packages`
/// for global installs, then `<cwd>/.ghpm/packages`.
#[tracing::instrument(skip(runtime))]
pub fn install_root<R: Runtime + ?Sized>(
    runtime: &R,
    install_root: Option<PathBuf>,
    global: bool,
) -> Result<PathBuf> {
    let root = match install_root {
        Some(path) => path,
        None if global => global_install_root(runtime)?,
        None => project_install_root(runtime)?,
    };
    info!("Using install root: {}", root.display());
    Ok(root)
}

#[tracing::instrument(skip(runtime))]
pub fn global_install_root<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(STATE_DIR).join(PACKAGES_DIR))
}

#[tracing::instrument(skip(runtime))]
pub fn project_install_root<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    let project = runtime
        .current_dir()
        .context("Could not determine the current directory")?;
    Ok(project.join(STATE_DIR).join(PACKAGES_DIR))
}
