use anyhow::Result;

use crate::application::{ListAction, PackageInfo};
use crate::runtime::Runtime;

use super::config::Config;
use super::paths::install_root;

/// List installed packages
#[tracing::instrument(skip(config))]
pub fn list<R: Runtime>(global: bool, config: Config<R>) -> Result<()> {
    let root = install_root(&config.runtime, config.install_root.clone(), global)?;
    let packages = ListAction::new(&config.runtime, root).list_packages()?;
    print!("{}", format_packages(&packages));
    Ok(())
}

fn format_packages(packages: &[PackageInfo]) -> String {
    if packages.is_empty() {
        return "No packages installed.\n".to_string();
    }
    let width = packages.iter().map(|p| p.name.len()).max().unwrap_or(0);
    packages
        .iter()
        .map(|p| {
            format!(
                "{:width$}  {}  {} file(s), installed {}\n",
                p.name,
                p.locator,
                p.files,
                p.installed_at.format("%Y-%m-%d %H:%M"),
                width = width
            )
        })
        .collect()
}
