use anyhow::Result;

use crate::application::UninstallAction;
use crate::install::RootLock;
use crate::runtime::Runtime;

use super::config::Config;
use super::paths::install_root;

/// Remove an installed package
#[tracing::instrument(skip(config))]
pub async fn uninstall<R: Runtime>(
    package_name: &str,
    global: bool,
    yes: bool,
    config: Config<R>,
) -> Result<()> {
    let root = install_root(&config.runtime, config.install_root.clone(), global)?;
    if !config.runtime.exists(&root) {
        anyhow::bail!("Package {} is not installed (no packages in {:?})", package_name, root);
    }
    let _lock = RootLock::acquire(&root).await?;

    let action = UninstallAction::new(&config.runtime, root);
    let Some(record) = action.find(package_name)? else {
        anyhow::bail!("Package {} is not installed", package_name);
    };

    if !yes {
        println!(
            "Removing {} ({} file(s) in {})",
            record.locator,
            record.files_written.len(),
            record.install_path.display()
        );
        if !config.runtime.confirm("Proceed with removal?")? {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    let report = action.uninstall(package_name)?;
    println!(
        "Removed {} ({} file(s))",
        report.locator, report.removed_files
    );
    if !report.dependents.is_empty() {
        println!(
            "Warning: still required by {}",
            report.dependents.join(", ")
        );
    }
    Ok(())
}
