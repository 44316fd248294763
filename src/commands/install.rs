use anyhow::Result;
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::application::{InstallOptions, InstallReport, InstallUseCase};
use crate::cleanup;
use crate::install::RootLock;
use crate::runtime::Runtime;

use super::config::Config;
use super::paths::install_root;

/// Install a package and its dependencies
#[tracing::instrument(skip(options, config))]
pub async fn install<R: Runtime>(
    reference: &str,
    options: InstallOptions,
    config: Config<R>,
) -> Result<()> {
    let root = install_root(&config.runtime, config.install_root.clone(), options.global)?;
    let _lock = RootLock::acquire(&root).await?;
    debug!("Installing {} into {:?} with {:?}", reference, root, options);

    let cleanup_ctx = cleanup::new_shared();
    let interrupt_handler = cleanup::spawn_interrupt_handler(Arc::clone(&cleanup_ctx));

    let result = InstallUseCase::new(
        &config.runtime,
        &config.source,
        &config.http_client,
        root.clone(),
        cleanup_ctx,
    )
    .execute(reference, &options)
    .await;

    interrupt_handler.abort();

    let report = result?;
    print_report(&report, &root);
    Ok(())
}

fn print_report(report: &InstallReport, root: &Path) {
    for upgrade in &report.upgrades {
        println!(
            "    upgraded {} {} -> {}",
            upgrade.identity, upgrade.from, upgrade.to
        );
    }
    for name in &report.skipped {
        println!("     present {}", name);
    }
    if report.installed.is_empty() {
        println!("{} is already installed", report.locator);
        return;
    }
    println!(
        "Installed {} ({} package(s), {} file(s) in {})",
        report.locator,
        report.installed.len(),
        report.files_written.len(),
        root.join(&report.package_name).display()
    );
}
