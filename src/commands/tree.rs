use anyhow::Result;

use crate::application::resolve_tree;
use crate::resolver::{InstallPlan, ResolveOptions};
use crate::runtime::Runtime;

use super::config::Config;

/// Print the resolved dependency tree of a reference
#[tracing::instrument(skip(config))]
pub async fn tree<R: Runtime>(
    reference: &str,
    git_ref: Option<&str>,
    jobs: usize,
    config: Config<R>,
) -> Result<()> {
    let options = ResolveOptions {
        concurrency: jobs,
        ..ResolveOptions::default()
    };
    let plan = resolve_tree(&config.source, reference, git_ref, options).await?;
    print!("{}", format_plan(&plan));
    Ok(())
}

fn format_plan(plan: &InstallPlan) -> String {
    let mut out = plan.root.render();
    for upgrade in &plan.upgrades {
        out.push_str(&format!(
            "note: {} {} was raised to {}\n",
            upgrade.identity, upgrade.from, upgrade.to
        ));
    }
    out
}
