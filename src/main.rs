use anyhow::Result;
use clap::Parser;
use ghpm::application::InstallOptions;
use ghpm::commands::{self, Config, ConfigOverrides};
use ghpm::resolver::DEFAULT_CONCURRENCY;
use std::path::PathBuf;
use std::time::Duration;

/// ghpm - GitHub package manager
///
/// Install GitHub-hosted packages together with their dependencies, as
/// declared in each repository's ghpm.json manifest.
///
/// If the GITHUB_TOKEN environment variable is set, it will be used for authentication.
/// This is useful for accessing private repositories or avoiding rate limits.
///
/// Examples:
///   ghpm install madler/zlib@v1.3.1   # Install a tag and its dependencies
///   ghpm install owner/repo           # Install the default branch
///   ghpm tree owner/repo              # Show the resolved dependency tree
#[derive(Parser, Debug)]
#[command(author, version = env!("GHPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via GHPM_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "GHPM_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Longest GitHub rate-limit wait to sit out before failing, in seconds
    #[arg(
        long = "max-rate-limit-wait",
        env = "GHPM_MAX_RATE_LIMIT_WAIT",
        value_name = "SECS",
        global = true
    )]
    pub max_rate_limit_wait: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package and its dependencies
    Install(InstallArgs),

    /// Remove an installed package
    #[command(alias = "remove")]
    Uninstall(UninstallArgs),

    /// List installed packages
    List(ListArgs),

    /// Show the resolved dependency tree without installing
    Tree(TreeArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package reference: "owner/repo[@ref]" or an archive URL
    #[arg(value_name = "OWNER/REPO[@REF]")]
    pub reference: String,

    /// Install into ~/.ghpm/packages instead of the project
    #[arg(short, long)]
    pub global: bool,

    /// Branch, tag or commit to install (overrides @ref)
    #[arg(long = "ref", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Replace packages that are already installed
    #[arg(short, long)]
    pub force: bool,

    /// Install only the package itself
    #[arg(long)]
    pub no_deps: bool,

    /// Maximum number of concurrent downloads
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Package name as shown by `ghpm list`
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Remove from ~/.ghpm/packages instead of the project
    #[arg(short, long)]
    pub global: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// List ~/.ghpm/packages instead of the project
    #[arg(short, long)]
    pub global: bool,
}

#[derive(clap::Args, Debug)]
pub struct TreeArgs {
    /// Package reference: "owner/repo[@ref]" or an archive URL
    #[arg(value_name = "OWNER/REPO[@REF]")]
    pub reference: String,

    /// Branch, tag or commit to resolve (overrides @ref)
    #[arg(long = "ref", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Maximum number of concurrent requests
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(cli.verbose)))
        .init();

    let runtime = ghpm::runtime::RealRuntime;
    let config = Config::new(
        runtime,
        ConfigOverrides {
            install_root: cli.install_root,
            api_url: cli.api_url,
            max_rate_limit_wait: cli.max_rate_limit_wait.map(Duration::from_secs),
        },
    )?;

    match cli.command {
        Commands::Install(args) => {
            let options = InstallOptions {
                global: args.global,
                git_ref: args.git_ref,
                force: args.force,
                install_dependencies: !args.no_deps,
                jobs: args.jobs.max(1),
            };
            commands::install(&args.reference, options, config).await?
        }
        Commands::Uninstall(args) => {
            commands::uninstall(&args.name, args.global, args.yes, config).await?
        }
        Commands::List(args) => commands::list(args.global, config)?,
        Commands::Tree(args) => {
            commands::tree(&args.reference, args.git_ref.as_deref(), args.jobs.max(1), config).await?
        }
    }
    Ok(())
}
