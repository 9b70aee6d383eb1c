use anyhow::Result;
use clap::Parser;
use hangar::commands::{
    self,
    config::{Config, ConfigOverrides},
};
use std::path::PathBuf;

/// hangar - add-on package manager for the simulator
///
/// Resolves dependencies between community packages, downloads them from
/// GitHub releases or local archives, and installs them into the package
/// root.
///
/// If the GITHUB_TOKEN environment variable is set, it will be used for authentication.
///
/// Examples:
///   hangar add-source a32nx github flybywire/a32nx
///   hangar install a32nx@>=0.12
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package root holding Official/ and Community/ (also via HANGAR_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "HANGAR_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub package_root: Option<PathBuf>,

    /// Download cache directory (also via HANGAR_CACHE)
    #[arg(long = "cache", env = "HANGAR_CACHE", value_name = "PATH", global = true)]
    pub cache_root: Option<PathBuf>,

    /// Installed game version, used to filter packages (defaults to 1.0.0)
    #[arg(
        long = "game-version",
        env = "HANGAR_GAME_VERSION",
        value_name = "VERSION",
        global = true
    )]
    pub game_version: Option<String>,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide = true, hide_env_values = true, global = true)]
    pub token: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List installed and registered packages
    List,

    /// Remember where a package is downloaded from
    AddSource(AddSourceArgs),

    /// Forget the source of a package
    RemoveSource(RemoveSourceArgs),

    /// Install packages and their dependencies
    Install(InstallArgs),

    /// Uninstall packages no other package depends on
    Uninstall(IdsArgs),

    /// Show installed packages that depend on the given ones
    Dependents(IdsArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddSourceArgs {
    /// Package id
    pub id: String,

    #[command(subcommand)]
    pub source: SourceArgs,
}

#[derive(clap::Subcommand, Debug)]
pub enum SourceArgs {
    /// Releases of a GitHub repository
    Github {
        #[arg(value_name = "OWNER/REPO")]
        repo: String,
    },
    /// A zip archive on this machine
    Zip { path: PathBuf },
}

#[derive(clap::Args, Debug)]
pub struct RemoveSourceArgs {
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Packages to install, optionally with a version constraint
    #[arg(required = true, value_name = "ID[@CONSTRAINT]")]
    pub packages: Vec<String>,

    /// Take the first package from this archive, without remembering it
    #[arg(long = "once-from-zip", value_name = "PATH")]
    pub once_from_zip: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct IdsArgs {
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = Config::load(ConfigOverrides {
        package_root: cli.package_root,
        cache_root: cli.cache_root,
        game_version: cli.game_version,
        api_url: cli.api_url,
        token: cli.token,
    })?;

    match cli.command {
        Commands::List => commands::list(&config)?,
        Commands::AddSource(args) => {
            let descriptor = match &args.source {
                SourceArgs::Github { repo } => commands::github_descriptor(repo)?,
                SourceArgs::Zip { path } => commands::zip_descriptor(path)?,
            };
            commands::add_source(&config, &args.id, descriptor)?
        }
        Commands::RemoveSource(args) => commands::remove_source(&config, &args.id)?,
        Commands::Install(args) => {
            commands::install(&config, &args.packages, args.once_from_zip.as_deref()).await?
        }
        Commands::Uninstall(args) => commands::uninstall(&config, &args.ids)?,
        Commands::Dependents(args) => commands::dependents(&config, &args.ids)?,
    }
    Ok(())
}
