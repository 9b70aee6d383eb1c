use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::source::DEFAULT_API_URL;
use crate::version::VersionNumber;

const DEFAULT_GAME_VERSION: VersionNumber = VersionNumber::new(1, 0, 0);

/// Values given on the command line or through the environment. Anything
/// left `None` falls back to a default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub package_root: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub game_version: Option<String>,
    pub api_url: Option<String>,
    pub token: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the `Official` and `Community` trees.
    pub package_root: PathBuf,
    pub cache_root: PathBuf,
    pub game_version: VersionNumber,
    pub api_url: String,
    /// GitHub token, sent as a bearer token when present.
    pub token: Option<String>,
}

impl Config {
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let package_root = match overrides.package_root {
            Some(path) => path,
            None => default_package_root()?,
        };
        let cache_root = match overrides.cache_root {
            Some(path) => path,
            None => default_cache_root()?,
        };
        let game_version = match overrides.game_version.as_deref() {
            Some(version) => VersionNumber::parse(version)
                .with_context(|| format!("Invalid game version {:?}", version))?,
            None => DEFAULT_GAME_VERSION,
        };

        Ok(Self {
            package_root,
            cache_root,
            game_version,
            api_url: overrides
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: overrides.token.filter(|t| !t.is_empty()),
        })
    }
}

fn default_package_root() -> Result<PathBuf> {
    let data = dirs::data_dir().context("Could not determine the data directory; pass --root")?;
    Ok(data.join("hangar").join("packages"))
}

fn default_cache_root() -> Result<PathBuf> {
    let cache = dirs::cache_dir().context("Could not determine the cache directory; pass --cache")?;
    Ok(cache.join("hangar"))
}
