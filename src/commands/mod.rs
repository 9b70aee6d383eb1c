use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    install::{install_packages, uninstall_packages},
    logger::{LogFacadeLogger, Logger},
    package::{DiskPackageDatabase, PackageDatabase, PackageDependency, ProtectedDatabase},
    resolver::find_dependent_packages,
    runtime::RealRuntime,
    source::{
        AggregateProgress, DatabaseSourceRepository, EphemeralSources, HiddenBaseSources,
        LocalZipSource, SourceDescriptor,
    },
};

pub mod config;
pub mod services;

use config::Config;
use services::Services;

type Database<'a> = ProtectedDatabase<DiskPackageDatabase<'a, RealRuntime>>;

fn open_database<'a>(
    runtime: &'a RealRuntime,
    config: &Config,
    logger: Arc<dyn Logger>,
) -> Result<Database<'a>> {
    let database = DiskPackageDatabase::open(runtime, config.package_root.clone(), logger)?;
    Ok(ProtectedDatabase::new(database, config.game_version))
}

/// Descriptor for a GitHub repository given as `OWNER/REPO`.
pub fn github_descriptor(repo: &str) -> Result<SourceDescriptor> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(SourceDescriptor::github(owner, name, None))
        }
        _ => anyhow::bail!("Invalid repository {:?}, expected OWNER/REPO", repo),
    }
}

/// Descriptor for a local archive. Relative paths are made absolute so the
/// descriptor stays valid from any working directory.
pub fn zip_descriptor(path: &Path) -> Result<SourceDescriptor> {
    let path = std::path::absolute(path).with_context(|| format!("Invalid path {:?}", path))?;
    Ok(SourceDescriptor::zip(&path))
}

/// List installed and registered packages
#[tracing::instrument(skip(config))]
pub fn list(config: &Config) -> Result<()> {
    let runtime = RealRuntime;
    let database =
        DiskPackageDatabase::open(&runtime, config.package_root.clone(), Arc::new(LogFacadeLogger))?;

    for (id, message) in database.errored_packages() {
        eprintln!("warning: {} is unreadable: {}", id, message);
    }

    let packages = database.packages();
    if packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    for package in packages {
        let version = package
            .manifest
            .as_ref()
            .map(|m| m.version.to_string())
            .unwrap_or_else(|| "(not installed)".to_string());
        match &package.source {
            Some(source) => println!("{} {} [{}]", package.id, version, source.kind),
            None => println!("{} {}", package.id, version),
        }
    }
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn add_source(config: &Config, id: &str, descriptor: SourceDescriptor) -> Result<()> {
    let runtime = RealRuntime;
    let database = open_database(&runtime, config, Arc::new(LogFacadeLogger))?;
    let kind = descriptor.kind.clone();
    database.add_package_source(id, descriptor)?;
    println!("Added {} source for {}", kind, id);
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn remove_source(config: &Config, id: &str) -> Result<()> {
    let runtime = RealRuntime;
    let database = open_database(&runtime, config, Arc::new(LogFacadeLogger))?;
    database.remove_package_source(id)?;
    println!("Removed source of {}", id);
    Ok(())
}

/// Cancels `cancel` on Ctrl-C until the returned task is aborted.
fn cancel_on_interrupt(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    })
}

/// Resolve and install `requests` (`id` or `id@constraint`) with their
/// dependencies.
///
/// With `once_from_zip`, the first requested package is taken from that
/// archive for this run only; the archive is not remembered as its source.
#[tracing::instrument(skip(config))]
pub async fn install(config: &Config, requests: &[String], once_from_zip: Option<&Path>) -> Result<()> {
    let candidates = requests
        .iter()
        .map(|r| PackageDependency::parse(r))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(first) = candidates.first() else {
        anyhow::bail!("No package given");
    };

    let services = Services::from_config(config)?;
    let runtime = RealRuntime;
    let database = open_database(&runtime, config, services.logger.clone())?;

    let mut sources =
        EphemeralSources::new(DatabaseSourceRepository::new(&database, services.factory.clone()));
    if let Some(path) = once_from_zip {
        let path = std::path::absolute(path).with_context(|| format!("Invalid path {:?}", path))?;
        debug!("Using {:?} for {} this time only", path, first.id);
        let source = LocalZipSource::new(&first.id, path, services.runtime.clone());
        sources = sources.with_source(&first.id, Arc::new(source));
    }
    let sources = HiddenBaseSources::new(sources);

    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let progress = AggregateProgress::new();

    let result = install_packages(
        &candidates,
        &sources,
        &database,
        &config.game_version,
        Some(&progress),
        &cancel,
        services.logger.as_ref(),
    )
    .await;
    interrupt.abort();

    let snapshot = progress.snapshot();
    debug!(
        "{} requests, {} downloads, {} bytes",
        snapshot.requests, snapshot.downloads, snapshot.downloaded_bytes
    );

    let installed = result?;
    if installed.is_empty() {
        println!("Everything is already installed.");
    }
    for id in installed {
        println!("Installed {}", id);
    }
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn uninstall(config: &Config, ids: &[String]) -> Result<()> {
    let runtime = RealRuntime;
    let logger: Arc<dyn Logger> = Arc::new(LogFacadeLogger);
    let database = open_database(&runtime, config, logger.clone())?;
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

    uninstall_packages(&ids, &database, logger.as_ref())?;
    for id in ids {
        println!("Uninstalled {}", id);
    }
    Ok(())
}

/// Print every installed package that needs one of `ids`
#[tracing::instrument(skip(config))]
pub fn dependents(config: &Config, ids: &[String]) -> Result<()> {
    let runtime = RealRuntime;
    let database = open_database(&runtime, config, Arc::new(LogFacadeLogger))?;
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

    let dependents = find_dependent_packages(&ids, &database)?;
    if dependents.is_empty() {
        println!("No installed package depends on {}.", ids.join(", "));
    }
    for id in dependents {
        println!("{}", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionNumber;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn config(root: &Path) -> Config {
        Config {
            package_root: root.join("packages"),
            cache_root: root.join("cache"),
            game_version: VersionNumber::new(1, 0, 0),
            api_url: "http://127.0.0.1:9".to_string(),
            token: None,
        }
    }

    fn reopen(config: &Config) -> Vec<crate::package::InstalledPackage> {
        let runtime = RealRuntime;
        open_database(&runtime, config, Arc::new(LogFacadeLogger))
            .unwrap()
            .packages()
    }

    #[test]
    fn test_github_descriptor() {
        assert_eq!(
            github_descriptor("flybywire/a32nx").unwrap(),
            SourceDescriptor::github("flybywire", "a32nx", None)
        );
        assert!(github_descriptor("a32nx").is_err());
        assert!(github_descriptor("/a32nx").is_err());
        assert!(github_descriptor("a/b/c").is_err());
    }

    #[test]
    fn test_zip_descriptor_is_absolute() {
        let descriptor = zip_descriptor(Path::new("downloads/cub.zip")).unwrap();
        let path = descriptor.data["path"].as_str().unwrap();
        assert!(PathBuf::from(path).is_absolute());
    }

    #[test]
    fn test_add_and_remove_source() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        add_source(&config, "a32nx", github_descriptor("flybywire/a32nx").unwrap()).unwrap();
        let packages = reopen(&config);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].source, Some(SourceDescriptor::github("flybywire", "a32nx", None)));

        remove_source(&config, "a32nx").unwrap();
        assert!(reopen(&config).is_empty());
    }

    #[test]
    fn test_base_packages_cannot_get_a_source() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let result = add_source(&config, "fs-base-nav", github_descriptor("o/r").unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_uninstall_refused_while_required() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        for (id, manifest) in [
            ("cub", r#"{"package_version":"1.0","dependencies":[{"name":"navdata","package_version":">=1.0"}]}"#),
            ("navdata", r#"{"package_version":"1.0"}"#),
        ] {
            let package = config.package_root.join("Community").join(id);
            fs::create_dir_all(&package).unwrap();
            fs::write(package.join("manifest.json"), manifest).unwrap();
        }

        let err = uninstall(&config, &["navdata".to_string()]).unwrap_err();
        assert!(err.to_string().contains("cub"));

        uninstall(&config, &["cub".to_string()]).unwrap();
        uninstall(&config, &["navdata".to_string()]).unwrap();
        assert!(reopen(&config).is_empty());
    }
}
