//! Zip package archives.
//!
//! Archives are read through the [`Runtime`] into memory and unpacked entry
//! by entry. When every entry sits under one top-level directory, that
//! directory is stripped so the package contents land directly in the
//! destination.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::ZipArchive;

use crate::package::MANIFEST_FILE;
use crate::runtime::Runtime;

type Archive = ZipArchive<Cursor<Vec<u8>>>;

fn open_archive<R: Runtime + ?Sized>(runtime: &R, archive_path: &Path) -> Result<Archive> {
    let bytes = runtime
        .read(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
    ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))
}

/// Safe relative paths of all entries, index aligned. Entries whose names
/// would escape the destination are `None`.
fn entry_paths(archive: &mut Archive) -> Result<Vec<Option<PathBuf>>> {
    let mut paths = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read ZIP entry {}", i))?;
        paths.push(entry.enclosed_name());
    }
    Ok(paths)
}

/// The directory shared by every entry, if there is exactly one and it
/// actually contains something.
fn single_top_dir(paths: &[Option<PathBuf>]) -> Option<PathBuf> {
    let mut top = None;
    let mut nested = false;

    for path in paths.iter().flatten() {
        let mut components = path.components();
        let first = components.next()?.as_os_str().to_os_string();
        nested |= components.next().is_some();
        match &top {
            None => top = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return None,
        }
    }

    if nested { top.map(PathBuf::from) } else { None }
}

fn strip(path: &Path, prefix: Option<&Path>) -> Option<PathBuf> {
    let relative = match prefix {
        Some(prefix) => path.strip_prefix(prefix).ok()?,
        None => path,
    };
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative.to_path_buf())
    }
}

/// Unpacks `archive_path` into `destination`, returning the number of files
/// written. Fails on archives without any file.
#[tracing::instrument(skip(runtime))]
pub fn extract_zip<R: Runtime + ?Sized>(
    runtime: &R,
    archive_path: &Path,
    destination: &Path,
) -> Result<usize> {
    debug!("Extracting zip archive to {:?}...", destination);
    let mut archive = open_archive(runtime, archive_path)?;
    let paths = entry_paths(&mut archive)?;
    let prefix = single_top_dir(&paths);
    if let Some(prefix) = &prefix {
        debug!("Stripping top-level directory {:?}", prefix);
    }

    let mut files = 0;
    for (i, path) in paths.iter().enumerate() {
        let Some(path) = path else {
            debug!("Skipping entry {} with an unsafe path", i);
            continue;
        };
        let Some(relative) = strip(path, prefix.as_deref()) else {
            continue;
        };

        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read ZIP entry {}", i))?;
        let target = destination.join(&relative);

        if entry.is_dir() {
            runtime.create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            runtime.create_dir_all(parent)?;
        }
        let mut out = runtime.create_file(&target)?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract file {:?}", target))?;
        files += 1;
    }

    if files == 0 {
        bail!("Archive {:?} contains no files", archive_path);
    }

    info!("Extracted {} files into {:?}", files, destination);
    Ok(files)
}

/// Reads `manifest.json` from the archive root, or from inside its single
/// top-level directory. `None` if the archive has no manifest.
#[tracing::instrument(skip(runtime))]
pub fn read_zip_manifest<R: Runtime + ?Sized>(
    runtime: &R,
    archive_path: &Path,
) -> Result<Option<String>> {
    let mut archive = open_archive(runtime, archive_path)?;
    let paths = entry_paths(&mut archive)?;
    let prefix = single_top_dir(&paths);

    let index = paths.iter().position(|path| {
        path.as_deref()
            .and_then(|p| strip(p, prefix.as_deref()))
            .is_some_and(|p| p == Path::new(MANIFEST_FILE))
    });
    let Some(index) = index else {
        return Ok(None);
    };

    let mut entry = archive.by_index(index)?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read {} from {:?}", MANIFEST_FILE, archive_path))?;
    Ok(Some(content))
}

/// [`extract_zip`] on the blocking thread pool, for use from installers.
pub async fn extract_zip_blocking(
    runtime: Arc<dyn Runtime>,
    archive_path: PathBuf,
    destination: PathBuf,
) -> Result<usize> {
    tokio::task::spawn_blocking(move || extract_zip(&*runtime, &archive_path, &destination))
        .await
        .context("Extraction task panicked")?
}

/// [`read_zip_manifest`] on the blocking thread pool.
pub async fn read_zip_manifest_blocking(
    runtime: Arc<dyn Runtime>,
    archive_path: PathBuf,
) -> Result<Option<String>> {
    tokio::task::spawn_blocking(move || read_zip_manifest(&*runtime, &archive_path))
        .await
        .context("Manifest read task panicked")?
}
