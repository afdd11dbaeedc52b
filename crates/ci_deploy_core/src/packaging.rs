use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::json;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::bucket::BucketStore;
use crate::error::DeployError;
use crate::log;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DIRECTORY_MODE: u32 = 0o755;

/// Deflate archive of everything below `dir`. Entry names are relative to
/// `dir` and `/`-separated; file modes survive on unix.
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>, DeployError> {
    if !dir.is_dir() {
        return Err(DeployError::new(format!(
            "Cannot package '{}': not a directory",
            dir.display()
        )));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = 0usize;
    add_directory_entries(&mut writer, dir, dir, &mut entries)?;
    let cursor = writer
        .finish()
        .map_err(|error| DeployError::new(format!("Failed to finish zip archive: {error}")))?;

    log::info(
        "packager",
        "directory_zipped",
        json!({ "source": dir.display().to_string(), "files": entries }),
    );
    Ok(cursor.into_inner())
}

fn add_directory_entries(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    root: &Path,
    dir: &Path,
    entries: &mut usize,
) -> Result<(), DeployError> {
    for path in sorted_children(dir)? {
        let name = entry_name(root, &path)?;
        if path.is_dir() {
            let options = FileOptions::default().unix_permissions(DIRECTORY_MODE);
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|error| zip_error(&name, error))?;
            add_directory_entries(writer, root, &path, entries)?;
        } else {
            let body = fs::read(&path).map_err(|error| {
                DeployError::new(format!("Failed to read '{}': {error}", path.display()))
            })?;
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(file_mode(&path));
            writer
                .start_file(name.as_str(), options)
                .map_err(|error| zip_error(&name, error))?;
            writer.write_all(&body).map_err(|error| {
                DeployError::new(format!("Failed to write zip entry '{name}': {error}"))
            })?;
            *entries += 1;
        }
    }
    Ok(())
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, DeployError> {
    let read_dir = fs::read_dir(dir).map_err(|error| {
        DeployError::new(format!("Failed to list '{}': {error}", dir.display()))
    })?;
    let mut children = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|error| {
            DeployError::new(format!("Failed to list '{}': {error}", dir.display()))
        })?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

fn entry_name(root: &Path, path: &Path) -> Result<String, DeployError> {
    let relative = path.strip_prefix(root).map_err(|error| {
        DeployError::new(format!("'{}' escapes archive root: {error}", path.display()))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.permissions().mode() & 0o777)
        .unwrap_or(DEFAULT_FILE_MODE)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    DEFAULT_FILE_MODE
}

fn zip_error(name: &str, error: ZipError) -> DeployError {
    DeployError::new(format!("Failed to add '{name}' to zip archive: {error}"))
}

pub fn extract_zip(archive: &[u8], dest: &Path) -> Result<(), DeployError> {
    let mut archive = ZipArchive::new(Cursor::new(archive))
        .map_err(|error| DeployError::new(format!("Artifact is not a valid zip: {error}")))?;
    archive.extract(dest).map_err(|error| {
        DeployError::new(format!(
            "Failed to extract artifact into '{}': {error}",
            dest.display()
        ))
    })
}

pub fn read_zip_entry(archive: &[u8], entry: &str) -> Result<String, DeployError> {
    let mut archive = ZipArchive::new(Cursor::new(archive))
        .map_err(|error| DeployError::new(format!("Artifact is not a valid zip: {error}")))?;
    let mut file = archive.by_name(entry).map_err(|error| match error {
        ZipError::FileNotFound => {
            DeployError::new(format!("There is no item named '{entry}' in the archive"))
        }
        other => DeployError::new(format!("Failed to open '{entry}' in archive: {other}")),
    })?;

    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|error| {
        DeployError::new(format!("Failed to read '{entry}' from archive: {error}"))
    })?;
    Ok(contents)
}

/// Copies each top-level entry of `src` into `dest`: directories
/// recursively, files directly.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<(), DeployError> {
    fs::create_dir_all(dest).map_err(|error| {
        DeployError::new(format!("Failed to create '{}': {error}", dest.display()))
    })?;

    for path in sorted_children(src)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = dest.join(name);
        if path.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|error| {
                DeployError::new(format!(
                    "Failed to copy '{}' to '{}': {error}",
                    path.display(),
                    target.display()
                ))
            })?;
        }
    }
    Ok(())
}

/// Uploads a package and returns the object version it became.
pub fn upload_package(
    store: &impl BucketStore,
    bucket: &str,
    key: &str,
    body: &[u8],
) -> Result<String, DeployError> {
    let reported = store.put_object(bucket, key, body).map_err(|error| {
        DeployError::new(format!("Failed to upload s3://{bucket}/{key}: {error}"))
    })?;

    let version = match reported {
        Some(version) => Some(version),
        None => store.object_version(bucket, key).map_err(|error| {
            DeployError::new(format!("Failed to read back s3://{bucket}/{key}: {error}"))
        })?,
    };
    let version = version.ok_or_else(|| {
        DeployError::new(format!(
            "s3://{bucket}/{key} has no version id; is versioning enabled on the bucket?"
        ))
    })?;

    log::info(
        "packager",
        "package_uploaded",
        json!({
            "bucket": bucket,
            "key": key,
            "bytes": body.len(),
            "version_id": version.clone(),
        }),
    );
    Ok(version)
}
