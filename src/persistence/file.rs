//! Saving and reading configuration files.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::persistence::{header, is_header_line};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("File {} is a directory.", .0.display())]
    Directory(PathBuf),

    #[error("File {} is a special device.", .0.display())]
    Device(PathBuf),

    #[error("File {} is a named pipe.", .0.display())]
    Pipe(PathBuf),

    #[error("File {} exists, but it is not an existing configuration file.\nFile was NOT overwritten", .0.display())]
    NotConfigFile(PathBuf),

    #[error("File {} exists, but it could not be checked before overwriting: {source}\nFile was NOT overwritten", .path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("Could not create file \"{}\": {source}", .path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("Error writing to file \"{}\": {source}\n{}", .path.display(), cleanup_message(.removed))]
    Write { path: PathBuf, source: io::Error, removed: bool },

    #[error("Could not read file \"{}\": {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
}

fn cleanup_message(removed: &bool) -> &'static str {
    if *removed {
        "Save aborted; truncated file has been removed"
    } else {
        "Save aborted; truncated file may exist"
    }
}

/// How a saved file is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    pub file_mode: u32,
    pub group_id: Option<u32>,
    /// Requesting user, recorded in the header.
    pub user: u32,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            file_mode: 0o664,
            group_id: None,
            user: 0,
        }
    }
}

/// Write `body` behind a fresh header to `path`.
///
/// Returns the user-facing status text, which may carry warnings ahead of
/// "Save complete".
pub fn save_to_file(path: &Path, body: &str, options: &SaveOptions) -> Result<String, PersistError> {
    check_overwrite(path)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(options.file_mode)
        .open(path)
        .map_err(|source| PersistError::Create { path: path.to_path_buf(), source })?;

    let mut status = String::new();
    if let Err(e) = fs::set_permissions(path, Permissions::from_mode(options.file_mode)) {
        tracing::warn!(path = ?path, error = %e, "could not set file mode");
    }
    if let Some(gid) = options.group_id {
        if let Err(e) = std::os::unix::fs::fchown(&file, None, Some(gid)) {
            tracing::warn!(path = ?path, gid, error = %e, "could not set file group");
            status.push_str(&format!("Warning: could not set group of {} to {gid}: {e}\n", path.display()));
        }
    }

    let written = file
        .write_all(header(options.user).as_bytes())
        .and_then(|_| file.write_all(body.as_bytes()))
        .and_then(|_| file.sync_all());
    if let Err(source) = written {
        drop(file);
        let removed = fs::remove_file(path).is_ok();
        tracing::error!(path = ?path, error = %source, removed, "save aborted");
        return Err(PersistError::Write { path: path.to_path_buf(), source, removed });
    }

    tracing::info!(path = ?path, bytes = body.len(), "configuration saved");
    status.push_str("Save complete\n");
    Ok(status)
}

fn check_overwrite(path: &Path) -> Result<(), PersistError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(PersistError::Unreadable { path: path.to_path_buf(), source }),
    };
    let kind = metadata.file_type();
    if kind.is_dir() {
        return Err(PersistError::Directory(path.to_path_buf()));
    }
    if kind.is_char_device() || kind.is_block_device() {
        return Err(PersistError::Device(path.to_path_buf()));
    }
    if kind.is_fifo() {
        return Err(PersistError::Pipe(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|source| PersistError::Unreadable { path: path.to_path_buf(), source })?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| PersistError::Unreadable { path: path.to_path_buf(), source })?;
    if !is_header_line(&first) {
        return Err(PersistError::NotConfigFile(path.to_path_buf()));
    }
    Ok(())
}

/// Read a configuration file. Returns its text and the uid owning it.
pub fn read_config_file(path: &Path) -> Result<(String, u32), PersistError> {
    let read_err = |source: io::Error| PersistError::Read { path: path.to_path_buf(), source };
    let metadata = fs::metadata(path).map_err(read_err)?;
    if metadata.is_dir() {
        return Err(PersistError::Directory(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(read_err)?;
    Ok((text, metadata.uid()))
}
