// IO helpers
// (c) 2024 Ross Younger

use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Permissions for files holding private keys
#[cfg(unix)]
const PRIVATE_MODE: u32 = 0o600;

/// Creates (or truncates) a file for writing.
///
/// If `private` is set, on Unix the file is left readable by its owner only.
/// This applies to an existing file too, whatever its permissions were.
pub fn create_truncate_file(path: &Path, private: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    let _ = options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};
        let _ = options.mode(PRIVATE_MODE);
        let file = options.open(path)?;
        // mode() only takes effect when the file is created
        file.set_permissions(std::fs::Permissions::from_mode(PRIVATE_MODE))?;
        return Ok(file);
    }
    #[cfg(not(unix))]
    let _ = private;
    options.open(path)
}

/// Attempts to remove every file in the list, returning all the failures
pub fn remove_all<'a, I>(paths: I) -> Vec<(PathBuf, std::io::Error)>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    paths
        .into_iter()
        .filter_map(|p| match std::fs::remove_file(p) {
            Ok(()) => {
                tracing::debug!("removed {}", p.display());
                None
            }
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    tracing::warn!("{} was already gone", p.display());
                }
                Some((p.clone(), e))
            }
        })
        .collect()
}
