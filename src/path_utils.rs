use std::{
    io,
    os::unix::ffi::OsStrExt,
    path::{Component, Path, PathBuf},
};

/// Make `path` absolute and lexically normalized, dropping `.` and resolving `..`
///
/// Symlinks are not resolved, so the result names the file the same way the user did.
///
/// ## Example
///
/// ```rust
/// use std::path::PathBuf;
/// let path = logcut::path_utils::normalize_path("/var/log/./nginx/../mail.log")?;
/// assert_eq!(path, PathBuf::from("/var/log/mail.log"));
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn normalize_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Raw bytes of `path` as they are written into a cache file
pub fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

/// Default location of the cache file named `filename`
///
/// A file with this name in the working directory wins, otherwise it lives in the home directory.
pub fn default_cache_file(filename: &str) -> PathBuf {
    let local = Path::new(filename);
    if local.exists() {
        return std::env::current_dir()
            .map(|workdir| workdir.join(filename))
            .unwrap_or_else(|_| local.to_path_buf());
    }
    match dirs::home_dir() {
        Some(home) => home.join(filename),
        None => local.to_path_buf(),
    }
}
