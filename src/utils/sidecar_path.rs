use std::path::{Path, PathBuf};

/// Derives a side-car file path by appending `.{suffix}` to the full file
/// name of `path`, preserving any existing extension.
///
/// The data file `<name>` keeps its write-ahead log at `<name>.wal` and its
/// persisted cache offsets at `<name>.cache`.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use chainstore::utils::sidecar_path;
///
/// assert_eq!(sidecar_path(Path::new("data"), "wal"), PathBuf::from("data.wal"));
/// assert_eq!(
///     sidecar_path(Path::new("data.db"), "cache"),
///     PathBuf::from("data.db.cache")
/// );
/// ```
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
