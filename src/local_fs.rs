//! Local filesystem helpers built on `cap-std` ambient directories.
//!
//! Pipeline files, private keys, scripts and archives are all addressed by
//! user-supplied paths. These helpers split such a path into its parent
//! directory and file name so every open happens relative to an explicitly
//! opened [`Dir`].

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{
    ambient_authority,
    fs_utf8::{Dir, File},
};

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If the `HOME` environment variable is not set, the function returns the
/// input string unchanged.
///
/// # Examples
///
/// ```
/// # use onctl::local_fs::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_ed25519"), format!("{home}/.ssh/id_ed25519"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Resolves `path` against `base` unless it is already absolute.
#[must_use]
pub fn resolve_against(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Reads a UTF-8 file into a string.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory cannot be
/// opened or the file cannot be read.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (dir, name) = open_parent(path)?;
    dir.read_to_string(name)
}

/// Opens a file for reading.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be opened.
pub fn open(path: &Utf8Path) -> io::Result<File> {
    let (dir, name) = open_parent(path)?;
    dir.open(name)
}

/// Creates (or truncates) a file for writing.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be created.
pub fn create(path: &Utf8Path) -> io::Result<File> {
    let (dir, name) = open_parent(path)?;
    dir.create(name)
}

fn open_parent(path: &Utf8Path) -> io::Result<(Dir, &str)> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, name))
}
