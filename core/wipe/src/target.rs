//! Wipe target resolution.
//!
//! A path is classified once, up front, into the set of files each pass
//! overwrites and the entries removed afterwards. Symlinks are never
//! followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use securevault_common::{Error, Result};

/// Directory names that belong to the filesystem rather than the user and
/// are left untouched when walking a tree.
pub const VOLUME_METADATA_DIRS: &[&str] = &[
    "System Volume Information",
    "$RECYCLE.BIN",
    "lost+found",
    ".Spotlight-V100",
    ".fseventsd",
    ".Trashes",
];

/// Journal artifacts overwritten when the target is a volume, relative to
/// the volume root.
pub const VOLUME_JOURNAL_FILES: &[&str] = &["$Extend/$UsnJrnl:$J", ".journal"];

/// What a wipe job operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WipeTarget {
    /// A single regular file.
    File(PathBuf),
    /// A directory tree.
    Directory {
        root: PathBuf,
        /// Regular files overwritten on each pass.
        files: Vec<PathBuf>,
        /// Symlinks inside the tree; unlinked on delete, never followed.
        links: Vec<PathBuf>,
        /// Directories removable after the files are gone, deepest first.
        /// Directories that hold skipped entries are not listed.
        dirs: Vec<PathBuf>,
    },
    /// A mounted volume. Only journal artifacts at its root are overwritten.
    Volume { root: PathBuf, files: Vec<PathBuf> },
}

impl WipeTarget {
    /// Classify `path` and enumerate what it contains.
    ///
    /// # Errors
    /// - `Error::InvalidTarget` if the path is missing, is a symlink, is
    ///   neither a file nor a directory, or is a volume with no journal
    ///   artifacts
    /// - `Error::InvalidTarget` if any directory in the tree cannot be listed
    pub fn resolve(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).map_err(|e| inaccessible(path, e))?;

        if metadata.file_type().is_symlink() {
            return Err(Error::InvalidTarget(format!(
                "{} is a symbolic link",
                path.display()
            )));
        }

        if metadata.is_dir() && is_mount_point(path)? {
            return Self::resolve_volume(path);
        }

        if metadata.is_file() {
            return Ok(WipeTarget::File(path.to_path_buf()));
        }

        if metadata.is_dir() {
            let mut walk = Walk::default();
            walk.visit(path)?;
            debug!(
                "Resolved {}: {} files, {} links, {} directories",
                path.display(),
                walk.files.len(),
                walk.links.len(),
                walk.dirs.len()
            );
            return Ok(WipeTarget::Directory {
                root: path.to_path_buf(),
                files: walk.files,
                links: walk.links,
                dirs: walk.dirs,
            });
        }

        Err(Error::InvalidTarget(format!(
            "{} is not a file, directory or volume",
            path.display()
        )))
    }

    fn resolve_volume(root: &Path) -> Result<Self> {
        let files: Vec<PathBuf> = VOLUME_JOURNAL_FILES
            .iter()
            .map(|relative| root.join(relative))
            .filter(|candidate| {
                fs::symlink_metadata(candidate)
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            })
            .collect();

        if files.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "No journal artifacts found on volume {}",
                root.display()
            )));
        }

        Ok(WipeTarget::Volume {
            root: root.to_path_buf(),
            files,
        })
    }

    /// The path the target was resolved from.
    pub fn root(&self) -> &Path {
        match self {
            WipeTarget::File(path) => path,
            WipeTarget::Directory { root, .. } | WipeTarget::Volume { root, .. } => root,
        }
    }

    /// Files overwritten on every pass.
    pub fn files(&self) -> &[PathBuf] {
        match self {
            WipeTarget::File(path) => std::slice::from_ref(path),
            WipeTarget::Directory { files, .. } | WipeTarget::Volume { files, .. } => files,
        }
    }

    /// Whether this target ever has its entries removed.
    pub fn is_deletable(&self) -> bool {
        !matches!(self, WipeTarget::Volume { .. })
    }

    /// Whether progress is reported with an up-front estimate.
    pub fn is_multi_file(&self) -> bool {
        !matches!(self, WipeTarget::File(_))
    }

    /// Total size of the files to overwrite, in bytes.
    pub fn total_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        for path in self.files() {
            total += fs::symlink_metadata(path)?.len();
        }
        Ok(total)
    }
}

#[derive(Default)]
struct Walk {
    files: Vec<PathBuf>,
    links: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Walk {
    /// Visit `dir` and everything below it. Returns whether anything in the
    /// subtree was skipped, in which case `dir` must survive deletion.
    fn visit(&mut self, dir: &Path) -> Result<bool> {
        let mut retained = false;

        let mut entries = fs::read_dir(dir)
            .and_then(|listing| listing.collect::<io::Result<Vec<_>>>())
            .map_err(|e| inaccessible(dir, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| inaccessible(&path, e))?;

            if file_type.is_symlink() {
                self.links.push(path);
            } else if file_type.is_dir() {
                let name = entry.file_name();
                if VOLUME_METADATA_DIRS
                    .iter()
                    .any(|skip| name.as_os_str() == *skip)
                {
                    debug!("Skipping volume metadata {}", path.display());
                    retained = true;
                } else if self.visit(&path)? {
                    retained = true;
                }
            } else if file_type.is_file() {
                self.files.push(path);
            } else {
                warn!("Skipping special file {}", path.display());
                retained = true;
            }
        }

        if !retained {
            self.dirs.push(dir.to_path_buf());
        }
        Ok(retained)
    }
}

fn inaccessible(path: &Path, e: io::Error) -> Error {
    Error::InvalidTarget(format!("{}: {}", path.display(), e))
}

/// Whether `path` is the root of a mounted filesystem.
#[cfg(unix)]
fn is_mount_point(path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let canonical = fs::canonicalize(path).map_err(|e| inaccessible(path, e))?;
    let Some(parent) = canonical.parent() else {
        return Ok(true);
    };
    let own = fs::metadata(&canonical).map_err(|e| inaccessible(&canonical, e))?;
    let parent = fs::metadata(parent).map_err(|e| inaccessible(parent, e))?;
    Ok(own.dev() != parent.dev())
}

/// Whether `path` is the root of a mounted filesystem.
#[cfg(not(unix))]
fn is_mount_point(path: &Path) -> Result<bool> {
    let canonical = fs::canonicalize(path).map_err(|e| inaccessible(path, e))?;
    Ok(canonical.parent().is_none())
}
