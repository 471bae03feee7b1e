//! Path safety for archive entries.
//!
//! Every entry name and symlink target is checked lexically against the
//! destination root before anything touches the filesystem. Nothing is
//! written, created or linked for a path that fails.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use path_jail::Jail;

use crate::error::Error;

/// Outcome of checking one archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    /// Absolute target path, equal to or below the root.
    Admit(PathBuf),
    Reject(RejectReason),
}

/// Why a path was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectReason {
    /// Empty entry name.
    Empty,
    /// `.` or `./`, the archive's own root entry.
    CurrentDirectory,
    /// Leading `/`, `\` or a drive letter.
    Absolute,
    /// Name fails the character or length checks.
    InvalidName(&'static str),
    /// Lexically resolves outside the root.
    EscapesRoot { resolved: PathBuf },
    /// Symlink with an absolute target.
    AbsoluteLinkTarget { target: String },
    /// Symlink target resolves outside the root.
    LinkEscapesRoot { target: String, resolved: PathBuf },
    /// Symlinks are not allowed by policy.
    SymlinkNotAllowed { target: String },
    /// Containing directory resolves outside the root on disk.
    ResolvesOutside { detail: String },
    /// Symlink target resolves outside the root once the link's directory
    /// is followed on disk.
    LinkResolvesOutside { target: String, detail: String },
}

impl RejectReason {
    /// Root-directory markers are skipped by the caller, not reported.
    pub fn is_root_entry(&self) -> bool {
        matches!(self, Self::Empty | Self::CurrentDirectory)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty path"),
            Self::CurrentDirectory => f.write_str("current directory entry"),
            Self::Absolute => f.write_str("absolute path"),
            Self::InvalidName(reason) => write!(f, "invalid name: {}", reason),
            Self::EscapesRoot { resolved } => {
                write!(f, "escapes destination (resolves to '{}')", resolved.display())
            }
            Self::AbsoluteLinkTarget { target } => {
                write!(f, "symlink target '{}' is absolute", target)
            }
            Self::LinkEscapesRoot { target, resolved } => write!(
                f,
                "symlink target '{}' escapes destination (resolves to '{}')",
                target,
                resolved.display()
            ),
            Self::SymlinkNotAllowed { target } => {
                write!(f, "symlink to '{}' not allowed", target)
            }
            Self::ResolvesOutside { detail } => {
                write!(f, "containing directory resolves outside destination: {}", detail)
            }
            Self::LinkResolvesOutside { target, detail } => write!(
                f,
                "symlink target '{}' resolves outside destination: {}",
                target, detail
            ),
        }
    }
}

/// Lexical path check against a destination root.
///
/// Joins `root` and `archive_path` textually and collapses `.`/`..` without
/// consulting the filesystem. The result must equal `root` or lie below it,
/// compared component by component (`/dst-evil` is not below `/dst`).
pub fn validate(root: &Path, archive_path: &str) -> PathVerdict {
    if archive_path.is_empty() {
        return PathVerdict::Reject(RejectReason::Empty);
    }
    if archive_path.trim_end_matches('/') == "." {
        return PathVerdict::Reject(RejectReason::CurrentDirectory);
    }
    if let Err(reason) = validate_name(archive_path) {
        return PathVerdict::Reject(RejectReason::InvalidName(reason));
    }
    if is_absolute(archive_path) {
        return PathVerdict::Reject(RejectReason::Absolute);
    }

    let root = normalize(root);
    let resolved = normalize(&root.join(archive_path));
    if resolved.starts_with(&root) {
        PathVerdict::Admit(resolved)
    } else {
        PathVerdict::Reject(RejectReason::EscapesRoot { resolved })
    }
}

/// Lexical check of a symlink target, relative to the link's own directory.
pub fn validate_link(root: &Path, archive_path: &str, target: &str) -> PathVerdict {
    let link = match validate(root, archive_path) {
        PathVerdict::Admit(link) => link,
        reject => return reject,
    };

    if target.is_empty() {
        return PathVerdict::Reject(RejectReason::InvalidName("empty symlink target"));
    }
    if let Err(reason) = validate_name(target) {
        return PathVerdict::Reject(RejectReason::InvalidName(reason));
    }
    if is_absolute(target) {
        return PathVerdict::Reject(RejectReason::AbsoluteLinkTarget {
            target: target.to_string(),
        });
    }

    let root = normalize(root);
    let base = link.parent().unwrap_or(&root);
    let resolved = normalize(&base.join(target));
    if resolved.starts_with(&root) {
        PathVerdict::Admit(resolved)
    } else {
        PathVerdict::Reject(RejectReason::LinkEscapesRoot {
            target: target.to_string(),
            resolved,
        })
    }
}

/// Path guard bound to one destination root.
///
/// Runs the lexical check, then resolves the admitted path's containing
/// directory through a [`Jail`] so a directory that already exists as a
/// symlink pointing elsewhere can't be written through. Symlink targets are
/// resolved the same way, starting from the directory the link actually
/// lands in.
pub struct PathGuard {
    root: PathBuf,
    jail: Jail,
}

impl PathGuard {
    /// The destination must already exist.
    pub fn new(root: &Path) -> Result<Self, Error> {
        let root = normalize(&std::path::absolute(root)?);
        let jail = Jail::new(&root)?;
        Ok(Self { root, jail })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate(&self, archive_path: &str) -> PathVerdict {
        match validate(&self.root, archive_path) {
            PathVerdict::Admit(target) => self.check_resolved(target),
            reject => reject,
        }
    }

    pub fn validate_link(&self, archive_path: &str, target: &str) -> PathVerdict {
        match validate_link(&self.root, archive_path, target) {
            PathVerdict::Admit(resolved) => {
                self.check_resolved_link(archive_path, target, resolved)
            }
            reject => reject,
        }
    }

    /// The link is created at its lexical path, but the OS follows any
    /// symlinked directory on the way there, and the target is relative to
    /// wherever that lands.
    fn check_resolved_link(
        &self,
        archive_path: &str,
        target: &str,
        lexical: PathBuf,
    ) -> PathVerdict {
        let outside = |detail: String| {
            PathVerdict::Reject(RejectReason::LinkResolvesOutside {
                target: target.to_string(),
                detail,
            })
        };

        let link_dir = Path::new(archive_path).parent().unwrap_or(Path::new(""));
        let dir = match self.jail.join(link_dir) {
            Ok(dir) => dir,
            Err(e) => return outside(e.to_string()),
        };
        let relative = match dir.strip_prefix(self.jail.root()) {
            Ok(relative) => relative.join(target),
            Err(_) => return outside(format!("'{}' is not below the root", dir.display())),
        };
        match self.jail.join(relative) {
            Ok(_) => PathVerdict::Admit(lexical),
            Err(e) => outside(e.to_string()),
        }
    }

    fn check_resolved(&self, target: PathBuf) -> PathVerdict {
        let parent = target
            .parent()
            .and_then(|p| p.strip_prefix(&self.root).ok())
            .filter(|rel| !rel.as_os_str().is_empty());

        if let Some(rel) = parent {
            // The returned path is discarded: we write to the lexical target,
            // never to a symlink-resolved one.
            if let Err(e) = self.jail.join(rel) {
                return PathVerdict::Reject(RejectReason::ResolvesOutside {
                    detail: e.to_string(),
                });
            }
        }
        PathVerdict::Admit(target)
    }
}

/// Leading `/` or `\`, or a `C:` style drive prefix.
fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    if matches!(bytes.first(), Some(b'/') | Some(b'\\')) {
        return true;
    }
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
        || Path::new(path).is_absolute()
}

/// Character and length checks. Returns `Err(reason)` if invalid.
fn validate_name(name: &str) -> Result<(), &'static str> {
    // Reject control characters (includes null bytes)
    if name.chars().any(|c| c.is_control()) {
        return Err("contains control characters");
    }

    // Backslash separators could bypass the component checks on Unix
    if name.contains('\\') {
        return Err("contains backslash");
    }

    if name.len() > 1024 {
        return Err("path too long (>1024 bytes)");
    }

    if name.split('/').any(|component| component.len() > 255) {
        return Err("path component too long (>255 bytes)");
    }

    Ok(())
}

/// Collapse `.` and `..` lexically. `..` at the root stays at the root.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => result.push(part),
            Component::RootDir | Component::Prefix(_) => result.push(component.as_os_str()),
        }
    }

    result
}
