//! Writing admitted entries to disk.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::Error;
use crate::extractor::OverwritePolicy;
use crate::guard::PathVerdict;

/// What a single write produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Directory,
    File { bytes: u64 },
    Symlink,
    /// Nothing written: existing path kept, or an unsupported entry kind.
    Skipped,
}

/// Writes entries through one reusable copy buffer.
pub struct Materializer {
    buffer: Vec<u8>,
    overwrite: OverwritePolicy,
}

impl Materializer {
    pub fn new(buffer_size: usize, overwrite: OverwritePolicy) -> Self {
        Self {
            buffer: vec![0; buffer_size.max(1)],
            overwrite,
        }
    }

    /// Write one entry at the path the guard admitted.
    ///
    /// Refuses anything but [`PathVerdict::Admit`]; a rejected path never
    /// reaches the filesystem. For symlinks the caller has already checked
    /// the link target.
    pub fn write(
        &mut self,
        verdict: &PathVerdict,
        entry: &ArchiveEntry,
        content: &mut dyn Read,
    ) -> Result<Outcome, Error> {
        let path = match verdict {
            PathVerdict::Admit(path) => path.as_path(),
            PathVerdict::Reject(reason) => {
                return Err(Error::PathRejected {
                    entry: entry.relative_path.clone(),
                    reason: reason.clone(),
                })
            }
        };

        match &entry.kind {
            EntryKind::Directory => {
                fs::create_dir_all(path)?;
                Ok(Outcome::Directory)
            }
            EntryKind::File => self.write_file(path, entry, content),
            EntryKind::Symlink { target } => self.write_symlink(path, entry, target),
            EntryKind::Other(kind) => {
                log::debug!("ignoring {} entry '{}'", kind, entry.relative_path);
                Ok(Outcome::Skipped)
            }
        }
    }

    fn write_file(
        &mut self,
        path: &Path,
        entry: &ArchiveEntry,
        content: &mut dyn Read,
    ) -> Result<Outcome, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.clear(path, entry)? {
            return Ok(Outcome::Skipped);
        }

        // create_new refuses to follow anything that raced into place
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;

        let written = self.copy(content, &mut file, entry.size)?;
        if written != entry.size {
            return Err(Error::malformed(format!(
                "content ended after {} of {} declared bytes",
                written, entry.size
            )));
        }

        #[cfg(unix)]
        if let Some(mode) = entry.mode {
            use std::os::unix::fs::PermissionsExt;
            // owner/group/other rwx only; setuid, setgid and sticky are dropped
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))?;
        }

        Ok(Outcome::File { bytes: written })
    }

    fn write_symlink(
        &mut self,
        path: &Path,
        entry: &ArchiveEntry,
        target: &str,
    ) -> Result<Outcome, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.clear(path, entry)? {
            return Ok(Outcome::Skipped);
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(target, path)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(target, path)?;

        Ok(Outcome::Symlink)
    }

    /// Make room at `path` according to the overwrite policy.
    /// Returns `false` if the entry should be skipped.
    fn clear(&self, path: &Path, entry: &ArchiveEntry) -> Result<bool, Error> {
        let existing = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        match self.overwrite {
            OverwritePolicy::Skip => Ok(false),
            OverwritePolicy::Error => Err(Error::AlreadyExists {
                entry: entry.relative_path.clone(),
            }),
            OverwritePolicy::Overwrite if existing.is_dir() => Err(Error::AlreadyExists {
                entry: entry.relative_path.clone(),
            }),
            OverwritePolicy::Overwrite => {
                // removes the link itself, never its target
                fs::remove_file(path)?;
                Ok(true)
            }
        }
    }

    /// Fails as soon as the content runs past `declared`.
    fn copy(&mut self, content: &mut dyn Read, out: &mut fs::File, declared: u64) -> Result<u64, Error> {
        let mut written = 0u64;
        loop {
            let n = match content.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_read(e)),
            };
            if written + n as u64 > declared {
                return Err(Error::malformed(format!(
                    "content exceeds declared size of {} bytes",
                    declared
                )));
            }
            out.write_all(&self.buffer[..n])?;
            written += n as u64;
        }
        Ok(written)
    }
}
