//! Format-independent entry metadata.

/// Kind of an archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Target exactly as stored in the archive, not yet validated.
    Symlink { target: String },
    /// Hard links, device nodes, fifos and format meta entries.
    Other(&'static str),
}

/// One item read from an archive.
///
/// Produced by a decoder and handed straight to the materializer; never kept
/// past the entry it describes.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Slash-separated name as declared by the archive.
    pub relative_path: String,
    pub kind: EntryKind,
    /// Permission bits, if the archive records them.
    pub mode: Option<u32>,
    /// Declared uncompressed size.
    pub size: u64,
}

impl ArchiveEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink { .. })
    }

    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Symlink { target } => Some(target),
            _ => None,
        }
    }
}
