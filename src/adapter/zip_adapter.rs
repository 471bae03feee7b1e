//! zip adapter.
//!
//! The central directory sits at the end of a zip file, so a forward-only
//! source is spooled into a random-access [`Spool`] before any entry can be
//! listed.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use super::{EntrySource, Visit};
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::Error;
use crate::extractor::ZipBuffering;
use crate::format::ArchiveFormat;

/// Longest symlink target read from a zip entry body.
const MAX_LINK_TARGET: u64 = 4096;

/// Random-access copy of a forward-only source.
pub enum Spool {
    Memory(Cursor<Vec<u8>>),
    /// Anonymous temporary file, removed by the OS once dropped.
    Disk(File),
}

impl Spool {
    /// Copy `reader` to the end according to `buffering`.
    ///
    /// With `Auto`, a size hint picks the backend up front. Without one, up to
    /// `memory_limit` bytes are held in memory and the stream spills to disk
    /// only if it turns out to be larger.
    pub fn fill<R: Read>(
        mut reader: R,
        buffering: ZipBuffering,
        size_hint: Option<u64>,
    ) -> Result<Self, Error> {
        let spool = match buffering {
            ZipBuffering::Memory => Self::memory(&mut reader)?,
            ZipBuffering::Disk => Self::disk(&[], &mut reader)?,
            ZipBuffering::Auto { memory_limit } => match size_hint {
                Some(size) if size <= memory_limit => Self::memory(&mut reader)?,
                Some(_) => Self::disk(&[], &mut reader)?,
                None => {
                    let mut head = Vec::new();
                    (&mut reader)
                        .take(memory_limit.saturating_add(1))
                        .read_to_end(&mut head)?;
                    if head.len() as u64 <= memory_limit {
                        Self::Memory(Cursor::new(head))
                    } else {
                        Self::disk(&head, &mut reader)?
                    }
                }
            },
        };

        log::debug!("spooled zip source: {} bytes {}", spool.len(), spool.backend());
        Ok(spool)
    }

    fn memory<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::Memory(Cursor::new(buf)))
    }

    fn disk<R: Read>(head: &[u8], reader: &mut R) -> io::Result<Self> {
        let mut file = tempfile::tempfile()?;
        file.write_all(head)?;
        io::copy(reader, &mut file)?;
        file.rewind()?;
        Ok(Self::Disk(file))
    }

    pub fn is_disk(&self) -> bool {
        matches!(self, Self::Disk(_))
    }

    fn backend(&self) -> &'static str {
        if self.is_disk() {
            "on disk"
        } else {
            "in memory"
        }
    }

    fn len(&self) -> u64 {
        match self {
            Self::Memory(cursor) => cursor.get_ref().len() as u64,
            Self::Disk(file) => file.metadata().map(|m| m.len()).unwrap_or(0),
        }
    }
}

impl Read for Spool {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Memory(cursor) => cursor.read(buf),
            Self::Disk(file) => file.read(buf),
        }
    }
}

impl Seek for Spool {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Memory(cursor) => cursor.seek(pos),
            Self::Disk(file) => file.seek(pos),
        }
    }
}

/// Adapter over a random-access zip source.
///
/// Entries are yielded in central-directory order.
pub struct ZipAdapter<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
}

impl<R: Read + Seek> ZipAdapter<R> {
    /// Reads the central directory. A missing or corrupt one is
    /// [`Error::MalformedArchive`].
    pub fn new(reader: R) -> Result<Self, Error> {
        let archive = zip::ZipArchive::new(reader)?;
        Ok(Self { archive })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

impl<R: Read + Seek> EntrySource for ZipAdapter<R> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn for_each(&mut self, visit: &mut Visit<'_>) -> Result<(), Error> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;
            let relative_path = file.name().to_string();

            let kind = if file.is_symlink() {
                // zip stores the link target as the entry body
                let mut target = String::new();
                (&mut file)
                    .take(MAX_LINK_TARGET)
                    .read_to_string(&mut target)
                    .map_err(|e| Error::from_read(e).with_entry(&relative_path))?;
                EntryKind::Symlink { target }
            } else if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            let entry = ArchiveEntry {
                relative_path,
                kind,
                mode: file.unix_mode(),
                size: file.size(),
            };

            if !visit(entry, &mut file)? {
                break;
            }
        }
        Ok(())
    }
}
