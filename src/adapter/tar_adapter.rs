//! tar.gz adapter.

use std::io::{self, Read};

use flate2::read::GzDecoder;

use super::{EntrySource, Visit};
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::Error;
use crate::format::ArchiveFormat;

/// Streaming adapter for gzip-compressed tar.
///
/// Decompression and header parsing are pipelined: nothing seeks, and entry
/// content is read straight out of the decoder. Each entry must be consumed
/// before the next header can be parsed.
pub struct TarGzAdapter<R: Read> {
    decoder: GzDecoder<R>,
}

impl<R: Read> TarGzAdapter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            decoder: GzDecoder::new(reader),
        }
    }

    /// Read whatever follows the tar end-of-archive marker so the gzip
    /// trailer (CRC and length) is verified.
    fn drain_trailer(&mut self) -> Result<(), Error> {
        io::copy(&mut self.decoder, &mut io::sink()).map_err(decode_error)?;
        Ok(())
    }
}

impl<R: Read> EntrySource for TarGzAdapter<R> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::TarGz
    }

    fn for_each(&mut self, visit: &mut Visit<'_>) -> Result<(), Error> {
        {
            let mut archive = tar::Archive::new(&mut self.decoder);
            let entries = archive.entries().map_err(decode_error)?;

            for entry in entries {
                let mut entry = entry.map_err(decode_error)?;
                let relative_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

                let kind = match entry.header().entry_type() {
                    tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::File,
                    tar::EntryType::Directory => EntryKind::Directory,
                    tar::EntryType::Symlink => {
                        let target = entry
                            .link_name_bytes()
                            .map(|name| String::from_utf8_lossy(&name).into_owned())
                            .unwrap_or_default();
                        EntryKind::Symlink { target }
                    }
                    other => EntryKind::Other(entry_type_name(other)),
                };

                let info = ArchiveEntry {
                    relative_path,
                    kind,
                    mode: entry.header().mode().ok(),
                    size: entry.size(),
                };

                if !visit(info, &mut entry)? {
                    return Ok(());
                }
            }
        }

        self.drain_trailer()
    }
}

/// tar reports short blocks and bad headers as `ErrorKind::Other`; both mean
/// the stream is corrupt, as do decoder errors.
fn decode_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::Other => Error::malformed(e.to_string()),
        _ => Error::from_read(e),
    }
}

fn entry_type_name(entry_type: tar::EntryType) -> &'static str {
    match entry_type {
        tar::EntryType::Link => "hard link",
        tar::EntryType::Char => "character device",
        tar::EntryType::Block => "block device",
        tar::EntryType::Fifo => "fifo",
        tar::EntryType::GNUSparse => "GNU sparse file",
        tar::EntryType::XGlobalHeader => "pax global header",
        tar::EntryType::XHeader => "pax header",
        tar::EntryType::GNULongName | tar::EntryType::GNULongLink => "GNU long name",
        _ => "unknown entry type",
    }
}
