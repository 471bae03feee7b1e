//! Container format detection from a magic-number prefix.

use std::fmt;
use std::io::{self, Cursor, Read, Seek};

use crate::error::Error;

/// Number of prefix bytes needed to classify a stream.
pub const MAGIC_LEN: usize = 4;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Container format, derived purely from the byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip-compressed tar. The tar layer is only verified once decoding starts.
    TarGz,
    Zip,
    Unknown,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TarGz => f.write_str("tar.gz"),
            Self::Zip => f.write_str("zip"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Classify a stream prefix.
///
/// Fewer than [`MAGIC_LEN`] bytes is [`Error::TruncatedInput`], never `Unknown`.
pub fn sniff(prefix: &[u8]) -> Result<ArchiveFormat, Error> {
    if prefix.len() < MAGIC_LEN {
        return Err(Error::TruncatedInput {
            available: prefix.len(),
        });
    }

    let format = if prefix.starts_with(&GZIP_MAGIC) {
        ArchiveFormat::TarGz
    } else if prefix.starts_with(&ZIP_MAGIC) {
        ArchiveFormat::Zip
    } else {
        ArchiveFormat::Unknown
    };
    Ok(format)
}

/// A source whose peeked prefix is replayed ahead of the remaining bytes.
pub type Replay<R> = io::Chain<Cursor<[u8; MAGIC_LEN]>, R>;

/// Result of peeking a forward-only stream.
pub struct Peeked<R> {
    pub format: ArchiveFormat,
    pub magic: [u8; MAGIC_LEN],
    /// The full stream, prefix included.
    pub reader: Replay<R>,
}

/// Peek the prefix of a non-seekable stream, then hand it back intact.
pub fn peek<R: Read>(mut reader: R) -> Result<Peeked<R>, Error> {
    let mut magic = [0u8; MAGIC_LEN];
    let filled = read_prefix(&mut reader, &mut magic)?;
    let format = sniff(&magic[..filled])?;

    Ok(Peeked {
        format,
        magic,
        reader: Cursor::new(magic).chain(reader),
    })
}

/// Detect the format of a seekable source and rewind it.
pub fn detect_seekable<R: Read + Seek>(reader: &mut R) -> Result<(ArchiveFormat, [u8; MAGIC_LEN]), Error> {
    let start = reader.stream_position()?;
    let mut magic = [0u8; MAGIC_LEN];
    let filled = read_prefix(reader, &mut magic)?;
    reader.seek(io::SeekFrom::Start(start))?;
    Ok((sniff(&magic[..filled])?, magic))
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_prefix<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
