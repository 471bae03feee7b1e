use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::guard::RejectReason;

/// Errors that can occur during archive extraction.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in minor versions without breaking existing code. Match on
/// [`Error::kind`] when only the broad class matters.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Fewer bytes than the magic prefix were available.
    TruncatedInput { available: usize },

    /// Magic prefix matches neither gzip nor zip.
    UnsupportedFormat { magic: Vec<u8> },

    /// Structural corruption found while decoding the container.
    MalformedArchive { entry: Option<String>, detail: String },

    /// Entry path or link target failed the path guard. The archive is hostile.
    PathRejected { entry: String, reason: RejectReason },

    /// File already exists and overwrite policy is `Error`.
    AlreadyExists { entry: String },

    /// Destination exists but is not a directory.
    DestinationNotDirectory { path: PathBuf },

    /// Cancellation token tripped at an entry boundary.
    Cancelled { entries_processed: usize },

    /// Filesystem or stream I/O error.
    Io {
        entry: Option<String>,
        source: io::Error,
    },

    /// Resolved-path jail could not be set up for the destination.
    Jail(path_jail::JailError),
}

/// Broad error classes. Every [`Error`] maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TruncatedInput,
    UnsupportedFormat,
    MalformedArchive,
    PathRejected,
    Io,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::MalformedArchive { .. } => ErrorKind::MalformedArchive,
            Self::PathRejected { .. } => ErrorKind::PathRejected,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::AlreadyExists { .. }
            | Self::DestinationNotDirectory { .. }
            | Self::Io { .. }
            | Self::Jail(_) => ErrorKind::Io,
        }
    }

    /// Archive-relative name of the entry this error belongs to, if any.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::MalformedArchive { entry, .. } | Self::Io { entry, .. } => entry.as_deref(),
            Self::PathRejected { entry, .. } | Self::AlreadyExists { entry } => Some(entry),
            _ => None,
        }
    }

    /// Attach an entry name to errors that don't carry one yet.
    pub fn with_entry(self, name: &str) -> Self {
        match self {
            Self::MalformedArchive {
                entry: None,
                detail,
            } => Self::MalformedArchive {
                entry: Some(name.to_string()),
                detail,
            },
            Self::Io {
                entry: None,
                source,
            } => Self::Io {
                entry: Some(name.to_string()),
                source,
            },
            other => other,
        }
    }

    /// Whether re-downloading and extracting again could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::MalformedArchive)
            && !matches!(
                self,
                Self::AlreadyExists { .. } | Self::DestinationNotDirectory { .. }
            )
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedArchive {
            entry: None,
            detail: detail.into(),
        }
    }

    /// Classify a read error from decoder output.
    ///
    /// Corrupt or short compressed data surfaces as `InvalidData`,
    /// `InvalidInput` or `UnexpectedEof`; anything else came from the source.
    pub(crate) fn from_read(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof => Self::malformed(e.to_string()),
            _ => Self::from(e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedInput { available } => {
                write!(
                    f,
                    "input too short to detect format ({} of {} bytes)",
                    available,
                    crate::format::MAGIC_LEN
                )
            }
            Self::UnsupportedFormat { magic } => {
                write!(f, "unsupported archive format (magic: ")?;
                for byte in magic {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ")")
            }
            Self::MalformedArchive { entry, detail } => match entry {
                Some(entry) => write!(f, "malformed archive at '{}': {}", entry, detail),
                None => write!(f, "malformed archive: {}", detail),
            },
            Self::PathRejected { entry, reason } => {
                write!(f, "entry '{}' rejected: {}", entry, reason)
            }
            Self::AlreadyExists { entry } => {
                write!(f, "file '{}' already exists", entry)
            }
            Self::DestinationNotDirectory { path } => {
                write!(f, "destination '{}' is not a directory", path.display())
            }
            Self::Cancelled { entries_processed } => {
                write!(
                    f,
                    "extraction cancelled after {} entries",
                    entries_processed
                )
            }
            Self::Io { entry, source } => match entry {
                Some(entry) => write!(f, "I/O error at '{}': {}", entry, source),
                None => write!(f, "I/O error: {}", source),
            },
            Self::Jail(e) => write!(f, "path validation error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Jail(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io {
            entry: None,
            source: e,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => Self::from_read(e),
            other => Self::malformed(other.to_string()),
        }
    }
}

impl From<path_jail::JailError> for Error {
    fn from(e: path_jail::JailError) -> Self {
        Self::Jail(e)
    }
}

/// Errors from the installer layer: configuration, release lookup,
/// asset selection, download, and the extraction it drives.
#[derive(Debug)]
#[non_exhaustive]
pub enum InstallError {
    /// Configuration file unreadable or invalid.
    Config {
        path: Option<PathBuf>,
        detail: String,
    },

    /// Repository URL is not a GitHub repository URL.
    InvalidRepoUrl { url: String, detail: String },

    /// HTTP client could not be built (TLS backend, invalid header).
    Client(reqwest::Error),

    /// HTTP transport failure (connect, timeout, redirect loop, body decode).
    Http { url: String, source: reqwest::Error },

    /// Server answered with a non-2xx status.
    Status { url: String, status: u16 },

    /// Repository has no releases at all.
    NoReleases { repository: String },

    /// Repository has releases, but all are drafts or prereleases.
    NoStableRelease { repository: String },

    /// Asset filter found nothing suitable.
    AssetNotFound {
        release: Option<String>,
        detail: String,
    },

    /// Extraction of the downloaded asset failed.
    Extract { repository: String, source: Error },

    /// Cancellation token tripped between installer steps.
    Cancelled,
}

impl InstallError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }

    /// Whether the whole download-and-extract step is worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Extract { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { path, detail } => match path {
                Some(path) => write!(f, "invalid config '{}': {}", path.display(), detail),
                None => write!(f, "invalid config: {}", detail),
            },
            Self::InvalidRepoUrl { url, detail } => {
                write!(f, "invalid GitHub repository URL '{}': {}", url, detail)
            }
            Self::Client(e) => write!(f, "failed to build HTTP client: {}", e),
            Self::Http { url, source } => {
                if source.is_redirect() {
                    write!(f, "too many redirects fetching {}", url)
                } else if source.is_timeout() {
                    write!(f, "request to {} timed out", url)
                } else {
                    write!(f, "request to {} failed: {}", url, source)
                }
            }
            Self::Status { url, status } => {
                write!(f, "{} returned HTTP status {}", url, status)
            }
            Self::NoReleases { repository } => {
                write!(f, "no releases found for {}", repository)
            }
            Self::NoStableRelease { repository } => {
                write!(f, "no stable releases found for {}", repository)
            }
            Self::AssetNotFound { release, detail } => match release {
                Some(tag) => write!(f, "no suitable asset in release {}: {}", tag, detail),
                None => write!(f, "no suitable asset: {}", detail),
            },
            Self::Extract { repository, source } => {
                write!(f, "failed to extract {}: {}", repository, source)
            }
            Self::Cancelled => write!(f, "installation cancelled"),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            Self::Http { source, .. } => Some(source),
            Self::Extract { source, .. } => Some(source),
            _ => None,
        }
    }
}
