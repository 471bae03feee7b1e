//! Install the latest stable GitHub release of a tool, with an extraction
//! engine that never writes outside the destination directory.
//!
//! The extraction half ([`Extractor`]) streams tar.gz and zip archives from
//! any reader. The install half ([`Installer`]) finds a release, picks an
//! asset with an [`AssetFilter`], downloads it and hands the stream to the
//! extractor.

mod adapter;
mod cancel;
mod config;
mod download;
mod entry;
mod error;
mod extractor;
mod filter;
mod format;
mod guard;
mod installer;
mod materialize;
mod release;

#[cfg(feature = "async")]
pub mod async_extractor;

pub use adapter::{EntrySource, Spool, TarGzAdapter, Visit, ZipAdapter};
pub use cancel::CancelToken;
pub use config::{parse_repo_url, Config, Repo};
pub use download::{Download, Downloader, HttpDownloader};
pub use entry::{ArchiveEntry, EntryKind};
pub use error::{Error, ErrorKind, InstallError};
pub use extractor::{
    ExtractionRequest, Extractor, OverwritePolicy, Progress, Report, Stage, SymlinkPolicy,
    ZipBuffering,
};
pub use filter::{AssetFilter, SizeOrder};
pub use format::{detect_seekable, peek, sniff, ArchiveFormat, Peeked, Replay, MAGIC_LEN};
pub use guard::{validate, validate_link, PathGuard, PathVerdict, RejectReason};
pub use installer::{Installed, Installer};
pub use materialize::{Materializer, Outcome};
pub use release::{compare_releases, select_latest, Asset, GitHubClient, Release, ReleaseFinder};

/// Convenience function to extract an archive file with default settings.
pub fn extract_file<P: AsRef<std::path::Path>, Q: AsRef<std::path::Path>>(
    archive: P,
    destination: Q,
) -> Result<Report, Error> {
    Extractor::new().extract_file(archive, destination)
}
