//! Extraction engine.
//!
//! Composes the sniffer, a format adapter, the path guard and the
//! materializer into one call that either extracts the whole archive or
//! returns the first error.

use std::fmt;
use std::fs;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::adapter::{EntrySource, Spool, TarGzAdapter, ZipAdapter};
use crate::cancel::CancelToken;
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::Error;
use crate::format::{self, ArchiveFormat};
use crate::guard::{PathGuard, PathVerdict, RejectReason};
use crate::materialize::{Materializer, Outcome};

/// Default size of the copy buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default in-memory ceiling for [`ZipBuffering::Auto`].
pub const DEFAULT_ZIP_MEMORY_LIMIT: u64 = 32 * 1024 * 1024;

/// What to do when something already exists at an entry's path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace existing files and symlinks. A symlink is removed, never
    /// followed. Extracting the same archive twice gives the same tree.
    #[default]
    Overwrite,
    /// Keep what is there and count the entry as skipped.
    Skip,
    /// Fail with [`Error::AlreadyExists`].
    Error,
}

/// What to do with symlink entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Create links whose target stays inside the destination; reject the
    /// archive otherwise.
    #[default]
    Create,
    /// Ignore symlinks.
    Skip,
    /// Reject any archive containing a symlink.
    Error,
}

/// How a zip source is made seekable.
///
/// tar.gz never needs this; it always streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipBuffering {
    /// Hold the whole archive in memory.
    Memory,
    /// Spool to an anonymous temporary file.
    Disk,
    /// Memory up to `memory_limit` bytes, disk beyond that.
    Auto { memory_limit: u64 },
}

impl Default for ZipBuffering {
    fn default() -> Self {
        Self::Auto {
            memory_limit: DEFAULT_ZIP_MEMORY_LIMIT,
        }
    }
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    DestinationPrepared,
    FormatDetected,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::DestinationPrepared => "destination prepared",
            Self::FormatDetected => "format detected",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub format: ArchiveFormat,
    pub files_extracted: usize,
    pub dirs_created: usize,
    pub symlinks_created: usize,
    pub bytes_written: u64,
    /// Symlinks skipped by policy, existing files kept, and ignored entry kinds.
    pub entries_skipped: usize,
}

impl Report {
    fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            files_extracted: 0,
            dirs_created: 0,
            symlinks_created: 0,
            bytes_written: 0,
            entries_skipped: 0,
        }
    }
}

/// Passed to the progress callback after each written entry.
#[derive(Debug)]
pub struct Progress<'a> {
    /// Zero-based position of the entry in the archive.
    pub entry_index: usize,
    pub entry_name: &'a str,
    /// Total bytes written so far, this entry included.
    pub bytes_written: u64,
}

type ProgressFn = Arc<dyn Fn(&Progress<'_>) + Send + Sync>;

/// One extraction: a byte source and where to put it.
pub struct ExtractionRequest<R> {
    pub source: R,
    pub destination: PathBuf,
    pub cancel: CancelToken,
    /// Expected archive size, used to choose zip buffering.
    pub size_hint: Option<u64>,
}

impl<R> ExtractionRequest<R> {
    pub fn new<P: AsRef<Path>>(source: R, destination: P) -> Self {
        Self {
            source,
            destination: destination.as_ref().to_path_buf(),
            cancel: CancelToken::default(),
            size_hint: None,
        }
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn size_hint(mut self, size: Option<u64>) -> Self {
        self.size_hint = size;
        self
    }
}

/// Safe extraction of tar.gz and zip archives.
///
/// Every entry name and symlink target is checked against the destination
/// before anything is written. A path that escapes fails the whole
/// extraction with [`Error::PathRejected`]. Entries already written stay on
/// disk; extract into a staging directory and move it into place if you need
/// all-or-nothing.
///
/// # Example
///
/// ```no_run
/// use ghinstall::{Extractor, OverwritePolicy};
///
/// let report = Extractor::new()
///     .overwrite(OverwritePolicy::Skip)
///     .extract_file("tool.tar.gz", "/opt/tool")?;
/// println!("{} files", report.files_extracted);
/// # Ok::<(), ghinstall::Error>(())
/// ```
#[derive(Clone)]
pub struct Extractor {
    buffer_size: usize,
    zip_buffering: ZipBuffering,
    overwrite: OverwritePolicy,
    symlinks: SymlinkPolicy,
    progress: Option<ProgressFn>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            zip_buffering: ZipBuffering::default(),
            overwrite: OverwritePolicy::default(),
            symlinks: SymlinkPolicy::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("buffer_size", &self.buffer_size)
            .field("zip_buffering", &self.zip_buffering)
            .field("overwrite", &self.overwrite)
            .field("symlinks", &self.symlinks)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the intermediate copy buffer. Tuning only.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn zip_buffering(mut self, buffering: ZipBuffering) -> Self {
        self.zip_buffering = buffering;
        self
    }

    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    pub fn symlinks(mut self, policy: SymlinkPolicy) -> Self {
        self.symlinks = policy;
        self
    }

    /// Called after every entry that was written to disk.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress<'_>) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(f));
        self
    }

    /// Extract from a forward-only source.
    ///
    /// The format prefix is peeked and replayed. A zip source is spooled
    /// according to [`ZipBuffering`] first.
    pub fn run<R: Read>(&self, request: ExtractionRequest<R>) -> Result<Report, Error> {
        let mut stage = Stage::Init;
        let result = self.run_stream(request, &mut stage);
        finish(result, stage)
    }

    /// Extract from a seekable source. A zip is read in place.
    pub fn run_seekable<R: Read + Seek>(
        &self,
        request: ExtractionRequest<R>,
    ) -> Result<Report, Error> {
        let mut stage = Stage::Init;
        let result = self.run_in_place(request, &mut stage);
        finish(result, stage)
    }

    pub fn extract<R: Read, P: AsRef<Path>>(&self, reader: R, destination: P) -> Result<Report, Error> {
        self.run(ExtractionRequest::new(reader, destination))
    }

    pub fn extract_seekable<R: Read + Seek, P: AsRef<Path>>(
        &self,
        reader: R,
        destination: P,
    ) -> Result<Report, Error> {
        self.run_seekable(ExtractionRequest::new(reader, destination))
    }

    /// Extract an archive file, whatever its extension.
    pub fn extract_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        archive: P,
        destination: Q,
    ) -> Result<Report, Error> {
        let file = fs::File::open(archive)?;
        self.extract_seekable(BufReader::new(file), destination)
    }

    fn run_stream<R: Read>(
        &self,
        request: ExtractionRequest<R>,
        stage: &mut Stage,
    ) -> Result<Report, Error> {
        let ExtractionRequest {
            source,
            destination,
            cancel,
            size_hint,
        } = request;

        let guard = prepare_destination(&destination)?;
        *stage = Stage::DestinationPrepared;

        let peeked = format::peek(source)?;
        match peeked.format {
            ArchiveFormat::TarGz => {
                *stage = Stage::FormatDetected;
                let mut adapter = TarGzAdapter::new(peeked.reader);
                self.drive(&mut adapter, guard, &cancel, stage)
            }
            ArchiveFormat::Zip => {
                *stage = Stage::FormatDetected;
                let spool = Spool::fill(peeked.reader, self.zip_buffering, size_hint)?;
                let mut adapter = ZipAdapter::new(spool)?;
                self.drive(&mut adapter, guard, &cancel, stage)
            }
            ArchiveFormat::Unknown => Err(Error::UnsupportedFormat {
                magic: peeked.magic.to_vec(),
            }),
        }
    }

    fn run_in_place<R: Read + Seek>(
        &self,
        request: ExtractionRequest<R>,
        stage: &mut Stage,
    ) -> Result<Report, Error> {
        let ExtractionRequest {
            mut source,
            destination,
            cancel,
            ..
        } = request;

        let guard = prepare_destination(&destination)?;
        *stage = Stage::DestinationPrepared;

        let (detected, magic) = format::detect_seekable(&mut source)?;
        match detected {
            ArchiveFormat::TarGz => {
                *stage = Stage::FormatDetected;
                let mut adapter = TarGzAdapter::new(source);
                self.drive(&mut adapter, guard, &cancel, stage)
            }
            ArchiveFormat::Zip => {
                *stage = Stage::FormatDetected;
                let mut adapter = ZipAdapter::new(source)?;
                self.drive(&mut adapter, guard, &cancel, stage)
            }
            ArchiveFormat::Unknown => Err(Error::UnsupportedFormat {
                magic: magic.to_vec(),
            }),
        }
    }

    fn drive(
        &self,
        adapter: &mut dyn EntrySource,
        guard: PathGuard,
        cancel: &CancelToken,
        stage: &mut Stage,
    ) -> Result<Report, Error> {
        debug!(
            "extracting {} archive into {}",
            adapter.format(),
            guard.root().display()
        );
        *stage = Stage::Streaming;

        let mut session = Session {
            extractor: self,
            materializer: Materializer::new(self.buffer_size, self.overwrite),
            report: Report::new(adapter.format()),
            guard,
            cancel,
            entries_processed: 0,
        };
        adapter.for_each(&mut |entry, content| session.visit(entry, content))?;

        *stage = Stage::Completed;
        Ok(session.report)
    }
}

/// Per-request state while entries stream through.
struct Session<'a> {
    extractor: &'a Extractor,
    guard: PathGuard,
    materializer: Materializer,
    cancel: &'a CancelToken,
    report: Report,
    entries_processed: usize,
}

impl Session<'_> {
    fn visit(&mut self, entry: ArchiveEntry, content: &mut dyn Read) -> Result<bool, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                entries_processed: self.entries_processed,
            });
        }
        let index = self.entries_processed;
        self.entries_processed += 1;

        let verdict = match self.guard.validate(&entry.relative_path) {
            PathVerdict::Reject(reason) if reason.is_root_entry() => {
                debug!("skipping root entry '{}'", entry.relative_path);
                return Ok(true);
            }
            PathVerdict::Reject(reason) => return Err(rejected(&entry, reason)),
            admitted => admitted,
        };

        match &entry.kind {
            EntryKind::Symlink { target } => match self.extractor.symlinks {
                SymlinkPolicy::Create => {
                    if let PathVerdict::Reject(reason) =
                        self.guard.validate_link(&entry.relative_path, target)
                    {
                        return Err(rejected(&entry, reason));
                    }
                }
                SymlinkPolicy::Skip => {
                    debug!("skipping symlink '{}'", entry.relative_path);
                    self.report.entries_skipped += 1;
                    return Ok(true);
                }
                SymlinkPolicy::Error => {
                    let reason = RejectReason::SymlinkNotAllowed {
                        target: target.clone(),
                    };
                    return Err(rejected(&entry, reason));
                }
            },
            EntryKind::Other(kind) => {
                debug!("ignoring {} '{}'", kind, entry.relative_path);
                self.report.entries_skipped += 1;
                return Ok(true);
            }
            EntryKind::Directory | EntryKind::File => {}
        }

        let outcome = self
            .materializer
            .write(&verdict, &entry, content)
            .map_err(|e| e.with_entry(&entry.relative_path))?;

        match outcome {
            Outcome::Directory => self.report.dirs_created += 1,
            Outcome::File { bytes } => {
                self.report.files_extracted += 1;
                self.report.bytes_written += bytes;
            }
            Outcome::Symlink => self.report.symlinks_created += 1,
            Outcome::Skipped => {
                self.report.entries_skipped += 1;
                return Ok(true);
            }
        }
        debug!("extracted '{}'", entry.relative_path);

        if let Some(progress) = &self.extractor.progress {
            progress(&Progress {
                entry_index: index,
                entry_name: &entry.relative_path,
                bytes_written: self.report.bytes_written,
            });
        }
        Ok(true)
    }
}

fn rejected(entry: &ArchiveEntry, reason: RejectReason) -> Error {
    Error::PathRejected {
        entry: entry.relative_path.clone(),
        reason,
    }
}

/// Create the destination if missing. An existing non-directory is an error.
fn prepare_destination(destination: &Path) -> Result<PathGuard, Error> {
    match fs::metadata(destination) {
        Ok(meta) if !meta.is_dir() => {
            return Err(Error::DestinationNotDirectory {
                path: destination.to_path_buf(),
            })
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(destination)?,
        Err(e) => return Err(e.into()),
    }
    PathGuard::new(destination)
}

fn finish(result: Result<Report, Error>, stage: Stage) -> Result<Report, Error> {
    match &result {
        Ok(report) => debug!(
            "extraction completed: {} files, {} dirs, {} symlinks, {} bytes",
            report.files_extracted, report.dirs_created, report.symlinks_created, report.bytes_written
        ),
        Err(e) => warn!("extraction {} -> {}: {}", stage, Stage::Failed, e),
    }
    result
}
