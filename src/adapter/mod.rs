//! Archive format adapters.
//!
//! Adapters normalize the supported container formats into one entry
//! sequence for the extraction engine.

mod tar_adapter;
mod zip_adapter;

use std::io::Read;

pub use tar_adapter::TarGzAdapter;
pub use zip_adapter::{Spool, ZipAdapter};

use crate::entry::ArchiveEntry;
use crate::error::Error;
use crate::format::ArchiveFormat;

/// Per-entry callback. Return `Ok(true)` to continue, `Ok(false)` to stop.
pub type Visit<'v> = dyn FnMut(ArchiveEntry, &mut dyn Read) -> Result<bool, Error> + 'v;

/// A decoder yielding entries with their content, in archive order.
///
/// Single pass: once `for_each` returns, the source is spent.
pub trait EntrySource {
    fn format(&self) -> ArchiveFormat;

    /// Feed every entry to `visit`. The reader is only meaningful for
    /// regular files and must not be used after the callback returns.
    fn for_each(&mut self, visit: &mut Visit<'_>) -> Result<(), Error>;
}
