//! Async API (requires the `async` feature).
//!
//! Extraction and installation are blocking, so both run on tokio's blocking
//! thread pool via [`tokio::task::spawn_blocking`].
//!
//! # Example
//!
//! ```no_run
//! use ghinstall::async_extractor::AsyncExtractor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ghinstall::Error> {
//!     let report = AsyncExtractor::default()
//!         .extract_file("tool.tar.gz", "/opt/tool")
//!         .await?;
//!     println!("Extracted {} files", report.files_extracted);
//!     Ok(())
//! }
//! ```
//!
//! The HTTP clients behind [`Installer::github`] must not be created or
//! dropped on an async worker thread. Build the installer before entering
//! the runtime, or inside `spawn_blocking`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::{spawn_blocking, JoinError};

use crate::{
    AssetFilter, CancelToken, Config, Error, ExtractionRequest, Extractor, InstallError, Installed,
    Installer, Report,
};

/// Async wrapper around an [`Extractor`].
#[derive(Debug, Clone, Default)]
pub struct AsyncExtractor {
    inner: Extractor,
    cancel: CancelToken,
}

impl AsyncExtractor {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            inner: extractor,
            cancel: CancelToken::default(),
        }
    }

    /// Token checked before each entry of every extraction started from here.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn extract_file<P, Q>(&self, archive: P, destination: Q) -> Result<Report, Error>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let extractor = self.inner.clone();
        let cancel = self.cancel.clone();
        let archive = archive.as_ref().to_path_buf();
        let destination = destination.as_ref().to_path_buf();

        spawn_blocking(move || -> Result<Report, Error> {
            let file = std::fs::File::open(&archive)?;
            let request = ExtractionRequest::new(io::BufReader::new(file), destination).cancel(cancel);
            extractor.run_seekable(request)
        })
        .await
        .map_err(join_error)?
    }

    pub async fn extract_bytes<Q: AsRef<Path>>(
        &self,
        data: Vec<u8>,
        destination: Q,
    ) -> Result<Report, Error> {
        let extractor = self.inner.clone();
        let cancel = self.cancel.clone();
        let destination: PathBuf = destination.as_ref().to_path_buf();

        spawn_blocking(move || {
            let request = ExtractionRequest::new(io::Cursor::new(data), destination).cancel(cancel);
            extractor.run_seekable(request)
        })
        .await
        .map_err(join_error)?
    }
}

/// Install every configured repository concurrently, one blocking task each.
///
/// Results come back in configuration order. Destinations must not overlap.
pub async fn install_all(
    installer: Arc<Installer>,
    config: Config,
    filter: AssetFilter,
    cancel: CancelToken,
) -> Vec<Result<Installed, InstallError>> {
    let config = Arc::new(config);
    let tasks: Vec<_> = (0..config.github.len())
        .map(|index| {
            let installer = Arc::clone(&installer);
            let config = Arc::clone(&config);
            let filter = filter.clone();
            let cancel = cancel.clone();
            spawn_blocking(move || {
                installer.install_repo(&config, &config.github[index], &filter, &cancel)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (task, repo) in tasks.into_iter().zip(&config.github) {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(InstallError::Extract {
                repository: repo.url.clone(),
                source: join_error(e),
            }),
        };
        results.push(result);
    }
    results
}

fn join_error(e: JoinError) -> Error {
    Error::from(io::Error::other(e))
}
