//! Release installation: find, select, download, extract.

use std::path::PathBuf;

use log::{info, warn};

use crate::cancel::CancelToken;
use crate::config::{parse_repo_url, Config, Repo};
use crate::download::{Downloader, HttpDownloader};
use crate::error::{ErrorKind, InstallError};
use crate::extractor::{ExtractionRequest, Extractor, Report};
use crate::filter::AssetFilter;
use crate::release::{Asset, GitHubClient, ReleaseFinder};

/// Outcome of one repository installation.
#[derive(Debug, Clone)]
pub struct Installed {
    pub repository: String,
    pub tag: String,
    pub asset: Asset,
    pub destination: PathBuf,
    pub report: Report,
}

/// Installs the latest stable release of each configured repository.
pub struct Installer {
    finder: Box<dyn ReleaseFinder>,
    downloader: Box<dyn Downloader>,
    extractor: Extractor,
    max_attempts: u32,
}

impl Installer {
    pub fn new<F, D>(finder: F, downloader: D, extractor: Extractor) -> Self
    where
        F: ReleaseFinder + 'static,
        D: Downloader + 'static,
    {
        Self {
            finder: Box::new(finder),
            downloader: Box::new(downloader),
            extractor,
            max_attempts: 1,
        }
    }

    /// GitHub API, HTTP downloads and a default extractor.
    pub fn github() -> Result<Self, InstallError> {
        Ok(Self::new(
            GitHubClient::new()?,
            HttpDownloader::new()?,
            Extractor::default(),
        ))
    }

    /// Download-and-extract attempts per repository. A transient failure
    /// (network, truncated or corrupt download) starts over from the
    /// download; anything else fails immediately.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Install every repository in order, stopping at the first failure.
    pub fn install(
        &self,
        config: &Config,
        filter: &AssetFilter,
        cancel: &CancelToken,
    ) -> Result<Vec<Installed>, InstallError> {
        config
            .github
            .iter()
            .map(|repo| self.install_repo(config, repo, filter, cancel))
            .collect()
    }

    pub fn install_repo(
        &self,
        config: &Config,
        repo: &Repo,
        filter: &AssetFilter,
        cancel: &CancelToken,
    ) -> Result<Installed, InstallError> {
        info!("installing {} to {}", repo.url, repo.output_dir.display());
        check(cancel)?;

        let (owner, name) = parse_repo_url(&repo.url)?;
        info!("finding latest stable release for {}/{}", owner, name);
        let release = self.finder.latest_stable(&owner, &name)?;
        info!("found release {}", release.tag_name);

        let asset = filter.select(&release.assets).map_err(|e| match e {
            InstallError::AssetNotFound { detail, .. } => InstallError::AssetNotFound {
                release: Some(release.tag_name.clone()),
                detail,
            },
            other => other,
        })?;
        info!(
            "selected asset {} ({:.2} MB)",
            asset.name,
            asset.size as f64 / (1024.0 * 1024.0)
        );

        let url = config.download_url(&asset.browser_download_url);
        if url != asset.browser_download_url {
            info!("using mirror: {}", url);
        }

        let mut attempt = 1;
        let report = loop {
            check(cancel)?;
            match self.fetch_and_extract(&url, asset, repo, cancel) {
                Ok(report) => break report,
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, repo.url, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "installed {} {} to {}",
            repo.url,
            release.tag_name,
            repo.output_dir.display()
        );
        Ok(Installed {
            repository: repo.url.clone(),
            tag: release.tag_name.clone(),
            asset: asset.clone(),
            destination: repo.output_dir.clone(),
            report,
        })
    }

    fn fetch_and_extract(
        &self,
        url: &str,
        asset: &Asset,
        repo: &Repo,
        cancel: &CancelToken,
    ) -> Result<Report, InstallError> {
        info!("downloading {}", url);
        let download = self.downloader.download(url)?;

        let size_hint = Some(asset.size)
            .filter(|size| *size > 0)
            .or(download.content_length);
        let request = ExtractionRequest::new(download.reader, &repo.output_dir)
            .cancel(cancel.clone())
            .size_hint(size_hint);

        info!("extracting to {}", repo.output_dir.display());
        self.extractor.run(request).map_err(|e| match e.kind() {
            ErrorKind::Cancelled => InstallError::Cancelled,
            _ => InstallError::Extract {
                repository: repo.url.clone(),
                source: e,
            },
        })
    }
}

fn check(cancel: &CancelToken) -> Result<(), InstallError> {
    if cancel.is_cancelled() {
        return Err(InstallError::Cancelled);
    }
    Ok(())
}
