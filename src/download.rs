//! Asset download.

use std::io::Read;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::error::InstallError;
use crate::release::USER_AGENT;

/// Overall timeout for one download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// An open response body.
pub struct Download {
    pub reader: Box<dyn Read + Send>,
    /// `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
}

/// Fetches a URL as a byte stream.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &str) -> Result<Download, InstallError>;
}

/// Blocking HTTP downloader.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, InstallError> {
        Self::with_timeout(DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(InstallError::Client)?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str) -> Result<Download, InstallError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| InstallError::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Download {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}
