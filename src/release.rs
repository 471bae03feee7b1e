//! GitHub release lookup and version ordering.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::InstallError;

/// Default GitHub REST API base.
pub const GITHUB_API: &str = "https://api.github.com";

/// Timeout for release metadata requests.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = concat!("ghinstall/", env!("CARGO_PKG_VERSION"));

/// Downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub content_type: String,
    /// Size in bytes as reported by GitHub.
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease
    }
}

/// Source of release metadata.
pub trait ReleaseFinder: Send + Sync {
    /// Latest release that is neither a draft nor a prerelease.
    fn latest_stable(&self, owner: &str, repo: &str) -> Result<Release, InstallError>;
}

/// Blocking GitHub REST client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Client against api.github.com, authenticated if `GITHUB_TOKEN` is set.
    pub fn new() -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(API_TIMEOUT)
            .build()
            .map_err(InstallError::Client)?;

        Ok(Self {
            client,
            base_url: GITHUB_API.to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// Point at another API root, e.g. GitHub Enterprise or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// All releases on the first page, newest first as GitHub returns them.
    pub fn releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>, InstallError> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page=100",
            self.base_url, owner, repo
        );
        debug!("fetching {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| InstallError::http(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Status {
                url,
                status: status.as_u16(),
            });
        }
        response.json().map_err(|e| InstallError::http(&url, e))
    }
}

impl ReleaseFinder for GitHubClient {
    fn latest_stable(&self, owner: &str, repo: &str) -> Result<Release, InstallError> {
        let repository = format!("{}/{}", owner, repo);
        let releases = self.releases(owner, repo)?;
        if releases.is_empty() {
            return Err(InstallError::NoReleases { repository });
        }
        select_latest(releases).ok_or(InstallError::NoStableRelease { repository })
    }
}

/// Newest stable release by [`compare_releases`].
pub fn select_latest(releases: Vec<Release>) -> Option<Release> {
    releases
        .into_iter()
        .filter(Release::is_stable)
        .max_by(compare_releases)
}

/// Version order between two releases.
///
/// Two semver tags compare as versions. A semver tag always outranks one
/// that isn't. Otherwise, and on ties, the later publish date wins.
pub fn compare_releases(a: &Release, b: &Release) -> Ordering {
    let by_date = || a.published_at.cmp(&b.published_at);
    match (parse_tag(&a.tag_name), parse_tag(&b.tag_name)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(by_date),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => by_date(),
    }
}

/// Parse a release tag as a version.
///
/// A leading `v` is optional, and `MAJOR` or `MAJOR.MINOR` stand for
/// `MAJOR.0.0` and `MAJOR.MINOR.0`.
pub fn parse_tag(tag: &str) -> Option<Version> {
    let raw = tag.strip_prefix(['v', 'V']).unwrap_or(tag);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let mut parts = raw.split('.');
    let major = parse_numeric(parts.next()?)?;
    let minor = match parts.next() {
        Some(part) => parse_numeric(part)?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, 0))
}

/// Decimal without sign or leading zeros.
fn parse_numeric(part: &str) -> Option<u64> {
    let digits = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !digits || (part.len() > 1 && part.starts_with('0')) {
        return None;
    }
    part.parse().ok()
}
