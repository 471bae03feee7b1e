//! Installer configuration.
//!
//! ```yaml
//! github:
//!   - url: https://github.com/owner/repo
//!     output_dir: ./bin
//! mirror_url: https://mirror.example.com
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::InstallError;

const GITHUB_PREFIX: &str = "https://github.com/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: Vec<Repo>,
    /// Prefix prepended to every asset download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_url: Option<String>,
}

/// One repository to install and where its release goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub url: String,
    pub output_dir: PathBuf,
}

impl Repo {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
        }
    }
}

impl Config {
    /// Read, validate and normalize a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, InstallError> {
        let path = path.as_ref();
        let config_error = |detail: String| InstallError::Config {
            path: Some(path.to_path_buf()),
            detail,
        };

        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        Self::from_yaml(&text).map_err(|e| match e {
            InstallError::Config { detail, .. } => config_error(detail),
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, InstallError> {
        let mut config: Self = serde_yaml::from_str(text).map_err(|e| InstallError::Config {
            path: None,
            detail: e.to_string(),
        })?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    /// Configuration for a single repository, validated like a loaded file.
    pub fn single(url: &str, output_dir: impl Into<PathBuf>) -> Result<Self, InstallError> {
        let mut config = Self {
            github: vec![Repo::new(url, output_dir)],
            mirror_url: None,
        };
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    fn validate(&self) -> Result<(), InstallError> {
        let invalid = |detail: String| InstallError::Config { path: None, detail };

        if self.github.is_empty() {
            return Err(invalid("no GitHub repositories configured".into()));
        }
        for (i, repo) in self.github.iter().enumerate() {
            if repo.url.is_empty() {
                return Err(invalid(format!("repository at index {}: url is required", i)));
            }
            if repo.output_dir.as_os_str().is_empty() {
                return Err(invalid(format!(
                    "repository at index {}: output_dir is required",
                    i
                )));
            }
            if !repo.url.starts_with(GITHUB_PREFIX) {
                return Err(invalid(format!(
                    "repository at index {}: '{}' is not a GitHub repository URL",
                    i, repo.url
                )));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        for repo in &mut self.github {
            repo.url = repo.url.trim_end_matches('/').to_string();
            repo.output_dir = clean(&repo.output_dir);
        }
        self.mirror_url = self
            .mirror_url
            .take()
            .map(|m| m.trim_end_matches('/').to_string())
            .filter(|m| !m.is_empty());
    }

    /// URL an asset is actually fetched from.
    pub fn download_url(&self, asset_url: &str) -> String {
        match &self.mirror_url {
            Some(mirror) => format!("{}/{}", mirror, asset_url),
            None => asset_url.to_string(),
        }
    }
}

/// Split `https://github.com/{owner}/{repo}` into owner and repository name.
///
/// Anything after the repository segment is ignored, and a trailing `.git`
/// is dropped.
pub fn parse_repo_url(repo_url: &str) -> Result<(String, String), InstallError> {
    let invalid = |detail: &str| InstallError::InvalidRepoUrl {
        url: repo_url.to_string(),
        detail: detail.to_string(),
    };

    if !repo_url.starts_with(GITHUB_PREFIX) {
        return Err(invalid("must start with https://github.com/"));
    }
    let url = Url::parse(repo_url).map_err(|e| invalid(&e.to_string()))?;
    let mut segments = url
        .path_segments()
        .ok_or_else(|| invalid("missing path"))?
        .filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                return Err(invalid("empty repository name"));
            }
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(invalid("expected https://github.com/{owner}/{repo}")),
    }
}

/// Lexical clean of a configured output directory. Leading `..` of a
/// relative path is kept.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let config = Config::from_yaml(
            r#"
github:
  - url: https://github.com/owner/tool/
    output_dir: ./bin/../opt/tool/
mirror_url: https://mirror.example.com/
"#,
        )
        .unwrap();

        assert_eq!(config.github[0].url, "https://github.com/owner/tool");
        assert_eq!(config.github[0].output_dir, PathBuf::from("opt/tool"));
        assert_eq!(config.mirror_url.as_deref(), Some("https://mirror.example.com"));
    }

    #[test]
    fn rejects_invalid_configs() {
        let cases = [
            "github: []",
            "github:\n  - url: ''\n    output_dir: bin",
            "github:\n  - url: https://github.com/a/b\n    output_dir: ''",
            "github:\n  - url: https://gitlab.com/a/b\n    output_dir: bin",
            "github: not-a-list",
        ];
        for yaml in cases {
            let err = Config::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, InstallError::Config { .. }), "{}", yaml);
        }
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        match Config::load(&path).unwrap_err() {
            InstallError::Config { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn mirror_prefixes_download_url() {
        let asset = "https://github.com/o/r/releases/download/v1/r.tar.gz";

        let mut config = Config::single("https://github.com/o/r", "bin").unwrap();
        assert_eq!(config.download_url(asset), asset);

        config.mirror_url = Some("https://ghproxy.example".into());
        assert_eq!(
            config.download_url(asset),
            format!("https://ghproxy.example/{}", asset)
        );
    }

    #[test]
    fn empty_mirror_is_no_mirror() {
        let config =
            Config::from_yaml("github:\n  - url: https://github.com/a/b\n    output_dir: bin\nmirror_url: ''")
                .unwrap();
        assert_eq!(config.mirror_url, None);
    }

    #[test]
    fn repo_url_parsing() {
        assert_eq!(
            parse_repo_url("https://github.com/owner/repo").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
        assert_eq!(
            parse_repo_url("https://github.com/owner/repo.git").unwrap(),
            ("owner".to_string(), "repo".to_string())
        );
        assert_eq!(
            parse_repo_url("https://github.com/owner/repo/releases").unwrap().1,
            "repo"
        );
        assert!(parse_repo_url("https://github.com/owner").is_err());
        assert!(parse_repo_url("http://github.com/owner/repo").is_err());
    }

    #[test]
    fn clean_keeps_leading_parent() {
        assert_eq!(clean(Path::new("../x/./y/..")), PathBuf::from("../x"));
        assert_eq!(clean(Path::new("./")), PathBuf::from("."));
    }
}
