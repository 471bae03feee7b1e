//! Picking one asset out of a release.

use std::fmt;
use std::sync::Arc;

use crate::error::InstallError;
use crate::release::Asset;

/// Archive suffixes the extractor understands.
pub const ARCHIVE_PATTERNS: [&str; 3] = [".tar.gz", ".zip", ".tgz"];

/// Direction for [`AssetFilter::by_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOrder {
    Largest,
    Smallest,
}

type Predicate = Arc<dyn Fn(&Asset) -> bool + Send + Sync>;

/// Selects exactly one asset from a release's asset list.
///
/// Each filter narrows the list to matching candidates, keeping release
/// order (size filters reorder instead). The first remaining candidate wins.
///
/// ```
/// use ghinstall::{AssetFilter, SizeOrder};
///
/// let filter = AssetFilter::combined(vec![
///     AssetFilter::archives(),
///     AssetFilter::by_os(Some("linux")),
///     AssetFilter::by_arch(Some("amd64")),
///     AssetFilter::by_size(SizeOrder::Smallest),
/// ]);
/// # let _ = filter;
/// ```
#[derive(Clone)]
pub struct AssetFilter {
    rule: Rule,
}

#[derive(Clone)]
enum Rule {
    Patterns(Vec<String>),
    Glob(String),
    Os(String),
    Arch(String),
    Size(SizeOrder),
    Custom(Predicate),
    Combined(Vec<AssetFilter>),
}

impl Default for AssetFilter {
    fn default() -> Self {
        Self::archives()
    }
}

impl AssetFilter {
    /// First asset with a supported archive suffix.
    pub fn archives() -> Self {
        Self::by_name_pattern(ARCHIVE_PATTERNS)
    }

    /// Case-insensitive substring match on the asset name, any pattern.
    pub fn by_name_pattern<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .collect();
        Self {
            rule: Rule::Patterns(patterns),
        }
    }

    /// Glob match on the full asset name, e.g. `tool-*-linux-*.tar.gz`.
    pub fn by_glob(pattern: impl Into<String>) -> Self {
        Self {
            rule: Rule::Glob(pattern.into()),
        }
    }

    /// Operating system, `None` for the running one. Common aliases match
    /// (`darwin`, `macos`, `osx`).
    pub fn by_os(os: Option<&str>) -> Self {
        let os = os.unwrap_or(std::env::consts::OS).to_lowercase();
        Self { rule: Rule::Os(os) }
    }

    /// CPU architecture, `None` for the running one. Common aliases match
    /// (`amd64`, `x86_64`, `x64`).
    pub fn by_arch(arch: Option<&str>) -> Self {
        let arch = arch.unwrap_or(std::env::consts::ARCH).to_lowercase();
        Self {
            rule: Rule::Arch(arch),
        }
    }

    /// Order candidates by declared size.
    pub fn by_size(order: SizeOrder) -> Self {
        Self {
            rule: Rule::Size(order),
        }
    }

    /// Keep assets for which `predicate` returns true.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Asset) -> bool + Send + Sync + 'static,
    {
        Self {
            rule: Rule::Custom(Arc::new(predicate)),
        }
    }

    /// Apply filters in sequence, each to the survivors of the previous one.
    pub fn combined(filters: Vec<AssetFilter>) -> Self {
        Self {
            rule: Rule::Combined(filters),
        }
    }

    /// Assets built for the running OS and architecture.
    pub fn current_platform() -> Self {
        Self::combined(vec![Self::by_os(None), Self::by_arch(None)])
    }

    pub fn select<'a>(&self, assets: &'a [Asset]) -> Result<&'a Asset, InstallError> {
        let candidates = self.narrow(assets.iter().collect())?;
        candidates.first().copied().ok_or_else(|| not_found(format!("no asset matches {}", self)))
    }

    fn narrow<'a>(&self, candidates: Vec<&'a Asset>) -> Result<Vec<&'a Asset>, InstallError> {
        let kept = match &self.rule {
            Rule::Patterns(patterns) => keep(candidates, |name| {
                patterns.iter().any(|p| name.to_lowercase().contains(p.as_str()))
            }),
            Rule::Glob(pattern) => keep(candidates, |name| glob_match::glob_match(pattern, name)),
            Rule::Os(os) => {
                let aliases = os_aliases(os);
                keep(candidates, |name| contains_any(name, &aliases))
            }
            Rule::Arch(arch) => {
                let aliases = arch_aliases(arch);
                keep(candidates, |name| contains_any(name, &aliases))
            }
            Rule::Size(order) => {
                let mut sorted = candidates;
                match order {
                    SizeOrder::Largest => sorted.sort_by(|a, b| b.size.cmp(&a.size)),
                    SizeOrder::Smallest => sorted.sort_by_key(|a| a.size),
                }
                sorted
            }
            Rule::Custom(predicate) => candidates.into_iter().filter(|a| predicate(a)).collect(),
            Rule::Combined(filters) => {
                if filters.is_empty() {
                    return Err(not_found("no filters specified".into()));
                }
                let mut current = candidates;
                for (i, filter) in filters.iter().enumerate() {
                    current = filter.narrow(current)?;
                    if current.is_empty() {
                        return Err(not_found(format!(
                            "no assets left after filter {} ({})",
                            i, filter
                        )));
                    }
                }
                current
            }
        };
        Ok(kept)
    }
}

impl fmt::Display for AssetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Rule::Patterns(patterns) => write!(f, "name patterns {:?}", patterns),
            Rule::Glob(pattern) => write!(f, "glob '{}'", pattern),
            Rule::Os(os) => write!(f, "OS {}", os),
            Rule::Arch(arch) => write!(f, "architecture {}", arch),
            Rule::Size(SizeOrder::Largest) => f.write_str("largest size"),
            Rule::Size(SizeOrder::Smallest) => f.write_str("smallest size"),
            Rule::Custom(_) => f.write_str("custom filter"),
            Rule::Combined(filters) => {
                f.write_str("[")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", filter)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for AssetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetFilter({})", self)
    }
}

fn not_found(detail: String) -> InstallError {
    InstallError::AssetNotFound {
        release: None,
        detail,
    }
}

fn keep<'a>(candidates: Vec<&'a Asset>, matches: impl Fn(&str) -> bool) -> Vec<&'a Asset> {
    candidates.into_iter().filter(|a| matches(&a.name)).collect()
}

fn contains_any(name: &str, aliases: &[&str]) -> bool {
    let name = name.to_lowercase();
    aliases.iter().any(|alias| name.contains(alias))
}

// `win` alone would match `darwin`
fn os_aliases(os: &str) -> Vec<&str> {
    match os {
        "linux" => vec!["linux"],
        "darwin" | "macos" | "osx" => vec!["darwin", "macos", "osx", "apple"],
        "windows" | "win" => vec!["windows", "win64", "win32"],
        "freebsd" => vec!["freebsd"],
        other => vec![other],
    }
}

// bare `x86` and `arm` are substrings of `x86_64` and `arm64`
fn arch_aliases(arch: &str) -> Vec<&str> {
    match arch {
        "x86_64" | "amd64" | "x64" => vec!["amd64", "x86_64", "x64"],
        "x86" | "386" | "i386" | "i686" => vec!["i386", "i686", "386"],
        "aarch64" | "arm64" => vec!["arm64", "aarch64"],
        "arm" | "armv7" => vec!["armv7", "armv6", "armhf"],
        other => vec![other],
    }
}
