//! Package references and resolved locators.
//!
//! A user supplies a free-form string such as `madler/zlib@v1.3.1`. Parsing it
//! yields a [`PackageReference`], which may still lack a ref. Once the default
//! branch is known the reference becomes a [`PackageLocator`], which always
//! names exactly one branch, tag or commit.

mod version;

pub use version::TagVersion;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::PackageError;

/// Archive extensions recognised on remote URLs, longest first.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".zip"];

/// A GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    /// Parse `owner/repo`, returning `None` when the grammar does not match.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.split_once('/')?;

        let owner_ok = !owner.is_empty()
            && owner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        let repo_ok = !repo.is_empty()
            && repo != "."
            && repo != ".."
            && repo
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if owner_ok && repo_ok {
            Some(RepoId {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
        } else {
            None
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity(format!("{}/{}", self.owner, self.repo).to_lowercase())
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Exactly one git ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitRef {
    Branch(String),
    Tag(String),
    Commit(String),
}

impl GitRef {
    /// Classify a ref token: a `v<major>.<minor>.<patch>[suffix]` tag, a full
    /// 40 digit commit SHA, or otherwise a branch.
    pub fn classify(token: &str) -> Self {
        if TagVersion::parse(token).is_some() {
            GitRef::Tag(token.to_string())
        } else if token.len() == 40 && token.chars().all(|c| c.is_ascii_hexdigit()) {
            GitRef::Commit(token.to_lowercase())
        } else {
            GitRef::Branch(token.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GitRef::Branch(name) | GitRef::Tag(name) | GitRef::Commit(name) => name,
        }
    }

    /// Tags and commits always point at the same content; branches move.
    pub fn is_immutable(&self) -> bool {
        !matches!(self, GitRef::Branch(_))
    }

    pub fn tag_version(&self) -> Option<TagVersion> {
        match self {
            GitRef::Tag(name) => TagVersion::parse(name),
            _ => None,
        }
    }

    /// Order two refs when both are comparable tags. Anything involving a
    /// branch or a commit has no automatic ordering.
    pub fn compare(&self, other: &GitRef) -> Option<Ordering> {
        Some(self.tag_version()?.cmp(&other.tag_version()?))
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ref-independent key of a package: lowercase `owner/repo`, or the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed package reference, possibly still waiting for its default branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageReference {
    GitHub {
        repo: RepoId,
        git_ref: Option<GitRef>,
    },
    Remote {
        url: String,
    },
}

impl PackageReference {
    /// Parse `owner/repo[@ref]`. Strings that do not match the grammar are
    /// taken as remote URLs and validated when fetched.
    pub fn parse(input: &str) -> Result<Self, PackageError> {
        if input.is_empty() || input.chars().any(char::is_whitespace) {
            return Err(PackageError::InvalidReference(input.to_string()));
        }

        let (base, token) = match input.split_once('@') {
            Some((base, token)) => (base, Some(token)),
            None => (input, None),
        };

        let Some(repo) = RepoId::parse(base) else {
            return Ok(PackageReference::Remote {
                url: input.to_string(),
            });
        };

        let git_ref = match token {
            Some("") => return Err(PackageError::InvalidReference(input.to_string())),
            Some(token) => Some(GitRef::classify(token)),
            None => None,
        };

        Ok(PackageReference::GitHub { repo, git_ref })
    }

    /// Replace any embedded `@ref` with an explicit override.
    pub fn with_ref(self, token: &str) -> Result<Self, PackageError> {
        match self {
            PackageReference::GitHub { repo, .. } if !token.is_empty() => {
                Ok(PackageReference::GitHub {
                    git_ref: Some(GitRef::classify(token)),
                    repo,
                })
            }
            PackageReference::GitHub { repo, .. } => Err(PackageError::InvalidReference(
                format!("{}@{}", repo, token),
            )),
            PackageReference::Remote { url } => Err(PackageError::InvalidReference(format!(
                "{} (a remote URL cannot take a ref override)",
                url
            ))),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        match self {
            PackageReference::GitHub { repo, .. } => repo.identity(),
            PackageReference::Remote { url } => PackageIdentity(url.clone()),
        }
    }

    /// The locator, if no default-branch lookup is needed.
    pub fn locator(&self) -> Option<PackageLocator> {
        match self {
            PackageReference::GitHub {
                repo,
                git_ref: Some(git_ref),
            } => Some(PackageLocator::GitHub {
                repo: repo.clone(),
                git_ref: git_ref.clone(),
            }),
            PackageReference::GitHub { git_ref: None, .. } => None,
            PackageReference::Remote { url } => Some(PackageLocator::Remote { url: url.clone() }),
        }
    }
}

impl FromStr for PackageReference {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageReference::parse(s)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageReference::GitHub {
                repo,
                git_ref: Some(git_ref),
            } => write!(f, "{}@{}", repo, git_ref),
            PackageReference::GitHub { repo, git_ref: None } => write!(f, "{}", repo),
            PackageReference::Remote { url } => f.write_str(url),
        }
    }
}

/// A fully resolved package location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PackageLocator {
    GitHub {
        repo: RepoId,
        #[serde(rename = "ref")]
        git_ref: GitRef,
    },
    Remote {
        url: String,
    },
}

impl PackageLocator {
    pub fn github(repo: RepoId, git_ref: GitRef) -> Self {
        PackageLocator::GitHub { repo, git_ref }
    }

    pub fn identity(&self) -> PackageIdentity {
        match self {
            PackageLocator::GitHub { repo, .. } => repo.identity(),
            PackageLocator::Remote { url } => PackageIdentity(url.clone()),
        }
    }

    pub fn git_ref(&self) -> Option<&GitRef> {
        match self {
            PackageLocator::GitHub { git_ref, .. } => Some(git_ref),
            PackageLocator::Remote { .. } => None,
        }
    }

    /// Same package at a different ref. Remote locators have no ref and are returned as is.
    pub fn with_ref(&self, git_ref: GitRef) -> Self {
        match self {
            PackageLocator::GitHub { repo, .. } => PackageLocator::GitHub {
                repo: repo.clone(),
                git_ref,
            },
            PackageLocator::Remote { .. } => self.clone(),
        }
    }

    /// Whether the content behind this locator can never change.
    pub fn is_immutable(&self) -> bool {
        self.git_ref().is_some_and(GitRef::is_immutable)
    }

    /// Install directory name used when the package has no manifest.
    ///
    /// For GitHub this is the repository name; for a remote URL it is the
    /// last path segment with the archive extension removed.
    pub fn default_package_name(&self) -> String {
        match self {
            PackageLocator::GitHub { repo, .. } => repo.repo.clone(),
            PackageLocator::Remote { url } => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
                ARCHIVE_EXTENSIONS
                    .iter()
                    .find_map(|ext| segment.strip_suffix(ext))
                    .unwrap_or(segment)
                    .to_string()
            }
        }
    }
}

impl fmt::Display for PackageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageLocator::GitHub { repo, git_ref } => write!(f, "{}@{}", repo, git_ref),
            PackageLocator::Remote { url } => f.write_str(url),
        }
    }
}

/// Check that a remote reference is an absolute `http`/`https` URL.
pub fn validate_remote_url(url: &str) -> Result<reqwest::Url, PackageError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| PackageError::InvalidReference(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(PackageError::InvalidReference(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(input: &str) -> (RepoId, Option<GitRef>) {
        match PackageReference::parse(input).unwrap() {
            PackageReference::GitHub { repo, git_ref } => (repo, git_ref),
            other => panic!("expected a GitHub reference, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_without_ref_is_unresolved() {
        let (repo, git_ref) = github("madler/zlib");
        assert_eq!(repo.owner, "madler");
        assert_eq!(repo.repo, "zlib");
        assert_eq!(git_ref, None);
    }

    #[test]
    fn test_parse_semver_tags() {
        for tag in ["v1.2.3", "v0.0.1", "v10.20.30", "v1.2.3-rc.1", "v2.0.0beta"] {
            let (_, git_ref) = github(&format!("owner/repo@{}", tag));
            assert_eq!(git_ref, Some(GitRef::Tag(tag.to_string())), "{}", tag);
        }
    }

    #[test]
    fn test_parse_branches() {
        for branch in ["feature-x", "main", "1.2.3", "v1.2", "release/2024"] {
            let (_, git_ref) = github(&format!("owner/repo@{}", branch));
            assert_eq!(git_ref, Some(GitRef::Branch(branch.to_string())), "{}", branch);
        }
    }

    #[test]
    fn test_parse_full_sha_is_commit() {
        let sha = "0123456789ABCDEF0123456789abcdef01234567";
        let (_, git_ref) = github(&format!("owner/repo@{}", sha));
        assert_eq!(git_ref, Some(GitRef::Commit(sha.to_lowercase())));
    }

    #[test]
    fn test_parse_short_sha_is_branch() {
        let (_, git_ref) = github("owner/repo@0123abc");
        assert_eq!(git_ref, Some(GitRef::Branch("0123abc".to_string())));
    }

    #[test]
    fn test_parse_repo_name_characters() {
        let (repo, _) = github("some-org/my_lib.rs");
        assert_eq!(repo.repo, "my_lib.rs");
    }

    #[test]
    fn test_parse_invalid_inputs() {
        for input in ["", "   ", "owner/repo @v1.0.0", "owner/repo@", "a b"] {
            assert!(
                matches!(
                    PackageReference::parse(input),
                    Err(PackageError::InvalidReference(_))
                ),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_non_grammar_becomes_remote() {
        for input in [
            "https://example.com/pkg.tar.gz",
            "owner/repo/extra",
            "own_er/repo",
            "owner/..",
            "plain",
        ] {
            assert_eq!(
                PackageReference::parse(input).unwrap(),
                PackageReference::Remote {
                    url: input.to_string()
                }
            );
        }
    }

    #[test]
    fn test_with_ref_overrides_embedded_ref() {
        let reference = PackageReference::parse("owner/repo@main")
            .unwrap()
            .with_ref("v2.0.0")
            .unwrap();
        assert_eq!(reference.to_string(), "owner/repo@v2.0.0");
        assert_eq!(
            reference.locator().and_then(|l| l.git_ref().cloned()),
            Some(GitRef::Tag("v2.0.0".to_string()))
        );
    }

    #[test]
    fn test_with_ref_rejects_remote_and_empty() {
        let remote = PackageReference::parse("https://example.com/a.zip").unwrap();
        assert!(matches!(
            remote.with_ref("v1.0.0"),
            Err(PackageError::InvalidReference(_))
        ));

        let github = PackageReference::parse("owner/repo").unwrap();
        assert!(matches!(
            github.with_ref(""),
            Err(PackageError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_identity_is_case_insensitive_and_ref_independent() {
        let a = PackageReference::parse("Owner/Repo@v1.0.0").unwrap();
        let b = PackageReference::parse("owner/repo@main").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().as_str(), "owner/repo");
    }

    #[test]
    fn test_compare_refs() {
        let v2 = GitRef::classify("v2.0.0");
        let v1 = GitRef::classify("v1.5.0");
        assert_eq!(v2.compare(&v1), Some(Ordering::Greater));
        assert_eq!(v1.compare(&v2), Some(Ordering::Less));
        assert_eq!(GitRef::classify("branch-x").compare(&v1), None);
        assert_eq!(GitRef::classify("main").compare(&GitRef::classify("dev")), None);
    }

    #[test]
    fn test_default_package_name() {
        let locator = PackageLocator::github(
            RepoId::parse("madler/zlib").unwrap(),
            GitRef::classify("v1.3.1"),
        );
        assert_eq!(locator.default_package_name(), "zlib");

        for (url, name) in [
            ("https://example.com/dl/lib-1.0.tar.gz", "lib-1.0"),
            ("https://example.com/dl/lib.tgz?token=x", "lib"),
            ("https://example.com/dl/lib.zip", "lib"),
        ] {
            let remote = PackageLocator::Remote {
                url: url.to_string(),
            };
            assert_eq!(remote.default_package_name(), name);
        }
    }

    #[test]
    fn test_is_immutable() {
        let repo = RepoId::parse("o/r").unwrap();
        assert!(PackageLocator::github(repo.clone(), GitRef::classify("v1.0.0")).is_immutable());
        assert!(!PackageLocator::github(repo, GitRef::classify("main")).is_immutable());
        assert!(
            !PackageLocator::Remote {
                url: "https://x/a.zip".into()
            }
            .is_immutable()
        );
    }

    #[test]
    fn test_validate_remote_url() {
        assert!(validate_remote_url("https://example.com/a.tar.gz").is_ok());
        assert!(validate_remote_url("http://example.com/a.zip").is_ok());
        for url in ["ftp://example.com/a.zip", "plain", "owner/repo/extra", "file:///tmp/a.zip"] {
            assert!(matches!(
                validate_remote_url(url),
                Err(PackageError::InvalidReference(_))
            ));
        }
    }

    #[test]
    fn test_locator_serde_shape() {
        let locator = PackageLocator::github(
            RepoId::parse("madler/zlib").unwrap(),
            GitRef::classify("v1.3.1"),
        );
        let json = serde_json::to_value(&locator).unwrap();
        assert_eq!(json["source"], "github");
        assert_eq!(json["ref"]["tag"], "v1.3.1");
        let back: PackageLocator = serde_json::from_value(json).unwrap();
        assert_eq!(back, locator);
    }
}
