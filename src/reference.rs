use std::fmt;

use crate::error::{Error, Result};

/// Namespace Docker Hub gives to single-segment image names.
pub const OFFICIAL_NAMESPACE: &str = "library";

/// Tag used when a reference carries neither a tag nor a digest.
pub const DEFAULT_TAG: &str = "latest";

/// A resolved `[owner/]repo[:tag][@digest]` image reference.
///
/// `tag` is only absent when the reference was pinned by digest alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub owner: String,
    pub repo: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a raw reference string.
    ///
    /// Supported formats:
    /// - `alpine`
    /// - `nginx:1.25`
    /// - `user/repo:tag`
    /// - `user/repo@sha256:abc123`
    /// - `user/repo:tag@sha256:abc123`
    pub fn resolve(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidReference("empty image reference".to_string()));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(Error::InvalidReference(format!("whitespace in reference: {raw:?}")));
        }

        let (name, digest) = match raw.split_once('@') {
            Some((name, digest)) => {
                if digest.is_empty() {
                    return Err(Error::InvalidReference(format!("empty digest in {raw:?}")));
                }
                (name, Some(digest.to_string()))
            }
            None => (raw, None),
        };

        // A tag colon always comes after the last '/'.
        let after_last_slash = name.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (path, tag) = match name.rfind(':') {
            Some(colon) if colon >= after_last_slash => {
                let tag = &name[colon + 1..];
                if tag.is_empty() {
                    return Err(Error::InvalidReference(format!("empty tag in {raw:?}")));
                }
                (&name[..colon], Some(tag.to_string()))
            }
            _ => (name, None),
        };

        let (owner, repo) = match path.rsplit_once('/') {
            Some((owner, repo)) => (owner.to_string(), repo),
            None => (OFFICIAL_NAMESPACE.to_string(), path),
        };
        if repo.is_empty() || owner.is_empty() {
            return Err(Error::InvalidReference(format!("missing repository name in {raw:?}")));
        }

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };

        Ok(Self {
            owner,
            repo: repo.to_string(),
            tag,
            digest,
        })
    }

    /// `owner/repo`, the repository path a registry addresses.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// The manifest reference a registry request would use: the digest when
    /// pinned, otherwise the tag.
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}
