//! Core domain types for the pomwatch pipeline.

// ---------------------------------------------------------------------------
// RepoSlug
// ---------------------------------------------------------------------------

/// A normalized repository identity: exactly one owner and one name segment.
///
/// Produced by resolving whatever identifier the catalog carries (full HTTPS
/// URL, `owner/name` pair, or a bare name) into canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    /// Owning user or organization.
    pub owner: String,
    /// Repository name, without any `.git` suffix.
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// CatalogEntry
// ---------------------------------------------------------------------------

/// One (repository, ref) pair yielded by a catalog scan.
///
/// A single catalog descriptor can yield several entries: one per environment
/// that pins its own ref, plus one for the top-level ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Repository identifier exactly as the catalog records it.
    pub url: String,
    /// Git ref to read the descriptor at; `None` means the default branch.
    pub git_ref: Option<String>,
}

impl CatalogEntry {
    pub fn new(url: impl Into<String>, git_ref: Option<String>) -> Self {
        Self {
            url: url.into(),
            git_ref,
        }
    }
}
