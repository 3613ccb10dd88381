//! Item module - the normalized key every other entity hangs off

use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolver prefixes stripped from raw identifiers, longest first so that
/// `https://dx.doi.org/` wins over `doi.org/`.
const RESOLVER_PREFIXES: &[&str] = &[
    "https://www.doi.org/",
    "http://www.doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "https://doi.org/",
    "http://doi.org/",
    "dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Normalized item identifier
///
/// Distinct external spellings of the same identifier map to one key:
/// surrounding whitespace and one resolver prefix are stripped and the
/// remainder is lowercased.
///
/// # Examples
///
/// ```
/// use quarry_domain::ItemId;
///
/// let a = ItemId::parse("https://doi.org/10.1234/ABC.5").unwrap();
/// let b = ItemId::parse("doi:10.1234/abc.5").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "10.1234/abc.5");
/// assert_eq!(a.file_stem(), "10.1234_abc.5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Normalize a raw identifier into a key
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyId`] if nothing is left after normalization.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let lower = raw.trim().to_lowercase();

        // Repeated so that normalizing an already-normalized key is a no-op
        let mut stripped = lower.as_str();
        while let Some(rest) = RESOLVER_PREFIXES
            .iter()
            .find_map(|prefix| stripped.strip_prefix(prefix))
        {
            stripped = rest.trim();
        }

        if stripped.is_empty() {
            return Err(DomainError::EmptyId(raw.to_string()));
        }

        Ok(Self(stripped.to_string()))
    }

    /// Get the normalized key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key has the `10.<registrant>/<suffix>` shape
    pub fn is_doi(&self) -> bool {
        match self.0.split_once('/') {
            Some((registrant, suffix)) => {
                registrant.starts_with("10.") && registrant.len() > 3 && !suffix.is_empty()
            }
            None => false,
        }
    }

    /// Filesystem-safe stem used for artifact names
    ///
    /// `/` becomes `_`; anything outside `[a-z0-9._-]` is replaced with `_`.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect()
    }

    /// Best-effort inverse of [`ItemId::file_stem`]
    ///
    /// Stems are lossy, so callers holding a set of known ids should match
    /// against their stems first and only fall back to this.
    pub fn from_file_stem(stem: &str) -> Result<Self, DomainError> {
        Self::parse(&stem.replace('_', "/"))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}
