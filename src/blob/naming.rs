//! Blob names and fragment key derivation.

use std::fmt;

use crate::cache::{validate_key, MAX_KEY_LENGTH};
use crate::error::{BlobError, Result};

/// Joins a blob name and a fragment index.
pub const FRAGMENT_SEPARATOR: char = '-';

/// Longest suffix a fragment key can carry: `-` plus a full u32.
const MAX_SUFFIX_LEN: usize = 1 + 10;

/// Derives the cache key of fragment `index` (1-based) of `base_name`.
pub fn fragment_key(base_name: &str, index: u32) -> String {
    format!("{}{}{}", base_name, FRAGMENT_SEPARATOR, index)
}

/// A validated blob name, also used verbatim as the manifest key.
///
/// Besides the cache's own key rules, a name must leave room for the
/// longest fragment suffix and must not itself end in `-<digits>`. The
/// latter means no blob name can ever equal a fragment key of another blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobName(String);

impl BlobName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| BlobError::InvalidName {
            name: name.clone(),
            reason,
        };

        validate_key(&name).map_err(|e| invalid(e.to_string()))?;

        if name.len() + MAX_SUFFIX_LEN > MAX_KEY_LENGTH {
            return Err(invalid(format!(
                "name must be at most {} bytes to leave room for fragment keys",
                MAX_KEY_LENGTH - MAX_SUFFIX_LEN
            )));
        }

        if looks_like_fragment_key(&name) {
            return Err(invalid(format!(
                "name must not end with '{}' followed by digits",
                FRAGMENT_SEPARATOR
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key of fragment `index` (1-based) of this blob.
    pub fn fragment_key(&self, index: u32) -> String {
        fragment_key(&self.0, index)
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn looks_like_fragment_key(name: &str) -> bool {
    match name.rsplit_once(FRAGMENT_SEPARATOR) {
        Some((_, suffix)) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_key_format() {
        assert_eq!(fragment_key("photo.jpg", 1), "photo.jpg-1");
        assert_eq!(fragment_key("a", 12), "a-12");

        let name = BlobName::new("/tmp/backup.tar").unwrap();
        assert_eq!(name.fragment_key(3), "/tmp/backup.tar-3");
        assert_eq!(name.as_str(), "/tmp/backup.tar");
    }

    #[test]
    fn test_names_with_separator_are_allowed() {
        assert!(BlobName::new("my-file.txt").is_ok());
        assert!(BlobName::new("release-v2").is_ok());
        assert!(BlobName::new("trailing-").is_ok());
    }

    #[test]
    fn test_rejects_names_shaped_like_fragment_keys() {
        assert!(matches!(
            BlobName::new("report-1"),
            Err(BlobError::InvalidName { .. })
        ));
        assert!(BlobName::new("a-b-2024").is_err());
    }

    #[test]
    fn test_rejects_invalid_cache_keys() {
        assert!(BlobName::new("").is_err());
        assert!(BlobName::new("two words").is_err());
    }

    #[test]
    fn test_length_leaves_room_for_suffix() {
        let longest = "n".repeat(MAX_KEY_LENGTH - MAX_SUFFIX_LEN);
        let name = BlobName::new(longest).unwrap();
        assert!(name.fragment_key(u32::MAX).len() <= MAX_KEY_LENGTH);

        assert!(BlobName::new("n".repeat(MAX_KEY_LENGTH - MAX_SUFFIX_LEN + 1)).is_err());
    }
}
