//! Backend-tagged blob addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BlobStoreError;

/// Address of a stored ciphertext, tagged with the backend that holds it.
///
/// The canonical string form (`primary:<key>` / `legacy:<uuid>`) is what
/// gets persisted alongside capsule metadata, so `Display` and `FromStr`
/// must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlobLocator {
    /// Object key in the primary store.
    Primary { key: String },
    /// Row id in the legacy chunk store.
    Legacy { id: Uuid },
}

impl BlobLocator {
    pub fn primary(key: impl Into<String>) -> Self {
        Self::Primary { key: key.into() }
    }

    pub fn legacy(id: Uuid) -> Self {
        Self::Legacy { id }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary { key } => write!(f, "primary:{}", key),
            Self::Legacy { id } => write!(f, "legacy:{}", id),
        }
    }
}

impl FromStr for BlobLocator {
    type Err = BlobStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("primary", key)) if !key.is_empty() => Ok(Self::Primary {
                key: key.to_string(),
            }),
            Some(("legacy", id)) => Uuid::parse_str(id)
                .map(|id| Self::Legacy { id })
                .map_err(|_| BlobStoreError::InvalidLocator(s.to_string())),
            _ => Err(BlobStoreError::InvalidLocator(s.to_string())),
        }
    }
}

impl TryFrom<String> for BlobLocator {
    type Error = BlobStoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BlobLocator> for String {
    fn from(locator: BlobLocator) -> Self {
        locator.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_round_trip() {
        let locator = BlobLocator::primary("capsules/abc/def");
        let s = locator.to_string();
        assert_eq!(s, "primary:capsules/abc/def");
        assert_eq!(s.parse::<BlobLocator>().unwrap(), locator);
    }

    #[test]
    fn test_legacy_round_trip() {
        let id = Uuid::new_v4();
        let locator = BlobLocator::legacy(id);
        let s = locator.to_string();
        assert_eq!(s, format!("legacy:{}", id));
        assert_eq!(s.parse::<BlobLocator>().unwrap(), locator);
    }

    #[test]
    fn test_key_may_contain_colons() {
        // Only the first colon separates the tag from the key.
        let locator: BlobLocator = "primary:a:b:c".parse().unwrap();
        assert_eq!(locator, BlobLocator::primary("a:b:c"));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!("".parse::<BlobLocator>().is_err());
        assert!("primary:".parse::<BlobLocator>().is_err());
        assert!("legacy:not-a-uuid".parse::<BlobLocator>().is_err());
        assert!("gridfs:abc".parse::<BlobLocator>().is_err());
        assert!("no-separator".parse::<BlobLocator>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let locator = BlobLocator::legacy(Uuid::nil());
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(
            json,
            "\"legacy:00000000-0000-0000-0000-000000000000\""
        );
        let back: BlobLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
    }
}
