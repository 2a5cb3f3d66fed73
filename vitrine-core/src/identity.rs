//! Identity types for gallery nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of the gallery a node belongs to.
pub type GalleryId = i64;

/// Integer identifier shared by containers and leaves.
///
/// Containers and leaves are drawn from one id sequence, so an id alone
/// determines the record it refers to. Two values are reserved:
/// [`NodeId::NEW`] marks an instance that has not been persisted yet and
/// [`NodeId::NONE`] is the "no thumbnail assigned" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    /// Sentinel carried by unsaved nodes.
    pub const NEW: NodeId = NodeId(i64::MIN);

    /// "No node" value used for unassigned thumbnails.
    pub const NONE: NodeId = NodeId(0);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// True for the unsaved-node sentinel.
    pub const fn is_new(self) -> bool {
        self.0 == i64::MIN
    }

    /// True for the "no node" value.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True for ids that can exist in the record store.
    pub const fn is_persisted(self) -> bool {
        self.0 > 0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::NEW
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_new() {
            write!(f, "<new>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<i64> for NodeId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Compute the duplicate-detection key of a leaf.
///
/// Synchronization compares these keys to recognise files that were already
/// imported under a different name.
pub fn compute_hash_key(file_name: &str, size_kb: u64, date_added: Timestamp) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_name.to_lowercase().as_bytes());
    hasher.update(size_kb.to_le_bytes());
    hasher.update(date_added.timestamp_millis().to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sentinels_are_distinct() {
        assert!(NodeId::NEW.is_new());
        assert!(!NodeId::NEW.is_none());
        assert!(NodeId::NONE.is_none());
        assert!(!NodeId::NONE.is_persisted());
        assert!(NodeId::new(7).is_persisted());
        assert_eq!(NodeId::default(), NodeId::NEW);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId::new(42).to_string(), "42");
        assert_eq!(NodeId::NEW.to_string(), "<new>");
    }

    #[test]
    fn test_hash_key_ignores_file_name_case() {
        let added = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let a = compute_hash_key("IMG_0001.JPG", 512, added);
        let b = compute_hash_key("img_0001.jpg", 512, added);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let c = compute_hash_key("img_0001.jpg", 513, added);
        assert_ne!(a, c);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_hash_key_is_case_insensitive(name in "[a-zA-Z0-9_.]{1,40}", size in 0u64..1_000_000) {
            let added = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
            prop_assert_eq!(
                compute_hash_key(&name.to_uppercase(), size, added),
                compute_hash_key(&name.to_lowercase(), size, added)
            );
        }

        #[test]
        fn prop_only_positive_ids_are_persisted(raw in any::<i64>()) {
            let id = NodeId::new(raw);
            prop_assert_eq!(id.is_persisted(), raw > 0);
            prop_assert!(!(id.is_new() && id.is_none()));
        }
    }
}
