//! Error types for Vitrine operations

use crate::{EntityType, NodeId, NodeKind};
use thiserror::Error;

/// Node lifecycle and tree errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The id does not resolve to a record, or resolves to the wrong kind.
    #[error("Node not found: id {id}{}", expected_suffix(.expected))]
    NotFound {
        id: NodeId,
        expected: Option<NodeKind>,
    },

    #[error("Invalid node state: {reason}")]
    InvalidState { reason: String },

    #[error("Unsupported node kind for id {id}: {discriminator}")]
    UnsupportedKind { id: NodeId, discriminator: String },

    /// A child referenced by a cached parent vanished before it could be
    /// hydrated. Recovered by the loader; only surfaces in logs.
    #[error("Child {child_id} of {parent_id} disappeared during load")]
    ConcurrentMutationRace { parent_id: NodeId, child_id: NodeId },
}

fn expected_suffix(expected: &Option<NodeKind>) -> String {
    expected
        .map(|kind| format!(" (expected {})", kind))
        .unwrap_or_default()
}

impl NodeError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        NodeError::InvalidState {
            reason: reason.into(),
        }
    }
}

/// Record store and cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: i64 },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: i64,
        reason: String,
    },

    #[error("Cache backend error: {reason}")]
    CacheBackend { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Physical file operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileError {
    #[error("Move failed from {from} to {to}: {reason}")]
    MoveFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Copy failed from {from} to {to}: {reason}")]
    CopyFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Delete failed for {path}: {reason}")]
    DeleteFailed { path: String, reason: String },

    #[error("Create directory failed for {path}: {reason}")]
    CreateDirectoryFailed { path: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Directory name {name} already used under album {parent_id}")]
    DuplicateDirectoryName { parent_id: NodeId, name: String },

    #[error("Circular reference: cannot move {id} under its own descendant {destination}")]
    CircularReference { id: NodeId, destination: NodeId },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown setting: {name}")]
    UnknownSetting { name: String },
}

/// Master error type for all Vitrine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VitrineError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VitrineError {
    /// True for the typed not-found failure callers are expected to handle.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VitrineError::Node(NodeError::NotFound { .. })
                | VitrineError::Storage(StorageError::NotFound { .. })
        )
    }
}

/// Result type alias for Vitrine operations.
pub type VitrineResult<T> = Result<T, VitrineError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_error_display_not_found() {
        let err = NodeError::NotFound {
            id: NodeId::new(42),
            expected: Some(NodeKind::Container),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Node not found"));
        assert!(msg.contains("42"));
        assert!(msg.contains("expected Container"));

        let bare = NodeError::NotFound {
            id: NodeId::new(7),
            expected: None,
        };
        assert_eq!(format!("{}", bare), "Node not found: id 7");
    }

    #[test]
    fn test_node_error_display_unsupported_kind() {
        let err = NodeError::UnsupportedKind {
            id: NodeId::new(3),
            discriminator: "Hologram".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unsupported"));
        assert!(msg.contains("Hologram"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "MaxDirectoryNameLength".to_string(),
            value: "lots".to_string(),
            reason: "must be numeric".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("MaxDirectoryNameLength"));
        assert!(msg.contains("lots"));
        assert!(msg.contains("must be numeric"));
    }

    #[test]
    fn test_file_error_display_move_failed() {
        let err = FileError::MoveFailed {
            from: "/a/b.jpg".to_string(),
            to: "/c/b.jpg".to_string(),
            reason: "denied".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/a/b.jpg"));
        assert!(msg.contains("/c/b.jpg"));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let err = StorageError::LockPoisoned;
        assert_eq!(format!("{}", err), "Storage lock poisoned");
    }

    #[test]
    fn test_vitrine_error_from_variants() {
        let node = VitrineError::from(NodeError::invalid_state("read-only"));
        assert!(matches!(node, VitrineError::Node(_)));

        let storage = VitrineError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, VitrineError::Storage(_)));

        let file = VitrineError::from(FileError::DeleteFailed {
            path: "/x".to_string(),
            reason: "busy".to_string(),
        });
        assert!(matches!(file, VitrineError::File(_)));

        let validation = VitrineError::from(ValidationError::RequiredFieldMissing {
            field: "directory_name".to_string(),
        });
        assert!(matches!(validation, VitrineError::Validation(_)));

        let config = VitrineError::from(ConfigError::UnknownSetting {
            name: "x".to_string(),
        });
        assert!(matches!(config, VitrineError::Config(_)));
    }

    #[test]
    fn test_is_not_found() {
        let err = VitrineError::from(NodeError::NotFound {
            id: NodeId::new(1),
            expected: None,
        });
        assert!(err.is_not_found());
        assert!(!VitrineError::from(StorageError::LockPoisoned).is_not_found());
    }
}
