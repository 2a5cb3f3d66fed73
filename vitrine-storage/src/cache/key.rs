//! Binary cache keys for snapshot backends.

use vitrine_core::{NodeId, NodeKind};

/// Separator byte between the kind discriminant and the id.
const SEPARATOR: u8 = 0xFF;

/// Encoded length of a [`CacheKey`].
pub const KEY_LEN: usize = 10;

/// Key of one snapshot in a backend.
///
/// # Binary Format
///
/// The key encodes to a fixed 10-byte array:
/// - Byte 0: node kind discriminant
/// - Byte 1: separator (0xFF)
/// - Bytes 2-9: node id, big-endian
///
/// Big-endian ids keep LMDB's lexicographic order equal to numeric order for
/// positive ids, and the leading kind byte lets a whole kind be invalidated
/// with one prefix scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    kind: NodeKind,
    id: NodeId,
}

impl CacheKey {
    pub fn new(kind: NodeKind, id: NodeId) -> Self {
        Self { kind, id }
    }

    pub fn container(id: NodeId) -> Self {
        Self::new(NodeKind::Container, id)
    }

    pub fn leaf(id: NodeId) -> Self {
        Self::new(NodeKind::Leaf, id)
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Encode this key to a fixed-size byte array.
    pub fn encode(&self) -> [u8; KEY_LEN] {
        let mut bytes = [0u8; KEY_LEN];
        bytes[0] = self.kind.as_byte();
        bytes[1] = SEPARATOR;
        bytes[2..].copy_from_slice(&self.id.get().to_be_bytes());
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if the slice has the wrong length, the separator is
    /// missing, or the kind byte is unknown.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN || bytes[1] != SEPARATOR {
            return None;
        }
        let kind = NodeKind::from_byte(bytes[0])?;
        let id_bytes: [u8; 8] = bytes[2..].try_into().ok()?;
        Some(Self::new(kind, NodeId::new(i64::from_be_bytes(id_bytes))))
    }

    /// Prefix shared by every key of one kind.
    pub fn kind_prefix(kind: NodeKind) -> [u8; 2] {
        [kind.as_byte(), SEPARATOR]
    }
}
