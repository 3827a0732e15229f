//! Document identifiers and typed references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Random bytes fixed for the lifetime of the process.
static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(rand::random);

/// Per-process counter, seeded randomly so restarts do not replay values.
static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::random()));

/// Error returned when a string is not a valid [`DocumentId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid document id `{0}`")]
pub struct InvalidId(pub String);

/// 12-byte document identifier, rendered as 24 lowercase hex characters.
///
/// Layout:
///
/// - bytes `0..4`  - creation time, UNIX seconds, big-endian
/// - bytes `4..9`  - process-unique random value
/// - bytes `9..12` - incrementing counter, big-endian
///
/// Ids generated by one process sort by creation time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId([u8; 12]);

impl DocumentId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        let seconds = Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// Builds an identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time encoded in the identifier (second precision).
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for DocumentId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(InvalidId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.to_hex())
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<DocumentId> for serde_json::Value {
    fn from(id: DocumentId) -> Self {
        serde_json::Value::String(id.to_hex())
    }
}

/// Typed reference to a document of model `T`.
///
/// Stored as the bare id string. `Ref<T>` models one-to-many links,
/// `Vec<Ref<T>>` many-to-many links. Resolving a reference to the target's
/// data is always explicit, see [`crate::odm::Query::populate`].
pub struct Ref<T> {
    id: DocumentId,
    _target: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub const fn new(id: DocumentId) -> Self {
        Self {
            id,
            _target: PhantomData,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({})", self.id)
    }
}

impl<T> From<DocumentId> for Ref<T> {
    fn from(id: DocumentId) -> Self {
        Self::new(id)
    }
}

impl<T> From<Ref<T>> for serde_json::Value {
    fn from(reference: Ref<T>) -> Self {
        reference.id.into()
    }
}

impl<T> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Ref<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DocumentId::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique_and_hex() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();

        assert_ne!(a, b);
        assert_eq!(a.to_hex().len(), 24);
        assert!(a.to_hex().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_sort_by_creation() {
        let ids: Vec<DocumentId> = (0..100).map(|_| DocumentId::generate()).collect();
        let first = ids[0];
        assert!(ids.iter().skip(1).all(|id| id.timestamp() >= first.timestamp()));
    }

    #[test]
    fn test_parse_roundtrip() {
        let id: DocumentId = "65a1b2c3d4e5f60718293a4b".parse().unwrap();
        assert_eq!(id.to_string(), "65a1b2c3d4e5f60718293a4b");
        assert_eq!(id.timestamp().timestamp(), 0x65a1b2c3);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<DocumentId>().is_err());
        assert!("123".parse::<DocumentId>().is_err());
        assert!("zza1b2c3d4e5f60718293a4b".parse::<DocumentId>().is_err());
        assert!("65a1b2c3d4e5f60718293a4b00".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_ref_serializes_as_bare_id() {
        struct Target;
        let id: DocumentId = "65a1b2c3d4e5f60718293a4b".parse().unwrap();
        let reference: Ref<Target> = Ref::new(id);

        let json = serde_json::to_value(reference).unwrap();
        assert_eq!(json, serde_json::json!("65a1b2c3d4e5f60718293a4b"));

        let back: Ref<Target> = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_ref_rejects_invalid_id() {
        struct Target;
        let result = serde_json::from_value::<Ref<Target>>(serde_json::json!("nope"));
        assert!(result.is_err());
    }
}
