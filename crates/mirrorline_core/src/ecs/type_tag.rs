//! # Type Tags
//!
//! A type tag is the 32-bit FNV-1a hash of an entity kind's canonical name.
//! Both peers compute it from the same string at compile time, so a batch can
//! be routed to the right storage without any runtime type metadata.

use std::fmt;

use crate::error::{ReplicaError, ReplicaResult};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Stable numeric identifier for an entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeTag(pub u32);

impl TypeTag {
    /// Hashes a canonical kind name with 32-bit FNV-1a over its UTF-8 bytes.
    #[must_use]
    pub const fn of_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Returns the raw tag value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag {:#010x}", self.0)
    }
}

/// Registration-time table of tag to kind name.
///
/// Collisions are configuration errors and are reported when the second
/// kind is registered, never later while decoding traffic.
#[derive(Debug, Default)]
pub struct TagRegistry {
    entries: Vec<(TypeTag, &'static str)>,
}

impl TagRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers a kind name and returns its tag.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::AlreadyRegistered`] if the same name is registered
    /// twice, [`ReplicaError::TagCollision`] if a different name already owns
    /// the tag.
    pub fn register(&mut self, kind: &'static str) -> ReplicaResult<TypeTag> {
        let tag = TypeTag::of_name(kind);
        self.insert(tag, kind)?;
        Ok(tag)
    }

    /// Registers a kind under an explicit tag.
    pub(crate) fn insert(&mut self, tag: TypeTag, kind: &'static str) -> ReplicaResult<()> {
        if let Some(&(_, existing)) = self.entries.iter().find(|(t, _)| *t == tag) {
            if existing == kind {
                return Err(ReplicaError::AlreadyRegistered(kind));
            }
            return Err(ReplicaError::TagCollision {
                tag,
                existing,
                incoming: kind,
            });
        }
        self.entries.push((tag, kind));
        Ok(())
    }

    /// Looks up the kind name for a tag.
    #[must_use]
    pub fn kind_of(&self, tag: TypeTag) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|&(_, kind)| kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_values() {
        // Published FNV-1a 32-bit vectors
        assert_eq!(TypeTag::of_name("").get(), 0x811c_9dc5);
        assert_eq!(TypeTag::of_name("a").get(), 0xe40c_292c);
        assert_eq!(TypeTag::of_name("foobar").get(), 0xbf9c_f968);
    }

    #[test]
    fn test_tag_is_const_evaluable() {
        const TAG: TypeTag = TypeTag::of_name("mirrorline.Bullet");
        assert_eq!(TAG, TypeTag::of_name("mirrorline.Bullet"));
        assert_ne!(TAG, TypeTag::of_name("mirrorline.Player"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = TagRegistry::new();
        let tag = registry.register("kind.A").unwrap();
        assert_eq!(registry.kind_of(tag), Some("kind.A"));
        assert_eq!(
            registry.register("kind.A"),
            Err(ReplicaError::AlreadyRegistered("kind.A"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_detects_collision() {
        let mut registry = TagRegistry::new();
        let tag = TypeTag(7);
        registry.insert(tag, "kind.A").unwrap();
        let err = registry.insert(tag, "kind.B").unwrap_err();
        assert_eq!(
            err,
            ReplicaError::TagCollision {
                tag,
                existing: "kind.A",
                incoming: "kind.B",
            }
        );
    }
}
