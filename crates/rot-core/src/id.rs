use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for entity IDs.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// A lightweight, interned identifier for tokens, drawings, blockers and
/// vertices. Internally a 4-byte `Spur` index.
///
/// On disk and on the wire it is always the plain string form, either a
/// UUID-v4 or a migrated legacy id such as `00001-7-7-7-7`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(Spur);

impl EntityId {
    /// Intern a string as an EntityId, or return the existing handle.
    pub fn intern(s: &str) -> Self {
        EntityId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Generate a fresh random id for a newly created entity.
    pub fn fresh() -> Self {
        Self::intern(&uuid::Uuid::new_v4().to_string())
    }

    /// The handle for `s` if some entity has already claimed it. Never
    /// grows the interner.
    pub fn lookup(s: &str) -> Option<Self> {
        INTERNER.get(s).map(EntityId)
    }

    /// Placeholder for an id nothing was ever given. Matches no entity.
    pub fn unknown() -> Self {
        Self::intern("")
    }

    pub fn is_unknown(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Resolve an id named by a client: the existing handle, or
    /// [`EntityId::unknown`].
    pub fn resolve(s: &str) -> Self {
        Self::lookup(s).unwrap_or_else(Self::unknown)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("(unknown)");
        }
        f.write_str(self.as_str())
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EntityId::intern(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = EntityId::intern("00001-3-3-3-3");
        let b = EntityId::intern("00001-3-3-3-3");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "00001-3-3-3-3");
    }

    #[test]
    fn fresh_ids_are_unique_uuids() {
        let a = EntityId::fresh();
        let b = EntityId::fresh();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EntityId::intern("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: EntityId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn resolve_does_not_intern() {
        let ghost = "ghost-5b0f3c1e-resolve";
        assert_eq!(EntityId::resolve(ghost), EntityId::unknown());
        assert!(EntityId::resolve(ghost).is_unknown());
        assert_eq!(EntityId::lookup(ghost), None);

        let known = EntityId::intern("00001-9-9-9-9");
        assert_eq!(EntityId::resolve("00001-9-9-9-9"), known);
        assert!(!known.is_unknown());
        assert_eq!(EntityId::unknown().to_string(), "(unknown)");
    }
}
