//! Generated names and version counters.

use crate::define_id;

// =============================================================================
// Generated names
// =============================================================================

define_id!(KitId, "kit");
define_id!(RequestId, "req");

// =============================================================================
// Resource Version
// =============================================================================

/// Monotonic version of a stored object.
///
/// Every successful write bumps it by one; a write carrying a stale version
/// is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// Version assigned on creation.
    pub const FIRST: Self = Self(1);

    /// Creates a version from a raw counter.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// True for objects that were never persisted.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl serde::Serialize for ResourceVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        Ok(Self(value))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ulid;
    use proptest::prelude::*;

    #[test]
    fn test_kit_id_roundtrip() {
        let id = KitId::new();
        let s = id.to_string();
        assert!(s.starts_with("kit-"));
        assert_eq!(s, s.to_ascii_lowercase());
        let parsed: KitId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_kit_id_invalid_prefix() {
        let result: Result<KitId, _> = "req-01hv4z2wqxkjnm8gpqy6vbkc3d".parse();
        assert!(result.unwrap_err().is_prefix_error());
    }

    #[test]
    fn test_kit_id_missing_separator() {
        let result: Result<KitId, _> = "kit01hv4z2wqxkjnm8gpqy6vbkc3d".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::MissingSeparator));
    }

    #[test]
    fn test_kit_id_empty() {
        let result: Result<KitId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_kit_id_invalid_ulid() {
        let result: Result<KitId, _> = "kit-invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_kit_id_json_roundtrip() {
        let id = KitId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: KitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_resource_version_next() {
        let v = ResourceVersion::FIRST;
        assert_eq!(v.next().value(), 2);
        assert!(ResourceVersion::default().is_unset());
        assert!(!v.is_unset());
    }

    proptest! {
        #[test]
        fn prop_kit_id_parse_accepts_display(ms in 0u64..(1u64 << 47), rand in any::<u64>()) {
            let id = KitId::from_ulid(Ulid::from_parts(ms, rand as u128));
            let parsed = KitId::parse(&id.to_string()).unwrap();
            prop_assert_eq!(id, parsed);
        }
    }
}
