//! Value types shared across the deduplication caches.
//!
//! These are the identities the segment writer deduplicates on: the
//! physical [`RecordId`] locator, the logical [`StableId`] of a node, the
//! structural [`Template`] of a node record, and the [`Generation`] label
//! assigned by compaction.

use std::fmt;

/// Generation label attached to every record written during a compaction
/// epoch. Monotonic but not required to be contiguous; two generations are
/// equal only if their integer values match.
pub type Generation = i64;

/// Opaque locator of a persisted record: a segment identifier plus an
/// offset into that segment.
///
/// Treated as a plain value; equality is bytewise.
///
/// # Example
///
/// ```
/// use dedupkit::record::RecordId;
///
/// let a = RecordId::new(0xfeed, 128);
/// let b = RecordId::new(0xfeed, 128);
/// assert_eq!(a, b);
/// assert_ne!(a, RecordId::new(0xfeed, 132));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    segment: u128,
    offset: u32,
}

impl RecordId {
    /// Creates a locator from a segment identifier and a segment offset.
    pub fn new(segment: u128, offset: u32) -> Self {
        Self { segment, offset }
    }

    /// Returns the segment identifier.
    pub fn segment(&self) -> u128 {
        self.segment
    }

    /// Returns the offset within the segment.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}:{:08x}", self.segment, self.offset)
    }
}

/// Content-independent logical identifier of a node, used as the
/// node-cache key. Opaque to this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StableId([u8; 20]);

impl StableId {
    /// Length of a stable id in bytes.
    pub const LEN: usize = 20;

    /// Creates a stable id from its raw bytes.
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Structural template of a node record: the shape information shared by
/// nodes with identical structure. Equality and hashing are structural,
/// which is what makes templates deduplicable.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Template {
    /// Primary type name, if the node declares one.
    pub primary_type: Option<String>,
    /// Mixin type names in declaration order.
    pub mixin_types: Vec<String>,
    /// Names of the node's properties in stored order.
    pub property_names: Vec<String>,
    /// Name of the single child entry, if the node has exactly one.
    pub child_name: Option<String>,
}

/// The kind of writer operation a cache handle is used for.
///
/// Affects only the name under which telemetry is reported; `get` and
/// `put` behave identically for both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Regular write path of the segment writer.
    Write,
    /// Compaction rewriting records into a new generation.
    Compact,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Write => f.write_str("write"),
            Operation::Compact => f.write_str("compact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_round_trips_fields() {
        let id = RecordId::new(42, 7);
        assert_eq!(id.segment(), 42);
        assert_eq!(id.offset(), 7);
    }

    #[test]
    fn record_id_display_is_fixed_width_hex() {
        let id = RecordId::new(0xab, 0xcd);
        let text = id.to_string();
        assert_eq!(text.len(), 32 + 1 + 8);
        assert!(text.ends_with("000000cd"));
    }

    #[test]
    fn stable_id_display_is_hex() {
        let id = StableId::from_bytes([0xff; StableId::LEN]);
        assert_eq!(id.to_string(), "ff".repeat(StableId::LEN));
    }

    #[test]
    fn templates_with_same_structure_are_equal() {
        let a = Template {
            primary_type: Some("folder".into()),
            property_names: vec!["title".into()],
            ..Template::default()
        };
        let b = a.clone();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn operation_display_feeds_telemetry_names() {
        assert_eq!(Operation::Write.to_string(), "write");
        assert_eq!(Operation::Compact.to_string(), "compact");
    }
}
