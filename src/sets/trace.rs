//! Trace sets — a small fixed-width bitset over trace identifiers.

/// Maximum number of traces that can be in flight at once.
pub const TRACE_LIMIT: u32 = 8;

/// Identifies one of the (at most [`TRACE_LIMIT`]) traces currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(u8);

impl TraceId {
    /// Wrap a raw index. Panics if it is out of range — constructing an
    /// out-of-range trace id is a programming error, not a recoverable one.
    pub const fn new(index: u8) -> Self {
        assert!((index as u32) < TRACE_LIMIT, "trace id out of range");
        Self(index)
    }

    const fn bit(self) -> u8 {
        1 << self.0
    }
}

/// A bitset over trace identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TraceSet(u8);

impl TraceSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);
    /// The set containing every possible trace id.
    pub const UNIVERSAL: Self = Self(u8::MAX);

    /// A set containing only `id`.
    pub const fn singleton(id: TraceId) -> Self {
        Self(id.bit())
    }

    /// Whether `id` is a member.
    pub const fn contains(self, id: TraceId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Whether the set has no members.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two sets.
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Set difference: members of `self` not in `other`.
    pub const fn minus(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether `self` is a subset of `other`.
    pub const fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Insert `id`, returning the updated set.
    pub const fn with(self, id: TraceId) -> Self {
        Self(self.0 | id.bit())
    }

    /// Remove `id`, returning the updated set.
    pub const fn without(self, id: TraceId) -> Self {
        Self(self.0 & !id.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_empty() {
        assert!(TraceSet::EMPTY.is_empty());
        assert!(!TraceSet::UNIVERSAL.is_empty());
    }

    #[test]
    fn singleton_membership() {
        let t3 = TraceId::new(3);
        let s = TraceSet::singleton(t3);
        assert!(s.contains(t3));
        assert!(!s.contains(TraceId::new(2)));
    }

    #[test]
    fn union_and_intersect() {
        let a = TraceSet::singleton(TraceId::new(0));
        let b = TraceSet::singleton(TraceId::new(1));
        let u = a.union(b);
        assert!(u.contains(TraceId::new(0)));
        assert!(u.contains(TraceId::new(1)));
        assert_eq!(a.intersect(b), TraceSet::EMPTY);
        assert_eq!(u.intersect(a), a);
    }

    #[test]
    fn subset_and_minus() {
        let a = TraceSet::singleton(TraceId::new(0));
        let u = a.union(TraceSet::singleton(TraceId::new(1)));
        assert!(a.is_subset_of(u));
        assert!(!u.is_subset_of(a));
        assert_eq!(u.minus(a), TraceSet::singleton(TraceId::new(1)));
    }

    #[test]
    #[should_panic(expected = "trace id out of range")]
    fn out_of_range_id_panics() {
        TraceId::new(TRACE_LIMIT as u8);
    }
}
