//! The generic segment: range, colour, rank, and shield bookkeeping common
//! to every segment class, plus the slab that owns segment storage.
//!
//! The field set and its consistency rules mirror a pointer-based C
//! implementation's segment descriptor: tract/segment binding agrees in both
//! directions, rank sets are empty-or-singleton, a grey segment is always
//! ring-attached and vice versa, and a finished segment carries no shield
//! state.

use crate::class::SegClass;
use crate::ring::RingLink;
use crate::sets::{AccessSet, RankSet, RefSet, TraceSet};
use crate::tract::PoolId;

/// Identifies a segment in a [`SegStore`] slab. Stands in for the raw
/// pointer a pointer-based implementation would use — see `ring.rs`'s
/// module doc for why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegId(u32);

impl SegId {
    /// Construct a `SegId` from a raw slab index. Exposed for test code
    /// that needs to name segments before they exist; production callers
    /// get `SegId`s back from `Segment::allocate`.
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies an allocation buffer attached to a GC segment. Allocation
/// buffers themselves are out of scope; this is the forward reference
/// `spec.md` calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// GC-only fields, present iff the segment's class is (a descendant of)
/// `SegGC`. See DESIGN.md Open Question 1 for why this is `Option<GcExtra>`
/// on one `Segment` type rather than a separate Rust type.
#[derive(Debug, Clone)]
pub struct GcExtra {
    pub(crate) summary: RefSet,
    pub(crate) buffer: Option<BufferId>,
    pub(crate) pool_link: RingLink,
    pub(crate) grey_link: RingLink,
    pub(crate) client_slot: usize,
}

impl GcExtra {
    pub(crate) fn fresh() -> Self {
        Self {
            summary: RefSet::EMPTY,
            buffer: None,
            pool_link: RingLink::detached(),
            grey_link: RingLink::detached(),
            client_slot: 0,
        }
    }
}

/// A contiguous, arena-aligned range of address space with pool- and
/// collector-visible metadata.
#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) first_tract: usize,
    pub(crate) limit: usize,
    pub(crate) pool: PoolId,
    pub(crate) rank_set: RankSet,
    pub(crate) white: TraceSet,
    pub(crate) grey: TraceSet,
    pub(crate) nailed: TraceSet,
    pub(crate) pm: AccessSet,
    pub(crate) sm: AccessSet,
    pub(crate) depth: u32,
    pub(crate) class: &'static SegClass,
    pub(crate) gc: Option<GcExtra>,
}

impl Segment {
    pub(crate) fn new(class: &'static SegClass, pool: PoolId, base: usize, limit: usize) -> Self {
        Self {
            first_tract: base,
            limit,
            pool,
            rank_set: RankSet::EMPTY,
            white: TraceSet::EMPTY,
            grey: TraceSet::EMPTY,
            nailed: TraceSet::EMPTY,
            pm: AccessSet::EMPTY,
            sm: AccessSet::EMPTY,
            depth: 0,
            class,
            gc: None,
        }
    }

    /// Construct a bare segment for unit tests that exercise rings/classes
    /// directly without going through `Arena::allocate_segment`.
    #[cfg(test)]
    pub(crate) fn new_for_test(class: &'static SegClass, with_gc: bool) -> Self {
        let mut seg = Self::new(class, PoolId(0), 0x1000, 0x2000);
        if with_gc {
            seg.gc = Some(GcExtra::fresh());
        }
        seg
    }

    /// Base address — one past the previous segment, derived from the first
    /// tract.
    pub const fn base(&self) -> usize {
        self.first_tract
    }

    /// Address one past the end of the segment.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Size in bytes.
    pub const fn size(&self) -> usize {
        self.limit - self.first_tract
    }

    /// The pool that owns this segment.
    pub const fn pool(&self) -> PoolId {
        self.pool
    }

    /// The segment's class.
    pub const fn class(&self) -> &'static SegClass {
        self.class
    }

    /// Current rank set.
    pub const fn rank_set(&self) -> RankSet {
        self.rank_set
    }

    /// Current white set.
    pub const fn white(&self) -> TraceSet {
        self.white
    }

    /// Current grey set.
    pub const fn grey(&self) -> TraceSet {
        self.grey
    }

    /// Current nailed set (ambiguously-referenced, pinned objects).
    pub const fn nailed(&self) -> TraceSet {
        self.nailed
    }

    /// Current protection mode.
    pub const fn pm(&self) -> AccessSet {
        self.pm
    }

    /// Current shield mode.
    pub const fn sm(&self) -> AccessSet {
        self.sm
    }

    /// Current shield-expose nesting depth.
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// The GC-only fields, if this is a GC segment.
    pub fn gc(&self) -> Option<&GcExtra> {
        self.gc.as_ref()
    }

    pub(crate) fn gc_mut(&mut self) -> Option<&mut GcExtra> {
        self.gc.as_mut()
    }

    /// This segment's reference set ("summary"), if it is a GC segment.
    pub fn summary(&self) -> Option<RefSet> {
        self.gc.as_ref().map(|gc| gc.summary)
    }

    /// This segment's attached allocation buffer, if it is a GC segment.
    pub fn buffer(&self) -> Option<BufferId> {
        self.gc.as_ref().and_then(|gc| gc.buffer)
    }

    /// The opaque client slot, if this is a GC segment.
    pub fn client_slot(&self) -> Option<usize> {
        self.gc.as_ref().map(|gc| gc.client_slot)
    }

}

/// A slab of segments, addressed by [`SegId`]. Stands in for the "control
/// allocator" `spec.md` says backs class-sized segment headers — see
/// `tract.rs`'s module doc for the same scoping rationale.
#[derive(Debug, Default)]
pub struct SegStore {
    slots: Vec<Option<Segment>>,
    free: Vec<u32>,
}

impl SegStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Insert a segment, returning its new id. Reuses a freed slot if one
    /// is available.
    pub fn insert(&mut self, seg: Segment) -> SegId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(seg);
            SegId::from_raw(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(seg));
            SegId::from_raw(index)
        }
    }

    /// Remove a segment, freeing its slot for reuse.
    pub fn remove(&mut self, id: SegId) -> Option<Segment> {
        let slot = self.slots.get_mut(id.index())?;
        let seg = slot.take();
        if seg.is_some() {
            self.free.push(id.index() as u32);
        }
        seg
    }

    /// Borrow a segment.
    pub fn get(&self, id: SegId) -> Option<&Segment> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Mutably borrow a segment.
    pub fn get_mut(&mut self, id: SegId) -> Option<&mut Segment> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Iterate over every live segment, paired with its id, in slab order
    /// (not address order — callers that need address order should use
    /// `Arena::first`/`Arena::next`).
    pub fn iter(&self) -> impl Iterator<Item = (SegId, &Segment)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (SegId::from_raw(i as u32), s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::BASE_CLASS;

    #[test]
    fn store_insert_get_remove() {
        let mut store = SegStore::new();
        let seg = Segment::new(BASE_CLASS, PoolId(0), 0x1000, 0x2000);
        let id = store.insert(seg);

        assert_eq!(store.get(id).unwrap().base(), 0x1000);
        let removed = store.remove(id);
        assert!(removed.is_some());
        assert!(store.get(id).is_none());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut store = SegStore::new();
        let a = store.insert(Segment::new(BASE_CLASS, PoolId(0), 0x1000, 0x2000));
        store.remove(a);
        let b = store.insert(Segment::new(BASE_CLASS, PoolId(0), 0x3000, 0x4000));
        assert_eq!(a, b, "slab should recycle the freed index");
    }

    #[test]
    fn base_and_size() {
        let seg = Segment::new(BASE_CLASS, PoolId(0), 0x1000, 0x4000);
        assert_eq!(seg.base(), 0x1000);
        assert_eq!(seg.limit(), 0x4000);
        assert_eq!(seg.size(), 0x3000);
    }
}
