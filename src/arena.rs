//! The arena: address-space bookkeeping, the tract table, segment storage,
//! per-pool and per-rank rings, and the single re-entrant lock every
//! operation executes under.
//!
//! Real address-space reservation, commit, and page protection are out of
//! scope (`spec.md` §2 Non-goals) — `ArenaInner` allocates from a simple bump
//! region instead of calling into the OS, the same scoping `tract.rs` and
//! `shield.rs` use. What's in scope is everything layered on top: tract
//! binding, segment lifecycle, colour/rank/summary bookkeeping, and the
//! concurrency envelope those operations run under.

use rustc_hash::FxHashMap;

use crate::error::{SegError, SegResult};
use crate::ring::{LinkKind, Ring};
use crate::sets::{AccessSet, Rank, RankSet, RefSet, TraceSet, RANK_COUNT};
use crate::segment::{BufferId, SegId, SegStore, Segment};
use crate::shield::{RecordingShield, Shield};
use crate::tract::{PoolId, Tract, TractTable};
use crate::class::SegClass;

/// Running counters, exposed for diagnostics and tests. Not itself part of
/// any invariant.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArenaStats {
    pub segments_allocated: u64,
    pub segments_freed: u64,
    pub bytes_committed: usize,
}

/// All arena state reachable only while the arena's lock is held.
pub struct ArenaInner {
    pub(crate) granule: usize,
    pub(crate) next_free: usize,
    pub(crate) limit: usize,
    pub(crate) commit_limit: Option<usize>,
    pub(crate) tracts: TractTable,
    pub(crate) segments: SegStore,
    pub(crate) grey_rings: [Ring; RANK_COUNT],
    pub(crate) pool_rings: FxHashMap<PoolId, Ring>,
    /// Traces past the point at which mutator roots were blackened. Driven
    /// by the (out-of-scope) trace scheduler; exposed here purely so
    /// `set_grey` can decide whether a colour transition crosses the read
    /// barrier threshold.
    pub(crate) flipped_traces: TraceSet,
    pub(crate) shield: Box<dyn Shield>,
    pub(crate) stats: ArenaStats,
}

pub(crate) fn pool_ring_mut(pool_rings: &mut FxHashMap<PoolId, Ring>, pool: PoolId) -> &mut Ring {
    pool_rings.entry(pool).or_insert_with(Ring::new)
}

pub(crate) fn grey_ring_mut(grey_rings: &mut [Ring; RANK_COUNT], rank: Rank) -> &mut Ring {
    &mut grey_rings[rank as usize]
}

impl ArenaInner {
    fn new(granule: usize, size: usize, shield: Box<dyn Shield>) -> Self {
        Self {
            granule,
            next_free: 0,
            limit: size,
            commit_limit: None,
            tracts: TractTable::new(),
            segments: SegStore::new(),
            grey_rings: Default::default(),
            pool_rings: FxHashMap::default(),
            flipped_traces: TraceSet::EMPTY,
            shield,
            stats: ArenaStats::default(),
        }
    }

    /// The arena's granule size — every segment's base/limit are multiples
    /// of this.
    pub const fn granule(&self) -> usize {
        self.granule
    }

    fn reserve_range(&mut self, size: usize) -> SegResult<(usize, usize)> {
        if size == 0 {
            return Err(SegError::InvalidArgument("segment size must be non-zero"));
        }
        if size % self.granule != 0 {
            return Err(SegError::InvalidArgument("segment size must be granule-aligned"));
        }
        let base = self.next_free;
        let limit = base
            .checked_add(size)
            .ok_or(SegError::OutOfMemory)?;
        if limit > self.limit {
            return Err(SegError::OutOfMemory);
        }
        if let Some(cap) = self.commit_limit {
            if self.stats.bytes_committed + size > cap {
                return Err(SegError::CommitLimit);
            }
        }
        self.next_free = limit;
        self.stats.bytes_committed += size;
        Ok((base, limit))
    }

    /// Allocate a new segment of `size` bytes (must be non-zero and a
    /// multiple of the granule) from `pool`, with the given class, running
    /// the class's `init` slot.
    pub fn allocate_segment(
        &mut self,
        pool: PoolId,
        size: usize,
        class: &'static SegClass,
    ) -> SegResult<SegId> {
        let (base, limit) = match self.reserve_range(size) {
            Ok(range) => range,
            Err(err) => {
                #[cfg(feature = "gc_logging")]
                tracing::warn!(target: "segment::arena", pool = pool.0, size, error = ?err, "segment allocation failed");
                return Err(err);
            }
        };
        let id = self.segments.insert(Segment::new(class, pool, base, limit));
        self.tracts.bind_range(base, limit, self.granule, pool, id);

        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, base, limit, pool = pool.0, "segment reserved");

        if let Err(err) = (class.init)(self, id) {
            self.tracts.unbind_range(base, limit, self.granule);
            self.segments.remove(id);
            return Err(err);
        }
        self.stats.segments_allocated += 1;
        Ok(id)
    }

    /// Finish and free a segment: lowers the shield if still raised, runs
    /// the class's `finish` slot, clears the rank set, then unbinds and
    /// releases the range.
    pub fn free_segment(&mut self, id: SegId) -> SegResult<()> {
        let seg = self
            .segments
            .get(id)
            .ok_or(SegError::InvalidArgument("unknown segment"))?;
        let class = seg.class();
        let (base, limit, sm) = (seg.base(), seg.limit(), seg.sm());

        if !sm.is_empty() {
            self.shield.lower(id, sm);
            self.segments.get_mut(id).unwrap().sm = AccessSet::EMPTY;
        }

        (class.finish)(self, id)?;

        let seg = self.segments.get_mut(id).expect("unknown segment");
        assert!(
            seg.depth == 0,
            "freeing a segment with nonzero shield exposure depth"
        );
        seg.rank_set = RankSet::EMPTY;

        self.tracts.unbind_range(base, limit, self.granule);
        self.segments.remove(id);
        self.stats.segments_freed += 1;
        self.shield.flush();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, "segment freed");

        Ok(())
    }

    /// Set `seg`'s grey set, through its class.
    pub fn set_grey(&mut self, id: SegId, grey: TraceSet) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_grey)(self, id, grey)
    }

    /// Set `seg`'s white set, through its class.
    pub fn set_white(&mut self, id: SegId, white: TraceSet) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_white)(self, id, white)
    }

    /// Set `seg`'s rank set, through its class.
    pub fn set_rank_set(&mut self, id: SegId, rank_set: RankSet) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_rank_set)(self, id, rank_set)
    }

    /// Set `seg`'s summary, through its class.
    pub fn set_summary(&mut self, id: SegId, summary: RefSet) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_summary)(self, id, summary)
    }

    /// Set `seg`'s rank set and summary together, through its class.
    pub fn set_rank_and_summary(
        &mut self,
        id: SegId,
        rank_set: RankSet,
        summary: RefSet,
    ) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_rank_and_summary)(self, id, rank_set, summary)
    }

    /// Attach (or detach, with `None`) an allocation buffer, through the
    /// segment's class.
    pub fn set_buffer(&mut self, id: SegId, buffer: Option<BufferId>) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_buffer)(self, id, buffer)
    }

    /// Read the segment's summary, through its class.
    pub fn summary(&self, id: SegId) -> SegResult<RefSet> {
        let class = self.class_of(id)?;
        (class.summary)(self, id)
    }

    /// Set the segment's opaque client slot, through its class.
    pub fn set_p(&mut self, id: SegId, value: usize) -> SegResult<()> {
        let class = self.class_of(id)?;
        (class.set_p)(self, id, value)
    }

    /// Read the segment's opaque client slot, through its class.
    pub fn p(&self, id: SegId) -> SegResult<usize> {
        let class = self.class_of(id)?;
        (class.p)(self, id)
    }

    /// A human-readable description of the segment, through its class.
    pub fn describe(&self, id: SegId) -> SegResult<String> {
        let class = self.class_of(id)?;
        let mut s = String::new();
        (class.describe)(self, id, &mut s).expect("formatting to a String cannot fail");
        Ok(s)
    }

    /// Every rank's grey ring, in address-agnostic insertion order, as an
    /// iterator of segment ids.
    pub fn grey_segments(&self, rank: Rank) -> impl Iterator<Item = SegId> + '_ {
        self.grey_rings[rank as usize].iter(&self.segments, LinkKind::Grey)
    }

    /// Every segment in a pool's ring.
    pub fn pool_segments(&self, pool: PoolId) -> impl Iterator<Item = SegId> + '_ {
        self.pool_rings
            .get(&pool)
            .copied()
            .unwrap_or_default()
            .iter(&self.segments, LinkKind::Pool)
    }

    /// The first segment in address order, if any.
    pub fn first(&self) -> Option<SegId> {
        self.tracts.first().and_then(Tract::seg)
    }

    /// The next segment strictly after `id` in address order, if any.
    /// Skips past every tract of `id`'s own segment, so a multi-granule
    /// segment only ever yields its successor, not itself.
    pub fn next(&self, id: SegId) -> Option<SegId> {
        let seg = self.segments.get(id)?;
        self.tracts.next(seg.limit() - 1).and_then(Tract::seg)
    }

    /// The segment bound to the tract at `addr`, if any.
    pub fn seg_of(&self, addr: usize) -> Option<SegId> {
        self.tracts.tract_of_addr(addr).and_then(Tract::seg)
    }

    /// Borrow a segment directly.
    pub fn segment(&self, id: SegId) -> Option<&Segment> {
        self.segments.get(id)
    }

    fn class_of(&self, id: SegId) -> SegResult<&'static SegClass> {
        Ok(self
            .segments
            .get(id)
            .ok_or(SegError::InvalidArgument("unknown segment"))?
            .class())
    }

    /// Running allocation/free counters.
    pub const fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Mark `traces` as having flipped (past the point mutator roots were
    /// blackened). Called by the (out-of-scope) trace scheduler.
    pub fn set_flipped_traces(&mut self, traces: TraceSet) {
        self.flipped_traces = traces;
    }

    /// Impose a ceiling on total committed bytes. `None` means unbounded.
    pub fn set_commit_limit(&mut self, limit: Option<usize>) {
        self.commit_limit = limit;
    }
}

/// An arena: a granule-aligned address range plus the segment and tract
/// bookkeeping layered on top of it.
///
/// Operations take `&self` and lock internally (a `parking_lot::ReentrantMutex`
/// guarding a `RefCell<ArenaInner>`), mirroring the "all operations execute
/// within a single arena-entered lock" rule, re-entrant because shield
/// callbacks invoked from inside a locked operation may legitimately call
/// back into the arena (e.g. to describe a segment for a log line).
pub struct Arena {
    inner: parking_lot::ReentrantMutex<std::cell::RefCell<ArenaInner>>,
}

impl Arena {
    /// An arena spanning `size` bytes, granule-aligned at `granule`, backed
    /// by a no-op [`RecordingShield`].
    pub fn with_capacity(granule: usize, size: usize) -> Self {
        Self::with_shield(granule, size, Box::new(RecordingShield::new()))
    }

    /// Like [`Arena::with_capacity`], with a caller-supplied shield
    /// implementation.
    pub fn with_shield(granule: usize, size: usize, shield: Box<dyn Shield>) -> Self {
        assert!(granule > 0, "granule must be non-zero");
        Self {
            inner: parking_lot::ReentrantMutex::new(std::cell::RefCell::new(ArenaInner::new(
                granule, size, shield,
            ))),
        }
    }

    /// Run `f` with exclusive (but re-entrant) access to the arena's state.
    /// This is the entry point every public mutator and query above goes
    /// through.
    pub fn enter<R>(&self, f: impl FnOnce(&mut ArenaInner) -> R) -> R {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        f(&mut inner)
    }

    /// Allocate a new segment. See [`ArenaInner::allocate_segment`].
    pub fn allocate_segment(
        &self,
        pool: PoolId,
        size: usize,
        class: &'static SegClass,
    ) -> SegResult<SegId> {
        self.enter(|inner| inner.allocate_segment(pool, size, class))
    }

    /// Finish and free a segment. See [`ArenaInner::free_segment`].
    pub fn free_segment(&self, id: SegId) -> SegResult<()> {
        self.enter(|inner| inner.free_segment(id))
    }
}

impl Default for Arena {
    /// A 4 KiB-granule, 1 MiB arena — a reasonable default for tests and
    /// small embedders.
    fn default() -> Self {
        Self::with_capacity(4096, 1 << 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::BASE_CLASS;

    #[test]
    fn allocate_and_free_round_trip() {
        let arena = Arena::with_capacity(4096, 1 << 20);
        let id = arena
            .allocate_segment(PoolId(1), 4096, BASE_CLASS)
            .expect("allocation should succeed");
        assert_eq!(arena.enter(|i| i.segment(id).unwrap().size()), 4096);
        arena.free_segment(id).expect("free should succeed");
        assert_eq!(arena.enter(|i| i.stats().segments_freed), 1);
    }

    #[test]
    fn out_of_memory_once_exhausted() {
        let arena = Arena::with_capacity(4096, 8192);
        arena.allocate_segment(PoolId(0), 8192, BASE_CLASS).unwrap();
        let err = arena.allocate_segment(PoolId(0), 4096, BASE_CLASS).unwrap_err();
        assert_eq!(err, SegError::OutOfMemory);
    }

    #[test]
    fn commit_limit_is_enforced() {
        let arena = Arena::with_capacity(4096, 1 << 20);
        arena.enter(|i| i.set_commit_limit(Some(4096)));
        arena.allocate_segment(PoolId(0), 4096, BASE_CLASS).unwrap();
        let err = arena.allocate_segment(PoolId(0), 4096, BASE_CLASS).unwrap_err();
        assert_eq!(err, SegError::CommitLimit);
    }

    #[test]
    fn address_order_iteration() {
        let arena = Arena::with_capacity(4096, 1 << 20);
        let a = arena.allocate_segment(PoolId(0), 4096, BASE_CLASS).unwrap();
        let b = arena.allocate_segment(PoolId(0), 4096, BASE_CLASS).unwrap();

        arena.enter(|inner| {
            assert_eq!(inner.first(), Some(a));
            assert_eq!(inner.next(a), Some(b));
            assert_eq!(inner.next(b), None);
        });
    }
}
