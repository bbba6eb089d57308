//! The tract table — the arena-granule-sized address-to-metadata map this
//! layer sits on top of.
//!
//! `spec.md` scopes the tract/arena allocator out of this crate, but a
//! working stand-in is needed for the crate to build and be tested on its
//! own, so this is the minimal faithful implementation: a sparse, ordered
//! map from granule-aligned address to [`Tract`], good enough to support
//! `seg_of`, `first`, and `next` without pretending to manage real memory
//! or page protection.

use std::collections::BTreeMap;

use crate::segment::SegId;
use crate::sets::TraceSet;

/// Opaque identifier for the pool that owns a range of tracts. Pool
/// implementations are out of scope; this is just enough to let every
/// tract's pool agree with its segment's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub u32);

/// An arena-granule-sized unit of address-to-metadata mapping.
#[derive(Debug, Clone, Copy)]
pub struct Tract {
    base: usize,
    pool: PoolId,
    seg: Option<SegId>,
    white: TraceSet,
    /// Opaque per-tract client slot, analogous to the segment's `p`/client
    /// slot but scoped to a single granule.
    client: usize,
}

impl Tract {
    /// The granule-aligned base address of this tract.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// The pool this tract belongs to.
    pub const fn pool(&self) -> PoolId {
        self.pool
    }

    /// The segment this tract is bound to, if any.
    pub const fn seg(&self) -> Option<SegId> {
        self.seg
    }

    /// Whether this tract is bound to a segment.
    pub const fn has_seg(&self) -> bool {
        self.seg.is_some()
    }

    /// The tract's white set, mirrored from its owning segment.
    pub const fn white(&self) -> TraceSet {
        self.white
    }

    /// The opaque per-tract client slot.
    pub const fn client(&self) -> usize {
        self.client
    }
}

/// The sparse, address-ordered map of every committed tract in an arena.
#[derive(Debug, Default)]
pub struct TractTable {
    tracts: BTreeMap<usize, Tract>,
}

impl TractTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            tracts: BTreeMap::new(),
        }
    }

    /// Bind `[base, limit)` to `seg`/`pool`, creating one tract per granule.
    /// Panics if any address in the range is already committed — that would
    /// mean two segments claim the same address space, a programming error
    /// one level below this API.
    pub fn bind_range(
        &mut self,
        base: usize,
        limit: usize,
        granule: usize,
        pool: PoolId,
        seg: SegId,
    ) {
        let mut addr = base;
        while addr < limit {
            let prior = self.tracts.insert(
                addr,
                Tract {
                    base: addr,
                    pool,
                    seg: Some(seg),
                    white: TraceSet::EMPTY,
                    client: 0,
                },
            );
            assert!(prior.is_none(), "tract at {addr:#x} already committed");
            addr += granule;
        }
    }

    /// Remove every tract in `[base, limit)`, unbinding the segment.
    pub fn unbind_range(&mut self, base: usize, limit: usize, granule: usize) {
        let mut addr = base;
        while addr < limit {
            self.tracts
                .remove(&addr)
                .expect("unbinding a tract that was never bound");
            addr += granule;
        }
    }

    /// Write `white` into every tract of `[base, limit)` — the per-tract
    /// half of `set_white`'s segment/tract tie-break.
    pub fn set_white_range(&mut self, base: usize, limit: usize, granule: usize, white: TraceSet) {
        let mut addr = base;
        while addr < limit {
            if let Some(tract) = self.tracts.get_mut(&addr) {
                tract.white = white;
            }
            addr += granule;
        }
    }

    /// The tract bound at `addr`, if one is committed there.
    pub fn tract_of_addr(&self, addr: usize) -> Option<&Tract> {
        self.tracts.get(&addr)
    }

    /// The lowest-addressed tract in the table.
    pub fn first(&self) -> Option<&Tract> {
        self.tracts.values().next()
    }

    /// The next committed tract strictly after `addr`, in address order.
    pub fn next(&self, addr: usize) -> Option<&Tract> {
        self.tracts.range((addr + 1)..).next().map(|(_, t)| t)
    }
}
