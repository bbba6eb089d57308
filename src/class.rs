//! Segment classes — a single-inheritance vtable of operations, mirroring a
//! class-based C implementation's method table but dispatched through plain
//! `'static` function pointers instead of a runtime class hierarchy.
//!
//! Every operation takes `&mut ArenaInner` rather than `&mut Segment`: ring
//! and shield updates need to reach sibling segments (the rest of a grey
//! ring, the shield implementation sitting in the arena), which a method
//! scoped to one segment can't borrow. Subclassing is expressed as one
//! `SegClass` delegating to another's function pointers ("next method"),
//! the same pattern a single-inheritance class registry uses for "call my
//! parent's implementation, then do my own work".

use crate::arena::ArenaInner;
use crate::error::{SegError, SegResult};
use crate::ring::LinkKind;
use crate::sets::{Access, AccessSet, RankSet, RefSet, TraceSet};
use crate::segment::{BufferId, SegId};

/// The operation vector for a segment class. Slots that don't apply to a
/// given class (e.g. `summary` on a plain [`BASE_CLASS`] segment) are filled
/// with [`not_reached`] rather than a default no-op, so calling them is a
/// loud programming error instead of a silent skip.
pub struct SegClass {
    /// Name, for `describe` output.
    pub name: &'static str,
    /// The class this one refines, if any. `None` for the root class.
    pub superclass: Option<&'static SegClass>,

    pub init: fn(&mut ArenaInner, SegId) -> SegResult<()>,
    pub finish: fn(&mut ArenaInner, SegId) -> SegResult<()>,
    pub set_grey: fn(&mut ArenaInner, SegId, TraceSet) -> SegResult<()>,
    pub set_white: fn(&mut ArenaInner, SegId, TraceSet) -> SegResult<()>,
    pub set_rank_set: fn(&mut ArenaInner, SegId, RankSet) -> SegResult<()>,
    pub set_summary: fn(&mut ArenaInner, SegId, RefSet) -> SegResult<()>,
    pub set_rank_and_summary: fn(&mut ArenaInner, SegId, RankSet, RefSet) -> SegResult<()>,
    pub summary: fn(&ArenaInner, SegId) -> SegResult<RefSet>,
    pub buffer: fn(&ArenaInner, SegId) -> SegResult<Option<BufferId>>,
    pub set_buffer: fn(&mut ArenaInner, SegId, Option<BufferId>) -> SegResult<()>,
    pub p: fn(&ArenaInner, SegId) -> SegResult<usize>,
    pub set_p: fn(&mut ArenaInner, SegId, usize) -> SegResult<()>,
    pub describe: fn(&ArenaInner, SegId, &mut dyn std::fmt::Write) -> std::fmt::Result,
}

/// Panics: called on a segment class that does not implement this
/// operation. Analogous to a "method not applicable to this class" trap in
/// a hand-rolled class registry.
fn not_reached(_inner: &mut ArenaInner, _id: SegId) -> SegResult<()> {
    unreachable!("operation not applicable to this segment class")
}

fn base_init(_inner: &mut ArenaInner, _id: SegId) -> SegResult<()> {
    Ok(())
}

fn base_finish(_inner: &mut ArenaInner, _id: SegId) -> SegResult<()> {
    Ok(())
}

fn base_set_grey(inner: &mut ArenaInner, id: SegId, grey: TraceSet) -> SegResult<()> {
    let seg = inner
        .segments
        .get_mut(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?;
    seg.grey = grey;
    Ok(())
}

fn base_set_white(inner: &mut ArenaInner, id: SegId, white: TraceSet) -> SegResult<()> {
    let seg = inner
        .segments
        .get_mut(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?;
    let (base, limit, granule) = (seg.base(), seg.limit(), inner.granule);
    seg.white = white;
    inner.tracts.set_white_range(base, limit, granule, white);
    Ok(())
}

fn base_set_rank_set(inner: &mut ArenaInner, id: SegId, rank_set: RankSet) -> SegResult<()> {
    if rank_set != RankSet::EMPTY && rank_set.single().is_none() {
        return Err(SegError::InvalidArgument("rank set must be empty or a singleton"));
    }
    let seg = inner
        .segments
        .get_mut(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?;
    seg.rank_set = rank_set;
    Ok(())
}

fn base_summary(_inner: &ArenaInner, _id: SegId) -> SegResult<RefSet> {
    unreachable!("summary not applicable to this segment class")
}

fn base_set_summary(inner: &mut ArenaInner, id: SegId, _summary: RefSet) -> SegResult<()> {
    not_reached(inner, id)
}

fn base_set_rank_and_summary(
    inner: &mut ArenaInner,
    id: SegId,
    _rank_set: RankSet,
    _summary: RefSet,
) -> SegResult<()> {
    not_reached(inner, id)
}

fn base_buffer(_inner: &ArenaInner, _id: SegId) -> SegResult<Option<BufferId>> {
    unreachable!("buffer not applicable to this segment class")
}

fn base_set_buffer(inner: &mut ArenaInner, id: SegId, _buffer: Option<BufferId>) -> SegResult<()> {
    not_reached(inner, id)
}

fn base_p(_inner: &ArenaInner, _id: SegId) -> SegResult<usize> {
    unreachable!("client slot not applicable to this segment class")
}

fn base_set_p(inner: &mut ArenaInner, id: SegId, _value: usize) -> SegResult<()> {
    not_reached(inner, id)
}

fn base_describe(inner: &ArenaInner, id: SegId, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
    let seg = inner.segments.get(id).expect("unknown segment");
    write!(
        w,
        "Seg {:?} [{:#x}, {:#x}) pool={:?} rank_set={:?} white={:?} grey={:?} pm={:?} sm={:?} depth={}",
        id,
        seg.base(),
        seg.limit(),
        seg.pool(),
        seg.rank_set(),
        seg.white(),
        seg.grey(),
        seg.pm(),
        seg.sm(),
        seg.depth()
    )
}

/// The root segment class: range, colour, rank, and shield bookkeeping with
/// no collector-specific behaviour. Reference-oriented slots (`summary`,
/// `buffer`, `p`) are not reached on this class.
pub static BASE_CLASS: &SegClass = &SegClass {
    name: "Seg",
    superclass: None,
    init: base_init,
    finish: base_finish,
    set_grey: base_set_grey,
    set_white: base_set_white,
    set_rank_set: base_set_rank_set,
    set_summary: base_set_summary,
    set_rank_and_summary: base_set_rank_and_summary,
    summary: base_summary,
    buffer: base_buffer,
    set_buffer: base_set_buffer,
    p: base_p,
    set_p: base_set_p,
    describe: base_describe,
};

fn shield_access_for(rank_set: RankSet, summary: RefSet) -> AccessSet {
    if !rank_set.is_empty() && !summary.is_universal() {
        AccessSet::single(Access::Write)
    } else {
        AccessSet::EMPTY
    }
}

fn apply_write_shield(inner: &mut ArenaInner, id: SegId, was: AccessSet, now: AccessSet) {
    if was == now {
        return;
    }
    let seg = inner.segments.get_mut(id).expect("unknown segment");
    seg.sm = if now.contains(Access::Write) {
        seg.sm.with(Access::Write)
    } else {
        seg.sm.without(Access::Write)
    };
    if now.contains(Access::Write) && !was.contains(Access::Write) {
        inner.shield.raise(id, AccessSet::single(Access::Write));
        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, "write shield raised");
    } else if was.contains(Access::Write) && !now.contains(Access::Write) {
        inner.shield.lower(id, AccessSet::single(Access::Write));
        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, "write shield lowered");
    }
}

fn gc_init(inner: &mut ArenaInner, id: SegId) -> SegResult<()> {
    (BASE_CLASS.init)(inner, id)?;
    let pool = inner.segments.get(id).expect("unknown segment").pool();
    crate::gc_segment::attach_gc_extra(inner, id);

    let ArenaInner { pool_rings, segments, .. } = &mut *inner;
    crate::arena::pool_ring_mut(pool_rings, pool).insert(segments, id, LinkKind::Pool);
    Ok(())
}

fn gc_finish(inner: &mut ArenaInner, id: SegId) -> SegResult<()> {
    let seg = inner.segments.get(id).expect("unknown segment");
    let gc = seg.gc().expect("finish on a non-GC segment");
    assert!(gc.buffer.is_none(), "finishing a segment with an attached buffer");

    let grey_rank = if !seg.grey().is_empty() {
        Some(seg.rank_set().single().expect("grey segment must have a rank"))
    } else {
        None
    };
    let pool = seg.pool();

    if let Some(rank) = grey_rank {
        let ArenaInner { grey_rings, segments, .. } = &mut *inner;
        crate::arena::grey_ring_mut(grey_rings, rank).remove(segments, id, LinkKind::Grey);
    }
    {
        let ArenaInner { pool_rings, segments, .. } = &mut *inner;
        crate::arena::pool_ring_mut(pool_rings, pool).remove(segments, id, LinkKind::Pool);
    }

    (BASE_CLASS.finish)(inner, id)
}

fn gc_set_grey(inner: &mut ArenaInner, id: SegId, grey: TraceSet) -> SegResult<()> {
    let (old_grey, rank_set) = {
        let seg = inner.segments.get(id).ok_or(SegError::InvalidArgument("unknown segment"))?;
        (seg.grey(), seg.rank_set())
    };
    assert!(
        grey.is_empty() || !rank_set.is_empty(),
        "set_grey on an empty rank set"
    );

    (BASE_CLASS.set_grey)(inner, id, grey)?;

    if let Some(rank) = rank_set.single() {
        let ArenaInner { grey_rings, segments, .. } = &mut *inner;
        match (old_grey.is_empty(), grey.is_empty()) {
            (true, false) => crate::arena::grey_ring_mut(grey_rings, rank).insert(segments, id, LinkKind::Grey),
            (false, true) => crate::arena::grey_ring_mut(grey_rings, rank).remove(segments, id, LinkKind::Grey),
            _ => {}
        }
    }

    let flipped = inner.flipped_traces;
    let was_read_shielded = !old_grey.intersect(flipped).is_empty();
    let now_read_shielded = !grey.intersect(flipped).is_empty();
    if now_read_shielded && !was_read_shielded {
        let seg = inner.segments.get_mut(id).unwrap();
        seg.sm = seg.sm.with(Access::Read);
        inner.shield.raise(id, AccessSet::single(Access::Read));
        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, "read shield raised");
    } else if was_read_shielded && !now_read_shielded {
        let seg = inner.segments.get_mut(id).unwrap();
        seg.sm = seg.sm.without(Access::Read);
        inner.shield.lower(id, AccessSet::single(Access::Read));
        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "segment::arena", seg = ?id, "read shield lowered");
    }
    Ok(())
}

fn gc_set_white(inner: &mut ArenaInner, id: SegId, white: TraceSet) -> SegResult<()> {
    (BASE_CLASS.set_white)(inner, id, white)
}

fn gc_set_rank_set(inner: &mut ArenaInner, id: SegId, rank_set: RankSet) -> SegResult<()> {
    let (old_rank, summary) = {
        let seg = inner.segments.get(id).ok_or(SegError::InvalidArgument("unknown segment"))?;
        let gc = seg.gc().expect("set_rank_set on a non-GC segment");
        (seg.rank_set(), gc.summary)
    };
    assert!(
        summary.is_empty(),
        "set_rank_set requires the summary to already be cleared"
    );

    (BASE_CLASS.set_rank_set)(inner, id, rank_set)?;

    match (old_rank.is_empty(), rank_set.is_empty()) {
        (true, false) => apply_write_shield(inner, id, AccessSet::EMPTY, AccessSet::single(Access::Write)),
        (false, true) => apply_write_shield(inner, id, AccessSet::single(Access::Write), AccessSet::EMPTY),
        _ => {}
    }
    Ok(())
}

fn gc_set_summary(inner: &mut ArenaInner, id: SegId, summary: RefSet) -> SegResult<()> {
    let rank_set = inner
        .segments
        .get(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?
        .rank_set();
    assert!(!rank_set.is_empty(), "set_summary requires a non-empty rank set");

    let old_summary = inner.segments.get(id).unwrap().gc().unwrap().summary;
    let was = shield_access_for(rank_set, old_summary);
    {
        let seg = inner.segments.get_mut(id).unwrap();
        seg.gc_mut().unwrap().summary = summary;
    }
    let now = shield_access_for(rank_set, summary);
    apply_write_shield(inner, id, was, now);
    Ok(())
}

fn gc_set_rank_and_summary(
    inner: &mut ArenaInner,
    id: SegId,
    rank_set: RankSet,
    summary: RefSet,
) -> SegResult<()> {
    if rank_set == RankSet::EMPTY {
        assert!(summary.is_empty(), "clearing rank set requires an empty summary");
    }
    let old_rank = inner.segments.get(id).ok_or(SegError::InvalidArgument("unknown segment"))?.rank_set();
    let old_summary = inner.segments.get(id).unwrap().gc().unwrap().summary;
    let was = shield_access_for(old_rank, old_summary);

    (BASE_CLASS.set_rank_set)(inner, id, rank_set)?;
    inner.segments.get_mut(id).unwrap().gc_mut().unwrap().summary = summary;

    let now = shield_access_for(rank_set, summary);
    apply_write_shield(inner, id, was, now);
    Ok(())
}

fn gc_summary(inner: &ArenaInner, id: SegId) -> SegResult<RefSet> {
    Ok(inner
        .segments
        .get(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?
        .gc()
        .expect("summary on a non-GC segment")
        .summary)
}

fn gc_buffer(inner: &ArenaInner, id: SegId) -> SegResult<Option<BufferId>> {
    Ok(inner
        .segments
        .get(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?
        .gc()
        .expect("buffer on a non-GC segment")
        .buffer)
}

fn gc_set_buffer(inner: &mut ArenaInner, id: SegId, buffer: Option<BufferId>) -> SegResult<()> {
    let seg = inner
        .segments
        .get_mut(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?;
    seg.gc_mut().expect("set_buffer on a non-GC segment").buffer = buffer;
    Ok(())
}

fn gc_p(inner: &ArenaInner, id: SegId) -> SegResult<usize> {
    Ok(inner
        .segments
        .get(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?
        .gc()
        .expect("p on a non-GC segment")
        .client_slot)
}

fn gc_set_p(inner: &mut ArenaInner, id: SegId, value: usize) -> SegResult<()> {
    let seg = inner
        .segments
        .get_mut(id)
        .ok_or(SegError::InvalidArgument("unknown segment"))?;
    seg.gc_mut().expect("set_p on a non-GC segment").client_slot = value;
    Ok(())
}

fn gc_describe(inner: &ArenaInner, id: SegId, w: &mut dyn std::fmt::Write) -> std::fmt::Result {
    (BASE_CLASS.describe)(inner, id, w)?;
    let gc = inner.segments.get(id).expect("unknown segment").gc().expect("describe on a non-GC segment");
    write!(w, " summary={:?} buffer={:?}", gc.summary, gc.buffer)
}

/// The garbage-collected segment class: adds summaries, allocation buffers,
/// pool-ring and grey-ring membership, and write-shield bookkeeping on top
/// of [`BASE_CLASS`].
pub static GC_CLASS: &SegClass = &SegClass {
    name: "SegGC",
    superclass: Some(BASE_CLASS),
    init: gc_init,
    finish: gc_finish,
    set_grey: gc_set_grey,
    set_white: gc_set_white,
    set_rank_set: gc_set_rank_set,
    set_summary: gc_set_summary,
    set_rank_and_summary: gc_set_rank_and_summary,
    summary: gc_summary,
    buffer: gc_buffer,
    set_buffer: gc_set_buffer,
    p: gc_p,
    set_p: gc_set_p,
    describe: gc_describe,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_class_refines_base() {
        assert_eq!(GC_CLASS.superclass.unwrap().name, "Seg");
        assert!(BASE_CLASS.superclass.is_none());
    }
}
