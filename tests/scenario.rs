//! End-to-end walk through a segment's full life cycle: allocation, gaining
//! a rank and a summary, the write shield engaging as the summary narrows,
//! going grey for a flipped trace, coming back out of grey, and finally
//! freeing the segment.

use std::sync::Arc;

use seg_core::{
    Access, AccessSet, Arena, GC_CLASS, PoolId, Rank, RankSet, RecordingShield, RefSet, SegId,
    Shield, ShieldCall, TraceId, TraceSet,
};

struct SharedShield(Arc<RecordingShield>);

impl Shield for SharedShield {
    fn raise(&self, seg: SegId, access: AccessSet) {
        self.0.raise(seg, access);
    }
    fn lower(&self, seg: SegId, access: AccessSet) {
        self.0.lower(seg, access);
    }
    fn flush(&self) {
        self.0.flush();
    }
}

#[test]
fn allocate_colour_and_free_lifecycle() {
    let shield = Arc::new(RecordingShield::new());
    let arena = Arena::with_shield(4096, 1 << 20, Box::new(SharedShield(shield.clone())));
    let pool = PoolId(1);

    // 1. Allocate a four-granule GC segment: full tract binding, no rank,
    // no summary, no shield, not grey-ring-attached, pool-ring-attached.
    let id = arena
        .allocate_segment(pool, 4 * 4096, GC_CLASS)
        .expect("allocation should succeed");
    arena.enter(|inner| {
        let seg = inner.segment(id).unwrap();
        assert_eq!(seg.size(), 4 * 4096);
        assert!(seg.rank_set().is_empty());
        assert!(seg.summary().unwrap().is_empty());
        assert!(seg.sm().is_empty());
        assert!(!inner.grey_segments(Rank::Exact).any(|s| s == id));
        assert!(inner.pool_segments(pool).any(|s| s == id));
    });

    // 2. Give it an exact rank and a universal summary: the write shield
    // stays down (universal summary needs no protecting), grey stays empty.
    arena
        .enter(|inner| {
            inner.set_rank_and_summary(id, RankSet::singleton(Rank::Exact), RefSet::UNIVERSAL)
        })
        .unwrap();
    arena.enter(|inner| {
        let seg = inner.segment(id).unwrap();
        assert!(seg.sm().is_empty());
        assert!(seg.grey().is_empty());
        assert!(!inner.grey_segments(Rank::Exact).any(|s| s == id));
    });

    // 3. Narrow the summary to a strict subset of universal: the write
    // shield goes up.
    shield.clear();
    let narrow = RefSet::EMPTY.add_addr(0x1000).add_addr(0x9000);
    arena.enter(|inner| inner.set_summary(id, narrow)).unwrap();
    arena.enter(|inner| assert!(inner.segment(id).unwrap().sm().contains(Access::Write)));
    assert!(shield
        .calls()
        .contains(&ShieldCall::Raise(id, AccessSet::single(Access::Write))));

    // 4. Turn the segment grey for a trace that has already flipped: it
    // joins the rank's grey ring and the read shield comes up alongside the
    // write shield already raised.
    let t0 = TraceId::new(0);
    arena.enter(|inner| inner.set_flipped_traces(TraceSet::singleton(t0)));
    shield.clear();
    arena
        .enter(|inner| inner.set_grey(id, TraceSet::singleton(t0)))
        .unwrap();
    arena.enter(|inner| {
        assert!(inner.grey_segments(Rank::Exact).any(|s| s == id));
        let seg = inner.segment(id).unwrap();
        assert!(seg.sm().contains(Access::Read));
        assert!(seg.sm().contains(Access::Write));
    });
    assert!(shield
        .calls()
        .contains(&ShieldCall::Raise(id, AccessSet::single(Access::Read))));

    // 5. Clear grey: the ring link detaches, the read shield drops, the
    // write shield stays up.
    shield.clear();
    arena.enter(|inner| inner.set_grey(id, TraceSet::EMPTY)).unwrap();
    arena.enter(|inner| {
        assert!(!inner.grey_segments(Rank::Exact).any(|s| s == id));
        let seg = inner.segment(id).unwrap();
        assert!(!seg.sm().contains(Access::Read));
        assert!(seg.sm().contains(Access::Write));
    });
    assert!(shield
        .calls()
        .contains(&ShieldCall::Lower(id, AccessSet::single(Access::Read))));

    // 6. Clear rank and summary together, then free: the write shield
    // drops, and the address range is fully reclaimed with nothing left
    // over on full iteration.
    shield.clear();
    arena
        .enter(|inner| inner.set_rank_and_summary(id, RankSet::EMPTY, RefSet::EMPTY))
        .unwrap();
    arena.enter(|inner| assert!(inner.segment(id).unwrap().sm().is_empty()));
    assert!(shield
        .calls()
        .contains(&ShieldCall::Lower(id, AccessSet::single(Access::Write))));

    let pool_count_before = arena.enter(|inner| inner.pool_segments(pool).count());
    arena.free_segment(id).expect("free should succeed");
    let pool_count_after = arena.enter(|inner| inner.pool_segments(pool).count());

    assert_eq!(pool_count_before, pool_count_after + 1);
    assert!(arena.enter(|inner| inner.first()).is_none());
}
