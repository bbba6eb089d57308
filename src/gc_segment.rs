//! Construction glue for the garbage-collected segment class.
//!
//! Everything behavioural lives in `class.rs`'s `GC_CLASS` vtable; this
//! module just owns the bit of plumbing that has to run before any vtable
//! slot is callable — attaching a fresh [`GcExtra`] to a segment that was
//! allocated with [`crate::class::GC_CLASS`] as its class.

use crate::arena::ArenaInner;
use crate::segment::{GcExtra, SegId};

pub(crate) fn attach_gc_extra(inner: &mut ArenaInner, id: SegId) {
    let seg = inner.segments.get_mut(id).expect("unknown segment");
    debug_assert!(seg.gc().is_none(), "re-attaching gc extra to a live GC segment");
    seg.gc = Some(GcExtra::fresh());
}
