//! Small fixed-width set types shared by the segment layer.
//!
//! Each of these is a bitset over a tiny, statically bounded universe, so
//! they're all `Copy`, represented in a single integer, and cheap enough to
//! pass by value on the barrier hot path.

mod access;
mod rank;
mod ref_set;
mod trace;

pub use access::{Access, AccessSet};
pub use rank::{Rank, RankSet, RANK_COUNT};
pub use ref_set::RefSet;
pub use trace::{TraceId, TraceSet, TRACE_LIMIT};
