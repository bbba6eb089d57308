//! # seg-core
//!
//! Segment subsystem for a garbage-collected memory-management engine:
//! colour, rank, summary, and shield bookkeeping layered over arena-aligned
//! address ranges.
//!
//! ## Design
//!
//! - **Arena**: a granule-aligned address range, a tract table mapping
//!   address to owning segment, and a single re-entrant lock every
//!   operation executes under.
//! - **Segment classes**: a small, fixed single-inheritance hierarchy
//!   ([`class::BASE_CLASS`] / [`class::GC_CLASS`]) dispatched through
//!   `'static` function-pointer tables rather than a runtime vtable.
//! - **Rings**: intrusive per-pool and per-rank doubly-linked lists,
//!   addressed by [`segment::SegId`] rather than raw pointers.
//! - **Shield**: a trait abstracting over hardware/OS memory protection,
//!   so the colour and rank mutators can be tested without one.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod arena;
pub mod class;
pub mod error;
pub mod gc_segment;
pub mod ring;
pub mod sets;
pub mod segment;
pub mod shield;
pub mod tract;

pub use arena::{Arena, ArenaInner, ArenaStats};
pub use class::{SegClass, BASE_CLASS, GC_CLASS};
pub use error::{SegError, SegResult};
pub use ring::{LinkKind, Ring, RingLink};
pub use sets::{Access, AccessSet, Rank, RankSet, RefSet, TraceId, TraceSet, TRACE_LIMIT};
pub use segment::{BufferId, GcExtra, SegId, SegStore, Segment};
pub use shield::{RecordingShield, Shield, ShieldCall};
pub use tract::{PoolId, Tract, TractTable};
