//! Intrusive, index-based doubly-linked rings.
//!
//! `spec.md` describes `pool_link`/`grey_link` as classic intrusive list
//! nodes embedded in the segment struct, linked via raw pointers. Rust has
//! no safe analogue of an intrusive pointer-linked list, so this follows the
//! design notes' preferred alternative: segments live in a slab
//! ([`crate::segment::SegStore`]) addressed by [`crate::segment::SegId`],
//! and the "links" are just `Option<SegId>` pairs stored next to the rest of
//! a segment's state. Whether a node is attached is exactly as checkable as
//! with raw pointers — the class layer is responsible for keeping "grey iff
//! ring-attached" true on every transition.

use crate::segment::{SegId, SegStore};

/// One node's previous/next pointers within a ring. `None` in both fields
/// means detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingLink {
    prev: Option<SegId>,
    next: Option<SegId>,
}

impl RingLink {
    /// A freshly constructed, detached link.
    pub const fn detached() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }

    /// Whether this node is currently linked into some ring.
    pub const fn is_attached(self) -> bool {
        self.prev.is_some() || self.next.is_some()
    }
}

/// Which embedded link field a ring operation should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The segment's link into its owning pool's ring.
    Pool,
    /// The segment's link into its rank's grey ring.
    Grey,
}

fn link_mut(store: &mut SegStore, id: SegId, kind: LinkKind) -> &mut RingLink {
    let gc = store
        .get_mut(id)
        .expect("ring operation on unknown segment")
        .gc_mut()
        .expect("ring links only exist on GC segments");
    match kind {
        LinkKind::Pool => &mut gc.pool_link,
        LinkKind::Grey => &mut gc.grey_link,
    }
}

fn link(store: &SegStore, id: SegId, kind: LinkKind) -> RingLink {
    let gc = store
        .get(id)
        .expect("ring operation on unknown segment")
        .gc()
        .expect("ring links only exist on GC segments");
    match kind {
        LinkKind::Pool => gc.pool_link,
        LinkKind::Grey => gc.grey_link,
    }
}

/// A ring (circular doubly-linked list) of segments, identified only by a
/// head pointer — the rest of the topology lives in the segments' own links.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ring {
    head: Option<SegId>,
}

impl Ring {
    /// An empty ring.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Whether the ring has no members.
    pub const fn is_empty(self) -> bool {
        self.head.is_none()
    }

    /// Insert `id` into the ring. `id` must currently be detached.
    pub fn insert(&mut self, store: &mut SegStore, id: SegId, kind: LinkKind) {
        debug_assert!(
            !link(store, id, kind).is_attached(),
            "inserting an already-attached ring node"
        );
        match self.head {
            None => {
                *link_mut(store, id, kind) = RingLink {
                    prev: Some(id),
                    next: Some(id),
                };
                self.head = Some(id);
            }
            Some(head) => {
                let tail = link(store, head, kind).prev.expect("ring node has no prev");
                *link_mut(store, id, kind) = RingLink {
                    prev: Some(tail),
                    next: Some(head),
                };
                link_mut(store, tail, kind).next = Some(id);
                link_mut(store, head, kind).prev = Some(id);
            }
        }
    }

    /// Remove `id` from the ring. `id` must currently be a member.
    pub fn remove(&mut self, store: &mut SegStore, id: SegId, kind: LinkKind) {
        let RingLink { prev, next } = link(store, id, kind);
        let (prev, next) = (
            prev.expect("removing a detached ring node"),
            next.expect("removing a detached ring node"),
        );
        if prev == id {
            // Sole member.
            self.head = None;
        } else {
            link_mut(store, prev, kind).next = Some(next);
            link_mut(store, next, kind).prev = Some(prev);
            if self.head == Some(id) {
                self.head = Some(next);
            }
        }
        *link_mut(store, id, kind) = RingLink::detached();
    }

    /// Iterate the members of the ring in link order, starting at the head.
    pub fn iter<'a>(&self, store: &'a SegStore, kind: LinkKind) -> RingIter<'a> {
        RingIter {
            store,
            kind,
            start: self.head,
            current: self.head,
            done: self.head.is_none(),
        }
    }
}

/// Iterator over a [`Ring`]'s members.
pub struct RingIter<'a> {
    store: &'a SegStore,
    kind: LinkKind,
    start: Option<SegId>,
    current: Option<SegId>,
    done: bool,
}

impl Iterator for RingIter<'_> {
    type Item = SegId;

    fn next(&mut self) -> Option<SegId> {
        if self.done {
            return None;
        }
        let id = self.current?;
        let next = link(self.store, id, self.kind).next;
        self.current = next;
        if next == self.start {
            self.done = true;
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::GC_CLASS;
    use crate::segment::Segment;

    fn fresh_gc_seg(store: &mut SegStore) -> SegId {
        store.insert(Segment::new_for_test(GC_CLASS, true))
    }

    #[test]
    fn insert_then_remove_empties_ring() {
        let mut store = SegStore::new();
        let mut ring = Ring::new();
        let a = fresh_gc_seg(&mut store);

        ring.insert(&mut store, a, LinkKind::Grey);
        assert!(!ring.is_empty());
        assert!(link(&store, a, LinkKind::Grey).is_attached());

        ring.remove(&mut store, a, LinkKind::Grey);
        assert!(ring.is_empty());
        assert!(!link(&store, a, LinkKind::Grey).is_attached());
    }

    #[test]
    fn iterates_all_members_in_order() {
        let mut store = SegStore::new();
        let mut ring = Ring::new();
        let ids: Vec<_> = (0..4).map(|_| fresh_gc_seg(&mut store)).collect();
        for &id in &ids {
            ring.insert(&mut store, id, LinkKind::Pool);
        }

        let seen: Vec<_> = ring.iter(&store, LinkKind::Pool).collect();
        assert_eq!(seen.len(), ids.len());
        for id in ids {
            assert!(seen.contains(&id));
        }
    }

    #[test]
    fn remove_middle_preserves_rest() {
        let mut store = SegStore::new();
        let mut ring = Ring::new();
        let a = fresh_gc_seg(&mut store);
        let b = fresh_gc_seg(&mut store);
        let c = fresh_gc_seg(&mut store);
        for id in [a, b, c] {
            ring.insert(&mut store, id, LinkKind::Pool);
        }

        ring.remove(&mut store, b, LinkKind::Pool);
        let seen: Vec<_> = ring.iter(&store, LinkKind::Pool).collect();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&a));
        assert!(seen.contains(&c));
        assert!(!seen.contains(&b));
    }
}
