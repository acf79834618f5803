// Offset allocator shared by the collision and grid encoders.
//
// Encoding is two-pass: walk the object graph once reserving a byte range
// for every node, then emit each record and patch in the reserved offsets
// of the nodes it references. Two structurally identical nodes (say, two
// equal sparse heightmap cells) are still distinct records in the file, so
// reservations are keyed by a synthetic per-node id minted at first
// encounter, never by value.

use std::collections::BTreeMap;

/// Stable identity of one node in the graph being encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Default)]
pub struct LayoutAllocator {
    next_id: u32,
    cursor: usize,
    reservations: BTreeMap<NodeId, usize>,
}

impl LayoutAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start allocating after a fixed-size header.
    pub fn with_header(header_len: usize) -> Self {
        LayoutAllocator { next_id: 0, cursor: header_len, reservations: BTreeMap::new() }
    }

    /// Mint a fresh node id.
    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Round the cursor up to a multiple of `align`.
    pub fn align_to(&mut self, align: usize) {
        debug_assert!(align.is_power_of_two());
        self.cursor = (self.cursor + align - 1) & !(align - 1);
    }

    /// Reserve `size` bytes for `id` at the current cursor.
    pub fn reserve(&mut self, id: NodeId, size: usize) -> usize {
        let offset = self.cursor;
        let previous = self.reservations.insert(id, offset);
        assert!(previous.is_none(), "node {:?} reserved twice", id);
        self.cursor += size;
        offset
    }

    /// Reserve a byte range nobody needs to reference (padding, tables
    /// addressed relative to a parent record).
    pub fn skip(&mut self, size: usize) -> usize {
        let offset = self.cursor;
        self.cursor += size;
        offset
    }

    /// Resolve a node's reserved offset. A miss means the encoder is
    /// emitting a reference to a node it never laid out, which is a
    /// construction bug (e.g. a boundary referencing an object it does not
    /// belong to), so this asserts.
    pub fn offset_of(&self, id: NodeId) -> usize {
        *self
            .reservations
            .get(&id)
            .unwrap_or_else(|| panic!("no reservation for node {:?}", id))
    }

    /// Total laid-out length, padded up to `align`.
    pub fn finish(mut self, align: usize) -> usize {
        self.align_to(align);
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_reservation() {
        let mut alloc = LayoutAllocator::with_header(0x10);
        let a = alloc.node();
        let b = alloc.node();

        alloc.align_to(0x10);
        assert_eq!(alloc.reserve(a, 0x60), 0x10);
        alloc.skip(4);
        alloc.align_to(0x10);
        assert_eq!(alloc.reserve(b, 0x70), 0x80);

        assert_eq!(alloc.offset_of(a), 0x10);
        assert_eq!(alloc.offset_of(b), 0x80);
        assert_eq!(alloc.finish(0x10), 0xF0);
    }

    #[test]
    #[should_panic(expected = "no reservation")]
    fn test_unreserved_lookup_panics() {
        let mut alloc = LayoutAllocator::new();
        let id = alloc.node();
        alloc.offset_of(id);
    }

    #[test]
    fn test_identity_keying() {
        // Two nodes with identical payloads still get distinct ranges.
        let mut alloc = LayoutAllocator::new();
        let a = alloc.node();
        let b = alloc.node();
        let off_a = alloc.reserve(a, 8);
        let off_b = alloc.reserve(b, 8);
        assert_ne!(off_a, off_b);
    }
}
