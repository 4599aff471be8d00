use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tree::NodeId;

/// One live named allocation. Within a memory space the raw address is the
/// identity: no two live allocations may share a `ptr`.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub name: String,
    pub ptr: u64,
    pub size: u64,
    /// The frame that was open when the allocation happened. Attribution
    /// only, not ownership.
    pub frame: NodeId,
}

/// The currently-live allocation set for one memory space.
///
/// Cloning produces the value-copy snapshots used for high-water-mark
/// reporting; a snapshot is unaffected by later mutation of the live set.
#[derive(Debug, Clone, Default)]
pub struct Allocations {
    total_size: u64,
    live: HashMap<u64, Allocation>,
}

impl Allocations {
    /// Total live bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Record a new allocation. A `ptr` already in the live set means a
    /// double allocate, or an address reuse whose deallocate this tool
    /// never saw; either way the books are broken.
    pub fn allocate(&mut self, name: &str, ptr: u64, size: u64, frame: NodeId) -> Result<()> {
        if self.live.contains_key(&ptr) {
            return Err(Error::DoubleAllocate {
                name: name.to_string(),
                ptr,
                size,
            });
        }
        self.live.insert(
            ptr,
            Allocation {
                name: name.to_string(),
                ptr,
                size,
                frame,
            },
        );
        self.total_size += size;
        Ok(())
    }

    /// Remove a live allocation. The `(name, ptr, size)` triple must match
    /// exactly; a miss is logged with `current_path` (the frame open at
    /// deallocation time, not necessarily the allocating one) and the live
    /// set stays untouched.
    pub fn deallocate(&mut self, name: &str, ptr: u64, size: u64, current_path: &str) {
        match self.live.get(&ptr) {
            Some(entry) if entry.name == name && entry.size == size => {
                self.total_size -= size;
                self.live.remove(&ptr);
            }
            _ => {
                log::warn!(
                    "allocation (\"{name}\", 0x{ptr:x}, {size}), deallocated at \
                     \"{current_path}\", was not in the currently allocated set"
                );
            }
        }
    }

    /// Live entries, largest first (report order; ties by address).
    pub fn sorted_by_size(&self) -> Vec<&Allocation> {
        let mut entries: Vec<&Allocation> = self.live.values().collect();
        entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.ptr.cmp(&b.ptr)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_matching_deallocate_in_any_order_zeroes_the_set() {
        let mut allocs = Allocations::default();
        for i in 0..8u64 {
            allocs
                .allocate(&format!("buf{i}"), 0x1000 + i, 64 + i, NodeId::ROOT)
                .unwrap();
        }
        assert_eq!(allocs.total_size(), (0..8).map(|i| 64 + i).sum::<u64>());

        // Reverse order, exact triples.
        for i in (0..8u64).rev() {
            allocs.deallocate(&format!("buf{i}"), 0x1000 + i, 64 + i, "");
        }
        assert!(allocs.is_empty());
        assert_eq!(allocs.total_size(), 0);
    }

    #[test]
    fn duplicate_pointer_is_rejected() {
        let mut allocs = Allocations::default();
        allocs.allocate("a", 0x10, 8, NodeId::ROOT).unwrap();
        assert!(allocs.allocate("b", 0x10, 16, NodeId::ROOT).is_err());
        // The failed insert changes nothing.
        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs.total_size(), 8);
    }

    #[test]
    fn unmatched_deallocate_leaves_the_set_unchanged() {
        let mut allocs = Allocations::default();
        allocs.allocate("real", 0x20, 32, NodeId::ROOT).unwrap();

        allocs.deallocate("ghost", 0x999, 8, "app/step");
        // Size mismatch on a known pointer is also a miss.
        allocs.deallocate("real", 0x20, 64, "app/step");

        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs.total_size(), 32);
    }

    #[test]
    fn snapshots_are_value_copies() {
        let mut allocs = Allocations::default();
        allocs.allocate("a", 0x1, 100, NodeId::ROOT).unwrap();
        let snapshot = allocs.clone();
        allocs.deallocate("a", 0x1, 100, "");
        assert_eq!(snapshot.total_size(), 100);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn sorted_by_size_is_descending() {
        let mut allocs = Allocations::default();
        allocs.allocate("small", 0x1, 10, NodeId::ROOT).unwrap();
        allocs.allocate("large", 0x2, 1000, NodeId::ROOT).unwrap();
        allocs.allocate("mid", 0x3, 100, NodeId::ROOT).unwrap();
        let sizes: Vec<u64> = allocs.sorted_by_size().iter().map(|a| a.size).collect();
        assert_eq!(sizes, vec![1000, 100, 10]);
    }
}
