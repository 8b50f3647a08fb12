//! Time binning and the fixed-capacity table of resident bins.
//!
//! Raw timestamps are discretized with `floor(timestamp / bin_width)`. Each
//! resident bin owns one physical slot of an arena sized to the history
//! capacity; sample data for every source lives at the same slot index, so
//! admitting or evicting a bin never moves data around.

use std::collections::HashMap;

/// Integer bin identifier.
pub type BinId = i64;

/// Maps raw timestamps to bin identifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBinIndex {
    bin_width: f64,
}

impl TimeBinIndex {
    /// Create an index with the given bin width (seconds, must be positive).
    pub fn new(bin_width: f64) -> Self {
        Self { bin_width }
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Bin identifier of a timestamp.
    ///
    /// A timestamp exactly on a boundary belongs to the bin that starts there.
    pub fn bin_of(&self, timestamp: f64) -> BinId {
        (timestamp / self.bin_width).floor() as BinId
    }
}

/// Bookkeeping for one resident bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSlot {
    /// Bin identifier
    pub id: BinId,
    /// Most recently observed raw timestamp that mapped into this bin
    pub timestamp: f64,
    /// Admission order, used to break timestamp ties on eviction
    pub seq: u64,
}

/// Result of admitting a previously unseen bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    /// Physical slot now holding the bin
    pub slot: usize,
    /// Bin that was evicted to make room, if the table was full
    pub evicted: Option<BinSlot>,
}

/// Fixed-capacity table of resident bins.
#[derive(Debug, Clone)]
pub struct BinTable {
    slots: Vec<Option<BinSlot>>,
    index: HashMap<BinId, usize>,
    free: Vec<usize>,
    next_seq: u64,
}

impl BinTable {
    /// Create an empty table with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            index: HashMap::with_capacity(capacity),
            // Popped from the back, so slot 0 is handed out first.
            free: (0..capacity).rev().collect(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of resident bins.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn contains(&self, id: BinId) -> bool {
        self.index.contains_key(&id)
    }

    /// Physical slot of a resident bin.
    pub fn slot_of(&self, id: BinId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, slot: usize) -> Option<&BinSlot> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    /// The eviction candidate: smallest timestamp, earliest admission on ties.
    pub fn oldest(&self) -> Option<(usize, BinSlot)> {
        self.iter().min_by(|(_, a), (_, b)| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.seq.cmp(&b.seq))
        })
    }

    /// Admit a bin that is not yet resident.
    ///
    /// When the table is full the oldest bin is evicted and its slot reused.
    /// Admitting a bin that is already resident returns its current slot.
    pub fn admit(&mut self, id: BinId, timestamp: f64) -> Admission {
        if let Some(slot) = self.slot_of(id) {
            self.touch(slot, timestamp);
            return Admission {
                slot,
                evicted: None,
            };
        }

        let mut evicted = None;
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                // Capacity is never zero, so a full table has an oldest bin.
                let (slot, old) = self.oldest().expect("full bin table is non-empty");
                self.index.remove(&old.id);
                self.slots[slot] = None;
                evicted = Some(old);
                slot
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[slot] = Some(BinSlot { id, timestamp, seq });
        self.index.insert(id, slot);

        Admission { slot, evicted }
    }

    /// Record a newer observation for a resident slot.
    pub fn touch(&mut self, slot: usize, timestamp: f64) {
        if let Some(Some(entry)) = self.slots.get_mut(slot) {
            if timestamp > entry.timestamp {
                entry.timestamp = timestamp;
            }
        }
    }

    /// Drop the bin held in `slot`.
    pub fn remove(&mut self, slot: usize) -> Option<BinSlot> {
        let removed = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&removed.id);
        self.free.push(slot);
        Some(removed)
    }

    /// Resident bins in arbitrary (physical) order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, BinSlot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.map(|e| (slot, e)))
    }

    /// Resident bins ascending by timestamp (admission order on ties).
    pub fn sorted(&self) -> Vec<(usize, BinSlot)> {
        let mut bins: Vec<(usize, BinSlot)> = self.iter().collect();
        bins.sort_by(|(_, a), (_, b)| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_of_boundaries() {
        let index = TimeBinIndex::new(1.0);
        assert_eq!(index.bin_of(0.0), 0);
        assert_eq!(index.bin_of(0.999), 0);
        assert_eq!(index.bin_of(1.0), 1);
        assert_eq!(index.bin_of(3.4), 3);
        assert_eq!(index.bin_of(-0.5), -1);

        let half = TimeBinIndex::new(0.5);
        assert_eq!(half.bin_of(1.0), 2);
        assert_eq!(half.bin_of(1.49), 2);
        assert_eq!(half.bin_of(1.5), 3);
    }

    #[test]
    fn test_bin_of_wide_bins() {
        let index = TimeBinIndex::new(60.0);
        assert_eq!(index.bin_of(1_700_000_000.0), 28_333_333);
        assert_eq!(index.bin_of(1_700_000_039.9), 28_333_333);
        assert_eq!(index.bin_of(1_700_000_040.0), 28_333_334);
    }

    #[test]
    fn test_admit_until_full() {
        let mut table = BinTable::new(2);
        let a = table.admit(10, 10.5);
        let b = table.admit(11, 11.5);

        assert_eq!(a.slot, 0);
        assert_eq!(b.slot, 1);
        assert!(a.evicted.is_none() && b.evicted.is_none());
        assert!(table.is_full());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_eviction_reuses_oldest_slot() {
        let mut table = BinTable::new(2);
        table.admit(10, 10.5);
        table.admit(11, 11.5);

        let admission = table.admit(12, 12.5);
        assert_eq!(admission.slot, 0);
        assert_eq!(admission.evicted.map(|e| e.id), Some(10));
        assert!(!table.contains(10));
        assert!(table.contains(12));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_eviction_tie_breaks_on_admission_order() {
        let mut table = BinTable::new(2);
        table.admit(1, 5.0);
        table.admit(2, 5.0);

        let admission = table.admit(3, 6.0);
        assert_eq!(admission.evicted.map(|e| e.id), Some(1));
    }

    #[test]
    fn test_touch_keeps_latest_timestamp() {
        let mut table = BinTable::new(1);
        let slot = table.admit(4, 4.2).slot;

        table.touch(slot, 4.7);
        assert_eq!(table.get(slot).map(|b| b.timestamp), Some(4.7));

        table.touch(slot, 4.1);
        assert_eq!(table.get(slot).map(|b| b.timestamp), Some(4.7));
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut table = BinTable::new(2);
        table.admit(1, 1.0);
        let slot = table.admit(2, 2.0).slot;

        let removed = table.remove(slot);
        assert_eq!(removed.map(|b| b.id), Some(2));
        assert!(!table.contains(2));
        assert!(!table.is_full());
        assert_eq!(table.admit(3, 3.0).slot, slot);
        assert!(table.remove(99).is_none());
    }

    #[test]
    fn test_sorted_orders_by_timestamp() {
        let mut table = BinTable::new(3);
        table.admit(1, 1.0);
        table.admit(2, 2.0);
        table.admit(3, 3.0);
        table.admit(4, 4.0);
        table.admit(0, 0.5);

        // The physical order is scrambled by slot reuse; sorting is by time.
        let ids: Vec<BinId> = table.sorted().iter().map(|(_, b)| b.id).collect();
        assert_eq!(ids, vec![0, 3, 4]);
    }
}
