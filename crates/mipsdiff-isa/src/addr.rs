//! Sets of program-counter addresses.

use rustc_hash::FxHashSet;

/// A configurable set of program-counter addresses.
///
/// Used for the sync whitelist and the boot/exception vector table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet {
    addrs: FxHashSet<u32>,
}

impl AddressSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address. Returns false if it was already present.
    pub fn insert(&mut self, addr: u32) -> bool {
        self.addrs.insert(addr)
    }

    #[must_use]
    pub fn contains(&self, addr: u32) -> bool {
        self.addrs.contains(&addr)
    }

    /// True if any of `pcs` is in the set.
    #[must_use]
    pub fn intersects(&self, pcs: &[u32]) -> bool {
        pcs.iter().any(|pc| self.addrs.contains(pc))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl FromIterator<u32> for AddressSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().collect(),
        }
    }
}

impl From<&[u32]> for AddressSet {
    fn from(addrs: &[u32]) -> Self {
        addrs.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects() {
        let set = AddressSet::from(&[0x8000_58ec, 0x8002_4b7c][..]);
        assert!(set.intersects(&[0, 0x8002_4b7c, 4]));
        assert!(!set.intersects(&[0, 4, 8]));
        assert!(!set.intersects(&[]));
    }

    #[test]
    fn test_collect_dedups() {
        let set: AddressSet = [8, 4, 8, 0].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(0) && set.contains(4) && set.contains(8));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = AddressSet::new();
        assert!(set.is_empty());
        assert!(!set.contains(0));
        assert!(!set.intersects(&[0, 0, 0]));
    }
}
