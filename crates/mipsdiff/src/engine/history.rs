//! Fixed-size program-counter history.

/// Ring of the last `N` program counters, oldest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcHistory<const N: usize> {
    pcs: [u32; N],
}

impl<const N: usize> PcHistory<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { pcs: [0; N] }
    }

    /// Append `pc`, dropping the oldest entry.
    pub fn push(&mut self, pc: u32) {
        if N == 0 {
            return;
        }
        self.pcs.rotate_left(1);
        self.pcs[N - 1] = pc;
    }

    #[must_use]
    pub const fn as_array(&self) -> [u32; N] {
        self.pcs
    }
}

impl<const N: usize> Default for PcHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}
