use std::fmt;

/// One contiguous span of the pool's address space. A region
/// is either free or owned by exactly one id; the two cases
/// are separate variants, so a used region without an owner
/// (or a free region carrying a stale one) cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Unallocated span, available to satisfy requests.
    Free { start: u64, size: u64 },
    /// Span owned by the caller-supplied id.
    Used { id: u64, start: u64, size: u64 },
}

impl Region {
    pub fn start(&self) -> u64 {
        match *self {
            Region::Free { start, .. } => start,
            Region::Used { start, .. } => start,
        }
    }

    pub fn size(&self) -> u64 {
        match *self {
            Region::Free { size, .. } => size,
            Region::Used { size, .. } => size,
        }
    }

    /// Exclusive upper bound of the span, used for adjacency
    /// tests: two regions touch when one's end is the other's
    /// start.
    pub fn end(&self) -> u64 {
        self.start() + self.size()
    }

    /// The id owning this region, if any.
    pub fn owner(&self) -> Option<u64> {
        match *self {
            Region::Free { .. } => None,
            Region::Used { id, .. } => Some(id),
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Region::Free { .. })
    }

    /// Alias of [`is_free`](Self::is_free), kept for parity
    /// with older drivers of the simulator.
    pub fn is_empty(&self) -> bool {
        self.is_free()
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    pub fn is_adjacent_to(&self, other: &Region) -> bool {
        self.end() == other.start() || other.end() == self.start()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Region::Free { .. } => write!(f, "{};{}", self.start(), self.end()),
            Region::Used { id, .. } => write!(f, "{};{};{}", id, self.start(), self.end()),
        }
    }
}
