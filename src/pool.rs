use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use log::debug;
use thiserror::Error;

use crate::region::Region;
use crate::strategy::Strategy;

pub type PoolResult<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Out of memory: requested {requested} bytes, largest free region holds {largest}.")]
    OutOfMemory { requested: u64, largest: u64 },

    #[error("Id {0} is already allocated.")]
    DuplicateId(u64),

    #[error("Id {0} is not allocated.")]
    UnknownId(u64),

    #[error("Invalid size {0}: sizes must be positive.")]
    InvalidSize(u64),

    #[error("Nothing to compact: the pool has no free region.")]
    NoFreeRegion,
}

/// A fixed-size address space partitioned into used regions,
/// each owned by one id, and free regions available to
/// satisfy future requests.
///
/// Two invariants hold after every operation, successful or
/// not: the used and free regions together cover `[0, size)`
/// exactly, with no overlap; and no two free regions touch
/// (adjacent free spans are always coalesced into one).
#[derive(Debug, Clone)]
pub struct Pool {
    /// Total size of the address space, fixed at construction.
    size: u64,
    /// Free regions, keyed by start address and mapped to
    /// their size. The ordering makes first-fit deterministic
    /// (lowest address wins) and gives coalescing its
    /// neighbors through range lookups.
    free: BTreeMap<u64, u64>,
    /// Used regions, keyed by owner id.
    used: HashMap<u64, Region>,
}

impl Pool {
    /// Creates a pool with a single free region spanning the
    /// whole address space.
    pub fn new(size: u64) -> PoolResult<Self> {
        if size == 0 {
            return Err(PoolError::InvalidSize(size));
        }

        Ok(Self {
            size,
            free: BTreeMap::from([(0, size)]),
            used: HashMap::new(),
        })
    }

    /// Allocates `requested` bytes for `id`, choosing the free
    /// region according to `strategy`, and returns the start
    /// address of the allocation.
    pub fn allocate(&mut self, id: u64, requested: u64, strategy: Strategy) -> PoolResult<u64> {
        // Validate before touching anything, so that a failed
        // call leaves the pool exactly as it was.
        if self.used.contains_key(&id) {
            return Err(PoolError::DuplicateId(id));
        }
        if requested == 0 {
            return Err(PoolError::InvalidSize(requested));
        }

        // Consider only the free regions large enough for the
        // request, and let the strategy pick among them. The
        // map iterates in ascending address order, so taking
        // the first extremum breaks ties towards the lowest
        // start address.
        let mut candidates = self
            .free
            .iter()
            .filter(|(_, &size)| size >= requested)
            .map(|(&start, &size)| (start, size));

        let candidate = match strategy {
            Strategy::FirstFit => candidates.next(),
            Strategy::BestFit => candidates.min_by_key(|&(_, size)| size),
            Strategy::WorstFit => candidates.min_by_key(|&(_, size)| Reverse(size)),
        };

        let (start, size) = match candidate {
            Some(found) => found,
            None => {
                return Err(PoolError::OutOfMemory {
                    requested,
                    largest: self.largest_free_block(),
                })
            }
        };

        // Carve the allocation out of the low end of the
        // candidate. If the candidate was larger than the
        // request, the remainder goes back to the free map;
        // if it fit exactly, the whole region changes hands.
        self.free.remove(&start);
        if size > requested {
            self.free.insert(start + requested, size - requested);
        }

        self.used.insert(
            id,
            Region::Used {
                id,
                start,
                size: requested,
            },
        );

        debug!("Allocated {} bytes for id {} at {}", requested, id, start);
        Ok(start)
    }

    /// Releases the region owned by `id` and merges it with
    /// any free neighbor on either side.
    pub fn deallocate(&mut self, id: u64) -> PoolResult<()> {
        let region = self.used.remove(&id).ok_or(PoolError::UnknownId(id))?;

        let mut start = region.start();
        let mut size = region.size();

        // Look for a free region ending exactly where the
        // freed one starts. The free map has no adjacent
        // entries, so there is at most one such neighbor.
        let left = self
            .free
            .range(..start)
            .next_back()
            .map(|(&prev_start, &prev_size)| (prev_start, prev_size));

        if let Some((prev_start, prev_size)) = left {
            if prev_start + prev_size == start {
                self.free.remove(&prev_start);
                start = prev_start;
                size += prev_size;
            }
        }

        // Same on the right: a free region starting exactly at
        // the freed one's end is absorbed too. Together with
        // the left merge this bridges two previously separate
        // free regions into one.
        let end = region.start() + region.size();
        if let Some(next_size) = self.free.get(&end).copied() {
            self.free.remove(&end);
            size += next_size;
        }

        self.free.insert(start, size);

        debug!("Deallocated id {}, free span now [{}, {})", id, start, start + size);
        Ok(())
    }

    /// Slides every used region down to the low end of the
    /// address space, preserving their relative order, and
    /// leaves a single free region covering the tail.
    pub fn compact(&mut self) -> PoolResult<()> {
        if self.free.is_empty() {
            return Err(PoolError::NoFreeRegion);
        }

        let mut regions: Vec<Region> = self.used.values().copied().collect();
        regions.sort_by_key(|region| region.start());

        // Reassign start addresses cumulatively from zero.
        // Ids are untouched; only the placement changes.
        let mut offset = 0;
        for region in regions {
            if let Some(id) = region.owner() {
                self.used.insert(
                    id,
                    Region::Used {
                        id,
                        start: offset,
                        size: region.size(),
                    },
                );
                offset += region.size();
            }
        }

        self.free = BTreeMap::from([(offset, self.size - offset)]);
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.values().map(|region| region.size()).sum()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free.values().sum()
    }

    pub fn largest_free_block(&self) -> u64 {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// How badly the free space is scattered: 0 when one free
    /// region holds all free bytes (or none are free), tending
    /// towards 1 as the largest free region shrinks relative
    /// to the total.
    pub fn fragmentation_ratio(&self) -> f64 {
        let free = self.free_bytes();
        if free == 0 {
            return 0.0;
        }

        1.0 - self.largest_free_block() as f64 / free as f64
    }

    /// Every region of the pool, free and used, in address
    /// order. Since the regions partition the space, the spans
    /// returned here tile `[0, size)` exactly.
    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self
            .free
            .iter()
            .map(|(&start, &size)| Region::Free { start, size })
            .chain(self.used.values().copied())
            .collect();

        regions.sort_by_key(|region| region.start());
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::{Pool, PoolError};
    use crate::strategy::Strategy;

    /// Checks the structural invariants of the pool: the
    /// regions tile the whole address space in order, and no
    /// two free regions touch.
    fn check_invariants(pool: &Pool) {
        let regions = pool.regions();
        assert!(!regions.is_empty());

        let mut expected_start = 0;
        for window in regions.windows(2) {
            assert!(!(window[0].is_free() && window[1].is_free()), "adjacent free regions");
        }
        for region in &regions {
            assert_eq!(region.start(), expected_start, "gap or overlap in partition");
            expected_start = region.end();
        }
        assert_eq!(expected_start, pool.size());
    }

    /// A pool whose free map holds regions of sizes 10, 4 and
    /// 20 (in address order), separated by one-byte used
    /// regions so they cannot coalesce.
    fn pool_with_free_sizes_10_4_20() -> Pool {
        let mut pool = Pool::new(36).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        pool.allocate(100, 1, Strategy::FirstFit).unwrap();
        pool.allocate(2, 4, Strategy::FirstFit).unwrap();
        pool.allocate(101, 1, Strategy::FirstFit).unwrap();
        pool.allocate(3, 20, Strategy::FirstFit).unwrap();
        pool.deallocate(1).unwrap();
        pool.deallocate(2).unwrap();
        pool.deallocate(3).unwrap();

        check_invariants(&pool);
        pool
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(matches!(Pool::new(0), Err(PoolError::InvalidSize(0))));
    }

    #[test]
    fn allocates_at_the_low_end() {
        let mut pool = Pool::new(100).unwrap();
        assert_eq!(pool.allocate(1, 10, Strategy::FirstFit).unwrap(), 0);
        assert_eq!(pool.allocate(2, 80, Strategy::FirstFit).unwrap(), 10);
        assert_eq!(pool.allocate(3, 10, Strategy::FirstFit).unwrap(), 90);
        check_invariants(&pool);
    }

    #[test]
    fn first_fit_takes_the_lowest_address() {
        let mut pool = pool_with_free_sizes_10_4_20();
        assert_eq!(pool.allocate(50, 4, Strategy::FirstFit).unwrap(), 0);
        check_invariants(&pool);
    }

    #[test]
    fn best_fit_takes_the_exact_region() {
        let mut pool = pool_with_free_sizes_10_4_20();
        assert_eq!(pool.allocate(50, 4, Strategy::BestFit).unwrap(), 11);
        check_invariants(&pool);
    }

    #[test]
    fn worst_fit_takes_the_largest_region() {
        let mut pool = pool_with_free_sizes_10_4_20();
        assert_eq!(pool.allocate(50, 4, Strategy::WorstFit).unwrap(), 16);
        check_invariants(&pool);
    }

    #[test]
    fn exact_fit_consumes_the_whole_region() {
        let mut pool = Pool::new(10).unwrap();
        pool.allocate(1, 10, Strategy::BestFit).unwrap();
        assert_eq!(pool.free_bytes(), 0);
        assert_eq!(pool.used_bytes(), 10);
        check_invariants(&pool);
    }

    #[test]
    fn exhausted_pool_rejects_until_freed() {
        let mut pool = Pool::new(10).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();

        assert!(matches!(
            pool.allocate(2, 1, Strategy::FirstFit),
            Err(PoolError::OutOfMemory { requested: 1, largest: 0 })
        ));
        check_invariants(&pool);

        pool.deallocate(1).unwrap();
        assert_eq!(pool.allocate(2, 1, Strategy::FirstFit).unwrap(), 0);
    }

    #[test]
    fn duplicate_id_is_rejected_without_mutation() {
        let mut pool = Pool::new(100).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();

        let before = pool.regions();
        assert!(matches!(
            pool.allocate(1, 5, Strategy::FirstFit),
            Err(PoolError::DuplicateId(1))
        ));
        assert_eq!(pool.regions(), before);
    }

    #[test]
    fn unknown_id_is_rejected_without_mutation() {
        let mut pool = Pool::new(100).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();

        let before = pool.regions();
        assert!(matches!(pool.deallocate(7), Err(PoolError::UnknownId(7))));
        assert_eq!(pool.regions(), before);
    }

    #[test]
    fn zero_sized_request_is_rejected() {
        let mut pool = Pool::new(100).unwrap();
        assert!(matches!(
            pool.allocate(1, 0, Strategy::FirstFit),
            Err(PoolError::InvalidSize(0))
        ));
        check_invariants(&pool);
    }

    #[test]
    fn allocate_then_deallocate_restores_the_free_map() {
        let mut pool = Pool::new(100).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        pool.allocate(2, 20, Strategy::FirstFit).unwrap();
        pool.deallocate(1).unwrap();

        let before = pool.free.clone();
        pool.allocate(5, 7, Strategy::BestFit).unwrap();
        pool.deallocate(5).unwrap();
        assert_eq!(pool.free, before);
        check_invariants(&pool);
    }

    #[test]
    fn coalescing_bridges_across_the_middle_block() {
        let mut pool = Pool::new(30).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        pool.allocate(2, 10, Strategy::FirstFit).unwrap();
        pool.allocate(3, 10, Strategy::FirstFit).unwrap();

        pool.deallocate(1).unwrap();
        check_invariants(&pool);
        pool.deallocate(3).unwrap();
        check_invariants(&pool);
        assert_eq!(pool.free.len(), 2);

        // Freeing the middle block must fuse all three spans
        // into one region covering the whole pool.
        pool.deallocate(2).unwrap();
        check_invariants(&pool);
        assert_eq!(pool.free.len(), 1);
        assert_eq!(pool.free.get(&0), Some(&30));
    }

    #[test]
    fn compact_slides_used_regions_down() {
        let mut pool = Pool::new(100).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        pool.allocate(2, 30, Strategy::FirstFit).unwrap();
        pool.allocate(3, 20, Strategy::FirstFit).unwrap();
        pool.allocate(4, 40, Strategy::FirstFit).unwrap();
        pool.deallocate(1).unwrap();
        pool.deallocate(3).unwrap();

        pool.compact().unwrap();
        check_invariants(&pool);

        let regions = pool.regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].owner(), Some(2));
        assert_eq!(regions[0].start(), 0);
        assert_eq!(regions[1].owner(), Some(4));
        assert_eq!(regions[1].start(), 30);
        assert!(regions[2].is_free());
        assert_eq!(regions[2].size(), 30);
    }

    #[test]
    fn compact_requires_free_space() {
        let mut pool = Pool::new(10).unwrap();
        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        assert!(matches!(pool.compact(), Err(PoolError::NoFreeRegion)));
    }

    #[test]
    fn fragmentation_ratio_tracks_the_largest_block() {
        let mut pool = Pool::new(30).unwrap();
        assert_eq!(pool.fragmentation_ratio(), 0.0);

        pool.allocate(1, 10, Strategy::FirstFit).unwrap();
        pool.allocate(2, 10, Strategy::FirstFit).unwrap();
        pool.deallocate(1).unwrap();

        // Free spans of 10 and 10: the largest holds half the
        // free bytes.
        assert_eq!(pool.fragmentation_ratio(), 0.5);

        pool.allocate(3, 30, Strategy::FirstFit).unwrap_err();
        assert_eq!(pool.free_bytes(), 20);
    }

    #[test]
    fn invariants_hold_across_a_mixed_sequence() {
        let mut pool = Pool::new(1000).unwrap();
        pool.allocate(0, 100, Strategy::FirstFit).unwrap();
        check_invariants(&pool);
        pool.allocate(1, 100, Strategy::FirstFit).unwrap();
        check_invariants(&pool);
        pool.allocate(2, 500, Strategy::FirstFit).unwrap();
        check_invariants(&pool);
        pool.deallocate(1).unwrap();
        check_invariants(&pool);
        pool.allocate(3, 200, Strategy::FirstFit).unwrap();
        check_invariants(&pool);
        pool.deallocate(2).unwrap();
        check_invariants(&pool);

        assert_eq!(pool.fragmentation_ratio(), 1.0 - 600.0 / 700.0);
    }
}
