//! # Vmap Arena
//!
//! First-fit allocator for the CPU virtual range that shmem-backed objects
//! are mapped into. Freed ranges are merged with free neighbours.

use alloc::vec::Vec;

use spin::Mutex;

use npu_core::{Error, Result, VirtAddr, PAGE_SIZE};

// =============================================================================
// VIRTUAL RANGE
// =============================================================================

/// Base of the default vmap window
pub const VMAP_BASE: VirtAddr = VirtAddr::new(0xffff_c900_0000_0000);

/// Size of the default vmap window (32 GiB)
pub const VMAP_SIZE: u64 = 32 << 30;

/// Half-open virtual address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaRange {
    /// Start address
    pub start: VirtAddr,
    /// End address (exclusive)
    pub end: VirtAddr,
}

impl VaRange {
    /// Range of `size` bytes at `start`, `None` if it wraps
    pub const fn new(start: VirtAddr, size: u64) -> Option<Self> {
        match start.checked_offset(size) {
            Some(end) => Some(Self { start, end }),
            None => None,
        }
    }

    /// Size in bytes
    pub const fn size(&self) -> u64 {
        self.end.raw() - self.start.raw()
    }

    /// Check if address is in range
    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Check if ranges overlap
    pub fn overlaps(&self, other: &VaRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// =============================================================================
// ARENA
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Block {
    range: VaRange,
    free: bool,
}

/// Arena statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Successful allocations
    pub allocs: u64,
    /// Frees
    pub frees: u64,
    /// Allocations refused for lack of space
    pub failures: u64,
    /// Bytes currently allocated
    pub allocated: u64,
}

#[derive(Debug)]
struct ArenaInner {
    blocks: Vec<Block>,
    stats: ArenaStats,
}

/// Shared vmap arena
#[derive(Debug)]
pub struct VmapArena {
    range: VaRange,
    inner: Mutex<ArenaInner>,
}

impl VmapArena {
    /// Arena managing `range`
    pub fn new(range: VaRange) -> Self {
        Self {
            range,
            inner: Mutex::new(ArenaInner {
                blocks: alloc::vec![Block { range, free: true }],
                stats: ArenaStats::default(),
            }),
        }
    }

    /// Arena over the default vmap window
    pub fn kernel() -> Self {
        let range = VaRange {
            start: VMAP_BASE,
            end: VMAP_BASE + VMAP_SIZE,
        };
        Self::new(range)
    }

    /// Managed range
    pub fn range(&self) -> VaRange {
        self.range
    }

    /// Allocate a page-aligned range of at least `size` bytes
    pub fn allocate(&self, size: u64) -> Result<VaRange> {
        if size == 0 {
            return Err(Error::InvalidParameter);
        }
        let page = PAGE_SIZE as u64;
        let size = size.checked_next_multiple_of(page).ok_or(Error::AddressSpaceExhausted)?;

        let mut inner = self.inner.lock();
        let fit = inner.blocks.iter().enumerate().find_map(|(i, b)| {
            if !b.free {
                return None;
            }
            let start = b.range.start.checked_align_up(page)?;
            let range = VaRange::new(start, size)?;
            (range.end <= b.range.end).then_some((i, range))
        });

        let Some((index, range)) = fit else {
            inner.stats.failures += 1;
            log::warn!("vmap: no free range for {} bytes", size);
            return Err(Error::AddressSpaceExhausted);
        };

        inner.blocks.try_reserve(2).map_err(|_| Error::OutOfMemory)?;
        Self::split(&mut inner.blocks, index, range);
        inner.stats.allocs += 1;
        inner.stats.allocated += size;
        Ok(range)
    }

    fn split(blocks: &mut Vec<Block>, index: usize, alloc: VaRange) {
        let block = blocks[index];
        let mut at = index;
        blocks[at] = Block { range: alloc, free: false };

        if alloc.start > block.range.start {
            let left = VaRange {
                start: block.range.start,
                end: alloc.start,
            };
            blocks.insert(at, Block { range: left, free: true });
            at += 1;
        }
        if alloc.end < block.range.end {
            let right = VaRange {
                start: alloc.end,
                end: block.range.end,
            };
            blocks.insert(at + 1, Block { range: right, free: true });
        }
    }

    /// Return a range obtained from [`allocate`](Self::allocate)
    pub fn free(&self, range: VaRange) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = inner
            .blocks
            .iter()
            .position(|b| b.range == range && !b.free)
            .ok_or(Error::NotFound)?;

        inner.blocks[index].free = true;
        inner.stats.frees += 1;
        inner.stats.allocated -= range.size();

        // merge with free neighbours
        let blocks = &mut inner.blocks;
        if index + 1 < blocks.len() && blocks[index + 1].free {
            blocks[index].range.end = blocks[index + 1].range.end;
            blocks.remove(index + 1);
        }
        if index > 0 && blocks[index - 1].free {
            blocks[index - 1].range.end = blocks[index].range.end;
            blocks.remove(index);
        }
        Ok(())
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ArenaStats {
        self.inner.lock().stats
    }

    /// Total free bytes
    pub fn free_space(&self) -> u64 {
        self.inner
            .lock()
            .blocks
            .iter()
            .filter(|b| b.free)
            .map(|b| b.range.size())
            .sum()
    }

    /// Largest contiguous free range in bytes
    pub fn largest_free(&self) -> u64 {
        self.inner
            .lock()
            .blocks
            .iter()
            .filter(|b| b.free)
            .map(|b| b.range.size())
            .max()
            .unwrap_or(0)
    }
}

static_assertions::assert_impl_all!(VmapArena: Send, Sync);
