//! # Shared-Memory Backing
//!
//! Page-array backing for objects without a direct mapping capability.
//! Pages are allocated on the first vmap, placed in the vmap arena, and
//! released when the last mapping goes away.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use bytemuck::{Pod, Zeroable};
use spin::Mutex;

use npu_alloc::{alloc_array, Contiguity};
use npu_core::{pages_for, Error, Result, PAGE_SIZE};

use crate::iosys::IoSysMap;
use crate::vmap::{VaRange, VmapArena};

/// One backing page
#[derive(Clone, Copy)]
#[repr(C, align(4096))]
pub struct Page([u8; PAGE_SIZE]);

// SAFETY: a page of zero bytes is valid
unsafe impl Zeroable for Page {}
// SAFETY: plain bytes, size equals alignment so there is no padding
unsafe impl Pod for Page {}

static_assertions::const_assert_eq!(core::mem::size_of::<Page>(), PAGE_SIZE);

struct ShmemState {
    pages: Option<Box<[Page]>>,
    vmap: Option<VaRange>,
    use_count: u32,
}

/// Shmem-backed object storage
pub struct ShmemObject {
    size: usize,
    arena: Arc<VmapArena>,
    state: Mutex<ShmemState>,
}

impl ShmemObject {
    /// Backing for `size` bytes, mapped through `arena`
    pub fn new(size: usize, arena: Arc<VmapArena>) -> Self {
        Self {
            size,
            arena,
            state: Mutex::new(ShmemState {
                pages: None,
                vmap: None,
                use_count: 0,
            }),
        }
    }

    /// Object size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pages currently allocated
    pub fn resident_pages(&self) -> usize {
        self.state.lock().pages.as_ref().map_or(0, |p| p.len())
    }

    /// Number of live mappings
    pub fn vmap_use_count(&self) -> u32 {
        self.state.lock().use_count
    }

    /// Map the object, allocating pages on first use
    pub fn vmap(&self) -> Result<IoSysMap> {
        let mut state = self.state.lock();

        if let Some(range) = state.vmap {
            state.use_count += 1;
            return Ok(IoSysMap::system(range.start, self.size));
        }

        if self.size == 0 {
            return Err(Error::InvalidParameter);
        }

        let npages = pages_for(self.size);
        let pages = alloc_array::<Page>(npages, Contiguity::Virtual)?;
        let range = self.arena.allocate((npages * PAGE_SIZE) as u64)?;

        log::debug!("shmem: {} pages at {}", npages, range.start);
        state.pages = Some(pages);
        state.vmap = Some(range);
        state.use_count = 1;
        Ok(IoSysMap::system(range.start, self.size))
    }

    /// Access the bytes behind `map`
    ///
    /// `map` must be a live mapping of this object. The backing stays locked
    /// while `f` runs, so `f` must not map or unmap this object.
    pub fn with_mapping<R>(&self, map: &IoSysMap, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut state = self.state.lock();
        if state.vmap.map(|r| r.start) != Some(map.vaddr()) {
            log::warn!("shmem: access through {} which is not mapped", map.vaddr());
            return Err(Error::NotFound);
        }

        let pages = state.pages.as_deref_mut().ok_or(Error::InvalidState)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(pages);
        let len = map.len().min(self.size);
        Ok(f(&mut bytes[..len]))
    }

    /// Drop one mapping; the last one frees the range and the pages
    pub fn vunmap(&self, map: IoSysMap) {
        let mut state = self.state.lock();

        let Some(range) = state.vmap.filter(|r| r.start == map.vaddr()) else {
            log::warn!("shmem: vunmap of {} which is not mapped", map.vaddr());
            return;
        };

        state.use_count -= 1;
        if state.use_count > 0 {
            return;
        }

        state.vmap = None;
        state.pages = None;
        if let Err(e) = self.arena.free(range) {
            log::warn!("shmem: releasing {:?} failed: {}", range, e);
        }
    }
}

impl fmt::Debug for ShmemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ShmemObject")
            .field("size", &self.size)
            .field("vmap", &state.vmap)
            .field("use_count", &state.use_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_core::VirtAddr;

    fn arena(pages: u64) -> Arc<VmapArena> {
        let range = VaRange::new(VirtAddr::new(0x4000_0000), pages * PAGE_SIZE as u64).unwrap();
        Arc::new(VmapArena::new(range))
    }

    #[test]
    fn test_pages_follow_mappings() {
        let arena = arena(8);
        let shmem = ShmemObject::new(3 * PAGE_SIZE + 1, arena.clone());
        assert_eq!(shmem.resident_pages(), 0);

        let first = shmem.vmap().unwrap();
        let second = shmem.vmap().unwrap();
        assert_eq!(first.vaddr(), second.vaddr());
        assert_eq!(first.len(), 3 * PAGE_SIZE + 1);
        assert_eq!(shmem.resident_pages(), 4);
        assert_eq!(shmem.vmap_use_count(), 2);

        shmem.vunmap(first);
        assert_eq!(shmem.resident_pages(), 4);
        shmem.vunmap(second);
        assert_eq!(shmem.resident_pages(), 0);
        assert_eq!(arena.free_space(), 8 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_mappings_share_pages() {
        let shmem = ShmemObject::new(2 * PAGE_SIZE + 16, arena(4));
        let writer = shmem.vmap().unwrap();
        let reader = shmem.vmap().unwrap();

        shmem
            .with_mapping(&writer, |bytes| {
                assert_eq!(bytes.len(), 2 * PAGE_SIZE + 16);
                assert!(bytes.iter().all(|&b| b == 0));
                bytes[0] = 0xa5;
                bytes[PAGE_SIZE] = 0x5a;
                bytes[2 * PAGE_SIZE + 15] = 0xff;
            })
            .unwrap();

        let seen = shmem
            .with_mapping(&reader, |bytes| (bytes[0], bytes[PAGE_SIZE], bytes[2 * PAGE_SIZE + 15]))
            .unwrap();
        assert_eq!(seen, (0xa5, 0x5a, 0xff));

        shmem.vunmap(writer);
        shmem.vunmap(reader);
    }

    #[test]
    fn test_access_requires_live_mapping() {
        let shmem = ShmemObject::new(PAGE_SIZE, arena(2));
        let stray = IoSysMap::system(VirtAddr::new(0xdead_0000), PAGE_SIZE);
        assert_eq!(shmem.with_mapping(&stray, |_| ()).unwrap_err(), Error::NotFound);

        let map = shmem.vmap().unwrap();
        assert_eq!(shmem.with_mapping(&map, |b| b.len()).unwrap(), PAGE_SIZE);
        assert_eq!(shmem.with_mapping(&stray, |_| ()).unwrap_err(), Error::NotFound);

        let stale = IoSysMap::system(map.vaddr(), PAGE_SIZE);
        shmem.vunmap(map);
        assert_eq!(shmem.with_mapping(&stale, |_| ()).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn test_arena_exhaustion_leaves_unmapped() {
        let shmem = ShmemObject::new(4 * PAGE_SIZE, arena(2));
        assert_eq!(shmem.vmap().unwrap_err(), Error::AddressSpaceExhausted);
        assert_eq!(shmem.resident_pages(), 0);
        assert_eq!(shmem.vmap_use_count(), 0);
    }

    #[test]
    fn test_zero_size() {
        let shmem = ShmemObject::new(0, arena(1));
        assert_eq!(shmem.vmap().unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn test_stray_vunmap_ignored() {
        let shmem = ShmemObject::new(PAGE_SIZE, arena(1));
        let map = shmem.vmap().unwrap();
        shmem.vunmap(IoSysMap::system(VirtAddr::new(0xdead_0000), 1));
        assert_eq!(shmem.vmap_use_count(), 1);
        shmem.vunmap(map);
        assert_eq!(shmem.vmap_use_count(), 0);
    }
}
