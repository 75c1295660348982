//! # Mapping Adapter
//!
//! One map/unmap pair for every buffer object. Callers get the same
//! descriptor shape whether the object mapped itself or went through its
//! shmem backing.

use npu_core::{Error, MapError};

use crate::iosys::IoSysMap;
use crate::object::GemObject;

/// Map `obj` into CPU address space
///
/// The object's own capability is used when present, otherwise its shmem
/// backing. On failure the object stays unmapped.
pub fn map_object(obj: &GemObject) -> Result<IoSysMap, MapError> {
    if obj.is_mapped() {
        log::debug!("gem: object {:?} mapped again", obj.id());
    }

    let map = if let Some(funcs) = obj.funcs() {
        let map = funcs.vmap(obj).map_err(MapError::Failed)?;
        if !map.is_valid() {
            funcs.vunmap(obj, map);
            return Err(MapError::Failed(Error::MappingFailed));
        }
        map
    } else if let Some(shmem) = obj.shmem_backing() {
        shmem.vmap().map_err(MapError::Failed)?
    } else {
        log::warn!("gem: object {:?} has no mapping path", obj.id());
        return Err(MapError::NoMappingPath);
    };

    obj.mapped();
    log::debug!("gem: object {:?} mapped at {} ({} bytes)", obj.id(), map.vaddr(), map.len());
    Ok(map)
}

/// Undo a mapping returned by [`map_object`] for the same object
pub fn unmap_object(obj: &GemObject, map: IoSysMap) {
    if let Some(funcs) = obj.funcs() {
        funcs.vunmap(obj, map);
    } else if let Some(shmem) = obj.shmem_backing() {
        shmem.vunmap(map);
    } else {
        log::warn!("gem: unmap of object {:?} with no mapping path", obj.id());
        return;
    }
    obj.unmapped();
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};

    use npu_core::{Result, VirtAddr, PAGE_SIZE};

    use crate::object::GemObjectFuncs;
    use crate::vmap::{VaRange, VmapArena};

    #[derive(Default)]
    struct Aperture {
        maps: AtomicU32,
        unmaps: AtomicU32,
        broken: bool,
    }

    impl GemObjectFuncs for Aperture {
        fn vmap(&self, obj: &GemObject) -> Result<IoSysMap> {
            self.maps.fetch_add(1, Ordering::Relaxed);
            if self.broken {
                return Ok(IoSysMap::null());
            }
            Ok(IoSysMap::iomem(VirtAddr::new(0xe000_0000), obj.size()))
        }

        fn vunmap(&self, _obj: &GemObject, _map: IoSysMap) {
            self.unmaps.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn arena(pages: u64) -> Arc<VmapArena> {
        let range = VaRange::new(VirtAddr::new(0x8000_0000), pages * PAGE_SIZE as u64).unwrap();
        Arc::new(VmapArena::new(range))
    }

    #[test]
    fn test_shmem_fallback() {
        let arena = arena(16);
        let obj = GemObject::shmem(3 * PAGE_SIZE, arena.clone());

        let map = map_object(&obj).unwrap();
        assert!(map.is_valid());
        assert!(!map.is_iomem());
        assert_eq!(map.len(), 3 * PAGE_SIZE);
        assert!(obj.is_mapped());
        assert!(arena.range().contains(map.vaddr()));

        unmap_object(&obj, map);
        assert!(!obj.is_mapped());
        assert_eq!(arena.free_space(), 16 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_direct_path_preferred() {
        let aperture = Arc::new(Aperture::default());
        let obj = GemObject::with_funcs(4096, aperture.clone());

        let map = map_object(&obj).unwrap();
        assert!(map.is_valid());
        assert!(map.is_iomem());
        assert_eq!(map.len(), 4096);

        unmap_object(&obj, map);
        assert_eq!(aperture.maps.load(Ordering::Relaxed), 1);
        assert_eq!(aperture.unmaps.load(Ordering::Relaxed), 1);
        assert!(!obj.is_mapped());
    }

    #[test]
    fn test_no_mapping_path() {
        let obj = GemObject::new(4096);
        assert_eq!(map_object(&obj).unwrap_err(), MapError::NoMappingPath);
        assert!(!obj.is_mapped());
    }

    #[test]
    fn test_exhaustion_is_map_error() {
        let arena = arena(2);
        let obj = GemObject::shmem(4 * PAGE_SIZE, arena.clone());

        let err = map_object(&obj).unwrap_err();
        assert_eq!(err, MapError::Failed(Error::AddressSpaceExhausted));
        assert!(!obj.is_mapped());
        assert_eq!(arena.stats().allocated, 0);
    }

    #[test]
    fn test_invalid_direct_mapping_rejected() {
        let aperture = Arc::new(Aperture {
            broken: true,
            ..Aperture::default()
        });
        let obj = GemObject::with_funcs(4096, aperture.clone());

        assert_eq!(map_object(&obj).unwrap_err(), MapError::Failed(Error::MappingFailed));
        assert_eq!(aperture.unmaps.load(Ordering::Relaxed), 1);
        assert!(!obj.is_mapped());
    }

    #[test]
    fn test_distinct_objects_share_arena() {
        let arena = arena(4);
        let a = GemObject::shmem(PAGE_SIZE, arena.clone());
        let b = GemObject::shmem(PAGE_SIZE, arena.clone());

        let ma = map_object(&a).unwrap();
        let mb = map_object(&b).unwrap();
        assert_ne!(ma.vaddr(), mb.vaddr());

        unmap_object(&a, ma);
        unmap_object(&b, mb);
        assert_eq!(arena.stats().allocs, 2);
        assert_eq!(arena.stats().frees, 2);
    }
}
