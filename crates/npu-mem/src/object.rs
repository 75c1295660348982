//! # Buffer Objects
//!
//! A buffer object either carries a direct mapping capability
//! ([`GemObjectFuncs`]), a shmem backing, or both. The direct capability
//! wins when present.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use npu_core::{Error, ObjectId, Result};

use crate::iosys::IoSysMap;
use crate::shmem::ShmemObject;
use crate::vmap::VmapArena;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Direct per-object mapping capability
pub trait GemObjectFuncs: Send + Sync {
    /// Map `obj` into CPU address space
    fn vmap(&self, obj: &GemObject) -> Result<IoSysMap>;

    /// Undo a mapping produced by `vmap`
    fn vunmap(&self, obj: &GemObject, map: IoSysMap);
}

/// Buffer object
pub struct GemObject {
    id: ObjectId,
    size: usize,
    funcs: Option<Arc<dyn GemObjectFuncs>>,
    shmem: Option<ShmemObject>,
    map_count: AtomicU32,
}

impl GemObject {
    fn build(size: usize, funcs: Option<Arc<dyn GemObjectFuncs>>, shmem: Option<ShmemObject>) -> Self {
        Self {
            id: ObjectId::new(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
            size,
            funcs,
            shmem,
            map_count: AtomicU32::new(0),
        }
    }

    /// Object with no mapping path
    pub fn new(size: usize) -> Self {
        Self::build(size, None, None)
    }

    /// Object mapped through its own capability
    pub fn with_funcs(size: usize, funcs: Arc<dyn GemObjectFuncs>) -> Self {
        Self::build(size, Some(funcs), None)
    }

    /// Object backed by shmem pages mapped through `arena`
    pub fn shmem(size: usize, arena: Arc<VmapArena>) -> Self {
        Self::build(size, None, Some(ShmemObject::new(size, arena)))
    }

    /// Object id
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Direct mapping capability
    pub fn funcs(&self) -> Option<&Arc<dyn GemObjectFuncs>> {
        self.funcs.as_ref()
    }

    /// Shmem backing
    pub fn shmem_backing(&self) -> Option<&ShmemObject> {
        self.shmem.as_ref()
    }

    /// Access the bytes behind a shmem mapping of this object
    ///
    /// Objects with a direct capability own their memory, so for them this
    /// fails with [`Error::NotSupported`].
    pub fn with_mapping<R>(&self, map: &IoSysMap, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        match (&self.funcs, &self.shmem) {
            (None, Some(shmem)) => shmem.with_mapping(map, f),
            _ => Err(Error::NotSupported),
        }
    }

    /// Whether a mapping is outstanding
    pub fn is_mapped(&self) -> bool {
        self.map_count.load(Ordering::Acquire) > 0
    }

    pub(crate) fn mapped(&self) {
        self.map_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unmapped(&self) {
        let balanced = self
            .map_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !balanced {
            log::warn!("gem: object {:?} unmapped more often than mapped", self.id);
        }
    }
}

impl Drop for GemObject {
    fn drop(&mut self) {
        if self.is_mapped() {
            log::warn!("gem: object {:?} destroyed while mapped", self.id);
        }
    }
}

impl fmt::Debug for GemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GemObject")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("direct", &self.funcs.is_some())
            .field("shmem", &self.shmem)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

static_assertions::assert_impl_all!(GemObject: Send, Sync);
