//! Mapping descriptor returned by both mapping paths.

use core::fmt;

use npu_core::VirtAddr;

/// CPU mapping of a buffer object
///
/// Not `Clone`: each successful map yields one descriptor, and unmapping
/// consumes it.
#[must_use = "a mapping must be passed back to unmap_object"]
pub struct IoSysMap {
    vaddr: VirtAddr,
    len: usize,
    is_iomem: bool,
}

impl IoSysMap {
    /// Empty descriptor
    pub const fn null() -> Self {
        Self {
            vaddr: VirtAddr::null(),
            len: 0,
            is_iomem: false,
        }
    }

    /// System-memory mapping
    pub const fn system(vaddr: VirtAddr, len: usize) -> Self {
        Self {
            vaddr,
            len,
            is_iomem: false,
        }
    }

    /// I/O-memory mapping
    pub const fn iomem(vaddr: VirtAddr, len: usize) -> Self {
        Self {
            vaddr,
            len,
            is_iomem: true,
        }
    }

    /// Start address
    pub const fn vaddr(&self) -> VirtAddr {
        self.vaddr
    }

    /// Length in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping covers no bytes
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the address lives in I/O memory
    pub const fn is_iomem(&self) -> bool {
        self.is_iomem
    }

    /// Whether an address is set
    pub const fn is_set(&self) -> bool {
        !self.vaddr.is_null()
    }

    /// Whether the descriptor describes a usable mapping
    pub const fn is_valid(&self) -> bool {
        self.is_set() && self.len != 0
    }
}

impl fmt::Debug for IoSysMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSysMap")
            .field("vaddr", &self.vaddr)
            .field("len", &self.len)
            .field("is_iomem", &self.is_iomem)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(!IoSysMap::null().is_valid());
        assert!(!IoSysMap::system(VirtAddr::new(0x1000), 0).is_valid());
        assert!(IoSysMap::system(VirtAddr::new(0x1000), 16).is_valid());

        let io = IoSysMap::iomem(VirtAddr::new(0x2000), 8);
        assert!(io.is_iomem());
        assert!(io.is_set());
    }
}
