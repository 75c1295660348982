//! # Core Types
//!
//! Strongly typed addresses and handles used across the stack.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::Add;

// =============================================================================
// PAGE GEOMETRY
// =============================================================================

/// Page shift used for shmem backing and the vmap arena
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Number of pages needed to cover `bytes`
#[inline]
pub const fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}

// =============================================================================
// VIRTUAL ADDRESS
// =============================================================================

/// CPU virtual address handed out by a mapping
///
/// It identifies a range inside a vmap arena or a device aperture. It is not
/// dereferenced by this crate.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Null address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Align up to boundary, `None` on overflow
    #[inline]
    pub const fn checked_align_up(self, alignment: u64) -> Option<Self> {
        let mask = alignment - 1;
        match self.0.checked_add(mask) {
            Some(v) => Some(Self(v & !mask)),
            None => None,
        }
    }

    /// Offset by bytes, `None` on overflow
    #[inline]
    pub const fn checked_offset(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Add<u64> for VirtAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// HANDLE TYPES
// =============================================================================

/// Opaque, type-tagged identifier
///
/// The marker only separates id spaces; it places no bounds on `T`.
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a new handle
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Create a null handle
    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Get the raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>(0x{:x})", short_type_name::<T>(), self.id)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = core::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// Marker types for handles
/// Marker for scheduler jobs
pub struct JobMarker;
/// Marker for submission entities
pub struct EntityMarker;
/// Marker for memory objects
pub struct ObjectMarker;

/// Handle to a scheduler job
pub type JobId = Handle<JobMarker>;
/// Handle to a submission entity
pub type EntityId = Handle<EntityMarker>;
/// Handle to a memory object
pub type ObjectId = Handle<ObjectMarker>;

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(VirtAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(JobId: Send, Sync, Copy, Ord);
