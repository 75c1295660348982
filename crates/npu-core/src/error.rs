//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - [`Error`] is the vocabulary of the underlying platform (scheduler engine,
//!   mapping backends). It is what both platform revisions report.
//! - [`OutOfMemory`], [`InitError`], [`AdmissionError`] and [`MapError`] are
//!   what the adapters surface. Each one carries the platform failure
//!   unchanged in kind; none of them is ever downgraded to success.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Platform result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// PLATFORM ERROR
// =============================================================================

/// Failure reported by the underlying platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid parameter provided
    InvalidParameter,
    /// Out of system memory
    OutOfMemory,
    /// A resource with the same identity already exists
    AlreadyExists,
    /// Resource not found
    NotFound,
    /// Object is not in a state that allows the operation
    InvalidState,
    /// Operation not supported by this object
    NotSupported,
    /// Job credit cost is above the scheduler's credit limit
    CreditLimitExceeded,
    /// No free virtual range large enough for the mapping
    AddressSpaceExhausted,
    /// Backend failed to establish a mapping
    MappingFailed,
    /// Device was reported lost by a timeout handler
    DeviceLost,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::AlreadyExists => write!(f, "resource already exists"),
            Self::NotFound => write!(f, "resource not found"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::CreditLimitExceeded => write!(f, "credit limit exceeded"),
            Self::AddressSpaceExhausted => write!(f, "address space exhausted"),
            Self::MappingFailed => write!(f, "mapping failed"),
            Self::DeviceLost => write!(f, "device lost"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// =============================================================================
// ALLOCATION FAILURE
// =============================================================================

/// Allocation helper failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfMemory {
    /// Size computation overflowed; nothing was allocated
    SizeOverflow,
    /// The backing allocator could not provide `size` bytes
    Exhausted {
        /// Requested size in bytes
        size: usize,
    },
}

impl OutOfMemory {
    /// Whether the failure came from size arithmetic rather than the allocator
    pub const fn is_overflow(&self) -> bool {
        matches!(self, Self::SizeOverflow)
    }
}

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOverflow => write!(f, "out of memory: allocation size overflows"),
            Self::Exhausted { size } => write!(f, "out of memory: {} bytes unavailable", size),
        }
    }
}

impl From<OutOfMemory> for Error {
    fn from(_: OutOfMemory) -> Self {
        Error::OutOfMemory
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfMemory {}

// =============================================================================
// SCHEDULER INIT FAILURE
// =============================================================================

/// Scheduler construction rejected by the underlying platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitError(pub Error);

impl InitError {
    /// Platform failure behind this error
    pub const fn cause(&self) -> Error {
        self.0
    }
}

impl From<Error> for InitError {
    fn from(e: Error) -> Self {
        InitError(e)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler init failed: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InitError {}

// =============================================================================
// JOB ADMISSION FAILURE
// =============================================================================

/// Job admission failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// Job cost is above the scheduler's configured credit limit
    CreditsExceeded {
        /// Requested credit cost
        credits: u32,
        /// Scheduler credit limit
        limit: u32,
    },
    /// Underlying job initialization failed
    Platform(Error),
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreditsExceeded { credits, limit } => {
                write!(f, "job needs {} credits, scheduler limit is {}", credits, limit)
            },
            Self::Platform(e) => write!(f, "job init failed: {}", e),
        }
    }
}

impl From<Error> for AdmissionError {
    fn from(e: Error) -> Self {
        AdmissionError::Platform(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AdmissionError {}

// =============================================================================
// MAPPING FAILURE
// =============================================================================

/// Buffer mapping failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Object has neither a direct mapping capability nor a shmem backing
    NoMappingPath,
    /// The chosen mapping path reported a failure
    Failed(Error),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMappingPath => write!(f, "object has no mapping path"),
            Self::Failed(e) => write!(f, "mapping failed: {}", e),
        }
    }
}

impl From<Error> for MapError {
    fn from(e: Error) -> Self {
        MapError::Failed(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MapError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_errors_keep_platform_kind() {
        let init: InitError = Error::InvalidParameter.into();
        assert_eq!(init.cause(), Error::InvalidParameter);

        let admit: AdmissionError = Error::OutOfMemory.into();
        assert_eq!(admit, AdmissionError::Platform(Error::OutOfMemory));

        let map: MapError = Error::AddressSpaceExhausted.into();
        assert_eq!(map, MapError::Failed(Error::AddressSpaceExhausted));
    }

    #[test]
    fn test_oom_overflow_is_distinguishable() {
        assert!(OutOfMemory::SizeOverflow.is_overflow());
        assert!(!OutOfMemory::Exhausted { size: 64 }.is_overflow());
        assert_eq!(Error::from(OutOfMemory::SizeOverflow), Error::OutOfMemory);
    }
}
