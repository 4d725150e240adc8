// Pluggable region allocators.
//
// A queue needs two regions: the ring itself and the session (peer tables).
// An allocator hands out both, either on the process heap or as named
// shared-memory files another process can attach to.

use crate::Core::SharedMemory::{self, HeapRegion, SharedMemoryBackend};
use std::io;

/// Which of a queue's two regions is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Queue header plus the data band
    Ring,
    /// Session header plus producer/consumer slot tables
    Session,
}

impl RegionKind {
    fn suffix(self) -> &'static str {
        match self {
            RegionKind::Ring => "ring",
            RegionKind::Session => "sess",
        }
    }
}

/// Source of contiguous byte regions for a queue.
pub trait RegionAllocator {
    /// Create a fresh zeroed region of `size` bytes.
    fn allocate(&self, kind: RegionKind, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>>;

    /// Open a region created earlier by another handle or process.
    fn attach(&self, kind: RegionKind) -> io::Result<Box<dyn SharedMemoryBackend>>;

    /// True if regions from this allocator are visible to other processes.
    fn is_shared(&self) -> bool;
}

/// Regions on the process heap. Cannot be attached to.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl RegionAllocator for HeapAllocator {
    fn allocate(&self, _kind: RegionKind, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
        Ok(Box::new(HeapRegion::new(size)?))
    }

    fn attach(&self, kind: RegionKind) -> io::Result<Box<dyn SharedMemoryBackend>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("heap {} region cannot be attached", kind.suffix()),
        ))
    }

    fn is_shared(&self) -> bool {
        false
    }
}

/// Named `/dev/shm` regions: `rq_<name>_ring` and `rq_<name>_sess`.
#[derive(Debug, Clone)]
pub struct SharedMemoryAllocator {
    name: String,
}

impl SharedMemoryAllocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name under `/dev/shm` used for `kind`.
    pub fn region_name(&self, kind: RegionKind) -> String {
        format!("rq_{}_{}", self.name, kind.suffix())
    }
}

impl RegionAllocator for SharedMemoryAllocator {
    fn allocate(&self, kind: RegionKind, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
        SharedMemory::create_shared_memory(&self.region_name(kind), size)
    }

    fn attach(&self, kind: RegionKind) -> io::Result<Box<dyn SharedMemoryBackend>> {
        // The header check done by the caller validates the real size.
        SharedMemory::attach_shared_memory(&self.region_name(kind), 1)
    }

    fn is_shared(&self) -> bool {
        true
    }
}

/// Where a queue's regions come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageMode {
    #[default]
    Heap,
    /// Named shared memory; the string is the queue name.
    Shared(String),
}

impl StorageMode {
    pub fn allocator(&self) -> Box<dyn RegionAllocator> {
        match self {
            StorageMode::Heap => Box::new(HeapAllocator),
            StorageMode::Shared(name) => Box::new(SharedMemoryAllocator::new(name.clone())),
        }
    }
}
