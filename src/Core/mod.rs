pub mod SharedMemory;
pub mod alloc;

pub use SharedMemory::{
    attach_shared_memory, create_shared_memory, HeapRegion, RawHandle, SharedMemoryBackend,
    REGION_ALIGN,
};
pub use alloc::{HeapAllocator, RegionAllocator, RegionKind, SharedMemoryAllocator, StorageMode};
