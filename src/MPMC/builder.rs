use super::session::PeerRegistry;
use super::Buffer::RingStorage;
use crate::error::AllocError;
use crate::Core::alloc::StorageMode;
use std::sync::Arc;

/// Queue configuration: ring size, slot table sizes and where regions live.
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    capacity_hint: usize,
    producers: u32,
    consumers: u32,
    storage: StorageMode,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self {
            capacity_hint: 32 * 1024, // rounds to a 64KB ring
            producers: 4,
            consumers: 4,
            storage: StorageMode::Heap,
        }
    }
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_hint(mut self, capacity_hint: usize) -> Self {
        self.capacity_hint = capacity_hint;
        self
    }

    pub fn with_producers(mut self, producers: u32) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_consumers(mut self, consumers: u32) -> Self {
        self.consumers = consumers;
        self
    }

    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Shorthand for `with_storage(StorageMode::Shared(name))`.
    pub fn with_shared_name(self, name: impl Into<String>) -> Self {
        self.with_storage(StorageMode::Shared(name.into()))
    }

    pub fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    pub fn storage(&self) -> &StorageMode {
        &self.storage
    }

    /// Create the ring and its registry.
    pub fn build(self) -> Result<Arc<PeerRegistry>, AllocError> {
        let alloc = self.storage.allocator();
        let storage = RingStorage::create_in(self.capacity_hint, alloc.as_ref())?;
        PeerRegistry::create_in(storage, self.producers, self.consumers, alloc.as_ref())
    }

    /// Attach to a queue another handle or process built with the same
    /// shared name. Sizes come from the existing headers.
    pub fn open(self) -> Result<Arc<PeerRegistry>, AllocError> {
        if !matches!(self.storage, StorageMode::Shared(_)) {
            return Err(AllocError::Layout);
        }
        let alloc = self.storage.allocator();
        let storage = RingStorage::open_in(alloc.as_ref())?;
        PeerRegistry::open_in(storage, alloc.as_ref())
    }
}
