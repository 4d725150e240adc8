//! Peer registry: the fixed producer/consumer slot tables of one queue.
//!
//! Every attached peer owns one slot and publishes there the cursor it is
//! about to operate on. Producers take the minimum over consumer slots to
//! learn how far they may write; consumers take the minimum over producer
//! slots to learn how far data is fully committed.

use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use super::Buffer::layout::{PeerSlot, SessionHeader, IDLE, LAYOUT_VERSION, SESSION_MAGIC};
use super::Buffer::RingStorage;
use super::{Consumer, Producer};
use crate::error::{AllocError, NoFreeSlot, PeerRole};
use crate::trace::{debug, info, warn};
use crate::Core::alloc::{HeapAllocator, RegionAllocator, RegionKind};
use crate::Core::SharedMemory::SharedMemoryBackend;

pub struct PeerRegistry {
    storage: Arc<RingStorage>,
    // Keeps the session region alive; `header` and `slots` point into it.
    _backend: Box<dyn SharedMemoryBackend>,
    header: *const SessionHeader,
    /// `consumers` consumer slots followed by `producers` producer slots.
    slots: *const CachePadded<PeerSlot>,
    producers: u32,
    consumers: u32,
}

// Everything reachable through the raw pointers is atomic.
unsafe impl Send for PeerRegistry {}
unsafe impl Sync for PeerRegistry {}

impl PeerRegistry {
    /// Create heap-backed slot tables for `producers` and `consumers` peers.
    ///
    /// The registry takes the ring by value: every peer of a ring must be
    /// visible to the same slot tables, so a ring cannot be shared by two
    /// registries.
    ///
    /// ```compile_fail
    /// use ringqueue_lf::{PeerRegistry, RingStorage};
    /// use std::sync::Arc;
    ///
    /// let storage = Arc::new(RingStorage::create(64).unwrap());
    /// let a = PeerRegistry::create(Arc::clone(&storage), 1, 1).unwrap();
    /// let b = PeerRegistry::create(Arc::clone(&storage), 1, 1).unwrap();
    /// ```
    pub fn create(
        storage: RingStorage,
        producers: u32,
        consumers: u32,
    ) -> Result<Arc<Self>, AllocError> {
        Self::create_in(storage, producers, consumers, &HeapAllocator)
    }

    /// Create the slot tables in a region obtained from `alloc`.
    pub fn create_in(
        storage: RingStorage,
        producers: u32,
        consumers: u32,
        alloc: &dyn RegionAllocator,
    ) -> Result<Arc<Self>, AllocError> {
        let storage = Arc::new(storage);
        let size = SessionHeader::region_size(producers, consumers)
            .ok_or(AllocError::InvalidPeerCount { producers, consumers })?;

        let backend = alloc.allocate(RegionKind::Session, size)?;
        Self::check_region(backend.as_ref(), size)?;

        let base = backend.as_ptr();
        // SAFETY: region is `size` bytes, 128-aligned and not yet shared.
        unsafe {
            ptr::write(
                base as *mut SessionHeader,
                SessionHeader {
                    magic: SESSION_MAGIC,
                    version: LAYOUT_VERSION,
                    producers,
                    consumers,
                    reserved: 0,
                    last_head: CachePadded::new(AtomicU64::new(0)),
                    last_tail: CachePadded::new(AtomicU64::new(0)),
                },
            );

            let slots = base.add(SessionHeader::SLOTS_OFFSET) as *mut CachePadded<PeerSlot>;
            for i in 0..(producers as usize + consumers as usize) {
                ptr::write(
                    slots.add(i),
                    CachePadded::new(PeerSlot {
                        idx: AtomicU64::new(IDLE),
                        attached: AtomicBool::new(false),
                    }),
                );
            }
        }

        info!(producers, consumers, shared = alloc.is_shared(), "created peer registry");
        Ok(Arc::new(Self::from_region(storage, backend, producers, consumers)))
    }

    /// Attach to slot tables created earlier through the same named allocator.
    pub fn open_in(
        storage: RingStorage,
        alloc: &dyn RegionAllocator,
    ) -> Result<Arc<Self>, AllocError> {
        let storage = Arc::new(storage);
        let backend = alloc.attach(RegionKind::Session)?;
        Self::check_region(backend.as_ref(), SessionHeader::SLOTS_OFFSET)?;

        // SAFETY: region holds at least a full, aligned header.
        let header = unsafe { &*(backend.as_ptr() as *const SessionHeader) };
        if header.magic != SESSION_MAGIC || header.version != LAYOUT_VERSION {
            return Err(AllocError::Layout);
        }

        let (producers, consumers) = (header.producers, header.consumers);
        let size = SessionHeader::region_size(producers, consumers).ok_or(AllocError::Layout)?;
        Self::check_region(backend.as_ref(), size)?;

        info!(producers, consumers, "opened peer registry");
        Ok(Arc::new(Self::from_region(storage, backend, producers, consumers)))
    }

    fn check_region(backend: &dyn SharedMemoryBackend, need: usize) -> Result<(), AllocError> {
        let aligned = (backend.as_ptr() as usize) % std::mem::align_of::<SessionHeader>() == 0;
        if backend.size() < need || !aligned {
            return Err(AllocError::Layout);
        }
        Ok(())
    }

    fn from_region(
        storage: Arc<RingStorage>,
        backend: Box<dyn SharedMemoryBackend>,
        producers: u32,
        consumers: u32,
    ) -> Self {
        let base = backend.as_ptr();
        Self {
            storage,
            header: base as *const SessionHeader,
            // SAFETY: check_region guaranteed the slot tables are in bounds.
            slots: unsafe { base.add(SessionHeader::SLOTS_OFFSET) } as *const CachePadded<PeerSlot>,
            _backend: backend,
            producers,
            consumers,
        }
    }

    /// Drop this reference to the registry. The slot tables are released once
    /// every handle attached to it is gone too.
    pub fn destroy(self: Arc<Self>) {
        debug!(
            producers = self.attached_producers(),
            consumers = self.attached_consumers(),
            "destroying peer registry reference"
        );
        drop(self);
    }

    /// Claim the first free producer slot.
    pub fn attach_producer(self: &Arc<Self>) -> Result<Producer, NoFreeSlot> {
        let id = self.claim(PeerRole::Producer)?;
        Ok(Producer::new(Arc::clone(self), id))
    }

    /// Claim the first free consumer slot.
    pub fn attach_consumer(self: &Arc<Self>) -> Result<Consumer, NoFreeSlot> {
        let id = self.claim(PeerRole::Consumer)?;
        Ok(Consumer::new(Arc::clone(self), id))
    }

    fn claim(&self, role: PeerRole) -> Result<u32, NoFreeSlot> {
        let capacity = self.capacity_of(role);

        for id in 0..capacity {
            let slot = self.slot(role, id);
            if slot.attached.load(SeqCst) {
                continue;
            }
            // Lost races just move on to the next candidate.
            if slot
                .attached
                .compare_exchange(false, true, SeqCst, SeqCst)
                .is_ok()
            {
                slot.idx.store(IDLE, SeqCst);
                debug!(%role, id, "attached peer");
                return Ok(id);
            }
        }

        warn!(%role, capacity, "no free slot");
        Err(NoFreeSlot { role, capacity })
    }

    /// Return a slot to the pool. Only called by the owning handle.
    pub(crate) fn release(&self, role: PeerRole, id: u32) {
        let slot = self.slot(role, id);
        slot.idx.store(IDLE, SeqCst);
        slot.attached.store(false, SeqCst);
        debug!(%role, id, "detached peer");
    }

    #[inline]
    pub(crate) fn slot(&self, role: PeerRole, id: u32) -> &PeerSlot {
        debug_assert!(id < self.capacity_of(role));
        let index = match role {
            PeerRole::Consumer => id as usize,
            PeerRole::Producer => self.consumers as usize + id as usize,
        };
        // SAFETY: index is within the tables written at creation.
        unsafe { &*self.slots.add(index) }
    }

    fn capacity_of(&self, role: PeerRole) -> u32 {
        match role {
            PeerRole::Producer => self.producers,
            PeerRole::Consumer => self.consumers,
        }
    }

    #[inline]
    fn header(&self) -> &SessionHeader {
        // SAFETY: header points into the session region owned by self.
        unsafe { &*self.header }
    }

    /// Minimum over live `head` and every attached consumer's announced
    /// cursor. Stored as the new head hint and returned.
    pub(crate) fn min_consumer_bound(&self) -> u64 {
        let bound = self.min_bound(self.storage.head(), PeerRole::Consumer);
        self.header().last_head.store(bound, SeqCst);
        bound
    }

    /// Minimum over live `tail` and every attached producer's announced
    /// cursor. Stored as the new tail hint and returned.
    pub(crate) fn min_producer_bound(&self) -> u64 {
        let bound = self.min_bound(self.storage.tail(), PeerRole::Producer);
        self.header().last_tail.store(bound, SeqCst);
        bound
    }

    fn min_bound(&self, live: u64, role: PeerRole) -> u64 {
        (0..self.capacity_of(role))
            .map(|id| self.slot(role, id))
            .filter(|slot| slot.attached.load(SeqCst))
            // IDLE is u64::MAX and never lowers the minimum.
            .map(|slot| slot.idx.load(SeqCst))
            .fold(live, u64::min)
    }

    /// Cached lower bound on bytes still readable by some consumer.
    #[inline]
    pub fn head_hint(&self) -> u64 {
        self.header().last_head.load(SeqCst)
    }

    /// Cached upper bound on fully committed bytes.
    #[inline]
    pub fn tail_hint(&self) -> u64 {
        self.header().last_tail.load(SeqCst)
    }

    pub fn storage(&self) -> &Arc<RingStorage> {
        &self.storage
    }

    pub fn producer_capacity(&self) -> u32 {
        self.producers
    }

    pub fn consumer_capacity(&self) -> u32 {
        self.consumers
    }

    pub fn attached_producers(&self) -> u32 {
        self.count_attached(PeerRole::Producer)
    }

    pub fn attached_consumers(&self) -> u32 {
        self.count_attached(PeerRole::Consumer)
    }

    fn count_attached(&self, role: PeerRole) -> u32 {
        (0..self.capacity_of(role))
            .filter(|&id| self.slot(role, id).attached.load(SeqCst))
            .count() as u32
    }

    /// Announced cursors of every attached peer of `role` (`None` = idle).
    pub fn announced(&self, role: PeerRole) -> Vec<Option<u64>> {
        (0..self.capacity_of(role))
            .map(|id| self.slot(role, id))
            .filter(|slot| slot.attached.load(SeqCst))
            .map(|slot| Some(slot.idx.load(SeqCst)).filter(|&idx| idx != IDLE))
            .collect()
    }
}
