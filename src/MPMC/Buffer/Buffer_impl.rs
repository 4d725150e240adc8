use std::mem::align_of;
use std::ptr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::SeqCst;

use super::layout::{QueueHeader, FLAG_SHARED, LAYOUT_VERSION, MAX_CAPACITY, RING_MAGIC};
use super::Buffer::RingStorage;
use crate::error::AllocError;
use crate::trace::debug;
use crate::Core::alloc::{HeapAllocator, RegionAllocator, RegionKind};
use crate::Core::SharedMemory::SharedMemoryBackend;
use crate::MPMC::Structs::Buffer_Structs::LEN_PREFIX;
use crossbeam_utils::CachePadded;

impl RingStorage {
    /// Band length for a capacity hint: `2 << highest_set_bit(hint)`.
    ///
    /// 1000 becomes 1024 and 1024 becomes 2048. Hints that round below the
    /// length prefix or above [`MAX_CAPACITY`] are rejected.
    pub fn capacity_for(capacity_hint: usize) -> Result<u64, AllocError> {
        if capacity_hint == 0 {
            return Err(AllocError::InvalidCapacity(capacity_hint));
        }

        let highest_bit = usize::BITS - 1 - capacity_hint.leading_zeros();
        1u64.checked_shl(highest_bit + 1)
            .filter(|&len| (LEN_PREFIX as u64..=MAX_CAPACITY).contains(&len))
            .ok_or(AllocError::InvalidCapacity(capacity_hint))
    }

    /// Create a heap-backed ring sized from `capacity_hint`.
    pub fn create(capacity_hint: usize) -> Result<Self, AllocError> {
        Self::create_in(capacity_hint, &HeapAllocator)
    }

    /// Create a ring in a region obtained from `alloc`.
    pub fn create_in(capacity_hint: usize, alloc: &dyn RegionAllocator) -> Result<Self, AllocError> {
        let len = Self::capacity_for(capacity_hint)?;
        let size = QueueHeader::DATA_OFFSET + len as usize;

        let backend = alloc.allocate(RegionKind::Ring, size)?;
        Self::check_region(backend.as_ref(), size)?;

        let flags = if alloc.is_shared() { FLAG_SHARED } else { 0 };
        let header = backend.as_ptr() as *mut QueueHeader;

        // SAFETY: the region is at least `size` bytes, suitably aligned, and
        // nobody else can see it yet.
        unsafe {
            ptr::write(
                header,
                QueueHeader {
                    magic: RING_MAGIC,
                    version: LAYOUT_VERSION,
                    flags,
                    len,
                    mask: len - 1,
                    head: CachePadded::new(AtomicU64::new(0)),
                    tail: CachePadded::new(AtomicU64::new(0)),
                },
            );
        }

        debug!(capacity = len, shared = alloc.is_shared(), "created ring storage");
        Ok(Self::from_region(backend, len))
    }

    /// Attach to a ring created earlier through the same named allocator.
    pub fn open_in(alloc: &dyn RegionAllocator) -> Result<Self, AllocError> {
        let backend = alloc.attach(RegionKind::Ring)?;
        Self::check_region(backend.as_ref(), QueueHeader::DATA_OFFSET)?;

        // SAFETY: region holds at least a full, aligned header.
        let header = unsafe { &*(backend.as_ptr() as *const QueueHeader) };
        if header.magic != RING_MAGIC
            || header.version != LAYOUT_VERSION
            || !header.len.is_power_of_two()
            || header.len > MAX_CAPACITY
            || header.mask != header.len - 1
        {
            return Err(AllocError::Layout);
        }

        let len = header.len;
        Self::check_region(backend.as_ref(), QueueHeader::DATA_OFFSET + len as usize)?;

        debug!(capacity = len, "opened ring storage");
        Ok(Self::from_region(backend, len))
    }

    fn check_region(backend: &dyn SharedMemoryBackend, need: usize) -> Result<(), AllocError> {
        let base = backend.as_ptr();
        if backend.size() < need || (base as usize) % align_of::<QueueHeader>() != 0 {
            return Err(AllocError::Layout);
        }
        Ok(())
    }

    fn from_region(backend: Box<dyn SharedMemoryBackend>, len: u64) -> Self {
        let base = backend.as_ptr();
        Self {
            header: base as *const QueueHeader,
            // SAFETY: check_region guaranteed DATA_OFFSET + len bytes.
            data: unsafe { base.add(QueueHeader::DATA_OFFSET) },
            backend,
            len,
            mask: len - 1,
        }
    }

    /// Release the backing region. Same as dropping the storage.
    pub fn destroy(self) {
        debug!(capacity = self.len, "destroying ring storage");
        drop(self);
    }

    /// Band length in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Snapshot of the consumer cursor.
    pub fn head(&self) -> u64 {
        self.head_cursor().load(SeqCst)
    }

    /// Snapshot of the producer cursor.
    pub fn tail(&self) -> u64 {
        self.tail_cursor().load(SeqCst)
    }

    /// Bytes reserved by producers and not yet released by consumers,
    /// including frame prefixes and padding.
    pub fn used(&self) -> usize {
        let head = self.head();
        let tail = self.tail();
        tail.saturating_sub(head) as usize
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }

    pub fn is_shared(&self) -> bool {
        self.header().flags & FLAG_SHARED != 0
    }

    #[inline]
    pub(crate) fn header(&self) -> &QueueHeader {
        // SAFETY: header points into `backend`, which lives as long as self.
        unsafe { &*self.header }
    }

    #[inline]
    pub(crate) fn head_cursor(&self) -> &AtomicU64 {
        &self.header().head
    }

    #[inline]
    pub(crate) fn tail_cursor(&self) -> &AtomicU64 {
        &self.header().tail
    }

    /// Copy `src` into the band at physical `offset`, wrapping at the end.
    ///
    /// # Safety
    /// The caller must own the logical range being written, i.e. it won the
    /// tail CAS that granted it.
    #[inline]
    pub(crate) unsafe fn write_bytes(&self, offset: usize, src: &[u8]) {
        let len = self.len as usize;
        debug_assert!(offset < len && src.len() <= len);

        let first = src.len().min(len - offset);
        ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(offset), first);
        if first < src.len() {
            ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data, src.len() - first);
        }
    }

    /// Copy bytes out of the band at physical `offset`, wrapping at the end.
    ///
    /// # Safety
    /// No producer may be writing the range: either the caller won the head
    /// CAS for it, or its announced cursor still equals `head`.
    #[inline]
    pub(crate) unsafe fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        let len = self.len as usize;
        debug_assert!(offset < len && dst.len() <= len);

        let first = dst.len().min(len - offset);
        ptr::copy_nonoverlapping(self.data.add(offset), dst.as_mut_ptr(), first);
        if first < dst.len() {
            ptr::copy_nonoverlapping(self.data, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }
}
