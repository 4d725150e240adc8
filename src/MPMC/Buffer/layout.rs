use crossbeam_utils::CachePadded;
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, AtomicU64};

/// "RQLFRING"
pub const RING_MAGIC: u64 = 0x5251_4C46_5249_4E47;
/// "RQLFSESS"
pub const SESSION_MAGIC: u64 = 0x5251_4C46_5345_5353;
/// Version of both in-region layouts.
pub const LAYOUT_VERSION: u32 = 1;

/// Set in `QueueHeader::flags` when the ring lives in shared memory.
pub const FLAG_SHARED: u32 = 0x01;

/// Sentinel `idx` for a peer with no operation in flight.
pub const IDLE: u64 = u64::MAX;

/// Largest ring length; keeps every payload length representable in the
/// 4-byte prefix.
pub const MAX_CAPACITY: u64 = 1 << 31;

/// Header at the very beginning of the ring region.
///
/// The data band of `len` bytes follows immediately at
/// [`QueueHeader::DATA_OFFSET`].
#[repr(C, align(128))]
pub struct QueueHeader {
    /// A "magic number" to identify the region as a ring.
    pub magic: u64,

    /// The version of the memory layout.
    pub version: u32,

    /// Storage flags, see [`FLAG_SHARED`].
    pub flags: u32,

    /// Data band length in bytes (power of two).
    pub len: u64,

    /// `len - 1`
    pub mask: u64,

    /// Consumer cursor. Advanced by CAS once per popped frame.
    pub head: CachePadded<AtomicU64>,

    /// Producer cursor. Advanced by CAS once per pushed frame.
    pub tail: CachePadded<AtomicU64>,
}

impl QueueHeader {
    pub const DATA_OFFSET: usize = size_of::<QueueHeader>();
}

/// One producer or consumer entry of the session tables.
#[repr(C)]
pub struct PeerSlot {
    /// Cursor the peer announced for its in-flight operation, or [`IDLE`].
    pub idx: AtomicU64,

    /// Claimed by `attach` with a single CAS, cleared by `detach`.
    pub attached: AtomicBool,
}

/// Header at the beginning of the session region.
///
/// Followed by `consumers` consumer slots, then `producers` producer slots,
/// each a `CachePadded<PeerSlot>`.
#[repr(C, align(128))]
pub struct SessionHeader {
    pub magic: u64,
    pub version: u32,
    pub producers: u32,
    pub consumers: u32,
    pub reserved: u32,

    /// Lower bound on the oldest byte any consumer may still read.
    /// Refreshed by producers.
    pub last_head: CachePadded<AtomicU64>,

    /// Upper bound on fully committed bytes. Refreshed by consumers.
    pub last_tail: CachePadded<AtomicU64>,
}

impl SessionHeader {
    pub const SLOTS_OFFSET: usize = size_of::<SessionHeader>();
    pub const SLOT_STRIDE: usize = size_of::<CachePadded<PeerSlot>>();

    /// Total session region size for the given table sizes, if it fits `usize`.
    pub fn region_size(producers: u32, consumers: u32) -> Option<usize> {
        (producers as usize)
            .checked_add(consumers as usize)?
            .checked_mul(Self::SLOT_STRIDE)?
            .checked_add(Self::SLOTS_OFFSET)
    }
}
