// The byte ring shared by every producer and consumer of one queue.

use super::layout::QueueHeader;
use crate::Core::SharedMemory::SharedMemoryBackend;

/// A power-of-two byte band with two monotonic 64-bit cursors.
///
/// `head` and `tail` live in a [`QueueHeader`] at the start of the backing
/// region, so a ring in shared memory carries its cursors with it. Physical
/// offset of a cursor is `cursor & mask`.
///
/// ### Invariants
/// - `head <= tail` and `tail - head <= capacity()` at all times.
/// - Cursors only grow; a logical offset is never reused.
pub struct RingStorage {
    /// Keeps the region mapped; `header` and `data` point into it.
    pub(crate) backend: Box<dyn SharedMemoryBackend>,

    pub(crate) header: *const QueueHeader,

    /// Start of the data band.
    pub(crate) data: *mut u8,

    /// Band length in bytes, copied out of the header.
    pub(crate) len: u64,

    pub(crate) mask: u64,
}

// The header is all atomics; the band is only touched by the peer whose
// cursor CAS granted the bytes in question.
unsafe impl Send for RingStorage {}
unsafe impl Sync for RingStorage {}
