// In src/MPMC/producer.rs
use crate::error::{Full, PeerRole};
use crate::trace::trace;
use crate::MPMC::Buffer::layout::{PeerSlot, IDLE};
use crate::MPMC::session::PeerRegistry;
use crate::MPMC::Structs::Buffer_Structs::{encode_len, FramePlan, LEN_PREFIX};
use crossbeam_utils::Backoff;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::fence;
use std::sync::Arc;

/// A producer bound to one registry slot.
///
/// `push` takes `&mut self`, so a handle never has two operations in flight
/// and detaching (by value or on drop) cannot race one.
pub struct Producer {
    pub(crate) registry: Arc<PeerRegistry>,
    pub(crate) id: u32,
}

impl Producer {
    pub(crate) fn new(registry: Arc<PeerRegistry>, id: u32) -> Self {
        Self { registry, id }
    }

    #[inline]
    fn slot(&self) -> &PeerSlot {
        self.registry.slot(PeerRole::Producer, self.id)
    }

    /// Appends `data` as one framed message.
    ///
    /// # Returns
    /// * `Ok(())` once the frame is fully written and visible to consumers
    /// * `Err(Full)` if the frame does not fit; nothing was written and the
    ///   cursors are unchanged. Oversized messages also end up here.
    pub fn push(&mut self, data: &[u8]) -> Result<(), Full> {
        let registry = &*self.registry;
        let storage = registry.storage();
        let slot = registry.slot(PeerRole::Producer, self.id);
        let tail_cursor = storage.tail_cursor();
        let len = storage.capacity() as u64;
        let backoff = Backoff::new();

        let (plan, payload_len) = loop {
            // Announce before reading the consumer side, so a consumer that
            // refreshes its tail hint cannot look past this reservation.
            let tail = tail_cursor.load(SeqCst);
            slot.idx.store(tail, SeqCst);
            fence(SeqCst);

            let plan = FramePlan::at(tail, len);
            let payload_len = match u32::try_from(data.len()) {
                Ok(n) => n,
                Err(_) => {
                    slot.idx.store(IDLE, SeqCst);
                    return Err(Full);
                }
            };
            let framed = plan.framed_len(payload_len as u64);

            // A tail older than the hint means another producer moved on;
            // the CAS below fails and we retry with a fresh tail.
            if len < tail.saturating_sub(registry.head_hint()) + framed {
                let head_bound = registry.min_consumer_bound();
                if len < tail.saturating_sub(head_bound) + framed {
                    slot.idx.store(IDLE, SeqCst);
                    trace!(id = self.id, tail, head_bound, framed, "push: ring full");
                    return Err(Full);
                }
            }

            if tail_cursor
                .compare_exchange(tail, tail + framed, SeqCst, SeqCst)
                .is_ok()
            {
                break (plan, payload_len);
            }
            backoff.spin();
        };

        // SAFETY: the CAS granted [tail, tail + framed) to this producer and
        // the boundary check kept it clear of every byte a consumer may read.
        unsafe {
            storage.write_bytes(plan.offset, &encode_len(payload_len));
            storage.write_bytes(plan.payload_offset(len), data);
        }

        // Bytes must be visible before consumers may treat them as committed.
        fence(SeqCst);
        slot.idx.store(IDLE, SeqCst);
        Ok(())
    }

    /// Like [`push`](Self::push), retrying on `Full` with
    /// [`Backoff::snooze`] up to `max_spins` extra attempts.
    pub fn push_spin(&mut self, data: &[u8], max_spins: u32) -> Result<(), Full> {
        let backoff = Backoff::new();
        let mut attempts = 0;
        loop {
            match self.push(data) {
                Err(Full) if attempts < max_spins => {
                    attempts += 1;
                    backoff.snooze();
                }
                result => return result,
            }
        }
    }

    /// Largest payload that can ever fit in an empty ring.
    pub fn max_message_size(&self) -> usize {
        self.registry.storage().capacity() - LEN_PREFIX
    }

    /// Slot index in the producer table.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Cursor this producer currently announces, `None` when idle.
    pub fn announced(&self) -> Option<u64> {
        Some(self.slot().idx.load(SeqCst)).filter(|&idx| idx != IDLE)
    }

    /// Give the slot back to the registry.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.registry.release(PeerRole::Producer, self.id);
    }
}
