// src/MPMC/consumer.rs

use crate::error::{PeerRole, PopError};
use crate::MPMC::Buffer::layout::{PeerSlot, IDLE};
use crate::MPMC::session::PeerRegistry;
use crate::MPMC::Structs::Buffer_Structs::{decode_len, FramePlan, LEN_PREFIX};
use crossbeam_utils::Backoff;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::fence;
use std::sync::Arc;

/// A consumer bound to one registry slot.
pub struct Consumer {
    pub(crate) registry: Arc<PeerRegistry>,
    pub(crate) id: u32,
}

impl Consumer {
    pub(crate) fn new(registry: Arc<PeerRegistry>, id: u32) -> Self {
        Self { registry, id }
    }

    #[inline]
    fn slot(&self) -> &PeerSlot {
        self.registry.slot(PeerRole::Consumer, self.id)
    }

    /// Removes the oldest message and copies its payload into `out`.
    ///
    /// # Returns
    /// * `Ok(n)` with the payload in `out[..n]`
    /// * `Err(PopError::Empty)` if no committed message is available
    /// * `Err(PopError::CallerBufferTooSmall { .. })` if the next message is
    ///   longer than `out`; it stays queued
    pub fn pop(&mut self, out: &mut [u8]) -> Result<usize, PopError> {
        let registry = &*self.registry;
        let storage = registry.storage();
        let slot = registry.slot(PeerRole::Consumer, self.id);
        let head_cursor = storage.head_cursor();
        let len = storage.capacity() as u64;
        let backoff = Backoff::new();

        let (plan, msg_len) = loop {
            let head = head_cursor.load(SeqCst);
            slot.idx.store(head, SeqCst);
            fence(SeqCst);

            // Once head is seen unchanged after the announcement, producers
            // cannot reclaim the frame at `head` until we reset to idle.
            if head_cursor.load(SeqCst) != head {
                backoff.spin();
                continue;
            }

            if head >= registry.tail_hint() && head >= registry.min_producer_bound() {
                slot.idx.store(IDLE, SeqCst);
                return Err(PopError::Empty);
            }

            let plan = FramePlan::at(head, len);
            let mut prefix = [0u8; LEN_PREFIX];
            // SAFETY: [head, tail_hint) is committed and protected by our
            // announcement (see above).
            unsafe { storage.read_bytes(plan.offset, &mut prefix) };
            let msg_len = decode_len(prefix) as usize;

            if msg_len > out.len() {
                if head_cursor.load(SeqCst) != head {
                    backoff.spin();
                    continue;
                }
                slot.idx.store(IDLE, SeqCst);
                return Err(PopError::CallerBufferTooSmall {
                    needed: msg_len,
                    available: out.len(),
                });
            }

            let new_head = head + plan.framed_len(msg_len as u64);
            if head_cursor
                .compare_exchange(head, new_head, SeqCst, SeqCst)
                .is_ok()
            {
                break (plan, msg_len);
            }
            backoff.spin();
        };

        // SAFETY: the CAS granted this frame to us; producers cannot write it
        // while our slot still announces its start.
        unsafe { storage.read_bytes(plan.payload_offset(len), &mut out[..msg_len]) };

        fence(SeqCst);
        slot.idx.store(IDLE, SeqCst);
        Ok(msg_len)
    }

    /// Like [`pop`](Self::pop), retrying on `Empty` with
    /// [`Backoff::snooze`] up to `max_spins` extra attempts.
    pub fn pop_spin(&mut self, out: &mut [u8], max_spins: u32) -> Result<usize, PopError> {
        let backoff = Backoff::new();
        let mut attempts = 0;
        loop {
            match self.pop(out) {
                Err(PopError::Empty) if attempts < max_spins => {
                    attempts += 1;
                    backoff.snooze();
                }
                result => return result,
            }
        }
    }

    /// Pops into a freshly allocated buffer of up to `max_len` bytes.
    pub fn pop_vec(&mut self, max_len: usize) -> Result<Vec<u8>, PopError> {
        let mut buf = vec![0u8; max_len];
        let n = self.pop(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Slot index in the consumer table.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Cursor this consumer currently announces, `None` when idle.
    pub fn announced(&self) -> Option<u64> {
        Some(self.slot().idx.load(SeqCst)).filter(|&idx| idx != IDLE)
    }

    /// Give the slot back to the registry.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.registry.release(PeerRole::Consumer, self.id);
    }
}
