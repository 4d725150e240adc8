use crate::error::PeerRole;
use crate::MPMC::Buffer::RingStorage;
use crate::MPMC::{Consumer, PeerRegistry, Producer};
use std::fmt;

/// Debug function for RingStorage
///
/// Shows cursor snapshots and sizes; never touches the data band.
pub fn debug_ring_storage(storage: &RingStorage, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingStorage")
        .field("capacity", &storage.capacity())
        .field("head", &storage.head())
        .field("tail", &storage.tail())
        .field("used", &storage.used())
        .field("shared", &storage.is_shared())
        .field("data", &format_args!("{:p}", storage.data))
        .finish()
}

/// Debug function for PeerRegistry
///
/// Shows:
/// - Slot table sizes and attach counts
/// - Both boundary hints
/// - Announced cursors of attached peers
pub fn debug_peer_registry(registry: &PeerRegistry, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PeerRegistry")
        .field("producers", &format_args!("{}/{}", registry.attached_producers(), registry.producer_capacity()))
        .field("consumers", &format_args!("{}/{}", registry.attached_consumers(), registry.consumer_capacity()))
        .field("head_hint", &registry.head_hint())
        .field("tail_hint", &registry.tail_hint())
        .field("announced_producers", &registry.announced(PeerRole::Producer))
        .field("announced_consumers", &registry.announced(PeerRole::Consumer))
        .field("storage", registry.storage())
        .finish()
}

pub fn debug_producer(producer: &Producer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Producer")
        .field("id", &producer.id())
        .field("announced", &producer.announced())
        .finish_non_exhaustive()
}

pub fn debug_consumer(consumer: &Consumer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Consumer")
        .field("id", &consumer.id())
        .field("announced", &consumer.announced())
        .finish_non_exhaustive()
}
