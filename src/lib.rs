//! Lock-free, bounded, multi-producer multi-consumer byte ring.
//!
//! One [`RingStorage`] holds framed variable-length messages; one
//! [`PeerRegistry`] holds a fixed number of producer and consumer slots.
//! Workers attach once, then `push`/`pop` without locks:
//!
//! ```
//! use ringqueue_lf::{PeerRegistry, PopError, RingStorage};
//!
//! let storage = RingStorage::create(1024).unwrap();
//! let registry = PeerRegistry::create(storage, 1, 1).unwrap();
//! let mut producer = registry.attach_producer().unwrap();
//! let mut consumer = registry.attach_consumer().unwrap();
//!
//! producer.push(b"hello").unwrap();
//! let mut buf = [0u8; 32];
//! assert_eq!(consumer.pop(&mut buf), Ok(5));
//! assert_eq!(&buf[..5], b"hello");
//! assert_eq!(consumer.pop(&mut buf), Err(PopError::Empty));
//! ```

// Module naming follows project convention (MPMC = Multi-Producer Multi-Consumer)
#[allow(non_snake_case)]
pub mod MPMC;
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod error;
pub mod ffi;
pub mod trace;

pub use error::{AllocError, Error, Full, NoFreeSlot, PeerRole, PopError, Result};
pub use trace::init_tracing;
pub use Core::alloc::StorageMode;
pub use MPMC::Buffer::RingStorage;
pub use MPMC::{Consumer, PeerRegistry, Producer, QueueBuilder};
