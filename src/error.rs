use std::fmt;
use std::io;
use thiserror::Error;

/// Which side of the queue a registry slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    Producer,
    Consumer,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Producer => f.write_str("producer"),
            PeerRole::Consumer => f.write_str("consumer"),
        }
    }
}

/// The backing region for the ring or the peer tables could not be obtained.
///
/// Fatal to the creating call: no partially built object is ever returned.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("invalid capacity hint {0}")]
    InvalidCapacity(usize),
    #[error("peer table too large ({producers} producers, {consumers} consumers)")]
    InvalidPeerCount { producers: u32, consumers: u32 },
    #[error("invalid layout or magic")]
    Layout,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Every slot of the requested role is already attached.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no free {role} slot (capacity {capacity})")]
pub struct NoFreeSlot {
    pub role: PeerRole,
    pub capacity: u32,
}

/// The ring has no room for the framed message. Nothing was written.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Default)]
#[error("ring queue is full")]
pub struct Full;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    #[error("ring queue is empty")]
    Empty,
    /// The message stays in the queue; retry with at least `needed` bytes.
    #[error("caller buffer too small: need {needed} bytes, have {available}")]
    CallerBufferTooSmall { needed: usize, available: usize },
}

/// Umbrella error for callers that mix creation, attach and transfer calls.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    NoFreeSlot(#[from] NoFreeSlot),
    #[error(transparent)]
    Full(#[from] Full),
    #[error(transparent)]
    Pop(#[from] PopError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
