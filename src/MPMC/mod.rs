mod builder;
mod consumer;
mod debug;
mod producer;
pub mod session;

pub use builder::QueueBuilder;
pub use consumer::Consumer;
pub use producer::Producer;
pub use session::PeerRegistry;

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::RingStorage; // re-export for stable path
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{decode_len, encode_len, FramePlan, LEN_PREFIX}; // re-export for stable path
}
