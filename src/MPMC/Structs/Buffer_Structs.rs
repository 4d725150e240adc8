// Message framing inside the ring: [u32 length, little-endian][payload].
//
// If fewer than LEN_PREFIX bytes remain before the physical end of the band,
// those bytes are skipped as padding and the frame starts at offset 0. The
// cursor still advances over the padding, so cursor deltas equal bytes used.

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Where a frame starting at a given cursor lands in the band.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePlan {
    /// Bytes skipped before the physical end of the band.
    pub padding: u64,
    /// Physical offset of the length prefix.
    pub offset: usize,
}

impl FramePlan {
    /// Plan a frame at logical `cursor` in a band of `len` bytes (power of two).
    #[inline]
    pub fn at(cursor: u64, len: u64) -> Self {
        let real = cursor & (len - 1);
        let remaining = len - real;

        if remaining < LEN_PREFIX as u64 {
            Self {
                padding: remaining,
                offset: 0,
            }
        } else {
            Self {
                padding: 0,
                offset: real as usize,
            }
        }
    }

    /// Cursor advance for a frame carrying `payload_len` bytes.
    #[inline]
    pub fn framed_len(&self, payload_len: u64) -> u64 {
        self.padding + LEN_PREFIX as u64 + payload_len
    }

    /// Physical offset of the first payload byte. May be 0 when the prefix
    /// ends exactly at the end of the band.
    #[inline]
    pub fn payload_offset(&self, len: u64) -> usize {
        (self.offset + LEN_PREFIX) & (len as usize - 1)
    }
}

#[inline]
pub fn encode_len(len: u32) -> [u8; LEN_PREFIX] {
    len.to_le_bytes()
}

#[inline]
pub fn decode_len(bytes: [u8; LEN_PREFIX]) -> u32 {
    u32::from_le_bytes(bytes)
}
