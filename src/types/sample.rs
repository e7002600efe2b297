//! Interleaved I/Q sample frames

/// One interleaved in-phase/quadrature sample pair.
///
/// This is the atomic unit on both stream endpoints. On the wire (Linrad payload
/// and transmit byte source) a frame is four bytes: `I` then `Q`, each a
/// little-endian `i16`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Frame {
    /// In-phase component
    pub i: i16,
    /// Quadrature component
    pub q: i16,
}

impl Frame {
    /// Size of one frame in bytes.
    pub const SIZE: usize = 4;

    /// Create a new frame.
    pub const fn new(i: i16, q: i16) -> Self {
        Self { i, q }
    }

    /// Encode as four little-endian bytes.
    pub fn to_le_bytes(self) -> [u8; Self::SIZE] {
        let [i0, i1] = self.i.to_le_bytes();
        let [q0, q1] = self.q.to_le_bytes();
        [i0, i1, q0, q1]
    }

    /// Decode from four little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            i: i16::from_le_bytes([bytes[0], bytes[1]]),
            q: i16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Pack into a 32-bit word with `I` in the low half.
    ///
    /// This matches reading the frame's wire bytes as a little-endian `u32`.
    pub fn packed(self) -> u32 {
        (self.i as u16 as u32) | ((self.q as u16 as u32) << 16)
    }

    /// Inverse of [`Frame::packed`].
    pub fn from_packed(word: u32) -> Self {
        Self { i: word as u16 as i16, q: (word >> 16) as u16 as i16 }
    }
}

/// Decode whole frames from `bytes`, appending them to `out`.
///
/// Trailing bytes that do not form a whole frame are ignored; callers that must
/// reject fragments check alignment first.
pub fn decode_frames(bytes: &[u8], out: &mut Vec<Frame>) {
    out.extend(
        bytes
            .chunks_exact(Frame::SIZE)
            .map(|c| Frame::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
}

/// Encode `frames` into `out`, which must hold `frames.len() * Frame::SIZE` bytes.
pub fn encode_frames(frames: &[Frame], out: &mut [u8]) {
    debug_assert_eq!(out.len(), frames.len() * Frame::SIZE);
    for (frame, chunk) in frames.iter().zip(out.chunks_exact_mut(Frame::SIZE)) {
        chunk.copy_from_slice(&frame.to_le_bytes());
    }
}
