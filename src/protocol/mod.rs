//! Wire protocol for the intercom
//!
//! All multi-byte fields are network byte order. The layout is fixed binary,
//! not self-describing: both ends must agree on the media parameters
//! (sample rate, channels, period length) out of band.

mod codec;

pub use codec::PacketCodec;

use bytes::Bytes;

/// Presence marker broadcast on the discovery port. Any other payload
/// received there is silently ignored.
pub const BEACON_MARKER: &[u8] = b"HELLO";

/// Audio header: sequence (u32) + timestamp (u64)
pub const AUDIO_HEADER_LEN: usize = 4 + 8;

/// Video fragment header: frame_sequence (u32) + fragment_index (u32)
/// + total_fragments (u32) + is_last (u8) + fragment_length (u64)
pub const VIDEO_HEADER_LEN: usize = 4 + 4 + 4 + 1 + 8;

/// One capture period of audio
///
/// The sample payload has a fixed per-session size
/// (period_frames x channels), so every audio datagram is the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Per-sender monotonically increasing counter
    pub sequence: u32,
    /// Capture timestamp, microseconds since session start
    pub timestamp: u64,
    /// Interleaved i16 samples for one period
    pub samples: Vec<i16>,
}

/// One datagram-sized piece of a compressed video frame
///
/// An oversized frame splits into a dense sequence of fragments sharing one
/// `frame_sequence`; `is_last` holds only at index `total_fragments - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFragment {
    pub frame_sequence: u32,
    pub fragment_index: u32,
    pub total_fragments: u32,
    pub is_last: bool,
    pub payload: Bytes,
}
