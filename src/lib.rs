//! # LAN Intercom
//!
//! Serverless peer-to-peer audio/video intercom over UDP.
//!
//! Every node runs the same session: it advertises itself with periodic
//! `HELLO` broadcasts, learns about other nodes from their broadcasts, and
//! streams captured media to every peer it currently considers alive.
//!
//! ```text
//!             ┌──────────────── SessionCoordinator ────────────────┐
//!             │                                                    │
//! beacon ───► │ broadcast HELLO ────────────► discovery port       │
//! listener ─► │ discovery port ─► PeerDirectory (mutex, snapshots) │
//!             │                                                    │
//! capture ──► │ AudioSource ─► PacketCodec ─► every live peer      │
//! playback ◄─ │ audio port ─► PacketCodec ─► JitterBuffer ─► Sink  │
//!             │                                                    │
//! camera  ──► │ VideoSource ─► fragments ─► every live peer        │
//! display ◄─ │ video port ─► FragmentReassembler ─► VideoDisplay  │
//!             └────────────────────────────────────────────────────┘
//! ```
//!
//! One OS thread per duty, cooperative shutdown through a shared flag, and a
//! single mutex (the peer directory) as the only cross-thread state.

pub mod audio;
pub mod config;
pub mod error;
pub mod peers;
pub mod protocol;
pub mod session;
pub mod video;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio capture and playback
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default audio period length in frames
    pub const DEFAULT_PERIOD_FRAMES: usize = 1024;

    /// Default UDP port for discovery beacons
    pub const DEFAULT_DISCOVERY_PORT: u16 = 12345;

    /// Default UDP port for audio datagrams
    pub const DEFAULT_AUDIO_PORT: u16 = 12346;

    /// Default UDP port for video fragments
    pub const DEFAULT_VIDEO_PORT: u16 = 12347;

    /// Default seconds between HELLO broadcasts
    pub const DEFAULT_BEACON_INTERVAL_SECS: u64 = 5;

    /// Default seconds without a beacon before a peer is dropped
    pub const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 15;

    /// Default jitter buffer fill target, in packets
    pub const DEFAULT_JITTER_DEPTH: usize = 5;

    /// Maximum video fragment payload, kept under the common-path MTU
    /// so a fragment never splits at the IP layer
    pub const MAX_FRAGMENT_PAYLOAD: usize = 1400;

    /// Device-to-session period queue capacity, in periods
    pub const PERIOD_QUEUE_CAPACITY: usize = 8;
}
