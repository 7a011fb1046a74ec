//! Video subsystem module
//!
//! Camera access and image compression are external collaborators: the
//! transport only ever sees an opaque compressed frame and its timestamp.
//! [`VideoSource`] and [`VideoDisplay`] are the seams; the reassembler in
//! [`reassembly`] rebuilds fragmented frames on the receive side.

pub mod reassembly;

pub use reassembly::FragmentReassembler;

use bytes::Bytes;

use crate::error::VideoError;

/// One compressed video frame as produced by the capture collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Capture timestamp, microseconds since session start
    pub timestamp: u64,
    /// Opaque compressed image bytes
    pub data: Bytes,
}

/// Produces timestamped compressed frames, blocking until one is ready
pub trait VideoSource: Send {
    fn capture_frame(&mut self) -> Result<EncodedFrame, VideoError>;

    /// Attempt a device-level recovery after a failed capture
    fn recover(&mut self) -> Result<(), VideoError> {
        Ok(())
    }
}

/// Renders reconstructed frames
///
/// A display failure drops the frame; a lost or incomplete frame is simply
/// never shown.
pub trait VideoDisplay: Send {
    fn show_frame(&mut self, data: &[u8]) -> Result<(), VideoError>;
}
