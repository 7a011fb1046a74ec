//! Audio subsystem module
//!
//! The transport never touches hardware directly: it reads and writes whole
//! periods of interleaved i16 samples through the [`AudioSource`] and
//! [`AudioSink`] seams. The cpal-backed implementations live in
//! [`capture`] and [`playback`].

pub mod capture;
pub mod jitter;
pub mod playback;
pub mod ring;

pub use capture::CpalSource;
pub use jitter::{JitterBuffer, PlayoutUnit};
pub use playback::CpalSink;
pub use ring::PeriodQueue;

use crate::error::AudioError;

/// Produces one capture period at a time, blocking until the device has one
///
/// A `read_period` failure is a local hardware condition; the caller attempts
/// [`AudioSource::recover`] once before giving up on the capture loop.
pub trait AudioSource: Send {
    /// Read one period of interleaved i16 samples
    fn read_period(&mut self) -> Result<Vec<i16>, AudioError>;

    /// Attempt a device-level recovery after a failed read
    fn recover(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Consumes one playout period at a time
pub trait AudioSink: Send {
    /// Queue one period of interleaved i16 samples for playback
    fn write_period(&mut self, samples: &[i16]) -> Result<(), AudioError>;

    /// Attempt a device-level recovery after a failed write
    fn recover(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}
