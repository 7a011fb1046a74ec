//! Error types for the intercom

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device errors
///
/// Always a local hardware condition, never a network failure. The owning
/// media loop attempts one recovery; a second failure stops only that loop.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device disconnected")]
    Disconnected,
}

/// Video collaborator errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Frame encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Frame decoding failed: {0}")]
    DecodeFailed(String),

    #[error("Display failed: {0}")]
    DisplayFailed(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Wire decode/encode errors
///
/// Decode failures are never fatal: the datagram is dropped and the receive
/// loop continues.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("Payload length mismatch: declared {declared}, available {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    #[error("Fragment payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid sample count: expected {expected}, got {actual}")]
    InvalidSampleCount { expected: usize, actual: usize },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
