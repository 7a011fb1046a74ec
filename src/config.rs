//! Application configuration
//!
//! Compiled-in defaults, optionally overridden by a TOML file. Both ends of a
//! session must agree on the media parameters out of band: the wire format is
//! not self-describing.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
}

/// Discovery and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port for HELLO beacons (bound and broadcast to)
    pub discovery_port: u16,
    /// Port audio datagrams are sent to and received on
    pub audio_port: u16,
    /// Port video fragments are sent to and received on
    pub video_port: u16,
    /// Address beacons are broadcast to
    pub broadcast_address: Ipv4Addr,
    /// Seconds between HELLO broadcasts
    pub beacon_interval_secs: u64,
    /// Seconds without a beacon before a peer is considered gone
    pub liveness_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: DEFAULT_DISCOVERY_PORT,
            audio_port: DEFAULT_AUDIO_PORT,
            video_port: DEFAULT_VIDEO_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            beacon_interval_secs: DEFAULT_BEACON_INTERVAL_SECS,
            liveness_timeout_secs: DEFAULT_LIVENESS_TIMEOUT_SECS,
        }
    }
}

impl NetworkConfig {
    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.beacon_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

/// Audio format settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Frames per capture/playback period
    pub period_frames: usize,
    /// Packets buffered before playout starts
    pub jitter_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            period_frames: DEFAULT_PERIOD_FRAMES,
            jitter_depth: DEFAULT_JITTER_DEPTH,
        }
    }
}

impl AudioConfig {
    /// Interleaved samples in one period (frames x channels)
    pub fn samples_per_period(&self) -> usize {
        self.period_frames * self.channels as usize
    }
}

/// Video pipeline settings
///
/// Width/height/quality are passed through to the capture collaborator; the
/// transport only cares about `max_fragment_payload`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Largest fragment payload placed in a single datagram
    pub max_fragment_payload: usize,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Compression quality, 0-100
    pub quality: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_fragment_payload: MAX_FRAGMENT_PAYLOAD,
            width: 320,
            height: 240,
            quality: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from the per-user config directory, falling back to defaults
    /// when no file exists
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Per-user config file location, if a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lan-intercom")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject parameter combinations the wire format cannot carry
    pub fn validate(&self) -> Result<()> {
        if self.audio.channels == 0 {
            return Err(Error::Config("channel count must be non-zero".into()));
        }
        if self.audio.period_frames == 0 {
            return Err(Error::Config("period length must be non-zero".into()));
        }
        if self.audio.jitter_depth == 0 {
            return Err(Error::Config("jitter depth must be non-zero".into()));
        }
        if self.video.max_fragment_payload == 0
            || self.video.max_fragment_payload > MAX_FRAGMENT_PAYLOAD
        {
            return Err(Error::Config(format!(
                "fragment payload must be within 1..={}",
                MAX_FRAGMENT_PAYLOAD
            )));
        }
        let port_pairs = [
            (self.network.discovery_port, self.network.audio_port),
            (self.network.discovery_port, self.network.video_port),
            (self.network.audio_port, self.network.video_port),
        ];
        if port_pairs.iter().any(|(a, b)| a == b) {
            return Err(Error::Config("discovery/audio/video ports must differ".into()));
        }
        Ok(())
    }
}
