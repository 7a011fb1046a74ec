//! End-to-end pipeline tests over the loopback interface
//!
//! A session whose beacons target 127.0.0.1 discovers itself, so a single
//! coordinator exercises the whole path: capture collaborator -> codec ->
//! socket -> receive -> jitter buffer -> playback collaborator, and the video
//! equivalent through fragmentation and reassembly. Mock collaborators stand
//! in for the audio and camera hardware.

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lan_intercom::audio::{AudioSink, AudioSource};
use lan_intercom::config::AppConfig;
use lan_intercom::error::{AudioError, VideoError};
use lan_intercom::protocol::PacketCodec;
use lan_intercom::session::SessionCoordinator;
use lan_intercom::video::{EncodedFrame, VideoDisplay, VideoSource};

const PERIOD_FRAMES: usize = 64;

fn test_config(discovery: u16, audio: u16, video: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.network.discovery_port = discovery;
    config.network.audio_port = audio;
    config.network.video_port = video;
    config.network.broadcast_address = Ipv4Addr::LOCALHOST;
    config.network.beacon_interval_secs = 1;
    config.audio.channels = 1;
    config.audio.period_frames = PERIOD_FRAMES;
    config.audio.jitter_depth = 3;
    config
}

/// Emits periods whose first sample encodes their index (1-based), then
/// silence forever. Paced at roughly 100 periods per second.
struct ScriptedSource {
    next: usize,
    count: usize,
}

impl AudioSource for ScriptedSource {
    fn read_period(&mut self) -> Result<Vec<i16>, AudioError> {
        thread::sleep(Duration::from_millis(10));
        let mut period = vec![0i16; PERIOD_FRAMES];
        if self.next < self.count {
            self.next += 1;
            period[0] = self.next as i16;
        }
        Ok(period)
    }
}

/// Collects every period handed to playback
#[derive(Clone, Default)]
struct CollectingSink {
    periods: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl AudioSink for CollectingSink {
    fn write_period(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.periods.lock().push(samples.to_vec());
        Ok(())
    }
}

/// Emits the same multi-fragment compressed frame repeatedly
struct ScriptedVideoSource {
    frame: Bytes,
}

impl VideoSource for ScriptedVideoSource {
    fn capture_frame(&mut self) -> Result<EncodedFrame, VideoError> {
        thread::sleep(Duration::from_millis(30));
        Ok(EncodedFrame {
            timestamp: 0,
            data: self.frame.clone(),
        })
    }
}

#[derive(Clone, Default)]
struct CollectingDisplay {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl VideoDisplay for CollectingDisplay {
    fn show_frame(&mut self, data: &[u8]) -> Result<(), VideoError> {
        self.frames.lock().push(data.to_vec());
        Ok(())
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn audio_pipeline_self_loopback() {
    let config = test_config(42101, 42102, 42103);
    let source = ScriptedSource { next: 0, count: 200 };
    let sink = CollectingSink::default();
    let collected = sink.periods.clone();

    let session =
        SessionCoordinator::start(config, Box::new(source), Box::new(sink), None).unwrap();

    // Self-discovery: repeated beacons must yield exactly one peer record
    assert!(wait_until(Duration::from_secs(10), || session.peers().len() == 1));
    thread::sleep(Duration::from_millis(2500));
    assert_eq!(session.peers().len(), 1);

    // Enough scripted periods must make it through the full pipeline
    assert!(wait_until(Duration::from_secs(15), || {
        marker_run(&collected.lock()).len() >= 50
    }));

    session.shutdown();

    // The markers that arrived form one contiguous run: ordered, no drops,
    // no concealment mixed in
    let markers = marker_run(&collected.lock());
    assert!(markers.len() >= 50);
    for pair in markers.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "markers out of order: {markers:?}");
    }
}

/// First samples of the collected periods, with leading/trailing silence
/// stripped
fn marker_run(periods: &[Vec<i16>]) -> Vec<i16> {
    periods
        .iter()
        .map(|p| p[0])
        .filter(|&m| m > 0)
        .collect()
}

#[test]
fn audio_oversized_datagram_dropped() {
    let config = test_config(42121, 42122, 42123);
    let source = ScriptedSource { next: 0, count: 0 };
    let sink = CollectingSink::default();
    let collected = sink.periods.clone();

    let session =
        SessionCoordinator::start(config, Box::new(source), Box::new(sink), None).unwrap();
    assert!(wait_until(Duration::from_secs(10), || session.peers().len() == 1));

    // Valid headers, double the configured period length: the receive buffer
    // cannot hold these, and the OS-truncated remainder would otherwise pass
    // the decoder as a plausible period of garbage
    let oversized_codec = PacketCodec::new(PERIOD_FRAMES * 2, 16);
    let injector = UdpSocket::bind("127.0.0.1:0").unwrap();
    for seq in 0..30u32 {
        let datagram = oversized_codec
            .encode_audio(seq, 0, &vec![-5i16; PERIOD_FRAMES * 2])
            .unwrap();
        injector.send_to(&datagram, ("127.0.0.1", 42122)).unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(300));
    session.shutdown();

    // None of the injected payload reached playback
    let periods = collected.lock();
    assert!(periods.iter().all(|p| p.iter().all(|&s| s != -5)));
}

#[test]
fn video_pipeline_self_loopback() {
    let config = test_config(42111, 42112, 42113);

    // 3500 bytes at 1400 per fragment -> 3 fragments per frame
    let frame: Bytes = (0..3500u32).map(|i| (i % 251) as u8).collect();

    let source = ScriptedSource { next: 0, count: 0 };
    let sink = CollectingSink::default();
    let video_source = ScriptedVideoSource {
        frame: frame.clone(),
    };
    let display = CollectingDisplay::default();
    let shown = display.frames.clone();

    let session = SessionCoordinator::start(
        config,
        Box::new(source),
        Box::new(sink),
        Some((Box::new(video_source), Box::new(display))),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(15), || !shown.lock().is_empty()));
    session.shutdown();

    // Every displayed frame is a byte-exact reassembly of the captured one
    let frames = shown.lock();
    assert!(!frames.is_empty());
    for displayed in frames.iter() {
        assert_eq!(displayed.as_slice(), &frame[..]);
    }
}
