//! Session coordinator
//!
//! Owns the sockets, the shared peer directory and one thread per duty:
//! beacon, discovery listener, audio capture/send, audio receive/play and,
//! when a video source and display are supplied, video capture/send and video
//! receive/play. It is the only component that touches the capture and
//! playback collaborators.
//!
//! Shutdown is cooperative: a shared flag is checked once per loop iteration
//! and every blocking receive carries a read timeout, so `shutdown` joins all
//! threads within a bounded delay.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{AudioSink, AudioSource, JitterBuffer, PlayoutUnit};
use crate::config::AppConfig;
use crate::error::{NetworkError, Result};
use crate::peers::PeerDirectory;
use crate::protocol::{PacketCodec, BEACON_MARKER, VIDEO_HEADER_LEN};
use crate::video::{FragmentReassembler, VideoDisplay, VideoSource};

/// How long a blocking receive waits before re-checking the shutdown flag
/// and the liveness timer
const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Receive buffer requested on the media sockets
const MEDIA_RECV_BUFFER: usize = 2 * 1024 * 1024;

/// A running intercom session
pub struct SessionCoordinator {
    running: Arc<AtomicBool>,
    peers: Arc<PeerDirectory>,
    handles: Vec<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Bind the sockets and start every duty thread
    ///
    /// `video` is optional: without a source/display pair the video threads
    /// are simply not started.
    pub fn start(
        config: AppConfig,
        audio_source: Box<dyn AudioSource>,
        audio_sink: Box<dyn AudioSink>,
        video: Option<(Box<dyn VideoSource>, Box<dyn VideoDisplay>)>,
    ) -> Result<Self> {
        config.validate()?;

        let discovery_socket = bind_udp(config.network.discovery_port, true, None)?;
        let audio_socket = bind_udp(config.network.audio_port, false, Some(MEDIA_RECV_BUFFER))?;
        let video_socket = if video.is_some() {
            Some(bind_udp(config.network.video_port, false, Some(MEDIA_RECV_BUFFER))?)
        } else {
            None
        };

        let running = Arc::new(AtomicBool::new(true));
        let peers = Arc::new(PeerDirectory::new());
        let codec = PacketCodec::new(
            config.audio.samples_per_period(),
            config.video.max_fragment_payload,
        );
        let started_at = Instant::now();

        let mut handles = Vec::new();

        // Discovery: advertise-only, no handshake
        handles.push(spawn_thread("beacon", {
            let socket = try_clone(&discovery_socket)?;
            let running = running.clone();
            let target = SocketAddr::V4(SocketAddrV4::new(
                config.network.broadcast_address,
                config.network.discovery_port,
            ));
            let interval = config.network.beacon_interval();
            move || run_beacon(&socket, target, interval, &running)
        })?);

        handles.push(spawn_thread("discovery", {
            let running = running.clone();
            let peers = peers.clone();
            let timeout = config.network.liveness_timeout();
            move || run_discovery_listener(&discovery_socket, &peers, timeout, &running)
        })?);

        // Audio pipeline
        handles.push(spawn_thread("audio-send", {
            let socket = try_clone(&audio_socket)?;
            let running = running.clone();
            let peers = peers.clone();
            let audio_port = config.network.audio_port;
            move || {
                run_audio_send(
                    audio_source,
                    &socket,
                    &peers,
                    audio_port,
                    codec,
                    started_at,
                    &running,
                )
            }
        })?);

        handles.push(spawn_thread("audio-recv", {
            let running = running.clone();
            let depth = config.audio.jitter_depth;
            let silence = vec![0i16; config.audio.samples_per_period()];
            move || run_audio_receive(audio_sink, &audio_socket, codec, depth, silence, &running)
        })?);

        // Video pipeline, only when both collaborators exist
        if let Some((video_source, video_display)) = video {
            let video_socket = video_socket.expect("bound when video is requested");

            handles.push(spawn_thread("video-send", {
                let socket = try_clone(&video_socket)?;
                let running = running.clone();
                let peers = peers.clone();
                let video_port = config.network.video_port;
                move || run_video_send(video_source, &socket, &peers, video_port, codec, &running)
            })?);

            handles.push(spawn_thread("video-recv", {
                let running = running.clone();
                let buffer_len = VIDEO_HEADER_LEN + config.video.max_fragment_payload;
                move || run_video_receive(video_display, &video_socket, codec, buffer_len, &running)
            })?);
        }

        tracing::info!(
            discovery = config.network.discovery_port,
            audio = config.network.audio_port,
            "session started with {} threads",
            handles.len()
        );

        Ok(Self {
            running,
            peers,
            handles,
        })
    }

    /// Handle to the shared live-peer set
    pub fn peers(&self) -> Arc<PeerDirectory> {
        self.peers.clone()
    }

    /// Whether any media loop has not yet stopped itself
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal every thread to stop and join them all
    ///
    /// Media threads have no ordering dependency on each other; each exits at
    /// its next loop check. Sockets and device handles are released after the
    /// last join.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("session stopped");
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Bind a UDP socket on all interfaces with the options the duty needs
fn bind_udp(
    port: u16,
    broadcast: bool,
    recv_buffer: Option<usize>,
) -> std::result::Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    if broadcast {
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    }
    if let Some(bytes) = recv_buffer {
        // Best effort: an undersized OS buffer degrades to more loss, which
        // the playout path already conceals
        if let Err(e) = socket.set_recv_buffer_size(bytes) {
            tracing::warn!("failed to enlarge receive buffer: {}", e);
        }
    }

    let address: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .expect("static address format");
    socket
        .bind(&address.into())
        .map_err(|e| NetworkError::BindFailed(format!("port {port}: {e}")))?;
    socket
        .set_read_timeout(Some(SOCKET_READ_TIMEOUT))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}

fn try_clone(socket: &UdpSocket) -> std::result::Result<UdpSocket, NetworkError> {
    socket
        .try_clone()
        .map_err(|e| NetworkError::BindFailed(e.to_string()))
}

fn spawn_thread<F>(name: &str, body: F) -> std::result::Result<JoinHandle<()>, NetworkError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))
}

/// Sleep for `duration`, waking early when the shutdown flag drops
fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Relaxed) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(Duration::from_millis(100)));
    }
}

/// True when a receive error is just the configured read timeout
fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Broadcast the presence marker every interval, regardless of prior replies
fn run_beacon(
    socket: &UdpSocket,
    target: SocketAddr,
    interval: Duration,
    running: &AtomicBool,
) {
    while running.load(Ordering::Relaxed) {
        if let Err(e) = socket.send_to(BEACON_MARKER, target) {
            // Logged and retried next interval
            tracing::warn!("beacon send failed: {}", e);
        }
        sleep_while_running(running, interval);
    }
}

/// Record every exact-marker payload heard on the discovery port and prune
/// peers that have gone quiet
fn run_discovery_listener(
    socket: &UdpSocket,
    peers: &PeerDirectory,
    liveness_timeout: Duration,
    running: &AtomicBool,
) {
    let mut buffer = [0u8; 64];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((len, from)) => {
                if &buffer[..len] == BEACON_MARKER {
                    if peers.record_hello(from) {
                        tracing::info!("peer discovered: {}", from);
                    }
                }
                // Anything else on this port is noise: ignored silently
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => tracing::warn!("discovery receive failed: {}", e),
        }
        peers.prune_expired(Instant::now(), liveness_timeout);
    }
}

/// Capture one period at a time, packetize and fan out to the live-peer
/// snapshot
fn run_audio_send(
    mut source: Box<dyn AudioSource>,
    socket: &UdpSocket,
    peers: &PeerDirectory,
    audio_port: u16,
    codec: PacketCodec,
    started_at: Instant,
    running: &AtomicBool,
) {
    let mut sequence: u32 = 0;
    let mut recovering = false;

    while running.load(Ordering::Relaxed) {
        let samples = match source.read_period() {
            Ok(samples) => {
                recovering = false;
                samples
            }
            Err(e) => {
                tracing::warn!("audio capture failed: {}", e);
                if recovering || source.recover().is_err() {
                    tracing::error!("audio capture unrecoverable, stopping capture loop");
                    break;
                }
                recovering = true;
                continue;
            }
        };

        let timestamp = started_at.elapsed().as_micros() as u64;
        let datagram = match codec.encode_audio(sequence, timestamp, &samples) {
            Ok(datagram) => datagram,
            Err(e) => {
                // Device handed back an off-size period; skip it
                tracing::warn!("audio encode failed: {}", e);
                continue;
            }
        };
        sequence = sequence.wrapping_add(1);

        for peer in peers.snapshot() {
            let target = SocketAddr::new(peer.ip(), audio_port);
            if let Err(e) = socket.send_to(&datagram, target) {
                tracing::warn!("audio send to {} failed: {}", target, e);
            }
        }
    }
}

/// Receive audio datagrams, reorder through the jitter buffer and hand playout
/// units to the sink
fn run_audio_receive(
    mut sink: Box<dyn AudioSink>,
    socket: &UdpSocket,
    codec: PacketCodec,
    jitter_depth: usize,
    silence: Vec<i16>,
    running: &AtomicBool,
) {
    let mut jitter = JitterBuffer::new(jitter_depth);
    // One byte of headroom: a receive filling the whole buffer means the
    // datagram was larger than any valid one and the OS truncated it
    let mut buffer = vec![0u8; codec.audio_datagram_len() + 1];
    let mut recovering = false;

    'recv: while running.load(Ordering::Relaxed) {
        let len = match socket.recv(&mut buffer) {
            Ok(len) => len,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                tracing::warn!("audio receive failed: {}", e);
                continue;
            }
        };
        if len == buffer.len() {
            tracing::trace!("oversized audio datagram dropped");
            continue;
        }

        let packet = match codec.decode_audio(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                // Short or corrupt datagram: drop it and keep receiving
                tracing::trace!("audio decode failed: {}", e);
                continue;
            }
        };

        jitter.push(packet);

        // One unit per datagram in the steady state; concealments leave their
        // real packet buffered, so after loss keep draining until the depth
        // is back at the target
        while let Some(unit) = jitter.pop() {
            let samples = match &unit {
                PlayoutUnit::Packet(packet) => &packet.samples,
                PlayoutUnit::Concealment => &silence,
            };
            if let Err(e) = sink.write_period(samples) {
                tracing::warn!("audio playback failed: {}", e);
                if recovering || sink.recover().is_err() {
                    tracing::error!("audio playback unrecoverable, stopping playout loop");
                    break 'recv;
                }
                recovering = true;
            } else {
                recovering = false;
            }
            if jitter.depth() <= jitter_depth {
                break;
            }
        }
    }

    let stats = jitter.stats();
    tracing::debug!(
        received = stats.packets_received,
        late = stats.packets_late,
        concealed = stats.units_concealed,
        "audio receive loop done"
    );
}

/// Capture compressed frames, fragment and fan out to the live-peer snapshot
fn run_video_send(
    mut source: Box<dyn VideoSource>,
    socket: &UdpSocket,
    peers: &PeerDirectory,
    video_port: u16,
    codec: PacketCodec,
    running: &AtomicBool,
) {
    let mut frame_sequence: u32 = 0;
    let mut recovering = false;

    while running.load(Ordering::Relaxed) {
        let frame = match source.capture_frame() {
            Ok(frame) => {
                recovering = false;
                frame
            }
            Err(e) => {
                tracing::warn!("video capture failed: {}", e);
                if recovering || source.recover().is_err() {
                    tracing::error!("video capture unrecoverable, stopping capture loop");
                    break;
                }
                recovering = true;
                continue;
            }
        };

        let fragments = match codec.fragment_frame(frame_sequence, &frame.data) {
            Ok(fragments) => fragments,
            Err(e) => {
                tracing::warn!("video fragmentation failed: {}", e);
                continue;
            }
        };
        frame_sequence = frame_sequence.wrapping_add(1);

        let snapshot = peers.snapshot();
        for peer in snapshot {
            let target = SocketAddr::new(peer.ip(), video_port);
            for fragment in &fragments {
                if let Err(e) = socket.send_to(fragment, target) {
                    tracing::warn!("video send to {} failed: {}", target, e);
                }
            }
        }
    }
}

/// Receive fragments, reassemble frames and hand complete ones to the display
fn run_video_receive(
    mut display: Box<dyn VideoDisplay>,
    socket: &UdpSocket,
    codec: PacketCodec,
    buffer_len: usize,
    running: &AtomicBool,
) {
    let mut reassembler = FragmentReassembler::new();
    let mut buffer = vec![0u8; buffer_len];

    while running.load(Ordering::Relaxed) {
        let len = match socket.recv(&mut buffer) {
            Ok(len) => len,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                tracing::warn!("video receive failed: {}", e);
                continue;
            }
        };

        let fragment = match codec.decode_video_fragment(&buffer[..len]) {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::trace!("video decode failed: {}", e);
                continue;
            }
        };

        if let Some(frame) = reassembler.ingest(fragment) {
            // An undisplayable frame is dropped, same as a lost one
            if let Err(e) = display.show_frame(&frame) {
                tracing::warn!("video display failed: {}", e);
            }
        }
    }

    let stats = reassembler.stats();
    tracing::debug!(
        completed = stats.frames_completed,
        evicted = stats.frames_evicted,
        "video receive loop done"
    );
}
