//! Audio capture via cpal
//!
//! The device callback converts incoming samples to i16, slices them into
//! fixed-size periods and pushes them onto a lock-free queue; the session's
//! capture thread blocks in [`CpalSource::read_period`] until a whole period
//! is available. The cpal stream itself lives on a dedicated keep-alive
//! thread because it is not `Send`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::ring::{create_shared_queue, SharedPeriodQueue};
use crate::audio::AudioSource;
use crate::config::AudioConfig;
use crate::constants::PERIOD_QUEUE_CAPACITY;
use crate::error::AudioError;

/// Capture side of the default (or named) input device
pub struct CpalSource {
    queue: SharedPeriodQueue,
    error_rx: Receiver<AudioError>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Open an input device and start capturing
    ///
    /// `device_name` of `None` selects the default input device.
    pub fn new(device_name: Option<&str>, config: AudioConfig) -> Result<Self, AudioError> {
        let device = find_input_device(device_name)?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples_per_period = config.samples_per_period();
        let queue = create_shared_queue(PERIOD_QUEUE_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let running_cb = running.clone();
        let running_loop = running.clone();
        let callback_queue = queue.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                // Accumulates callback buffers until a whole period is ready
                let mut pending: Vec<i16> = Vec::with_capacity(samples_per_period);

                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        for &sample in data {
                            pending.push((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                            if pending.len() == samples_per_period {
                                let period = std::mem::replace(
                                    &mut pending,
                                    Vec::with_capacity(samples_per_period),
                                );
                                if !callback_queue.push(period) {
                                    tracing::trace!("capture queue full, period dropped");
                                }
                            }
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until shutdown
                while running_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        // Surface stream construction failures to the caller
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::StreamError("stream startup timed out".into()));
            }
        }

        Ok(Self {
            queue,
            error_rx,
            running,
            thread_handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioSource for CpalSource {
    /// Blocks until the device delivers a period, but never longer than one
    /// second so a shutdown check is always reachable upstream
    fn read_period(&mut self) -> Result<Vec<i16>, AudioError> {
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        loop {
            if let Some(period) = self.queue.try_pop() {
                return Ok(period);
            }
            if let Ok(err) = self.error_rx.try_recv() {
                return Err(err);
            }
            if !self.running.load(Ordering::Relaxed) {
                return Err(AudioError::Disconnected);
            }
            if std::time::Instant::now() >= deadline {
                return Err(AudioError::StreamError("no period within 1s".into()));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn recover(&mut self) -> Result<(), AudioError> {
        // Drain stale errors; the stream keeps running unless its thread died
        while self.error_rx.try_recv().is_ok() {}
        if self.running.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(AudioError::Disconnected)
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Find an input device by name, or the default one
fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".into())),
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
    }
}
