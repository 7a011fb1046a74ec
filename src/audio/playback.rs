//! Audio playback via cpal
//!
//! Mirror of the capture side: [`CpalSink::write_period`] queues one period,
//! the device callback drains the queue at the hardware rate and fills any
//! shortfall with silence. A full queue drops the newest period instead of
//! blocking the receive path.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::ring::{create_shared_queue, SharedPeriodQueue};
use crate::audio::AudioSink;
use crate::config::AudioConfig;
use crate::constants::PERIOD_QUEUE_CAPACITY;
use crate::error::AudioError;

/// Playback side of the default (or named) output device
pub struct CpalSink {
    queue: SharedPeriodQueue,
    error_rx: Receiver<AudioError>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open an output device and start the playback stream
    pub fn new(device_name: Option<&str>, config: AudioConfig) -> Result<Self, AudioError> {
        let device = find_output_device(device_name)?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = create_shared_queue(PERIOD_QUEUE_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let running_loop = running.clone();
        let callback_queue = queue.clone();

        let handle = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                // Carries the unconsumed tail of the current period between
                // callbacks
                let mut current: Vec<i16> = Vec::new();
                let mut offset = 0usize;

                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for out in data.iter_mut() {
                            if offset == current.len() {
                                match callback_queue.try_pop() {
                                    Some(period) => {
                                        current = period;
                                        offset = 0;
                                    }
                                    None => {
                                        // Underrun: render silence
                                        *out = 0.0;
                                        continue;
                                    }
                                }
                            }
                            *out = current[offset] as f32 / i16::MAX as f32;
                            offset += 1;
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

                while running_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

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

impl AudioSink for CpalSink {
    fn write_period(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }
        if !self.running.load(Ordering::Relaxed) {
            return Err(AudioError::Disconnected);
        }
        if !self.queue.push(samples.to_vec()) {
            tracing::trace!("playback queue full, period dropped");
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<(), AudioError> {
        while self.error_rx.try_recv().is_ok() {}
        if self.running.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(AudioError::Disconnected)
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Find an output device by name, or the default one
fn find_output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default output device".into())),
        Some(wanted) => {
            let devices = host
                .output_devices()
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
