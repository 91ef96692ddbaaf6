//! Microphone capture with cpal.
//!
//! The cpal callback only downmixes, resamples and pushes into a lock-free
//! ring buffer. A drain thread pops from the ring and hands chunks to the
//! consumer callback, so a slow consumer never blocks the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::StreamResampler;
use super::util::{device_name, downmix, pick_config};

/// About four seconds at 16kHz.
const RING_SIZE: usize = 65536;
const READ_CHUNK: usize = 2048;

pub struct Capturer {
    stream: Stream,
    /// Cleared while VAL is speaking so it does not hear itself.
    listening: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    drain: Option<JoinHandle<()>>,
}

impl Capturer {
    /// Open the default input device and start delivering mono samples at
    /// `sample_rate` to `on_samples`. Capture starts paused.
    ///
    /// # Errors
    /// Returns an error if there is no input device or the stream cannot be built.
    pub fn new<F>(sample_rate: u32, on_samples: F) -> Result<Self>
    where
        F: Fn(&[f32]) + Send + 'static,
    {
        let device = cpal::default_host().default_input_device().context("No input device available")?;
        info!("🎙️ Input device: {}", device_name(&device));

        let config = pick_config(device.supported_input_configs().context("Failed to query input configs")?, sample_rate)?;
        let device_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let mut resampler = if device_rate != sample_rate {
            info!("Resampling microphone {} Hz -> {} Hz", device_rate, sample_rate);
            Some(StreamResampler::new(device_rate, sample_rate)?)
        } else {
            None
        };

        let (mut producer, mut consumer) = HeapRb::<f32>::new(RING_SIZE).split();
        let listening = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let callback_listening = listening.clone();
        let dropped = AtomicU64::new(0);
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !callback_listening.load(Ordering::Relaxed) {
                    return;
                }
                let mono = downmix(data, channels);
                let samples = match resampler.as_mut() {
                    Some(resampler) => resampler.push(&mono),
                    None => mono,
                };
                if producer.push_slice(&samples) < samples.len() {
                    let count = dropped.fetch_add(1, Ordering::Relaxed);
                    if count.is_multiple_of(100) {
                        warn!("Capture ring full, dropped {} chunks", count + 1);
                    }
                }
            },
            |err| tracing::error!("Audio capture error: {}", err),
            None,
        )?;
        stream.play().context("Failed to start audio stream")?;

        let drain_listening = listening.clone();
        let drain_shutdown = shutdown.clone();
        let drain = std::thread::spawn(move || {
            let mut buffer = vec![0.0f32; READ_CHUNK];
            while !drain_shutdown.load(Ordering::Relaxed) {
                if !drain_listening.load(Ordering::Relaxed) {
                    consumer.clear();
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                if consumer.occupied_len() == 0 {
                    std::thread::sleep(Duration::from_micros(200));
                    continue;
                }
                let read = consumer.pop_slice(&mut buffer);
                on_samples(&buffer[..read]);
            }
            debug!("Capture drain thread exiting");
        });

        Ok(Self { stream, listening, shutdown, drain: Some(drain) })
    }

    pub fn resume(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    /// Stop delivering samples; anything buffered is discarded.
    pub fn pause(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Stop the stream and join the drain thread.
    pub fn shutdown(&mut self) {
        self.pause();
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.stream.pause();
        if let Some(handle) = self.drain.take()
            && handle.join().is_err()
        {
            warn!("Capture drain thread panicked");
        }
        debug!("Audio capture stopped");
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
