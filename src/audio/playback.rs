//! Speaker output with cpal.
//!
//! Samples are resampled to the device rate and queued in a lock-free ring
//! buffer that the cpal callback drains. `play` blocks until the ring is
//! empty or playback is stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::{Condvar, Mutex};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::resample;
use super::util::{device_name, pick_config};

/// About eleven seconds at 48kHz.
const RING_SIZE: usize = 524288;

/// Drained-or-stopped signal shared with the callback.
struct Drained {
    done: Mutex<bool>,
    cond: Condvar,
}

pub struct Player {
    _stream: Stream,
    device_rate: u32,
    input_rate: u32,
    producer: Mutex<ringbuf::HeapProd<f32>>,
    stopped: Arc<AtomicBool>,
    drained: Arc<Drained>,
}

impl Player {
    /// Open the default output device for mono audio at `sample_rate`.
    ///
    /// # Errors
    /// Returns an error if there is no output device or the stream cannot be built.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let device = cpal::default_host().default_output_device().context("No output device available")?;
        info!("🔈 Output device: {}", device_name(&device));

        let preferred_rate = device.default_output_config().map(|c| c.sample_rate()).unwrap_or(48000);
        let config = pick_config(device.supported_output_configs().context("Failed to query output configs")?, preferred_rate)?;
        let device_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let (producer, mut consumer) = HeapRb::<f32>::new(RING_SIZE).split();
        let stopped = Arc::new(AtomicBool::new(false));
        let drained = Arc::new(Drained { done: Mutex::new(true), cond: Condvar::new() });

        let callback_stopped = stopped.clone();
        let callback_drained = drained.clone();
        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let stopped = callback_stopped.load(Ordering::Relaxed);
                if stopped {
                    consumer.clear();
                }
                for frame in data.chunks_mut(channels) {
                    let sample = if stopped { 0.0 } else { consumer.try_pop().unwrap_or(0.0) };
                    frame.fill(sample);
                }
                if consumer.is_empty() {
                    let mut done = callback_drained.done.lock();
                    if !*done {
                        *done = true;
                        callback_drained.cond.notify_all();
                    }
                }
            },
            |err| tracing::error!("Audio playback error: {}", err),
            None,
        )?;
        stream.play().context("Failed to start playback stream")?;

        debug!("Playback: input {} Hz -> device {} Hz, {} channels", sample_rate, device_rate, channels);
        Ok(Self { _stream: stream, device_rate, input_rate: sample_rate, producer: Mutex::new(producer), stopped, drained })
    }

    /// Play mono samples and block until they finish.
    ///
    /// Returns `false` if playback was stopped or timed out.
    pub fn play(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }
        let samples = match resample(samples, self.input_rate, self.device_rate) {
            Ok(resampled) => resampled,
            Err(e) => {
                warn!("Resampling failed, playing at input rate: {}", e);
                samples.to_vec()
            }
        };

        self.stopped.store(false, Ordering::SeqCst);
        let written = self.producer.lock().push_slice(&samples);
        if written < samples.len() {
            warn!("Playback buffer overflow, dropped {} samples", samples.len() - written);
        }
        // Cleared after queueing so the callback cannot report the empty ring first
        *self.drained.done.lock() = false;

        let budget = Duration::from_secs_f64(samples.len() as f64 / self.device_rate as f64 + 1.0);
        let deadline = Instant::now() + budget;
        let mut done = self.drained.done.lock();
        while !*done {
            if self.drained.cond.wait_until(&mut done, deadline).timed_out() {
                warn!("Playback did not drain in {:.1}s", budget.as_secs_f32());
                drop(done);
                self.stop();
                return false;
            }
        }
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Silence output and drop queued samples.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut done = self.drained.done.lock();
        *done = true;
        self.drained.cond.notify_all();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}
