//! FFT resampling with rubato, streaming (capture) and whole-buffer (playback).

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

fn mono_fft(from_rate: u32, to_rate: u32) -> Result<Fft<f32>> {
    Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1, FixedSync::Input).context("Failed to create resampler")
}

/// Resampler fed from an audio callback in arbitrary slice sizes.
pub struct StreamResampler {
    resampler: Fft<f32>,
    pending: Vec<f32>,
    output: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler = mono_fft(from_rate, to_rate)?;
        let output = vec![0.0; resampler.output_frames_max()];
        Ok(Self { resampler, pending: Vec::with_capacity(CHUNK_SIZE * 2), output })
    }

    /// Queue samples and return whatever full chunks produced.
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);
        let mut produced = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            let frames = self.output.len();
            let (Ok(input), Ok(mut output)) =
                (InterleavedSlice::new(&chunk, 1, CHUNK_SIZE), InterleavedSlice::new_mut(&mut self.output, 1, frames))
            else {
                break;
            };
            match self.resampler.process_into_buffer(&input, &mut output, None) {
                Ok((_, written)) => produced.extend_from_slice(&self.output[..written]),
                Err(e) => {
                    tracing::warn!("Resampling failed: {}", e);
                    break;
                }
            }
        }
        produced
    }
}

/// Resample a whole buffer.
///
/// # Errors
/// Returns an error if the resampler cannot be built or a chunk fails.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    let mut resampler = mono_fft(from_rate, to_rate)?;
    let frames = resampler.output_frames_max();
    let mut buffer = vec![0.0; frames];
    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64) as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    for chunk in samples.chunks(CHUNK_SIZE) {
        let mut padded = chunk.to_vec();
        padded.resize(CHUNK_SIZE, 0.0);
        let input = InterleavedSlice::new(&padded, 1, CHUNK_SIZE).context("Failed to wrap input")?;
        let mut out = InterleavedSlice::new_mut(&mut buffer, 1, frames).context("Failed to wrap output")?;
        let (_, written) = resampler.process_into_buffer(&input, &mut out, None).map_err(|e| anyhow!("Resampling error: {}", e))?;
        output.extend_from_slice(&buffer[..written]);
    }

    output.truncate(expected + 100);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_lengths() {
        let up = resample(&vec![0.0; 24000], 24000, 48000).unwrap();
        assert!(up.len() >= 47900 && up.len() <= 48100, "got {}", up.len());
        let down = resample(&vec![0.0; 48000], 48000, 16000).unwrap();
        assert!(down.len() >= 15900 && down.len() <= 16100, "got {}", down.len());
        assert_eq!(resample(&[0.5; 10], 16000, 16000).unwrap(), [0.5; 10]);
    }

    #[test]
    fn test_stream_resampler_buffers_partial_chunks() {
        let mut stream = StreamResampler::new(48000, 16000).unwrap();
        assert!(stream.push(&[0.0; 512]).is_empty());
        let mut total = 0;
        for _ in 0..20 {
            total += stream.push(&[0.0; 512]).len();
        }
        assert!(total > 0);
    }
}
