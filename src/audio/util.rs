//! Device helpers and sample utilities shared by capture, playback and earcons.

use std::f32::consts::TAU;

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Fade applied to both ends of a tone so it does not click.
const FADE_MS: u32 = 8;

pub fn device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick an F32 mono or stereo configuration, at `target_rate` when the device
/// supports it, otherwise at the nearest rate of the first candidate.
pub fn pick_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_rate: u32) -> Result<SupportedStreamConfig> {
    let candidates: Vec<SupportedStreamConfigRange> =
        configs.filter(|c| c.channels() <= 2 && c.sample_format() == SampleFormat::F32).collect();

    if let Some(exact) = candidates.iter().find(|c| (c.min_sample_rate()..=c.max_sample_rate()).contains(&target_rate)) {
        return Ok(exact.with_sample_rate(target_rate));
    }
    let Some(first) = candidates.first() else {
        anyhow::bail!("No F32 audio configuration with at most two channels");
    };
    Ok(first.with_sample_rate(target_rate.clamp(first.min_sample_rate(), first.max_sample_rate())))
}

/// Average interleaved frames down to mono.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
}

/// Sine tone with short linear fades.
pub fn tone(frequency: f32, duration_ms: u32, sample_rate: u32, volume: f32) -> Vec<f32> {
    let total = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    let fade = ((sample_rate * FADE_MS / 1000) as usize).min(total / 2).max(1);
    (0..total)
        .map(|i| {
            let envelope = (i.min(total - 1 - i) as f32 / fade as f32).min(1.0);
            (TAU * frequency * i as f32 / sample_rate as f32).sin() * volume * envelope
        })
        .collect()
}

/// Multiply samples by `gain` in place.
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() > f32::EPSILON {
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix() {
        assert_eq!(downmix(&[0.5, 1.0, -0.5, -1.0], 2), [0.75, -0.75]);
        assert_eq!(downmix(&[0.1, 0.2], 1), [0.1, 0.2]);
    }

    #[test]
    fn test_tone_shape() {
        let samples = tone(1000.0, 200, 24000, 0.5);
        assert_eq!(samples.len(), 4800);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= 0.5));
        assert!(samples.iter().any(|s| s.abs() > 0.45));
        assert!(samples[samples.len() - 1].abs() < 0.01);
    }

    #[test]
    fn test_gain() {
        let mut samples = vec![0.5, -0.5];
        apply_gain(&mut samples, 0.4);
        assert_eq!(samples, [0.2, -0.2]);
    }
}
