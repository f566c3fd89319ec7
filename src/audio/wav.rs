//! WAV file feeder for offline runs.

use crate::defaults::SAMPLE_RATE;
use crate::error::{HearkenError, Result};
use std::path::Path;

/// Reads a WAV file into 16 kHz mono i16 samples.
///
/// Stereo input is downmixed and other sample rates are linearly
/// resampled; the pipeline itself never resamples.
pub fn read_wav_samples(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| HearkenError::Audio {
        message: format!("failed to open WAV file: {}", e),
    })?;

    let spec = reader.spec();
    let source_rate = spec.sample_rate;
    let source_channels = spec.channels;

    let raw_samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HearkenError::Audio {
            message: format!("failed to read WAV samples: {}", e),
        })?;

    let mono_samples = if source_channels == 2 {
        raw_samples
            .chunks_exact(2)
            .map(|frame| {
                let left = frame[0] as i32;
                let right = frame[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect()
    } else {
        raw_samples
    };

    if source_rate == SAMPLE_RATE {
        Ok(mono_samples)
    } else {
        Ok(resample(&mono_samples, source_rate, SAMPLE_RATE))
    }
}

/// Linear resampler that walks a running source phase.
///
/// Each output sample advances the phase by `from_rate / to_rate` source
/// samples and blends the two neighbours the phase falls between; the loop
/// ends when the phase runs off the input.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let mut output = Vec::with_capacity((samples.len() as f64 / step) as usize + 1);
    let mut phase = 0.0f64;

    while (phase as usize) < samples.len() {
        let index = phase as usize;
        let sample = match samples.get(index + 1) {
            Some(&next) => {
                let weight = phase - index as f64;
                (samples[index] as f64 * (1.0 - weight) + next as f64 * weight).round() as i16
            }
            // Phase landed inside the final source sample.
            None => samples[index],
        };
        output.push(sample);
        phase += step;
    }

    output
}
