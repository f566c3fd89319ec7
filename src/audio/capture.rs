//! Microphone capture using CPAL.

use crate::defaults::SAMPLE_RATE;
use crate::error::{HearkenError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Samples per chunk delivered to the consumer (80 ms at 16 kHz).
const CHUNK_SIZE: usize = 1280;

fn audio_error(message: String) -> HearkenError {
    HearkenError::Audio { message }
}

/// Captures 16 kHz mono PCM from the default input device.
///
/// Tries an i16 stream first and falls back to f32 with conversion for
/// devices that only expose float formats. Chunks arrive on an internal
/// channel; the consumer polls with `try_read`.
pub struct MicCapture {
    _stream: Stream,
    receiver: Receiver<Vec<i16>>,
}

impl MicCapture {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| audio_error("no input device available".to_string()))?;

        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = mpsc::channel();
        let buffer = Arc::new(Mutex::new(Vec::with_capacity(CHUNK_SIZE * 2)));

        let stream = Self::build_stream_i16(&device, &config, sender.clone(), buffer.clone())
            .or_else(|_| Self::build_stream_f32(&device, &config, sender, buffer))?;

        stream
            .play()
            .map_err(|e| audio_error(format!("failed to start audio stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            receiver,
        })
    }

    fn build_stream_i16(
        device: &cpal::Device,
        config: &StreamConfig,
        sender: Sender<Vec<i16>>,
        buffer: Arc<Mutex<Vec<i16>>>,
    ) -> Result<Stream> {
        let err_fn = |err| eprintln!("Audio stream error: {}", err);

        device
            .build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut buf = buffer.lock().unwrap();
                    buf.extend_from_slice(data);

                    while buf.len() >= CHUNK_SIZE {
                        let chunk: Vec<i16> = buf.drain(..CHUNK_SIZE).collect();
                        let _ = sender.send(chunk);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| audio_error(format!("failed to build i16 stream: {}", e)))
    }

    fn build_stream_f32(
        device: &cpal::Device,
        config: &StreamConfig,
        sender: Sender<Vec<i16>>,
        buffer: Arc<Mutex<Vec<i16>>>,
    ) -> Result<Stream> {
        let err_fn = |err| eprintln!("Audio stream error: {}", err);

        device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
                        .collect();

                    let mut buf = buffer.lock().unwrap();
                    buf.extend_from_slice(&samples);

                    while buf.len() >= CHUNK_SIZE {
                        let chunk: Vec<i16> = buf.drain(..CHUNK_SIZE).collect();
                        let _ = sender.send(chunk);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| audio_error(format!("failed to build f32 stream: {}", e)))
    }

    /// Try to read a chunk of audio (non-blocking).
    pub fn try_read(&self) -> Option<Vec<i16>> {
        self.receiver.try_recv().ok()
    }

    /// Read a chunk of audio (blocking).
    pub fn read(&self) -> Result<Vec<i16>> {
        self.receiver
            .recv()
            .map_err(|_| audio_error("audio channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio hardware
    fn test_mic_capture_init() {
        let result = MicCapture::new();
        assert!(result.is_ok());
    }
}
