//! Real microphone capture, grounded in the teacher's `stream::build_stream`:
//! a cpal input stream runs its callback on cpal's realtime thread, which
//! must never block, so samples cross into the orchestrator's world over a
//! bounded `crossbeam-channel` exactly as the teacher bridges device
//! callbacks to a `Receiver<Vec<f32>>`.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use crossbeam_channel::Receiver;
use rubato::{FftFixedIn, Resampler as RubatoResampler};

use crate::chunk::AudioChunk;
use crate::traits::AudioInput;
use crate::AudioError;

/// Microphone-backed [`AudioInput`]. Owns the cpal stream for its lifetime;
/// dropping it tears the stream down.
pub struct CpalAudioInput {
    _stream: Stream,
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
    stopped: bool,
}

// cpal's `Stream` carries a `PhantomData<*mut ()>` marker that opts it out of
// auto-`Send` on every platform even though the underlying handle is just a
// device reference safely moved across threads; the realtime work happens on
// cpal's own callback thread, not here.
unsafe impl Send for CpalAudioInput {}

impl CpalAudioInput {
    /// Opens `device_id` (or the host default when `None`) and resamples its
    /// native rate to `target_rate` if they differ.
    pub fn open(device_id: Option<&str>, target_rate: u32) -> crate::Result<Self> {
        let host = cpal::default_host();
        let device = match device_id {
            Some(id) => host
                .input_devices()?
                .find(|d| d.name().ok().as_deref() == Some(id))
                .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))?,
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?,
        };

        let config = device.default_input_config().map_err(|e| {
            AudioError::StreamError(format!("failed to get default config: {e}"))
        })?;
        let source_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let (tx, rx) = crossbeam_channel::unbounded::<Vec<f32>>();

        let resampler: Option<Arc<Mutex<SincResampler>>> = if source_rate != target_rate {
            SincResampler::new(source_rate, target_rate).map(|r| Arc::new(Mutex::new(r)))
        } else {
            None
        };

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let resampler = resampler.clone();
                device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _| {
                        let samples = process_frame(data, channels, source_rate, target_rate, resampler.as_ref());
                        let _ = tx.send(samples);
                    },
                    |err| tracing::error!("audio capture stream error: {err}"),
                    None,
                )?
            }
            SampleFormat::I16 => {
                let resampler = resampler.clone();
                device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _| {
                        let float: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let samples =
                            process_frame(&float, channels, source_rate, target_rate, resampler.as_ref());
                        let _ = tx.send(samples);
                    },
                    |err| tracing::error!("audio capture stream error: {err}"),
                    None,
                )?
            }
            format => {
                return Err(AudioError::StreamError(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("failed to start capture stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            receiver: rx,
            sample_rate: target_rate,
            stopped: false,
        })
    }
}

impl AudioInput for CpalAudioInput {
    fn next_frame(&mut self) -> Option<AudioChunk> {
        if self.stopped {
            return None;
        }
        let samples = self.receiver.recv().ok()?;
        Some(AudioChunk::new(samples, self.sample_rate))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

fn process_frame(
    data: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
    resampler: Option<&Arc<Mutex<SincResampler>>>,
) -> Vec<f32> {
    match resampler {
        Some(resampler) => {
            let mono = if channels > 1 { to_mono(data, channels) } else { data.to_vec() };
            match resampler.lock() {
                Ok(mut r) => r.process(&mono),
                Err(_) => resample_linear(&mono, source_rate, target_rate),
            }
        }
        None => to_mono_if_needed(data, channels).into_owned(),
    }
}

fn to_mono_if_needed(samples: &[f32], channels: usize) -> Cow<'_, [f32]> {
    if channels <= 1 {
        Cow::Borrowed(samples)
    } else {
        Cow::Owned(to_mono(samples, channels))
    }
}

fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    let mono_len = samples.len() / channels;
    let inv = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .take(mono_len)
        .map(|c| c.iter().sum::<f32>() * inv)
        .collect()
}

/// Fallback stateless resampler for odd ratios the sinc resampler rejects.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let mut out = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx.fract() as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };
        out.push(sample);
    }
    out
}

/// High-quality sinc resampler, buffered to absorb cpal's variable callback
/// sizes. Grounded in the teacher's `stream::SincResampler`.
struct SincResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<f32>,
    chunk_size: usize,
}

impl SincResampler {
    fn new(from_rate: u32, to_rate: u32) -> Option<Self> {
        let chunk_size = 256;
        let resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1).ok()?;
        Some(Self {
            resampler,
            input_buffer: Vec::with_capacity(chunk_size * 2),
            chunk_size,
        })
    }

    fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        self.input_buffer.extend_from_slice(samples);
        let mut output = Vec::new();
        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            if let Ok(resampled) = self.resampler.process(&[chunk], None) {
                if let Some(channel) = resampled.into_iter().next() {
                    output.extend_from_slice(&channel);
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_resample_upsamples_to_expected_length() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample_linear(&samples, 8000, 16000);
        assert_eq!(out.len(), samples.len() * 2);
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }
}
