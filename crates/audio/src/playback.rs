//! Real speaker playback. Spec §4.1 calls for "a pre-buffered streaming
//! queue"; the teacher has no playback code at all (it is a listen-only
//! app), so this module follows the teacher's device/stream idiom
//! (`cpal::traits`, a realtime callback that must never block) while
//! inventing the buffering and fade-in a playback path actually needs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::traits::AudioOutput;
use crate::AudioError;

pub struct CpalAudioOutput {
    _stream: Stream,
    producer: HeapProd<f32>,
    sample_rate: u32,
}

// See the matching note on `CpalAudioInput` in capture.rs: cpal's `Stream`
// opts out of auto-`Send` via a `PhantomData<*mut ()>` marker, but the handle
// itself is safe to move across threads.
unsafe impl Send for CpalAudioOutput {}

impl CpalAudioOutput {
    /// `fade_in_ms` (spec §4.1/§6, `SessionConfig::fade_in_ms`) sets how long
    /// the ease-in ramp runs whenever the ring buffer empties and then
    /// receives new audio, so a stream restart after an underrun doesn't
    /// click.
    pub fn open(device_id: Option<&str>, target_rate: u32, fade_in_ms: u32) -> crate::Result<Self> {
        let fade_in_samples = ((target_rate as u64 * fade_in_ms as u64) / 1000).max(1) as usize;
        let host = cpal::default_host();
        let device = match device_id {
            Some(id) => host
                .output_devices()?
                .find(|d| d.name().ok().as_deref() == Some(id))
                .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?,
        };

        let config = device.default_output_config().map_err(|e| {
            AudioError::StreamError(format!("failed to get default output config: {e}"))
        })?;
        let channels = config.channels() as usize;

        // Two seconds of headroom at the target rate; C1's drain loop keeps
        // this topped up, underruns just mean silence rather than a panic.
        let ring = HeapRb::<f32>::new(target_rate as usize * 2);
        let (producer, mut consumer) = ring.split();

        let fade_remaining = Arc::new(AtomicUsize::new(0));
        let was_empty = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let fade_remaining = fade_remaining.clone();
                let was_empty = was_empty.clone();
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _| {
                        fill_output(data, channels, &mut consumer, &fade_remaining, &was_empty, fade_in_samples);
                    },
                    |err| tracing::error!("audio playback stream error: {err}"),
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
            .map_err(|e| AudioError::StreamError(format!("failed to start playback stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate: target_rate,
        })
    }
}

/// Exponential ease-in curve (spec §4.1): quiet at the start of the ramp and
/// accelerating into full volume, rather than a linear ramp.
fn ease_in_expo(progress: f32) -> f32 {
    if progress <= 0.0 {
        0.0
    } else if progress >= 1.0 {
        1.0
    } else {
        2f32.powf(10.0 * (progress - 1.0))
    }
}

fn fill_output(
    data: &mut [f32],
    channels: usize,
    consumer: &mut HeapCons<f32>,
    fade_remaining: &AtomicUsize,
    was_empty: &std::sync::atomic::AtomicBool,
    fade_in_samples: usize,
) {
    for frame in data.chunks_mut(channels) {
        let sample = match consumer.try_pop() {
            Some(s) => {
                if was_empty.swap(false, Ordering::Relaxed) {
                    fade_remaining.store(fade_in_samples, Ordering::Relaxed);
                }
                let remaining = fade_remaining.load(Ordering::Relaxed);
                if remaining > 0 {
                    fade_remaining.store(remaining - 1, Ordering::Relaxed);
                    let progress = fade_in_samples.saturating_sub(remaining) as f32 / fade_in_samples as f32;
                    s * ease_in_expo(progress)
                } else {
                    s
                }
            }
            None => {
                was_empty.store(true, Ordering::Relaxed);
                0.0
            }
        };
        for out in frame.iter_mut() {
            *out = sample;
        }
    }
}

impl AudioOutput for CpalAudioOutput {
    fn write(&mut self, bytes: &[u8]) -> crate::Result<usize> {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect();
        let mut written = 0;
        for sample in samples {
            if self.producer.try_push(sample).is_err() {
                break;
            }
            written += 2;
        }
        Ok(written)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_output_ramps_up_after_silence_then_plays_flat() {
        let ring = HeapRb::<f32>::new(16);
        let (mut producer, mut consumer) = ring.split();
        for _ in 0..8 {
            producer.try_push(1.0).unwrap();
        }
        let fade_total = 4;
        let fade_remaining = AtomicUsize::new(fade_total);
        let was_empty = std::sync::atomic::AtomicBool::new(false);
        let mut out = vec![0.0f32; 8];
        fill_output(&mut out, 1, &mut consumer, &fade_remaining, &was_empty, fade_total);
        assert!(out[0] < out[3]);
        assert!((out[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ease_in_expo_ramp_is_monotonic_and_quiet_at_the_start() {
        let quarter = ease_in_expo(0.25);
        let half = ease_in_expo(0.5);
        let three_quarters = ease_in_expo(0.75);
        assert!(quarter < half);
        assert!(half < three_quarters);
        assert!(quarter < 0.01, "ease-in should start much quieter than a linear ramp");
        assert_eq!(ease_in_expo(1.0), 1.0);
        assert_eq!(ease_in_expo(0.0), 0.0);
    }
}
