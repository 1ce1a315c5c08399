//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL (Cross-Platform Audio Library).
//! The device callback accumulates samples and hands fixed-size
//! [`AudioFrame`]s to the analysis thread over a channel.
//!
//! ## Features
//! - Default input device selection
//! - f32 format negotiation around a preferred sample rate
//! - Multi-channel input downmixed to mono

use crate::AudioFrame;
use crate::output::find_f32_config;
use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{error, info, trace};

/// Default number of samples per analysis frame (~46 ms at 44.1 kHz).
pub const BUFFER_SIZE: usize = 2048;

/// Starts audio capture from the default input device.
///
/// Frames of `frame_size` samples are sent to `sender` as they fill. If the
/// receiver has gone away the frames are simply dropped.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - The live stream (keep it alive) and its rate
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<AudioFrame>,
    frame_size: usize,
    preferred_rate: u32,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_f32_config(configs, preferred_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = preferred_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(sample_rate))
        .into();
    let channels = config.channels.max(1) as usize;

    info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

    let mut framer = Framer::new(frame_size, channels);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            framer.push(data, |samples| {
                if sender.send(AudioFrame::new(samples, sample_rate)).is_err() {
                    trace!("analysis side gone, dropping frame");
                }
            });
        },
        |err| error!("An error occurred on the input stream: {}", err),
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Accumulates interleaved device buffers into fixed-size mono frames.
#[derive(Debug)]
struct Framer {
    frame_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl Framer {
    fn new(frame_size: usize, channels: usize) -> Self {
        Self { frame_size, channels, pending: Vec::with_capacity(frame_size * 2) }
    }

    fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        let channels = self.channels as f32;
        self.pending.extend(
            interleaved
                .chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / channels),
        );

        while self.pending.len() >= self.frame_size {
            emit(self.pending[..self.frame_size].to_vec());
            self.pending.drain(..self.frame_size);
        }
    }
}
