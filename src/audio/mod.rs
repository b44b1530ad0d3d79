use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::audio_api::{AudioCommand, AudioSink, NoteSpec};
use crate::sequencer::scheduler::Clock;

mod engine;
mod frame;
mod voice;

pub use frame::StereoFrame;
pub use voice::{ActiveVoice, Voice, VoiceKind};

use engine::Engine;

/// Audio clock backed by the output stream's frame counter. Monotonic, and
/// it measures rendered audio rather than wall time, so scheduled
/// timestamps line up with what actually comes out of the device.
#[derive(Clone)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl Clock for SampleClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate
    }
}

/// Sending half of the command channel, as a sink the sequencer side can
/// schedule notes into.
#[derive(Clone)]
pub struct LiveSink {
    tx: Sender<AudioCommand>,
}

impl LiveSink {
    pub fn send(&self, cmd: AudioCommand) {
        let _ = self.tx.try_send(cmd);
    }
}

impl AudioSink for LiveSink {
    fn schedule(&mut self, note: NoteSpec) {
        let _ = self.tx.try_send(AudioCommand::Play(note));
    }
}

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    clock: SampleClock,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        let _ = self.tx.try_send(cmd);
    }

    pub fn sink(&self) -> LiveSink {
        LiveSink { tx: self.tx.clone() }
    }

    pub fn clock(&self) -> SampleClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> f64 {
        self.clock.sample_rate
    }
}

pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    if channels != 2 {
        anyhow::bail!("expected a stereo output device, got {channels} channels");
    }

    let frames = Arc::new(AtomicU64::new(0));
    let clock = SampleClock {
        frames: Arc::clone(&frames),
        sample_rate: sample_rate as f64,
    };

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream =
                build_output_stream_f32(&device, &config.into(), rx, frames, sample_rate, channels)?;
            output_stream.play().context("failed to play output stream")?;

            Ok(AudioHandle {
                tx,
                clock,
                _output_stream: output_stream,
            })
        }
        _ => anyhow::bail!("unsupported sample format (only f32 supported for now)"),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut engine = Engine::new(sample_rate, frames);

    let err_fn = |err| eprintln!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels;
            let out: &mut [StereoFrame] = unsafe {
                // stereo f32 pairs, verified at stream setup
                std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut StereoFrame, n_frames)
            };
            engine.render_block(out);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
