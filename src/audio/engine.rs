use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::frame::StereoFrame;
use super::voice::ActiveVoice;
use crate::audio_api::{AudioCommand, NoteSpec};

const MAX_VOICES: usize = 32; // hard cap so we won't malloc in the audio callback
const MASTER_GAIN: f32 = 0.8;

/// Runs inside the cpal callback: drains commands, holds the voice pool,
/// and counts frames. The frame counter doubles as the audio clock the
/// scheduler reads (frames / sample_rate = seconds).
pub struct Engine {
    sample_rate: f32,
    frames_rendered: Arc<AtomicU64>,
    voices: Vec<ActiveVoice>,
}

impl Engine {
    pub fn new(sample_rate: u32, frames_rendered: Arc<AtomicU64>) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            frames_rendered,
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Play(spec) => self.start_voice(spec),
            AudioCommand::AllOff => self.voices.clear(),
        }
    }

    fn start_voice(&mut self, spec: NoteSpec) {
        if self.voices.len() == MAX_VOICES {
            // steal the oldest slot rather than grow
            self.voices.remove(0);
        }
        self.voices.push(ActiveVoice::new(&spec, self.sample_rate));
    }

    /// Fill one output block. Voices whose start time lies beyond this block
    /// stay queued in the pool; they were sent ahead of time on purpose.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        for frame in out.iter_mut() {
            *frame = StereoFrame::zero();
        }

        let block_start = self.frames_rendered.load(Ordering::Relaxed);
        for voice in &mut self.voices {
            voice.render_into(out, block_start);
        }
        self.voices.retain(|v| !v.is_finished());

        for frame in out.iter_mut() {
            frame.left *= MASTER_GAIN;
            frame.right *= MASTER_GAIN;
        }

        self.frames_rendered
            .store(block_start + out.len() as u64, Ordering::Release);
    }
}
