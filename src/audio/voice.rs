use serde::{Deserialize, Serialize};

use super::frame::StereoFrame;
use crate::audio_api::{AudioSink, NoteSpec};
use crate::shared::NoteName;

// WebAudio-style exponential ramps can't reach zero, so every envelope
// decays toward this floor instead.
const RAMP_FLOOR: f32 = 0.01;

// Fixed seed so the snare burst is the same in every render.
const NOISE_SEED: u32 = 0x3243_F6A9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    Kick,
    Snare,
    Hihat,
    Sine,
    Square,
    Sawtooth,
}

/// The sound-producing capability bound to a track. Resolves a pitch to a
/// frequency and hands a fully-specified note to whichever sink it's given
/// (live engine or offline collector).
#[derive(Clone, Copy, Debug)]
pub struct Voice {
    kind: VoiceKind,
}

impl Voice {
    pub fn new(kind: VoiceKind) -> Self {
        Self { kind }
    }

    /// `amplitude` is the track volume in [0,1]. The drum recipes carry
    /// their own fixed envelopes; the synth recipes use it as the decay
    /// length in seconds, which is what makes quiet tracks sound shorter.
    pub fn play(&self, pitch: Option<&NoteName>, time: f64, amplitude: f32, sink: &mut dyn AudioSink) {
        let freq = match self.kind {
            VoiceKind::Kick => 150.0,
            VoiceKind::Snare => 0.0, // noise, no pitch
            VoiceKind::Hihat => 800.0,
            _ => pitch.map(NoteName::frequency).unwrap_or(261.63),
        };
        sink.schedule(NoteSpec {
            voice: self.kind,
            freq,
            amplitude,
            start_time: time,
        });
    }
}

#[derive(Clone, Copy, Debug)]
enum Shape {
    Sine,
    Square,
    Saw,
}

#[derive(Clone, Debug)]
enum Gen {
    Osc {
        shape: Shape,
        phase: f32,
        phase_inc: f32,
        // per-frame multiplier on phase_inc; 1.0 = no sweep
        sweep: f32,
    },
    Noise {
        state: u32,
    },
}

impl Gen {
    fn next(&mut self) -> f32 {
        match self {
            Gen::Osc { shape, phase, phase_inc, sweep } => {
                let s = match shape {
                    Shape::Sine => phase.sin(),
                    Shape::Square => {
                        if *phase < std::f32::consts::PI { 1.0 } else { -1.0 }
                    }
                    Shape::Saw => (*phase / std::f32::consts::TAU) * 2.0 - 1.0,
                };
                *phase += *phase_inc;
                if *phase >= std::f32::consts::TAU {
                    *phase -= std::f32::consts::TAU;
                }
                *phase_inc *= *sweep;
                s
            }
            Gen::Noise { state } => {
                // minstd LCG, gives the same burst every time
                *state = ((*state as u64 * 48271) % 0x7fff_ffff) as u32;
                (*state as f32 / 0x7fff_ffff as f32) * 2.0 - 1.0
            }
        }
    }
}

/// One sounding note, advanced a frame at a time. Both the live engine and
/// the offline renderer drive these, so the two paths produce the same
/// samples for the same NoteSpec.
#[derive(Clone, Debug)]
pub struct ActiveVoice {
    start_frame: u64,
    frames_left: u64,
    gain: f32,
    decay: f32,
    gen: Gen,
}

/// Per-frame factor that takes `from` to `to` over `seconds`.
fn ramp(from: f32, to: f32, seconds: f32, sample_rate: f32) -> f32 {
    let frames = (seconds * sample_rate).max(1.0);
    (to / from).powf(1.0 / frames)
}

impl ActiveVoice {
    pub fn new(spec: &NoteSpec, sample_rate: f32) -> Self {
        let phase_inc = |freq: f32| std::f32::consts::TAU * freq / sample_rate;

        let (seconds, gain, gen) = match spec.voice {
            VoiceKind::Kick => (
                0.5,
                1.0,
                Gen::Osc {
                    shape: Shape::Sine,
                    phase: 0.0,
                    phase_inc: phase_inc(150.0),
                    // pitch drops 150 Hz -> ~0 over the note length
                    sweep: ramp(150.0, RAMP_FLOOR, 0.5, sample_rate),
                },
            ),
            VoiceKind::Snare => (0.2, 0.5, Gen::Noise { state: NOISE_SEED }),
            VoiceKind::Hihat => (
                0.05,
                0.1,
                Gen::Osc {
                    shape: Shape::Square,
                    phase: 0.0,
                    phase_inc: phase_inc(800.0),
                    sweep: 1.0,
                },
            ),
            VoiceKind::Sine | VoiceKind::Square | VoiceKind::Sawtooth => {
                let shape = match spec.voice {
                    VoiceKind::Square => Shape::Square,
                    VoiceKind::Sawtooth => Shape::Saw,
                    _ => Shape::Sine,
                };
                let seconds = spec.amplitude.clamp(0.01, 1.0);
                (
                    seconds,
                    0.3,
                    Gen::Osc {
                        shape,
                        phase: 0.0,
                        phase_inc: phase_inc(spec.freq),
                        sweep: 1.0,
                    },
                )
            }
        };

        let start_frame = (spec.start_time.max(0.0) * sample_rate as f64).round() as u64;
        Self {
            start_frame,
            frames_left: (seconds * sample_rate) as u64,
            gain,
            decay: ramp(gain, RAMP_FLOOR, seconds, sample_rate),
            gen,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.frames_left == 0
    }

    /// Mix this voice into `out`, where `out[0]` is absolute frame
    /// `block_start`. Blocks must arrive in order; frames before the note's
    /// start are left untouched.
    pub fn render_into(&mut self, out: &mut [StereoFrame], block_start: u64) {
        for (i, frame) in out.iter_mut().enumerate() {
            if self.frames_left == 0 {
                break;
            }
            if block_start + (i as u64) < self.start_frame {
                continue;
            }
            let s = self.gain * self.gen.next();
            frame.left += s;
            frame.right += s;
            self.gain *= self.decay;
            self.frames_left -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;

    fn render(spec: &NoteSpec, frames: usize) -> Vec<StereoFrame> {
        let mut voice = ActiveVoice::new(spec, SR);
        let mut out = vec![StereoFrame::zero(); frames];
        voice.render_into(&mut out, 0);
        out
    }

    #[test]
    fn voice_waits_for_its_start_frame() {
        let spec = NoteSpec {
            voice: VoiceKind::Kick,
            freq: 150.0,
            amplitude: 1.0,
            start_time: 100.0 / SR as f64,
        };
        let out = render(&spec, 200);
        assert!(out[..100].iter().all(|f| f.left == 0.0 && f.right == 0.0));
        assert!(out[100..].iter().any(|f| f.left != 0.0));
    }

    #[test]
    fn kick_decays_and_finishes() {
        let spec = NoteSpec {
            voice: VoiceKind::Kick,
            freq: 150.0,
            amplitude: 1.0,
            start_time: 0.0,
        };
        let mut voice = ActiveVoice::new(&spec, SR);
        // 0.5s of kick
        let mut out = vec![StereoFrame::zero(); (SR * 0.6) as usize];
        voice.render_into(&mut out, 0);
        assert!(voice.is_finished());
        let early: f32 = out[..100].iter().map(|f| f.left.abs()).sum();
        let late: f32 = out[22000..22100].iter().map(|f| f.left.abs()).sum();
        assert!(early > late);
        // past the envelope it's silence again
        assert!(out[(SR * 0.55) as usize].left == 0.0);
    }

    #[test]
    fn snare_is_deterministic_across_instances() {
        let spec = NoteSpec {
            voice: VoiceKind::Snare,
            freq: 0.0,
            amplitude: 0.7,
            start_time: 0.0,
        };
        let a = render(&spec, 1000);
        let b = render(&spec, 1000);
        assert_eq!(a, b);
        assert!(a.iter().any(|f| f.left != 0.0));
    }

    #[test]
    fn block_rendering_matches_one_shot() {
        let spec = NoteSpec {
            voice: VoiceKind::Sine,
            freq: 261.63,
            amplitude: 0.5,
            start_time: 0.001,
        };
        let whole = render(&spec, 4096);

        let mut voice = ActiveVoice::new(&spec, SR);
        let mut blocked = vec![StereoFrame::zero(); 4096];
        for (n, chunk) in blocked.chunks_mut(512).enumerate() {
            voice.render_into(chunk, n as u64 * 512);
        }
        assert_eq!(whole, blocked);
    }

    #[test]
    fn synth_lengths_follow_volume() {
        let long = ActiveVoice::new(
            &NoteSpec { voice: VoiceKind::Square, freq: 220.0, amplitude: 0.8, start_time: 0.0 },
            SR,
        );
        let short = ActiveVoice::new(
            &NoteSpec { voice: VoiceKind::Square, freq: 220.0, amplitude: 0.2, start_time: 0.0 },
            SR,
        );
        assert!(long.frames_left > short.frames_left);
    }
}
