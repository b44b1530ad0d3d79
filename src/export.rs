// The offline path: walk the whole project once, compute every event time
// in closed form (no polling loop, so no incremental drift), mix into a
// flat buffer, and wrap it in a 16-bit PCM WAV. Same project in,
// byte-identical file out.

use std::path::Path;

use crate::audio::{ActiveVoice, StereoFrame};
use crate::audio_api::{AudioSink, NoteSpec};
use crate::pipeline::project::Project;
use crate::shared::{STEPS_PER_BAR, default_note};

pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 2;

/// Collects scheduled notes instead of sending them anywhere; one render
/// pass owns it and discards it after encoding.
#[derive(Debug, Default)]
pub struct OfflineSink {
    pub notes: Vec<NoteSpec>,
}

impl AudioSink for OfflineSink {
    fn schedule(&mut self, note: NoteSpec) {
        self.notes.push(note);
    }
}

/// Every audible event of one full loop pass, in closed form:
/// `time = global_step * seconds_per_step`. Mute/solo use the same rule as
/// live playback, evaluated once against the static project.
pub fn schedule_project(project: &Project) -> Vec<NoteSpec> {
    let sps = project.seconds_per_step();
    let mut sink = OfflineSink::default();

    for track in &project.tracks {
        if !project.is_audible(track) {
            continue;
        }
        let Some(bars) = project.patterns.get(&track.id) else {
            continue;
        };
        for (bar_index, bar) in bars.iter().enumerate().take(project.num_bars) {
            for (&step, ev) in &bar.steps {
                if !ev.active {
                    continue;
                }
                let global_step = bar_index * STEPS_PER_BAR + step as usize;
                let note = ev.note.clone().unwrap_or_else(default_note);
                track.instrument().play(
                    Some(&note),
                    global_step as f64 * sps,
                    track.volume,
                    &mut sink,
                );
            }
        }
    }

    sink.notes
}

/// One full loop pass in frames at the export rate.
pub fn frame_count(project: &Project) -> usize {
    let total_seconds = project.total_steps() as f64 * project.seconds_per_step();
    (SAMPLE_RATE as f64 * total_seconds).ceil() as usize
}

pub fn render_project(project: &Project) -> Vec<StereoFrame> {
    let mut buffer = vec![StereoFrame::zero(); frame_count(project)];
    for spec in schedule_project(project) {
        let mut voice = ActiveVoice::new(&spec, SAMPLE_RATE as f32);
        voice.render_into(&mut buffer, 0);
    }
    buffer
}

/// Clamp to [-1,1], then scale asymmetrically: 32768 on the negative side,
/// 32767 on the non-negative side, so neither end can leave i16 range.
fn pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// 44-byte RIFF/WAVE header (PCM fmt chunk: 2 channels, 44100 Hz, 16-bit)
/// followed by interleaved little-endian samples.
pub fn write_wav(frames: &[StereoFrame], path: &Path) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for frame in frames {
        writer.write_sample(pcm16(frame.left))?;
        writer.write_sample(pcm16(frame.right))?;
    }
    writer.finalize()?;
    Ok(())
}

/// A failed export surfaces here and leaves the project untouched; the
/// render buffer is thrown away either way.
pub fn export_project(project: &Project, path: &Path) -> anyhow::Result<()> {
    let frames = render_project(project);
    write_wav(&frames, path)
}
