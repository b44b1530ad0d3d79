// The pattern store: pure data plus the mutation boundary that keeps
// everything the scheduler reads inside its declared bounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audio::{Voice, VoiceKind};
use crate::shared::{
    DEFAULT_BPM, DEFAULT_NUM_BARS, MAX_BARS, MAX_BPM, MIN_BARS, MIN_BPM, NoteName, STEPS_PER_BAR,
};

pub type TrackId = String;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<NoteName>,
}

/// One bar: a sparse map from step index (0-15) to its event. A missing
/// key is silence, so empty bars cost nothing to store or to scan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(default)]
    pub steps: BTreeMap<u8, StepEvent>,
}

impl Bar {
    pub fn step(&self, index: u8) -> Option<&StepEvent> {
        self.steps.get(&index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Drum,
    Synth,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub subtype: VoiceKind,
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
}

impl Track {
    fn new(id: &str, name: &str, kind: TrackKind, subtype: VoiceKind, volume: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            subtype,
            volume,
            mute: false,
            solo: false,
        }
    }

    pub fn instrument(&self) -> Voice {
        Voice::new(self.subtype)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Out-of-range bar or step; the store is left untouched.
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub bpm: u32,
    pub num_bars: usize,
    pub tracks: Vec<Track>,
    /// Track id -> one Bar per project bar. Kept the same length as
    /// `num_bars` for every track, always.
    pub patterns: BTreeMap<TrackId, Vec<Bar>>,
}

impl Default for Project {
    fn default() -> Self {
        let tracks = vec![
            Track::new("kick", "Kick", TrackKind::Drum, VoiceKind::Kick, 0.8),
            Track::new("snare", "Snare", TrackKind::Drum, VoiceKind::Snare, 0.7),
            Track::new("hat", "Hi-Hat", TrackKind::Drum, VoiceKind::Hihat, 0.6),
            Track::new("bass", "Bass", TrackKind::Synth, VoiceKind::Square, 0.6),
            Track::new("melody", "Melody", TrackKind::Synth, VoiceKind::Sawtooth, 0.5),
        ];
        let patterns = tracks
            .iter()
            .map(|t| (t.id.clone(), vec![Bar::default(); DEFAULT_NUM_BARS]))
            .collect();
        Self {
            name: "Untitled Project".to_string(),
            bpm: DEFAULT_BPM,
            num_bars: DEFAULT_NUM_BARS,
            tracks,
            patterns,
        }
    }
}

impl Project {
    pub fn seconds_per_step(&self) -> f64 {
        crate::sequencer::scheduler::seconds_per_step(self.bpm)
    }

    pub fn total_steps(&self) -> usize {
        self.num_bars * STEPS_PER_BAR
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// The one audibility rule, used identically by live playback, preview
    /// and export: muted is silent, and any solo silences every non-soloed
    /// track regardless of its own mute flag.
    pub fn is_audible(&self, track: &Track) -> bool {
        if track.mute {
            return false;
        }
        !self.any_solo() || track.solo
    }

    /// Out-of-range values are clamped, so the scheduler only ever sees a
    /// valid tempo.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Resize the loop, keeping every track's bar list in lock-step:
    /// existing bars survive, growth appends empty bars, shrinking truncates
    /// at the tail. Returns false (and changes nothing) out of bounds.
    pub fn set_num_bars(&mut self, num_bars: usize) -> bool {
        if !(MIN_BARS..=MAX_BARS).contains(&num_bars) {
            return false;
        }
        for bars in self.patterns.values_mut() {
            bars.resize(num_bars, Bar::default());
        }
        self.num_bars = num_bars;
        true
    }

    pub fn set_volume(&mut self, track_id: &str, volume: f32) {
        if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            t.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn toggle_mute(&mut self, track_id: &str) {
        if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            t.mute = !t.mute;
        }
    }

    pub fn toggle_solo(&mut self, track_id: &str) {
        if let Some(t) = self.tracks.iter_mut().find(|t| t.id == track_id) {
            t.solo = !t.solo;
        }
    }

    /// Toggling an existing event with the same pitch (or with no pitch
    /// given) deletes the entry outright; anything else writes an active
    /// event, replacing whatever was there.
    pub fn toggle_step(
        &mut self,
        track_id: &str,
        bar: usize,
        step: u8,
        note: Option<NoteName>,
    ) -> ToggleOutcome {
        if bar >= self.num_bars || step as usize >= STEPS_PER_BAR {
            return ToggleOutcome::Ignored;
        }
        let Some(bars) = self.patterns.get_mut(track_id) else {
            return ToggleOutcome::Ignored;
        };
        let Some(target) = bars.get_mut(bar) else {
            return ToggleOutcome::Ignored;
        };

        match target.steps.get(&step) {
            Some(ev) if ev.active && (note.is_none() || ev.note == note) => {
                target.steps.remove(&step);
                ToggleOutcome::Removed
            }
            _ => {
                target.steps.insert(step, StepEvent { active: true, note });
                ToggleOutcome::Added
            }
        }
    }
}
