// Grid constants and the small types every layer needs.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

pub const STEPS_PER_BAR: usize = 16;
pub const MIN_BARS: usize = 1;
pub const MAX_BARS: usize = 8;
pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 200;
pub const DEFAULT_BPM: u32 = 128;
pub const DEFAULT_NUM_BARS: usize = 4;

/// A pitch like "C4". Unknown names fall back to 440 Hz when played,
/// so a stray name degrades to a beep instead of an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteName(pub String);

impl NoteName {
    pub fn new(name: impl Into<String>) -> Self {
        NoteName(name.into())
    }

    /// Two octaves, no accidentals. Matches the pitches the piano roll offers.
    pub fn frequency(&self) -> f32 {
        match self.0.as_str() {
            "C3" => 130.81,
            "D3" => 146.83,
            "E3" => 164.81,
            "F3" => 174.61,
            "G3" => 196.00,
            "A3" => 220.00,
            "B3" => 246.94,
            "C4" => 261.63,
            "D4" => 293.66,
            "E4" => 329.63,
            "F4" => 349.23,
            "G4" => 392.00,
            "A4" => 440.00,
            "B4" => 493.88,
            _ => 440.0,
        }
    }
}

/// The pitch used when a step is active but has no note set.
pub fn default_note() -> NoteName {
    NoteName::new("C4")
}

/// Current (bar, step-in-bar) cursor, published by the playback side each
/// step so a display can poll it without touching sequencer state.
#[derive(Clone, Default)]
pub struct Playhead {
    inner: Arc<Mutex<(usize, usize)>>,
}

impl Playhead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bar: usize, step: usize) {
        if let Ok(mut g) = self.inner.lock() {
            *g = (bar, step);
        }
    }

    pub fn get(&self) -> (usize, usize) {
        self.inner.lock().map(|g| *g).unwrap_or((0, 0))
    }

    pub fn reset(&self) {
        self.set(0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_note_frequencies() {
        assert_eq!(NoteName::new("A3").frequency(), 220.0);
        assert_eq!(NoteName::new("C4").frequency(), 261.63);
    }

    #[test]
    fn unknown_note_falls_back_to_440() {
        assert_eq!(NoteName::new("H9").frequency(), 440.0);
        assert_eq!(NoteName::new("").frequency(), 440.0);
    }

    #[test]
    fn playhead_roundtrip_and_reset() {
        let ph = Playhead::new();
        ph.set(2, 7);
        assert_eq!(ph.get(), (2, 7));
        ph.reset();
        assert_eq!(ph.get(), (0, 0));
    }
}
