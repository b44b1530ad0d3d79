pub use crate::audio::{StereoFrame, VoiceKind};

/// One scheduled note, fully resolved: which synthesis recipe, at what
/// frequency and level, starting at what audio-clock time (seconds).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteSpec {
    pub voice: VoiceKind,
    pub freq: f32,
    pub amplitude: f32,
    pub start_time: f64,
}

#[derive(Clone, Debug)]
pub enum AudioCommand {
    // The engine can't look up patterns or tracks; by the time a command
    // reaches it everything is resolved down to a NoteSpec.
    Play(NoteSpec),
    /// Drop every active voice immediately (transport stop).
    AllOff,
}

/// Where scheduled notes go. The live sink pushes them at the cpal engine,
/// the offline sink collects them for a deterministic render. Voices don't
/// care which one they're given.
pub trait AudioSink {
    fn schedule(&mut self, note: NoteSpec);
}
