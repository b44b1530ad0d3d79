//! A lookahead step-sequencer engine: a 16-steps-per-bar, N-bar loop
//! scheduled against an audio clock, playable live through cpal or
//! rendered offline to a WAV file with identical note timing.

pub mod audio;
pub mod audio_api;
pub mod export;
pub mod pipeline;
pub mod sequencer;
pub mod shared;

pub use audio::{AudioHandle, LiveSink, SampleClock, Voice, VoiceKind, start_audio};
pub use audio_api::{AudioCommand, AudioSink, NoteSpec};
pub use pipeline::{PersistedState, Project, ToggleOutcome, Track, TrackKind};
pub use sequencer::{Clock, PlaybackCoordinator, StepScheduler, StepTrigger};
pub use shared::{NoteName, Playhead};
