pub mod persistence;
pub mod project;

pub use persistence::PersistedState;
pub use project::{Bar, Project, StepEvent, ToggleOutcome, Track, TrackId, TrackKind};
