// Bridges scheduler triggers to audible output: owns play/stop state and
// the cursor, reads the pattern store on every step, and fires voices.

use std::sync::{Arc, RwLock};

use crate::audio_api::AudioSink;
use crate::pipeline::project::{Project, ToggleOutcome};
use crate::sequencer::scheduler::{Clock, StepScheduler, StepTrigger};
use crate::shared::{NoteName, Playhead, STEPS_PER_BAR, default_note};

/// One scheduled step against one project snapshot. Mute/solo are
/// evaluated here, per step, so a toggle mid-bar is honored on the very
/// next trigger. A track with no pattern entry is skipped silently;
/// playback never halts over one track's misconfiguration.
pub fn dispatch_step(
    project: &Project,
    trigger: StepTrigger,
    playhead: &Playhead,
    sink: &mut dyn AudioSink,
) {
    let total = project.total_steps().max(1);
    let global = trigger.global_step % total;
    let bar = global / STEPS_PER_BAR;
    let step_in_bar = (global % STEPS_PER_BAR) as u8;
    playhead.set(bar, step_in_bar as usize);

    for track in &project.tracks {
        if !project.is_audible(track) {
            continue;
        }
        let Some(bars) = project.patterns.get(&track.id) else {
            continue;
        };
        let Some(b) = bars.get(bar) else {
            continue;
        };
        let Some(ev) = b.step(step_in_bar) else {
            continue;
        };
        if !ev.active {
            continue;
        }
        let note = ev.note.clone().unwrap_or_else(default_note);
        track
            .instrument()
            .play(Some(&note), trigger.time, track.volume, sink);
    }
}

/// Owns the scheduler (no hidden singletons; make as many of these as you
/// want) and exposes play/stop as an idempotent toggle. Edits go through
/// here too so the scheduler's tempo and step count stay in sync with the
/// store.
pub struct PlaybackCoordinator<S: AudioSink + Clone + Send + 'static> {
    scheduler: StepScheduler,
    project: Arc<RwLock<Project>>,
    playhead: Playhead,
    clock: Arc<dyn Clock>,
    sink: S,
    is_playing: bool,
}

impl<S: AudioSink + Clone + Send + 'static> PlaybackCoordinator<S> {
    pub fn new(project: Arc<RwLock<Project>>, clock: Arc<dyn Clock>, sink: S) -> Self {
        let (bpm, num_bars) = match project.read() {
            Ok(p) => (p.bpm, p.num_bars),
            Err(_) => (crate::shared::DEFAULT_BPM, crate::shared::DEFAULT_NUM_BARS),
        };
        let scheduler = StepScheduler::new(Arc::clone(&clock), bpm, num_bars);

        let playhead = Playhead::new();
        let cb_project = Arc::clone(&project);
        let cb_playhead = playhead.clone();
        let mut cb_sink = sink.clone();
        scheduler.set_step_callback(move |trigger| {
            if let Ok(p) = cb_project.read() {
                dispatch_step(&p, trigger, &cb_playhead, &mut cb_sink);
            }
        });

        Self {
            scheduler,
            project,
            playhead,
            clock,
            sink,
            is_playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn playhead(&self) -> Playhead {
        self.playhead.clone()
    }

    /// Play -> stop resets the cursor for display; stop -> play starts
    /// from step 0. Returns the new state.
    pub fn toggle_playback(&mut self) -> bool {
        if self.is_playing {
            self.scheduler.stop();
            self.playhead.reset();
            self.is_playing = false;
        } else {
            self.scheduler.start();
            self.is_playing = true;
        }
        self.is_playing
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        if let Ok(mut p) = self.project.write() {
            p.set_bpm(bpm);
            self.scheduler.set_bpm(p.bpm);
        }
    }

    pub fn set_num_bars(&mut self, num_bars: usize) -> bool {
        let Ok(mut p) = self.project.write() else {
            return false;
        };
        if !p.set_num_bars(num_bars) {
            return false;
        }
        self.scheduler.set_total_steps(p.total_steps());
        true
    }

    /// Grid edit. Adding a step also previews it immediately through the
    /// same voice path, timestamped "now"; the running scheduler keeps its
    /// own cursor, so the preview can't disturb it.
    pub fn toggle_step(
        &mut self,
        track_id: &str,
        bar: usize,
        step: u8,
        note: Option<NoteName>,
    ) -> ToggleOutcome {
        let outcome = match self.project.write() {
            Ok(mut p) => p.toggle_step(track_id, bar, step, note.clone()),
            Err(_) => return ToggleOutcome::Ignored,
        };
        if outcome == ToggleOutcome::Added {
            self.preview(track_id, note.as_ref());
        }
        outcome
    }

    /// Previews follow the full audibility rule, solo included. The rule
    /// is one predicate everywhere; an edit on a non-soloed track while
    /// another is soloed stays silent.
    fn preview(&mut self, track_id: &str, note: Option<&NoteName>) {
        let Ok(p) = self.project.read() else {
            return;
        };
        let Some(track) = p.track(track_id) else {
            return;
        };
        if !p.is_audible(track) {
            return;
        }
        track
            .instrument()
            .play(note, self.clock.now(), track.volume, &mut self.sink);
    }
}
