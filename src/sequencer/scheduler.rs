// The lookahead scheduler. A coarse wall-clock timer decides *when we
// look*, the audio clock decides *when notes sound*: every wake we commit
// trigger timestamps up to `LOOKAHEAD_SECS` ahead, so jitter in the wake
// loop never reaches the audio as long as it stays under the window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::shared::{MAX_BPM, MIN_BPM, STEPS_PER_BAR};

/// Wall-clock period between scheduler wake-ups.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How far ahead of the audio clock we may pre-commit triggers.
pub const LOOKAHEAD_SECS: f64 = 0.1;

/// 16th-note grid: 4 steps per beat.
pub fn seconds_per_step(bpm: u32) -> f64 {
    60.0 / (bpm as f64 * 4.0)
}

/// Monotonic time source in seconds. Live playback uses the output
/// stream's sample counter; tests drive a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Instant-based clock for hosts without an audio stream.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-cranked clock so tests control exactly what the scheduler sees.
#[derive(Clone, Default)]
pub struct ManualClock {
    t: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dt: f64) {
        if let Ok(mut g) = self.t.lock() {
            *g += dt;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.t.lock().map(|g| *g).unwrap_or(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepTrigger {
    pub global_step: usize,
    /// Audio-clock seconds. Strictly increasing across one run.
    pub time: f64,
}

/// The pure half: a step counter in lock-step with an audio-clock horizon.
/// No timers in here, which is what makes it testable.
pub struct SchedulerCore {
    seconds_per_step: f64,
    next_step_time: f64,
    current_step: usize,
    total_steps: usize,
}

impl SchedulerCore {
    pub fn new(bpm: u32, num_bars: usize) -> Self {
        Self {
            seconds_per_step: seconds_per_step(bpm.clamp(MIN_BPM, MAX_BPM)),
            next_step_time: 0.0,
            current_step: 0,
            total_steps: (num_bars * STEPS_PER_BAR).max(1),
        }
    }

    /// Takes effect from the next computed step interval; already-emitted
    /// triggers keep their timestamps.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.seconds_per_step = seconds_per_step(bpm.clamp(MIN_BPM, MAX_BPM));
    }

    /// Bar-count edits mid-play land here; the step counter is re-wrapped
    /// on the next advance so we never read past the new last bar.
    pub fn set_total_steps(&mut self, total: usize) {
        self.total_steps = total.max(1);
    }

    pub fn reset(&mut self, now: f64) {
        self.current_step = 0;
        self.next_step_time = now;
    }

    /// Emit every step whose time falls inside the lookahead window.
    /// Zero or many per call.
    pub fn pump(&mut self, now: f64, out: &mut Vec<StepTrigger>) {
        while self.next_step_time < now + LOOKAHEAD_SECS {
            let step = self.current_step % self.total_steps;
            out.push(StepTrigger {
                global_step: step,
                time: self.next_step_time,
            });
            self.next_step_time += self.seconds_per_step;
            self.current_step = (step + 1) % self.total_steps;
        }
    }
}

type StepCallback = Box<dyn FnMut(StepTrigger) + Send + 'static>;

/// Wake-loop driver around `SchedulerCore`: a worker thread pumps the core
/// every `POLL_INTERVAL` and hands triggers to the callback (and to a
/// bounded channel for passive observers). Explicitly constructed, so a
/// host can run several independently.
pub struct StepScheduler {
    core: Arc<Mutex<SchedulerCore>>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<StepCallback>>>,
    trigger_tx: Sender<StepTrigger>,
    trigger_rx: Receiver<StepTrigger>,
    worker: Option<JoinHandle<()>>,
}

impl StepScheduler {
    pub fn new(clock: Arc<dyn Clock>, bpm: u32, num_bars: usize) -> Self {
        let (trigger_tx, trigger_rx) = crossbeam_channel::bounded(256);
        Self {
            core: Arc::new(Mutex::new(SchedulerCore::new(bpm, num_bars))),
            clock,
            running: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
            trigger_tx,
            trigger_rx,
            worker: None,
        }
    }

    /// Invoked on the wake thread for every trigger, in order.
    pub fn set_step_callback(&self, cb: impl FnMut(StepTrigger) + Send + 'static) {
        if let Ok(mut g) = self.callback.lock() {
            *g = Some(Box::new(cb));
        }
    }

    /// Observer side: cursor displays, tests. Lossy under backpressure,
    /// the callback path is the authoritative one.
    pub fn triggers(&self) -> Receiver<StepTrigger> {
        self.trigger_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_bpm(&self, bpm: u32) {
        if let Ok(mut core) = self.core.lock() {
            core.set_bpm(bpm);
        }
    }

    pub fn set_total_steps(&self, total: usize) {
        if let Ok(mut core) = self.core.lock() {
            core.set_total_steps(total);
        }
    }

    /// No-op when already running. Resets the step counter to 0 and anchors
    /// the first trigger at the clock's current time.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let now = self.clock.now();
        match self.core.lock() {
            Ok(mut core) => core.reset(now),
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                return;
            }
        }

        let core = Arc::clone(&self.core);
        let clock = Arc::clone(&self.clock);
        let running = Arc::clone(&self.running);
        let callback = Arc::clone(&self.callback);
        let tx = self.trigger_tx.clone();

        self.worker = Some(thread::spawn(move || {
            let mut due = Vec::new();
            while running.load(Ordering::SeqCst) {
                due.clear();
                match core.lock() {
                    Ok(mut core) => core.pump(clock.now(), &mut due),
                    Err(_) => {
                        // A poisoned core means an editor-side panic; stop the
                        // transport instead of spinning a loop that fires nothing.
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                match callback.lock() {
                    Ok(mut cb) => {
                        for t in &due {
                            if let Some(f) = cb.as_mut() {
                                f(*t);
                            }
                            let _ = tx.try_send(*t);
                        }
                    }
                    Err(_) => {
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
        }));
    }

    /// No-op when already stopped. Once this returns, no further triggers
    /// fire until the next `start()`. Cursor state is the caller's to reset.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for StepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_per_step_matches_grid_math() {
        assert_eq!(seconds_per_step(120), 0.125);
        assert_eq!(seconds_per_step(60), 0.25);
        assert_eq!(seconds_per_step(200), 0.075);
    }

    #[test]
    fn pump_emits_sequential_steps_with_constant_spacing() {
        let mut core = SchedulerCore::new(120, 4);
        let mut out = Vec::new();
        core.pump(0.4, &mut out); // window covers [0, 0.5)

        assert_eq!(out.len(), 4);
        for (i, t) in out.iter().enumerate() {
            assert_eq!(t.global_step, i);
            assert!((t.time - i as f64 * 0.125).abs() < 1e-12);
        }
    }

    #[test]
    fn pump_emits_nothing_outside_the_window() {
        let mut core = SchedulerCore::new(120, 4);
        let mut out = Vec::new();
        core.pump(0.0, &mut out);
        assert_eq!(out.len(), 1); // only the step at t=0 fits in [0, 0.1)

        out.clear();
        core.pump(0.0, &mut out); // same wake horizon, nothing new
        assert!(out.is_empty());
    }

    #[test]
    fn steps_wrap_at_total() {
        let mut core = SchedulerCore::new(120, 1); // 16 steps
        let mut out = Vec::new();
        core.pump(16.0 * 0.125, &mut out);
        let steps: Vec<usize> = out.iter().map(|t| t.global_step).collect();
        assert_eq!(&steps[..16], (0..16).collect::<Vec<_>>().as_slice());
        assert_eq!(steps[16], 0);
    }

    #[test]
    fn shrinking_total_rewraps_on_next_advance() {
        let mut core = SchedulerCore::new(120, 4); // 64 steps
        let mut out = Vec::new();
        core.pump(0.125 * 50.0 - 0.05, &mut out); // advance past step 50
        assert_eq!(out.last().map(|t| t.global_step), Some(50));

        core.set_total_steps(32);
        out.clear();
        core.pump(0.125 * 52.0 - 0.05, &mut out);
        // 51 % 32 = 19: back in range without a restart
        assert_eq!(out[0].global_step, 19);
        assert_eq!(out[1].global_step, 20);
    }

    #[test]
    fn tempo_change_applies_from_next_step() {
        let mut core = SchedulerCore::new(120, 4);
        let mut out = Vec::new();
        core.pump(0.1, &mut out); // t=0 and t=0.125
        assert_eq!(out.len(), 2);

        core.set_bpm(60); // 0.25s per step from here on
        out.clear();
        core.pump(0.45, &mut out);
        assert!((out[0].time - 0.25).abs() < 1e-12);
        assert!((out[1].time - 0.50).abs() < 1e-12);
    }

    #[test]
    fn bpm_is_clamped_at_the_boundary() {
        let mut fast = SchedulerCore::new(10_000, 1);
        let mut out = Vec::new();
        fast.pump(0.0, &mut out);
        let dt = {
            out.clear();
            fast.pump(1.0, &mut out);
            out[1].time - out[0].time
        };
        assert!((dt - seconds_per_step(200)).abs() < 1e-12);
    }

    #[test]
    fn driver_emits_in_order_and_start_is_idempotent() {
        let clock = ManualClock::new();
        let mut sched = StepScheduler::new(Arc::new(clock.clone()), 200, 1);
        let rx = sched.triggers();

        sched.start();
        sched.start(); // second call must not double-drive
        thread::sleep(Duration::from_millis(80));
        clock.advance(0.2);
        thread::sleep(Duration::from_millis(80));
        sched.stop();

        let got: Vec<StepTrigger> = rx.try_iter().collect();
        assert!(got.len() >= 2);
        for (i, t) in got.iter().enumerate() {
            assert_eq!(t.global_step, i % 16);
            assert!((t.time - i as f64 * 0.075).abs() < 1e-12);
        }
    }

    #[test]
    fn no_triggers_after_stop() {
        let clock = ManualClock::new();
        let mut sched = StepScheduler::new(Arc::new(clock.clone()), 120, 1);
        let rx = sched.triggers();

        sched.start();
        thread::sleep(Duration::from_millis(60));
        sched.stop();
        sched.stop(); // stopping twice is fine

        let drained = rx.try_iter().count();
        assert!(drained >= 1);

        clock.advance(5.0);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(rx.try_iter().count(), 0);
        assert!(!sched.is_running());
    }

    #[test]
    fn restart_begins_again_at_step_zero() {
        let clock = ManualClock::new();
        let mut sched = StepScheduler::new(Arc::new(clock.clone()), 120, 1);
        let rx = sched.triggers();

        sched.start();
        thread::sleep(Duration::from_millis(60));
        sched.stop();
        let _ = rx.try_iter().count();

        clock.advance(1.0);
        sched.start();
        thread::sleep(Duration::from_millis(60));
        sched.stop();

        let got: Vec<StepTrigger> = rx.try_iter().collect();
        assert_eq!(got[0].global_step, 0);
        // anchored at the clock's current time, not where the last run left off
        assert!((got[0].time - 1.0).abs() < 1e-12);
    }
}
