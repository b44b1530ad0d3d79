pub mod playback;
pub mod scheduler;

pub use playback::{PlaybackCoordinator, dispatch_step};
pub use scheduler::{
    Clock, LOOKAHEAD_SECS, ManualClock, POLL_INTERVAL, SchedulerCore, StepScheduler, StepTrigger,
    SystemClock, seconds_per_step,
};
