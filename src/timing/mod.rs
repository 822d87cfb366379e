mod scheduler;
mod timeline;
mod timers;

pub use scheduler::{
    COMPLETION_GRACE, FINISHED_DISPLAY, PlayError, PlaybackOptions, PlaybackSession,
    PlaybackState, STOPPED_DISPLAY, Scheduler,
};
pub use timeline::{build_timeline, scaled_offset};
pub use timers::{TimerHandle, TimerQueue};
