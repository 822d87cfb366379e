use crate::audio::AudioStatus;
use crate::timing::PlaybackState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Deactivate,
    /// Carries what the audio trigger needs for this note.
    Activate { duration: f64, loudness: f32 },
}

impl EventKind {
    /// Deactivate sorts before Activate at equal times.
    pub fn rank(&self) -> u8 {
        match self {
            EventKind::Deactivate => 0,
            EventKind::Activate { .. } => 1,
        }
    }

    pub fn is_activate(&self) -> bool {
        matches!(self, EventKind::Activate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEvent {
    /// Seconds from the start of the performance, unscaled
    pub time: f64,
    pub pitch: u8,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub name: String,
    pub tracks: usize,
    pub notes: usize,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerUpdate {
    State(PlaybackState),
    /// `None` hides the countdown display.
    Countdown(Option<u32>),
    /// Percent, 0.0 -> 100.0
    Progress(f32),
    PerformanceLoaded(PerformanceSummary),
    LoadFailed { message: String },
    Audio(AudioStatus),
}
