use crate::events::{EventKind, TimelineEvent};
use crate::performance::Performance;
use std::time::Duration;

/// Expands every note of every track into an Activate/Deactivate pair, ordered by
/// time with releases ahead of presses at the same instant.
pub fn build_timeline(performance: &Performance) -> Vec<TimelineEvent> {
    let mut events = Vec::with_capacity(performance.note_count() * 2);

    for note in performance.notes() {
        events.push(TimelineEvent {
            time: note.start,
            pitch: note.pitch,
            kind: EventKind::Activate {
                duration: note.duration,
                loudness: note.loudness,
            },
        });
        events.push(TimelineEvent {
            time: note.end(),
            pitch: note.pitch,
            kind: EventKind::Deactivate,
        });
    }

    events.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
    });
    events
}

/// Wall-clock offset of `seconds` of performance time played at `speed`, or `None`
/// when it does not fit in a `Duration`.
pub fn scaled_offset(seconds: f64, speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds / speed).ok()
}
