use super::timeline::{build_timeline, scaled_offset};
use super::timers::{TimerHandle, TimerQueue};
use crate::audio::{AudioVoice, VoiceConfig};
use crate::events::{EventKind, PlayerUpdate, TimelineEvent};
use crate::keyboard::KeyboardView;
use crate::labels::Language;
use crate::layout::{KeyId, LayoutId, map_pitch_to_key};
use crate::performance::Performance;
use crossbeam::channel::Sender;
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Grace period between the last scheduled event and completion.
pub const COMPLETION_GRACE: Duration = Duration::from_millis(200);
/// How long the finished indicator stays up before returning to idle.
pub const FINISHED_DISPLAY: Duration = Duration::from_millis(1500);
/// How long the stopped indicator stays up before returning to idle.
pub const STOPPED_DISPLAY: Duration = Duration::from_millis(1000);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    CountingDown,
    Playing,
    Finished,
    Stopped,
}

impl PlaybackState {
    /// CountingDown or Playing.
    pub fn is_session(self) -> bool {
        matches!(self, PlaybackState::CountingDown | PlaybackState::Playing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Positive multiplier applied to every event offset and to the total duration
    pub speed: f64,
    pub countdown_seconds: u32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            countdown_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayError {
    #[error("a playback session is already active")]
    SessionActive,
    #[error("no performance is loaded")]
    NoPerformance,
    #[error("speed multiplier {0} is not positive or stretches playback out of range")]
    InvalidSpeed(f64),
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    CountdownTick { generation: u64, remaining: u32 },
    Event { generation: u64, event: TimelineEvent },
    Complete { generation: u64 },
    ReturnToIdle,
}

/// Mutable state of one playback run. Reset wholesale when the run ends.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    generation: u64,
    is_playing: bool,
    stop_requested: bool,
    scheduled: HashSet<TimerHandle>,
    active_keys: BTreeSet<KeyId>,
    /// Pending until playback actually starts
    timeline: Vec<TimelineEvent>,
    speed: f64,
    total: Duration,
    started_at: Option<Instant>,
}

impl PlaybackSession {
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn active_keys(&self) -> &BTreeSet<KeyId> {
        &self.active_keys
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }
}

/// Drives a keyboard view and an audio voice from a performance timeline.
///
/// All timing goes through one [`TimerQueue`]; the host calls [`Scheduler::advance`]
/// whenever [`Scheduler::next_deadline`] passes or a command arrives.
pub struct Scheduler<V, A> {
    view: V,
    voice: A,
    layout: LayoutId,
    updates: Sender<PlayerUpdate>,
    timers: TimerQueue<Timer>,
    session: PlaybackSession,
    state: PlaybackState,
    generation: u64,
    manual_voice: VoiceConfig,
}

impl<V: KeyboardView, A: AudioVoice> Scheduler<V, A> {
    pub fn new(view: V, voice: A, layout: LayoutId, updates: Sender<PlayerUpdate>) -> Self {
        Self {
            view,
            voice,
            layout,
            updates,
            timers: TimerQueue::new(),
            session: PlaybackSession::default(),
            state: PlaybackState::Idle,
            generation: 0,
            manual_voice: VoiceConfig::MANUAL,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn layout(&self) -> LayoutId {
        self.layout
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn voice(&self) -> &A {
        &self.voice
    }

    pub fn set_manual_voice(&mut self, config: VoiceConfig) {
        self.manual_voice = config;
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Rebuilds the view for a new layout or label set. Refused during a session.
    pub fn render(&mut self, layout: LayoutId, language: Language) -> bool {
        if self.state.is_session() {
            debug!("Ignoring keyboard change during playback");
            return false;
        }
        self.layout = layout;
        self.view.render(layout.layout(), language);
        true
    }

    pub fn play(
        &mut self,
        now: Instant,
        performance: &Performance,
        options: PlaybackOptions,
    ) -> Result<(), PlayError> {
        if self.state != PlaybackState::Idle {
            return Err(PlayError::SessionActive);
        }
        if !(options.speed.is_finite() && options.speed > 0.0) {
            return Err(PlayError::InvalidSpeed(options.speed));
        }
        let Some(total) = session_span(now, performance.duration, options) else {
            return Err(PlayError::InvalidSpeed(options.speed));
        };

        self.generation += 1;
        self.session = PlaybackSession {
            generation: self.generation,
            is_playing: true,
            timeline: build_timeline(performance),
            speed: options.speed,
            total,
            ..PlaybackSession::default()
        };
        info!(
            "Starting session {}: {} events at {:.2}x",
            self.generation,
            self.session.timeline.len(),
            options.speed
        );

        if options.countdown_seconds > 0 {
            self.enter(PlaybackState::CountingDown);
            self.publish(PlayerUpdate::Countdown(Some(options.countdown_seconds)));
            self.schedule(
                now + COUNTDOWN_TICK,
                Timer::CountdownTick {
                    generation: self.generation,
                    remaining: options.countdown_seconds - 1,
                },
            );
        } else {
            self.start_playing(now);
        }
        Ok(())
    }

    /// Cancels the active session. Returns false when there is nothing to stop.
    pub fn stop(&mut self, now: Instant) -> bool {
        if !self.state.is_session() {
            debug!("Stop requested with no active session");
            return false;
        }

        self.session.stop_requested = true;
        for handle in self.session.scheduled.drain() {
            self.timers.cancel(handle);
        }
        for key in std::mem::take(&mut self.session.active_keys) {
            self.view.deactivate_key(key);
        }
        self.view.release_all();
        self.publish(PlayerUpdate::Countdown(None));

        info!("Session {} stopped", self.session.generation);
        self.session = PlaybackSession::default();
        self.enter(PlaybackState::Stopped);
        self.timers.schedule(now + STOPPED_DISPLAY, Timer::ReturnToIdle);
        true
    }

    /// Fires every timer due at `now`, earliest first.
    pub fn advance(&mut self, now: Instant) {
        while let Some((handle, deadline, timer)) = self.timers.pop_due(now) {
            self.session.scheduled.remove(&handle);
            self.fire(timer, deadline, now);
        }
    }

    /// Manual key press: the same effects as a scheduled press, without session bookkeeping.
    pub fn press_key(&mut self, key: KeyId) -> bool {
        let Some(handle) = self.view.resolve_key(key) else {
            return false;
        };
        self.view.activate_key(key);
        self.voice.play(handle.pitch, self.manual_voice);
        true
    }

    pub fn release_key(&mut self, key: KeyId) {
        if self.view.resolve_key(key).is_some() {
            self.view.deactivate_key(key);
        }
    }

    fn fire(&mut self, timer: Timer, deadline: Instant, now: Instant) {
        match timer {
            Timer::CountdownTick {
                generation,
                remaining,
            } => {
                if !self.is_current(generation) {
                    trace!("Dropping stale countdown tick");
                    return;
                }
                if remaining == 0 {
                    self.publish(PlayerUpdate::Countdown(None));
                    self.start_playing(deadline);
                } else {
                    self.publish(PlayerUpdate::Countdown(Some(remaining)));
                    self.schedule(
                        deadline + COUNTDOWN_TICK,
                        Timer::CountdownTick {
                            generation,
                            remaining: remaining - 1,
                        },
                    );
                }
            }
            Timer::Event { generation, event } => {
                if !self.is_current(generation) {
                    trace!("Dropping stale event for pitch {}", event.pitch);
                    return;
                }
                self.apply(event);
                self.publish_progress(now);
            }
            Timer::Complete { generation } => {
                if !self.is_current(generation) {
                    return;
                }
                self.finish(now);
            }
            Timer::ReturnToIdle => self.enter(PlaybackState::Idle),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session.is_playing
            && !self.session.stop_requested
            && self.session.generation == generation
    }

    fn start_playing(&mut self, start: Instant) {
        self.enter(PlaybackState::Playing);
        self.session.started_at = Some(start);
        self.publish(PlayerUpdate::Progress(0.0));

        let generation = self.session.generation;
        let speed = self.session.speed;
        let timeline = std::mem::take(&mut self.session.timeline);

        let mut last = Duration::ZERO;
        for event in timeline {
            let offset = scaled_offset(event.time, speed).unwrap_or(self.session.total);
            last = last.max(offset);
            self.schedule(start + offset, Timer::Event { generation, event });
        }
        self.schedule(
            start + last + COMPLETION_GRACE,
            Timer::Complete { generation },
        );
    }

    fn apply(&mut self, event: TimelineEvent) {
        let Some(key) = map_pitch_to_key(event.pitch, self.layout.layout()) else {
            trace!("Pitch {} has no key in layout {}", event.pitch, self.layout.as_str());
            return;
        };
        let Some(handle) = self.view.resolve_key(key) else {
            trace!("Key {} is not on the keyboard", key);
            return;
        };

        match event.kind {
            EventKind::Activate { duration, loudness } => {
                trace!("Activate {} (pitch {})", key, event.pitch);
                self.view.activate_key(key);
                self.voice.play(handle.pitch, VoiceConfig { duration, loudness });
                self.session.active_keys.insert(key);
            }
            EventKind::Deactivate => {
                trace!("Deactivate {} (pitch {})", key, event.pitch);
                self.view.deactivate_key(key);
                self.session.active_keys.remove(&key);
            }
        }
    }

    fn publish_progress(&self, now: Instant) {
        let Some(started_at) = self.session.started_at else {
            return;
        };
        let progress = if self.session.total.is_zero() {
            100.0
        } else {
            let elapsed = now.saturating_duration_since(started_at);
            (elapsed.as_secs_f64() / self.session.total.as_secs_f64() * 100.0).min(100.0)
        };
        self.publish(PlayerUpdate::Progress(progress as f32));
    }

    fn finish(&mut self, now: Instant) {
        self.publish(PlayerUpdate::Progress(100.0));

        let leftover = self.session.active_keys.len();
        if leftover > 0 {
            warn!("Releasing {} keys left down at the end of playback", leftover);
        }
        for key in std::mem::take(&mut self.session.active_keys) {
            self.view.deactivate_key(key);
        }
        for handle in self.session.scheduled.drain() {
            self.timers.cancel(handle);
        }

        info!("Session {} finished", self.session.generation);
        self.session = PlaybackSession::default();
        self.enter(PlaybackState::Finished);
        self.timers.schedule(now + FINISHED_DISPLAY, Timer::ReturnToIdle);
    }

    fn schedule(&mut self, deadline: Instant, timer: Timer) {
        let handle = self.timers.schedule(deadline, timer);
        self.session.scheduled.insert(handle);
    }

    fn enter(&mut self, state: PlaybackState) {
        debug!("Playback state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.publish(PlayerUpdate::State(state));
    }

    fn publish(&self, update: PlayerUpdate) {
        let _ = self.updates.send(update);
    }
}

/// Scaled duration of `seconds`, provided every deadline the session can reach
/// (countdown, last event, grace and finished display) is representable from `now`.
fn session_span(now: Instant, seconds: f64, options: PlaybackOptions) -> Option<Duration> {
    let total = scaled_offset(seconds, options.speed)?;
    let span = COUNTDOWN_TICK
        .checked_mul(options.countdown_seconds)?
        .checked_add(total)?
        .checked_add(COMPLETION_GRACE)?
        .checked_add(FINISHED_DISPLAY)?;
    now.checked_add(span)?;
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentVoice;
    use crate::keyboard::SharedKeyboard;
    use crate::performance::{Note, PerformanceTrack};
    use crossbeam::channel::{Receiver, unbounded};

    fn performance(notes: Vec<(u8, f64, f64)>) -> Performance {
        Performance::from_tracks(vec![PerformanceTrack {
            name: None,
            notes: notes
                .into_iter()
                .map(|(pitch, start, duration)| Note {
                    pitch,
                    start,
                    duration,
                    loudness: 1.0,
                })
                .collect(),
        }])
    }

    fn scheduler() -> (Scheduler<SharedKeyboard, SilentVoice>, Receiver<PlayerUpdate>) {
        let (tx, rx) = unbounded();
        let keyboard = SharedKeyboard::new(LayoutId::Full36.layout(), Language::Numbers);
        let scheduler = Scheduler::new(
            keyboard,
            SilentVoice::new("test"),
            LayoutId::Full36,
            tx,
        );
        (scheduler, rx)
    }

    fn states(rx: &Receiver<PlayerUpdate>) -> Vec<PlaybackState> {
        rx.try_iter()
            .filter_map(|u| match u {
                PlayerUpdate::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejects_second_session() {
        let (mut scheduler, _rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0)]);
        let t0 = Instant::now();

        scheduler.play(t0, &perf, PlaybackOptions::default()).unwrap();
        let pending = scheduler.session().scheduled_count();
        assert_eq!(
            scheduler.play(t0, &perf, PlaybackOptions::default()),
            Err(PlayError::SessionActive)
        );
        assert_eq!(scheduler.session().scheduled_count(), pending);
    }

    #[test]
    fn rejects_non_positive_speed() {
        let (mut scheduler, _rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0)]);
        let options = PlaybackOptions {
            speed: 0.0,
            countdown_seconds: 0,
        };

        assert_eq!(
            scheduler.play(Instant::now(), &perf, options),
            Err(PlayError::InvalidSpeed(0.0))
        );
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn rejects_speed_too_small_to_schedule() {
        let (mut scheduler, _rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0)]);
        let options = PlaybackOptions {
            speed: 1e-30,
            countdown_seconds: 0,
        };

        assert_eq!(
            scheduler.play(Instant::now(), &perf, options),
            Err(PlayError::InvalidSpeed(1e-30))
        );
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn tiny_speed_is_fine_for_an_empty_performance() {
        let (mut scheduler, _rx) = scheduler();
        let t0 = Instant::now();
        let options = PlaybackOptions {
            speed: 1e-30,
            countdown_seconds: 0,
        };

        scheduler.play(t0, &Performance::default(), options).unwrap();
        assert_eq!(scheduler.next_deadline(), Some(t0 + COMPLETION_GRACE));
    }

    #[test]
    fn completes_two_hundred_ms_after_last_event() {
        let (mut scheduler, rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0)]);
        let t0 = Instant::now();

        scheduler.play(t0, &perf, PlaybackOptions::default()).unwrap();
        scheduler.advance(t0 + Duration::from_millis(1199));
        assert_eq!(scheduler.state(), PlaybackState::Playing);

        scheduler.advance(t0 + Duration::from_millis(1200));
        assert_eq!(scheduler.state(), PlaybackState::Finished);
        assert!(scheduler.session().active_keys().is_empty());

        scheduler.advance(t0 + Duration::from_millis(1200) + FINISHED_DISPLAY);
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(
            states(&rx),
            vec![
                PlaybackState::Playing,
                PlaybackState::Finished,
                PlaybackState::Idle
            ]
        );
    }

    #[test]
    fn empty_performance_finishes_after_grace() {
        let (mut scheduler, rx) = scheduler();
        let perf = Performance::default();
        let t0 = Instant::now();

        scheduler.play(t0, &perf, PlaybackOptions::default()).unwrap();
        assert_eq!(scheduler.next_deadline(), Some(t0 + COMPLETION_GRACE));
        scheduler.advance(t0 + COMPLETION_GRACE);
        assert_eq!(scheduler.state(), PlaybackState::Finished);

        let progress: Vec<f32> = rx
            .try_iter()
            .filter_map(|u| match u {
                PlayerUpdate::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.last(), Some(&100.0));
    }

    #[test]
    fn progress_is_capped_and_scaled() {
        let (mut scheduler, rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0), (62, 1.0, 1.0)]);
        let t0 = Instant::now();
        let options = PlaybackOptions {
            speed: 2.0,
            countdown_seconds: 0,
        };

        scheduler.play(t0, &perf, options).unwrap();
        scheduler.advance(t0);
        let _ = rx.try_iter().count();

        // scaled total is 1s; the first release and second press fire at 0.5s
        scheduler.advance(t0 + Duration::from_millis(500));
        let progress: Vec<f32> = rx
            .try_iter()
            .filter_map(|u| match u {
                PlayerUpdate::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50.0, 50.0]);
    }

    #[test]
    fn manual_press_does_not_touch_session() {
        let (mut scheduler, _rx) = scheduler();
        assert!(scheduler.press_key(KeyId('z')));
        assert!(scheduler.view().is_pressed(KeyId('z')));
        assert!(scheduler.session().active_keys().is_empty());

        scheduler.release_key(KeyId('z'));
        assert!(!scheduler.view().is_pressed(KeyId('z')));
        assert!(!scheduler.press_key(KeyId('!')));
    }

    #[test]
    fn render_is_refused_during_session() {
        let (mut scheduler, _rx) = scheduler();
        let perf = performance(vec![(60, 0.0, 1.0)]);
        let t0 = Instant::now();
        scheduler.play(t0, &perf, PlaybackOptions::default()).unwrap();

        assert!(!scheduler.render(LayoutId::Natural15, Language::Solfege));
        assert_eq!(scheduler.layout(), LayoutId::Full36);

        scheduler.stop(t0);
        assert!(scheduler.render(LayoutId::Natural15, Language::Solfege));
        assert_eq!(scheduler.layout(), LayoutId::Natural15);
    }
}
