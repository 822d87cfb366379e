use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Tempo assumed until the first tempo meta event (120 BPM).
const DEFAULT_US_PER_BEAT: u32 = 500_000;
const US_PER_SECOND: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file type {0:?}, expected .mid or .midi")]
    UnsupportedExtension(PathBuf),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed MIDI data: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: u8,
    /// Seconds from the start of the performance
    pub start: f64,
    /// Seconds, always > 0
    pub duration: f64,
    /// 0.0 -> 1.0
    pub loudness: f32,
}

impl Note {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerformanceTrack {
    pub name: Option<String>,
    pub notes: Vec<Note>,
}

/// A parsed performance: notes per track plus the total length in seconds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Performance {
    pub tracks: Vec<PerformanceTrack>,
    pub duration: f64,
}

impl Performance {
    pub fn from_tracks(tracks: Vec<PerformanceTrack>) -> Self {
        let duration = tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(Note::end)
            .fold(0.0, f64::max);
        Self { tracks, duration }
    }

    /// Accepts `.mid` and `.midi`, in any letter case.
    pub fn is_supported_path(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
    }

    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if !Self::is_supported_path(path) {
            return Err(LoadError::UnsupportedExtension(path.to_path_buf()));
        }
        let content = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let performance = Self::load(&content)?;
        info!(
            "Loaded {:?}: {} notes in {} tracks, {:.2}s",
            path,
            performance.note_count(),
            performance.tracks.len(),
            performance.duration
        );
        Ok(performance)
    }

    /// Parses a Standard MIDI File. Either the whole file converts or nothing is returned.
    pub fn load(content: &[u8]) -> Result<Self, LoadError> {
        let smf = Smf::parse(content).map_err(|e| LoadError::Parse(e.to_string()))?;
        let clock = TickClock::new(&smf)?;

        let tracks = smf
            .tracks
            .iter()
            .map(|events| extract_track(events, &clock))
            .collect();

        Ok(Self::from_tracks(tracks))
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.tracks.iter().flat_map(|t| t.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

struct TempoSegment {
    tick: u64,
    seconds: f64,
    us_per_beat: u32,
}

enum TickClock {
    Metrical {
        ticks_per_beat: f64,
        /// Ascending by tick, first entry at tick 0
        segments: Vec<TempoSegment>,
    },
    Timecode {
        seconds_per_tick: f64,
    },
}

impl TickClock {
    fn new(smf: &Smf) -> Result<Self, LoadError> {
        match smf.header.timing {
            Timing::Metrical(ticks) => {
                let ticks_per_beat = ticks.as_int();
                if ticks_per_beat == 0 {
                    return Err(LoadError::Parse("zero ticks per beat".into()));
                }
                Ok(Self::metrical(smf, f64::from(ticks_per_beat)))
            }
            Timing::Timecode(fps, subframes) => {
                if subframes == 0 {
                    return Err(LoadError::Parse("zero subframes per frame".into()));
                }
                Ok(TickClock::Timecode {
                    seconds_per_tick: 1.0 / (f64::from(fps.as_f32()) * f64::from(subframes)),
                })
            }
        }
    }

    /// Tempo changes may live in any track; they apply to all of them.
    fn metrical(smf: &Smf, ticks_per_beat: f64) -> Self {
        let mut changes = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(us)) = event.kind {
                    changes.push((tick, us.as_int()));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            us_per_beat: DEFAULT_US_PER_BEAT,
        }];
        for (tick, us_per_beat) in changes {
            let Some(last) = segments.last_mut() else {
                break;
            };
            if last.tick == tick {
                last.us_per_beat = us_per_beat;
                continue;
            }
            let seconds = last.seconds
                + (tick - last.tick) as f64 * f64::from(last.us_per_beat)
                    / US_PER_SECOND
                    / ticks_per_beat;
            segments.push(TempoSegment {
                tick,
                seconds,
                us_per_beat,
            });
        }

        debug!("Tempo map has {} segments", segments.len());
        TickClock::Metrical {
            ticks_per_beat,
            segments,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            TickClock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
            TickClock::Metrical {
                ticks_per_beat,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let segment = &segments[idx];
                segment.seconds
                    + (tick - segment.tick) as f64 * f64::from(segment.us_per_beat)
                        / US_PER_SECOND
                        / ticks_per_beat
            }
        }
    }
}

struct NoteSpan {
    start_tick: u64,
    end_tick: u64,
    pitch: u8,
    velocity: u8,
}

fn extract_track(events: &[TrackEvent], clock: &TickClock) -> PerformanceTrack {
    let mut tick = 0u64;
    let mut name = None;
    // (channel, key) -> open notes as (start tick, velocity), oldest first
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
    let mut spans = Vec::new();

    for event in events {
        tick += u64::from(event.delta.as_int());
        match event.kind {
            TrackEventKind::Midi { channel, message } => {
                let (key, velocity) = match message {
                    MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int()),
                    MidiMessage::NoteOff { key, .. } => (key.as_int(), 0),
                    _ => continue,
                };
                let slot = (channel.as_int(), key);
                if velocity > 0 {
                    open.entry(slot).or_default().push_back((tick, velocity));
                } else if let Some((start_tick, velocity)) =
                    open.get_mut(&slot).and_then(VecDeque::pop_front)
                {
                    spans.push(NoteSpan {
                        start_tick,
                        end_tick: tick,
                        pitch: key,
                        velocity,
                    });
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                let text = String::from_utf8_lossy(raw).trim().to_string();
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            _ => {}
        }
    }

    for ((_, pitch), queue) in open {
        for (start_tick, velocity) in queue {
            spans.push(NoteSpan {
                start_tick,
                end_tick: tick,
                pitch,
                velocity,
            });
        }
    }
    spans.sort_by_key(|s| (s.start_tick, s.pitch, s.end_tick));

    let notes = spans
        .into_iter()
        .filter(|s| s.end_tick > s.start_tick)
        .map(|s| {
            let start = clock.seconds_at(s.start_tick);
            Note {
                pitch: s.pitch,
                start,
                duration: clock.seconds_at(s.end_tick) - start,
                loudness: f32::from(s.velocity) / 127.0,
            }
        })
        .collect();

    PerformanceTrack { name, notes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header};

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        }
    }

    fn note_off(key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(64),
            },
        }
    }

    fn tempo(us_per_beat: u32) -> TrackEventKind<'static> {
        TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_beat)))
    }

    fn end() -> TrackEventKind<'static> {
        TrackEventKind::Meta(MetaMessage::EndOfTrack)
    }

    fn write_smf(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let format = if tracks.len() == 1 {
            Format::SingleTrack
        } else {
            Format::Parallel
        };
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(480))));
        smf.tracks = tracks;
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn converts_ticks_with_tempo_changes() {
        let bytes = write_smf(vec![vec![
            event(0, note_on(60, 127)),
            event(480, note_on(60, 0)),
            event(0, tempo(250_000)),
            event(0, note_on(64, 64)),
            event(960, note_off(64)),
            event(0, end()),
        ]]);

        let perf = Performance::load(&bytes).unwrap();
        let notes: Vec<&Note> = perf.notes().collect();
        assert_eq!(notes.len(), 2);

        assert_eq!(notes[0].pitch, 60);
        assert_close(notes[0].start, 0.0);
        assert_close(notes[0].duration, 0.5);
        assert_eq!(notes[0].loudness, 1.0);

        assert_eq!(notes[1].pitch, 64);
        assert_close(notes[1].start, 0.5);
        assert_close(notes[1].duration, 0.5);
        assert!((notes[1].loudness - 64.0 / 127.0).abs() < 1e-6);

        assert_close(perf.duration, 1.0);
    }

    #[test]
    fn repeated_key_closes_oldest_first() {
        let bytes = write_smf(vec![vec![
            event(0, note_on(60, 100)),
            event(240, note_on(60, 100)),
            event(240, note_off(60)),
            event(240, note_off(60)),
            event(0, end()),
        ]]);

        let perf = Performance::load(&bytes).unwrap();
        let notes = &perf.tracks[0].notes;
        assert_eq!(notes.len(), 2);
        assert_close(notes[0].start, 0.0);
        assert_close(notes[0].duration, 0.5);
        assert_close(notes[1].start, 0.25);
        assert_close(notes[1].duration, 0.5);
    }

    #[test]
    fn dangling_note_closes_at_track_end() {
        let bytes = write_smf(vec![vec![event(0, note_on(72, 90)), event(960, end())]]);

        let perf = Performance::load(&bytes).unwrap();
        assert_eq!(perf.note_count(), 1);
        assert_close(perf.tracks[0].notes[0].duration, 1.0);
    }

    #[test]
    fn zero_length_notes_are_dropped() {
        let bytes = write_smf(vec![vec![
            event(0, note_on(60, 90)),
            event(0, note_off(60)),
            event(0, end()),
        ]]);

        let perf = Performance::load(&bytes).unwrap();
        assert_eq!(perf.note_count(), 0);
        assert_eq!(perf.duration, 0.0);
    }

    #[test]
    fn tempo_track_applies_to_other_tracks() {
        let bytes = write_smf(vec![
            vec![
                event(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Conductor"))),
                event(0, tempo(1_000_000)),
                event(0, end()),
            ],
            vec![
                event(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Piano"))),
                event(480, note_on(67, 100)),
                event(480, note_off(67)),
                event(0, end()),
            ],
        ]);

        let perf = Performance::load(&bytes).unwrap();
        assert_eq!(perf.tracks.len(), 2);
        assert_eq!(perf.tracks[0].name.as_deref(), Some("Conductor"));
        assert!(perf.tracks[0].notes.is_empty());
        assert_eq!(perf.tracks[1].name.as_deref(), Some("Piano"));

        let note = &perf.tracks[1].notes[0];
        assert_close(note.start, 1.0);
        assert_close(note.duration, 1.0);
        assert_close(perf.duration, 2.0);
    }

    #[test]
    fn malformed_bytes_fail() {
        let err = Performance::load(b"definitely not a midi file").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(Performance::is_supported_path(Path::new("song.mid")));
        assert!(Performance::is_supported_path(Path::new("SONG.MIDI")));
        assert!(Performance::is_supported_path(Path::new("dir/song.Mid")));
        assert!(!Performance::is_supported_path(Path::new("song.mp3")));
        assert!(!Performance::is_supported_path(Path::new("mid")));
    }

    #[test]
    fn open_rejects_other_extensions() {
        let err = Performance::open(Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(_)));
    }
}
