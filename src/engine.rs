use crate::audio::{self, AudioVoice};
use crate::events::{PerformanceSummary, PlayerUpdate};
use crate::keyboard::SharedKeyboard;
use crate::labels::Language;
use crate::layout::{KeyId, LayoutId};
use crate::performance::{LoadError, Performance};
use crate::settings::Settings;
use crate::timing::{PlayError, PlaybackOptions, Scheduler};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    LoadFile(PathBuf),
    LoadBytes { name: String, content: Vec<u8> },
    SetKeyboard { layout: LayoutId, language: Language },
    Play(PlaybackOptions),
    Stop,
    PressKey(KeyId),
    ReleaseKey(KeyId),
}

pub struct PlayerHandle {
    pub command_tx: Sender<PlayerCommand>,
    pub update_rx: Receiver<PlayerUpdate>,
    pub keyboard: SharedKeyboard,
}

pub fn spawn_player(settings: &Settings) -> PlayerHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();
    let keyboard = SharedKeyboard::new(settings.layout.layout(), settings.language);

    let thread_keyboard = keyboard.clone();
    let layout = settings.layout;
    let manual_voice = settings.manual_voice;
    std::thread::spawn(move || {
        // The output stream is not Send, so the voice is opened on this thread.
        let mut player = Player::new(thread_keyboard, audio::open_voice(), layout, update_tx);
        player.scheduler.set_manual_voice(manual_voice);
        player.run(command_rx);
    });

    PlayerHandle {
        command_tx,
        update_rx,
        keyboard,
    }
}

/// Owns everything the player thread mutates: the scheduler and the loaded performance.
pub struct Player<A> {
    scheduler: Scheduler<SharedKeyboard, A>,
    performance: Option<Performance>,
    updates: Sender<PlayerUpdate>,
}

impl<A: AudioVoice> Player<A> {
    pub fn new(
        keyboard: SharedKeyboard,
        voice: A,
        layout: LayoutId,
        updates: Sender<PlayerUpdate>,
    ) -> Self {
        let _ = updates.send(PlayerUpdate::Audio(voice.status()));
        Self {
            scheduler: Scheduler::new(keyboard, voice, layout, updates.clone()),
            performance: None,
            updates,
        }
    }

    pub fn scheduler(&self) -> &Scheduler<SharedKeyboard, A> {
        &self.scheduler
    }

    pub fn performance(&self) -> Option<&Performance> {
        self.performance.as_ref()
    }

    pub fn run(mut self, command_rx: Receiver<PlayerCommand>) {
        loop {
            let received = match self.scheduler.next_deadline() {
                Some(deadline) => command_rx.recv_deadline(deadline),
                None => command_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(command) => self.handle(command, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.scheduler.advance(Instant::now());
        }

        self.scheduler.stop(Instant::now());
        info!("Player thread exiting");
    }

    pub fn handle(&mut self, command: PlayerCommand, now: Instant) {
        match command {
            PlayerCommand::LoadFile(path) => {
                let name = display_name(&path);
                self.replace_performance(name, Performance::open(&path));
            }
            PlayerCommand::LoadBytes { name, content } => {
                let result = if Performance::is_supported_path(Path::new(&name)) {
                    Performance::load(&content)
                } else {
                    Err(LoadError::UnsupportedExtension(PathBuf::from(&name)))
                };
                self.replace_performance(name, result);
            }
            PlayerCommand::SetKeyboard { layout, language } => {
                self.scheduler.render(layout, language);
            }
            PlayerCommand::Play(options) => {
                let result = match &self.performance {
                    Some(performance) => self.scheduler.play(now, performance, options),
                    None => Err(PlayError::NoPerformance),
                };
                match result {
                    Ok(()) => {}
                    Err(e @ PlayError::InvalidSpeed(_)) => warn!("Play rejected: {}", e),
                    Err(e) => debug!("Play ignored: {}", e),
                }
            }
            PlayerCommand::Stop => {
                self.scheduler.stop(now);
            }
            PlayerCommand::PressKey(key) => {
                self.scheduler.press_key(key);
            }
            PlayerCommand::ReleaseKey(key) => {
                self.scheduler.release_key(key);
            }
        }
    }

    /// Only a fully parsed performance replaces the current one.
    fn replace_performance(&mut self, name: String, result: Result<Performance, LoadError>) {
        match result {
            Ok(performance) => {
                let summary = PerformanceSummary {
                    name,
                    tracks: performance.tracks.len(),
                    notes: performance.note_count(),
                    duration: performance.duration,
                };
                self.performance = Some(performance);
                let _ = self.updates.send(PlayerUpdate::PerformanceLoaded(summary));
            }
            Err(e) => {
                error!("Failed to load {}: {}", name, e);
                let _ = self.updates.send(PlayerUpdate::LoadFailed {
                    message: format!("Failed to load {}: {}", name, e),
                });
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
