mod fonts;
mod keyboard;

use crate::audio::AudioStatus;
use crate::engine::{PlayerCommand, PlayerHandle};
use crate::events::{PerformanceSummary, PlayerUpdate};
use crate::labels::Language;
use crate::layout::{KeyId, LayoutId};
use crate::settings::{MAX_SPEED, MIN_SPEED, Settings, Theme};
use crate::timing::PlaybackState;
use eframe::egui;
use keyboard::KeyboardWidget;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

const COUNTDOWN_CHOICES: [u32; 3] = [0, 3, 5];

pub struct PianoApp {
    player: PlayerHandle,
    settings: Settings,
    settings_path: PathBuf,
    state: PlaybackState,
    countdown: Option<u32>,
    progress: f32,
    performance: Option<PerformanceSummary>,
    error_message: Option<String>,
    audio: Option<AudioStatus>,
    held_keys: BTreeSet<KeyId>,
    mouse_key: Option<KeyId>,
}

impl PianoApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        player: PlayerHandle,
        settings: Settings,
        settings_path: PathBuf,
    ) -> Self {
        fonts::install_fonts(&cc.egui_ctx);
        apply_theme(&cc.egui_ctx, settings.theme);
        Self {
            player,
            settings,
            settings_path,
            state: PlaybackState::Idle,
            countdown: None,
            progress: 0.0,
            performance: None,
            error_message: None,
            audio: None,
            held_keys: BTreeSet::new(),
            mouse_key: None,
        }
    }

    fn send(&self, command: PlayerCommand) {
        if self.player.command_tx.send(command).is_err() {
            warn!("Player thread is gone");
        }
    }

    fn process_player_updates(&mut self) {
        while let Ok(update) = self.player.update_rx.try_recv() {
            match update {
                PlayerUpdate::State(state) => {
                    self.state = state;
                    if state == PlaybackState::Idle {
                        self.progress = 0.0;
                    }
                }
                PlayerUpdate::Countdown(value) => self.countdown = value,
                PlayerUpdate::Progress(percent) => self.progress = percent,
                PlayerUpdate::PerformanceLoaded(summary) => {
                    info!("Loaded {} ({} notes)", summary.name, summary.notes);
                    self.performance = Some(summary);
                    self.error_message = None;
                }
                PlayerUpdate::LoadFailed { message } => {
                    self.error_message = Some(message);
                }
                PlayerUpdate::Audio(status) => self.audio = Some(status),
            }
        }
    }

    fn save_settings(&mut self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            warn!("Failed to save settings: {}", e);
            self.error_message = Some(format!("Failed to save settings: {}", e));
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        let (events, dropped, focused) = ctx.input(|i| {
            (i.events.clone(), i.raw.dropped_files.clone(), i.focused)
        });

        for file in dropped {
            if let Some(path) = file.path {
                self.send(PlayerCommand::LoadFile(path));
            } else if let Some(bytes) = file.bytes {
                self.send(PlayerCommand::LoadBytes {
                    name: file.name,
                    content: bytes.to_vec(),
                });
            }
        }

        let events = if ctx.wants_keyboard_input() {
            &[][..]
        } else {
            &events[..]
        };
        let in_session = self.state.is_session();
        for command in key_commands(&mut self.held_keys, events, focused, in_session) {
            self.send(command);
        }
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open MIDI...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Open MIDI File")
                        .add_filter("MIDI", &["mid", "midi"])
                        .pick_file()
                    {
                        self.send(PlayerCommand::LoadFile(path));
                    }
                    ui.close();
                }

                ui.separator();

                if ui.button("Quit").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                match &self.audio {
                    Some(AudioStatus::Ready) => {
                        ui.label("🔊 Audio ready");
                    }
                    Some(AudioStatus::Unavailable(reason)) => {
                        ui.colored_label(egui::Color32::from_rgb(220, 160, 60), "🔇 No audio")
                            .on_hover_text(reason.as_str());
                    }
                    None => {}
                }
            });
        });
    }

    fn settings_controls(&mut self, ui: &mut egui::Ui) {
        let in_session = self.state.is_session();
        let mut layout = self.settings.layout;
        let mut language = self.settings.language;
        let mut theme = self.settings.theme;
        let mut countdown = self.settings.countdown_seconds;

        ui.horizontal(|ui| {
            ui.add_enabled_ui(!in_session, |ui| {
                egui::ComboBox::from_label("Layout")
                    .selected_text(format!("{} keys", layout.as_str()))
                    .show_ui(ui, |ui| {
                        for id in LayoutId::ALL {
                            ui.selectable_value(&mut layout, id, format!("{} keys", id.as_str()));
                        }
                    });

                egui::ComboBox::from_label("Labels")
                    .selected_text(language.display_name())
                    .show_ui(ui, |ui| {
                        for option in Language::ALL {
                            ui.selectable_value(&mut language, option, option.display_name());
                        }
                    });

                egui::ComboBox::from_label("Countdown")
                    .selected_text(countdown_text(countdown))
                    .show_ui(ui, |ui| {
                        for seconds in COUNTDOWN_CHOICES {
                            ui.selectable_value(&mut countdown, seconds, countdown_text(seconds));
                        }
                    });
            });

            egui::ComboBox::from_label("Theme")
                .selected_text(format!("{:?}", theme))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut theme, Theme::Dark, "Dark");
                    ui.selectable_value(&mut theme, Theme::Light, "Light");
                });
        });

        let mut changed = false;
        if layout != self.settings.layout || language != self.settings.language {
            self.settings.layout = layout;
            self.settings.language = language;
            self.held_keys.clear();
            self.mouse_key = None;
            self.send(PlayerCommand::SetKeyboard { layout, language });
            changed = true;
        }
        if theme != self.settings.theme {
            self.settings.theme = theme;
            apply_theme(ui.ctx(), theme);
            changed = true;
        }
        if countdown != self.settings.countdown_seconds {
            self.settings.countdown_seconds = countdown;
            changed = true;
        }
        if changed {
            self.save_settings();
        }
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let can_play = self.state == PlaybackState::Idle && self.performance.is_some();
            if ui.add_enabled(can_play, egui::Button::new("▶ Play")).clicked() {
                self.send(PlayerCommand::Play(self.settings.playback_options()));
            }
            if ui
                .add_enabled(self.state.is_session(), egui::Button::new("⏹ Stop"))
                .clicked()
            {
                self.send(PlayerCommand::Stop);
            }

            ui.separator();

            let speed = ui.add_enabled(
                !self.state.is_session(),
                egui::Slider::new(&mut self.settings.speed, MIN_SPEED..=MAX_SPEED)
                    .text("Speed")
                    .custom_formatter(|v, _| format!("{v:.2}x")),
            );
            if speed.drag_stopped() || (speed.changed() && !speed.dragged()) {
                self.save_settings();
            }

            ui.separator();
            ui.label(state_text(self.state));
        });

        ui.add(egui::ProgressBar::new(self.progress / 100.0).show_percentage());
    }

    fn performance_info(&self, ui: &mut egui::Ui) {
        match &self.performance {
            Some(summary) => {
                ui.label(format!(
                    "{}: {} notes in {} tracks, {:.1}s",
                    summary.name, summary.notes, summary.tracks, summary.duration
                ));
            }
            None => {
                ui.label("Drop a MIDI file here or use File → Open MIDI");
            }
        }
    }

    fn countdown_overlay(&self, ctx: &egui::Context) {
        let Some(value) = self.countdown else {
            return;
        };
        egui::Area::new(egui::Id::new("countdown"))
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                ui.label(
                    egui::RichText::new(value.to_string())
                        .size(120.0)
                        .strong()
                        .color(egui::Color32::from_rgb(255, 183, 77)),
                );
            });
    }
}

impl eframe::App for PianoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_player_updates();
        self.handle_input(ctx);

        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            self.menu_bar(ui);
        });

        if let Some(error) = self.error_message.clone() {
            egui::TopBottomPanel::top("error").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::RED, error);
                    if ui.button("✕").clicked() {
                        self.error_message = None;
                    }
                });
            });
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            self.settings_controls(ui);
            self.transport_controls(ui);
            self.performance_info(ui);
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let held = {
                let keyboard = self.player.keyboard.lock();
                ui.vertical_centered(|ui| KeyboardWidget::new(&keyboard).show(ui))
                    .inner
            };

            if held != self.mouse_key {
                if let Some(key) = self.mouse_key.take() {
                    self.send(PlayerCommand::ReleaseKey(key));
                }
                if let Some(key) = held {
                    self.send(PlayerCommand::PressKey(key));
                }
                self.mouse_key = held;
            }
        });

        self.countdown_overlay(ctx);

        ctx.request_repaint();
    }
}

fn apply_theme(ctx: &egui::Context, theme: Theme) {
    ctx.set_visuals(match theme {
        Theme::Dark => egui::Visuals::dark(),
        Theme::Light => egui::Visuals::light(),
    });
}

fn countdown_text(seconds: u32) -> String {
    match seconds {
        0 => "Off".to_string(),
        n => format!("{}s", n),
    }
}

fn state_text(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "Ready",
        PlaybackState::CountingDown => "Get ready...",
        PlaybackState::Playing => "Playing",
        PlaybackState::Finished => "Finished",
        PlaybackState::Stopped => "Stopped",
    }
}

/// Player commands for a frame of key events. `held` remembers which typing keys are
/// down so each press gets one release; losing window focus releases all of them.
fn key_commands(
    held: &mut BTreeSet<KeyId>,
    events: &[egui::Event],
    focused: bool,
    in_session: bool,
) -> Vec<PlayerCommand> {
    let mut commands = Vec::new();

    for event in events {
        let egui::Event::Key {
            key,
            pressed,
            repeat,
            modifiers,
            ..
        } = event
        else {
            continue;
        };

        if *key == egui::Key::Escape {
            if *pressed && in_session {
                commands.push(PlayerCommand::Stop);
            }
            continue;
        }
        if *repeat || modifiers.ctrl || modifiers.command || modifiers.alt {
            continue;
        }
        let Some(c) = key_char(*key) else {
            continue;
        };
        let id = KeyId::from_char(c);

        if *pressed {
            if held.insert(id) {
                commands.push(PlayerCommand::PressKey(id));
            }
        } else if held.remove(&id) {
            commands.push(PlayerCommand::ReleaseKey(id));
        }
    }

    if !focused {
        commands.extend(std::mem::take(held).into_iter().map(PlayerCommand::ReleaseKey));
    }
    commands
}

/// Typing keys that some layout binds.
fn key_char(key: egui::Key) -> Option<char> {
    use egui::Key;
    let c = match key {
        Key::A => 'a',
        Key::B => 'b',
        Key::C => 'c',
        Key::D => 'd',
        Key::E => 'e',
        Key::F => 'f',
        Key::G => 'g',
        Key::H => 'h',
        Key::I => 'i',
        Key::J => 'j',
        Key::K => 'k',
        Key::L => 'l',
        Key::M => 'm',
        Key::N => 'n',
        Key::O => 'o',
        Key::P => 'p',
        Key::Q => 'q',
        Key::R => 'r',
        Key::S => 's',
        Key::T => 't',
        Key::U => 'u',
        Key::V => 'v',
        Key::W => 'w',
        Key::X => 'x',
        Key::Y => 'y',
        Key::Z => 'z',
        Key::Num0 => '0',
        Key::Num1 => '1',
        Key::Num2 => '2',
        Key::Num3 => '3',
        Key::Num4 => '4',
        Key::Num5 => '5',
        Key::Num6 => '6',
        Key::Num7 => '7',
        Key::Num8 => '8',
        Key::Num9 => '9',
        Key::Comma => ',',
        Key::Period => '.',
        Key::Semicolon => ';',
        Key::Slash => '/',
        Key::Minus => '-',
        Key::Equals => '=',
        Key::OpenBracket => '[',
        Key::CloseBracket => ']',
        _ => return None,
    };
    Some(c)
}
