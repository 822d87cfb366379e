use pianosim::{PianoApp, PlayerCommand, Settings, spawn_player};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pianosim=info")),
        )
        .init();

    let settings_path = Settings::default_path();
    let settings = Settings::load_or_default(&settings_path);
    let player = spawn_player(&settings);

    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        let _ = player.command_tx.send(PlayerCommand::LoadFile(path));
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 640.0])
            .with_title("Piano Simulator")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "pianosim",
        options,
        Box::new(|cc| Ok(Box::new(PianoApp::new(cc, player, settings, settings_path)))),
    )
}
