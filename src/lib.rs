pub mod audio;
pub mod engine;
pub mod events;
pub mod keyboard;
pub mod labels;
pub mod layout;
pub mod performance;
pub mod settings;
pub mod timing;
mod ui;

pub use engine::{PlayerCommand, PlayerHandle, spawn_player};
pub use events::{PerformanceSummary, PlayerUpdate};
pub use performance::{LoadError, Performance};
pub use settings::Settings;
pub use ui::PianoApp;
