use eframe::egui;
use std::sync::Arc;
use tracing::{debug, warn};

const THAI_FONT_NAME: &str = "Noto Sans Thai";

/// Empty when the build found no Thai font.
static THAI_FONT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/thai.ttf"));

/// Appends the Thai face as a fallback of the proportional family.
pub fn install_fonts(ctx: &egui::Context) {
    if THAI_FONT.is_empty() {
        warn!("Built without a Thai font, Thai labels will show as boxes");
        return;
    }

    let mut fonts = egui::FontDefinitions::default();
    fonts.font_data.insert(
        THAI_FONT_NAME.to_owned(),
        Arc::new(egui::FontData::from_static(THAI_FONT)),
    );
    fonts
        .families
        .entry(egui::FontFamily::Proportional)
        .or_default()
        .push(THAI_FONT_NAME.to_owned());
    ctx.set_fonts(fonts);
    debug!("Installed Thai fallback font");
}
