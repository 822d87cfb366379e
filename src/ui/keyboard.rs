use crate::keyboard::{KeyHandle, KeyboardState};
use crate::labels::{degree_number, key_label};
use crate::layout::KeyId;
use eframe::egui;

const KEY_WIDTH: f32 = 58.0;
const KEY_HEIGHT: f32 = 96.0;
const KEY_GAP: f32 = 6.0;

/// Draws the key grid and reports which key, if any, the pointer is holding down.
pub struct KeyboardWidget<'a> {
    state: &'a KeyboardState,
}

impl<'a> KeyboardWidget<'a> {
    pub fn new(state: &'a KeyboardState) -> Self {
        Self { state }
    }

    pub fn show(self, ui: &mut egui::Ui) -> Option<KeyId> {
        let rows = self.state.layout.rows;
        let widest = rows.iter().map(|row| row.len()).max().unwrap_or(0) as f32;
        let size = egui::Vec2::new(
            widest * (KEY_WIDTH + KEY_GAP),
            rows.len() as f32 * (KEY_HEIGHT + KEY_GAP),
        );
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
        let origin = response.rect.min;

        let pointer = if response.is_pointer_button_down_on() {
            response.interact_pointer_pos()
        } else {
            None
        };

        let mut held = None;
        for handle in self.state.keys() {
            let row_len = rows[handle.row].len() as f32;
            let indent = (widest - row_len) * (KEY_WIDTH + KEY_GAP) / 2.0;
            let rect = egui::Rect::from_min_size(
                origin
                    + egui::Vec2::new(
                        indent + handle.column as f32 * (KEY_WIDTH + KEY_GAP),
                        handle.row as f32 * (KEY_HEIGHT + KEY_GAP),
                    ),
                egui::Vec2::new(KEY_WIDTH, KEY_HEIGHT),
            );

            if pointer.is_some_and(|pos| rect.contains(pos)) {
                held = Some(handle.key);
            }
            self.draw_key(&painter, rect, handle);
        }
        held
    }

    fn draw_key(&self, painter: &egui::Painter, rect: egui::Rect, handle: KeyHandle) {
        let active = self.state.pressed.contains(&handle.key);
        let (fill, text_color) = match (handle.black, active) {
            (_, true) => (
                egui::Color32::from_rgb(255, 183, 77),
                egui::Color32::BLACK,
            ),
            (true, false) => (
                egui::Color32::from_rgb(30, 30, 30),
                egui::Color32::WHITE,
            ),
            (false, false) => (
                egui::Color32::from_rgb(235, 235, 235),
                egui::Color32::BLACK,
            ),
        };

        painter.rect_filled(rect, 6.0, fill);
        painter.rect_stroke(
            rect,
            6.0,
            egui::Stroke::new(1.0, egui::Color32::from_rgb(100, 100, 100)),
            egui::StrokeKind::Inside,
        );

        if let Some(number) = degree_number(handle.pitch) {
            painter.text(
                rect.center_top() + egui::Vec2::new(0.0, 22.0),
                egui::Align2::CENTER_CENTER,
                number,
                egui::FontId::proportional(16.0),
                text_color,
            );
        }
        if let Some(label) = key_label(handle.pitch, self.state.language) {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                label,
                egui::FontId::proportional(13.0),
                text_color,
            );
        }
        painter.text(
            rect.center_bottom() - egui::Vec2::new(0.0, 14.0),
            egui::Align2::CENTER_CENTER,
            handle.key.to_string(),
            egui::FontId::monospace(12.0),
            text_color.gamma_multiply(0.7),
        );
    }
}
