use crate::labels::Language;
use crate::layout::{KeyId, Layout, is_black_key};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A key as rendered: where it sits and what it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHandle {
    pub key: KeyId,
    pub pitch: u8,
    pub row: usize,
    pub column: usize,
    pub black: bool,
}

/// Visual side of the keyboard. Scheduled and manual presses go through the same
/// calls, so the two are indistinguishable on screen.
pub trait KeyboardView {
    fn render(&mut self, layout: &'static Layout, language: Language);
    fn resolve_key(&self, key: KeyId) -> Option<KeyHandle>;
    fn activate_key(&mut self, key: KeyId);
    fn deactivate_key(&mut self, key: KeyId);
    /// Clears every key, whether or not it was recorded as pressed.
    fn release_all(&mut self);
}

#[derive(Debug)]
pub struct KeyboardState {
    pub layout: &'static Layout,
    pub language: Language,
    pub pressed: BTreeSet<KeyId>,
}

impl KeyboardState {
    pub fn keys(&self) -> impl Iterator<Item = KeyHandle> + '_ {
        self.layout.rows.iter().enumerate().flat_map(|(row, keys)| {
            keys.iter().enumerate().map(move |(column, &(pitch, c))| KeyHandle {
                key: KeyId(c),
                pitch,
                row,
                column,
                black: is_black_key(pitch),
            })
        })
    }
}

/// Keyboard state shared between the player thread (effects) and the UI (drawing).
#[derive(Debug, Clone)]
pub struct SharedKeyboard {
    inner: Arc<Mutex<KeyboardState>>,
}

impl SharedKeyboard {
    pub fn new(layout: &'static Layout, language: Language) -> Self {
        Self {
            inner: Arc::new(Mutex::new(KeyboardState {
                layout,
                language,
                pressed: BTreeSet::new(),
            })),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, KeyboardState> {
        self.inner.lock()
    }

    pub fn is_pressed(&self, key: KeyId) -> bool {
        self.inner.lock().pressed.contains(&key)
    }
}

impl KeyboardView for SharedKeyboard {
    fn render(&mut self, layout: &'static Layout, language: Language) {
        let mut state = self.inner.lock();
        state.layout = layout;
        state.language = language;
        state.pressed.clear();
    }

    fn resolve_key(&self, key: KeyId) -> Option<KeyHandle> {
        self.inner.lock().keys().find(|handle| handle.key == key)
    }

    fn activate_key(&mut self, key: KeyId) {
        self.inner.lock().pressed.insert(key);
    }

    fn deactivate_key(&mut self, key: KeyId) {
        self.inner.lock().pressed.remove(&key);
    }

    fn release_all(&mut self) {
        self.inner.lock().pressed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutId;

    #[test]
    fn resolves_keys_of_current_layout() {
        let mut keyboard = SharedKeyboard::new(LayoutId::Full36.layout(), Language::Numbers);
        let handle = keyboard.resolve_key(KeyId('s')).unwrap();
        assert_eq!(handle.pitch, 61);
        assert!(handle.black);
        assert_eq!((handle.row, handle.column), (1, 1));

        keyboard.render(LayoutId::Natural15.layout(), Language::Numbers);
        assert_eq!(keyboard.resolve_key(KeyId('s')), None);
        assert_eq!(keyboard.resolve_key(KeyId('y')).map(|h| h.pitch), Some(60));
    }

    #[test]
    fn clones_share_pressed_keys() {
        let mut keyboard = SharedKeyboard::new(LayoutId::Natural21.layout(), Language::Thai);
        let observer = keyboard.clone();

        keyboard.activate_key(KeyId('z'));
        keyboard.activate_key(KeyId('x'));
        assert!(observer.is_pressed(KeyId('z')));

        keyboard.deactivate_key(KeyId('z'));
        assert!(!observer.is_pressed(KeyId('z')));
        assert!(observer.is_pressed(KeyId('x')));

        keyboard.release_all();
        assert!(observer.lock().pressed.is_empty());
    }

    #[test]
    fn render_clears_pressed_keys() {
        let mut keyboard = SharedKeyboard::new(LayoutId::Full36.layout(), Language::Numbers);
        keyboard.activate_key(KeyId('q'));
        keyboard.render(LayoutId::Full36.layout(), Language::NoteNames);
        assert!(!keyboard.is_pressed(KeyId('q')));
        assert_eq!(keyboard.lock().language, Language::NoteNames);
    }
}
