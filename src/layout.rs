use serde::{Deserialize, Serialize};

/// Logical key id: the lowercase computer-keyboard character bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub char);

impl KeyId {
    pub fn from_char(c: char) -> Self {
        Self(c.to_ascii_lowercase())
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LayoutId {
    #[default]
    Full36,
    Natural21,
    Natural15,
}

impl LayoutId {
    pub const ALL: [LayoutId; 3] = [LayoutId::Full36, LayoutId::Natural21, LayoutId::Natural15];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutId::Full36 => "36",
            LayoutId::Natural21 => "21",
            LayoutId::Natural15 => "15",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    pub fn layout(self) -> &'static Layout {
        match self {
            LayoutId::Full36 => &FULL_36,
            LayoutId::Natural21 => &NATURAL_21,
            LayoutId::Natural15 => &NATURAL_15,
        }
    }
}

/// A fixed arrangement of keys: rows of `(pitch, key)` bindings, top row first,
/// plus the pitch range the layout can represent.
#[derive(Debug)]
pub struct Layout {
    pub id: LayoutId,
    pub min: u8,
    pub max: u8,
    pub rows: &'static [&'static [(u8, char)]],
}

static FULL_36: Layout = Layout {
    id: LayoutId::Full36,
    min: 48,
    max: 84,
    rows: &[
        &[
            (72, 'q'),
            (73, '2'),
            (74, 'w'),
            (75, '3'),
            (76, 'e'),
            (77, 'r'),
            (78, '5'),
            (79, 't'),
            (80, '6'),
            (81, 'y'),
            (82, '7'),
            (83, 'u'),
            (84, 'i'),
        ],
        &[
            (60, 'z'),
            (61, 's'),
            (62, 'x'),
            (63, 'd'),
            (64, 'c'),
            (65, 'v'),
            (66, 'g'),
            (67, 'b'),
            (68, 'h'),
            (69, 'n'),
            (70, 'j'),
            (71, 'm'),
        ],
        &[
            (48, ','),
            (49, 'l'),
            (50, '.'),
            (51, ';'),
            (52, '/'),
            (53, 'o'),
            (54, '0'),
            (55, 'p'),
            (56, '-'),
            (57, '['),
            (58, '='),
            (59, ']'),
        ],
    ],
};

static NATURAL_21: Layout = Layout {
    id: LayoutId::Natural21,
    min: 48,
    max: 84,
    rows: &[
        &[
            (72, 'q'),
            (74, 'w'),
            (76, 'e'),
            (77, 'r'),
            (79, 't'),
            (81, 'y'),
            (83, 'u'),
            (84, 'i'),
        ],
        &[
            (60, 'z'),
            (62, 'x'),
            (64, 'c'),
            (65, 'v'),
            (67, 'b'),
            (69, 'n'),
            (71, 'm'),
        ],
        &[
            (48, ','),
            (50, '.'),
            (52, '/'),
            (53, 'o'),
            (55, 'p'),
            (57, '['),
            (59, ']'),
        ],
    ],
};

static NATURAL_15: Layout = Layout {
    id: LayoutId::Natural15,
    min: 60,
    max: 84,
    rows: &[
        &[(60, 'y'), (62, 'u'), (64, 'i'), (65, 'o'), (67, 'p')],
        &[(69, 'h'), (71, 'j'), (72, 'k'), (74, 'l'), (76, ';')],
        &[(77, 'n'), (79, 'm'), (81, ','), (83, '.'), (84, '/')],
    ],
};

impl Layout {
    pub fn keys(&self) -> impl Iterator<Item = (u8, KeyId)> + '_ {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|&(pitch, c)| (pitch, KeyId(c))))
    }

    pub fn key_for_pitch(&self, pitch: u8) -> Option<KeyId> {
        self.keys().find(|&(p, _)| p == pitch).map(|(_, key)| key)
    }

    pub fn pitch_for_key(&self, key: KeyId) -> Option<u8> {
        self.keys().find(|&(_, k)| k == key).map(|(pitch, _)| pitch)
    }

    /// True when every semitone of `min..=max` has its own key.
    pub fn is_chromatic(&self) -> bool {
        (self.min..=self.max).all(|pitch| self.key_for_pitch(pitch).is_some())
    }
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

/// Semitone within the octave -> the natural degree at or below it.
const SNAP_TO_NATURAL: [u8; 12] = [0, 0, 2, 2, 4, 5, 5, 7, 7, 9, 9, 11];

/// Maps a pitch onto a key of `layout`.
///
/// Pitches outside the layout's range are folded by octaves until they fit. Layouts
/// without sharps snap a semitone to the natural key directly below it.
pub fn map_pitch_to_key(pitch: u8, layout: &Layout) -> Option<KeyId> {
    let min = i16::from(layout.min);
    let max = i16::from(layout.max);

    let mut folded = i16::from(pitch);
    while folded < min {
        folded += 12;
    }
    while folded > max {
        folded -= 12;
    }
    let folded = u8::try_from(folded).ok()?;

    if layout.is_chromatic() {
        return layout.key_for_pitch(folded);
    }

    let octave_base = folded / 12 * 12;
    let degree = SNAP_TO_NATURAL[usize::from(folded - octave_base)];
    layout.key_for_pitch(octave_base + degree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_layout_snaps_sharp_down() {
        let layout = LayoutId::Natural15.layout();
        assert_eq!(map_pitch_to_key(61, layout), Some(KeyId('y')));
        assert_eq!(layout.pitch_for_key(KeyId('y')), Some(60));
    }

    #[test]
    fn chromatic_layout_folds_high_pitch() {
        let layout = LayoutId::Full36.layout();
        // 90 -> 78
        assert_eq!(map_pitch_to_key(90, layout), Some(KeyId('5')));
        assert_eq!(layout.pitch_for_key(KeyId('5')), Some(78));
    }

    #[test]
    fn low_pitch_folds_up() {
        let layout = LayoutId::Natural15.layout();
        // 59 -> 71
        assert_eq!(map_pitch_to_key(59, layout), Some(KeyId('j')));
        // 0 -> 60
        assert_eq!(map_pitch_to_key(0, layout), Some(KeyId('y')));
    }

    #[test]
    fn every_pitch_maps_into_layout() {
        for id in LayoutId::ALL {
            let layout = id.layout();
            for pitch in 0..=127u8 {
                let key = map_pitch_to_key(pitch, layout)
                    .unwrap_or_else(|| panic!("pitch {pitch} unmapped in layout {}", id.as_str()));
                let target = layout.pitch_for_key(key).unwrap();
                assert!((layout.min..=layout.max).contains(&target));
            }
        }
    }

    #[test]
    fn chromatic_detection() {
        assert!(LayoutId::Full36.layout().is_chromatic());
        assert!(!LayoutId::Natural21.layout().is_chromatic());
        assert!(!LayoutId::Natural15.layout().is_chromatic());
    }

    #[test]
    fn range_of_exactly_one_octave_terminates() {
        static OCTAVE: Layout = Layout {
            id: LayoutId::Natural15,
            min: 60,
            max: 72,
            rows: &[&[
                (60, 'a'),
                (62, 's'),
                (64, 'd'),
                (65, 'f'),
                (67, 'g'),
                (69, 'h'),
                (71, 'j'),
                (72, 'k'),
            ]],
        };
        assert_eq!(map_pitch_to_key(127, &OCTAVE), Some(KeyId('g')));
        assert_eq!(map_pitch_to_key(73, &OCTAVE), Some(KeyId('a')));
    }

    #[test]
    fn layout_names_round_trip() {
        for id in LayoutId::ALL {
            assert_eq!(LayoutId::from_name(id.as_str()), Some(id));
        }
        assert_eq!(LayoutId::from_name("88"), None);
    }
}
