use serde::{Deserialize, Serialize};

/// Label set printed on natural keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Numbers,
    Thai,
    Solfege,
    NoteNames,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Numbers,
        Language::Thai,
        Language::Solfege,
        Language::NoteNames,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Numbers => "Numbers",
            Language::Thai => "ไทย",
            Language::Solfege => "Do Re Mi",
            Language::NoteNames => "C D E",
        }
    }
}

struct Degree {
    number: &'static str,
    thai: &'static str,
    solfege: &'static str,
    note: &'static str,
}

const DEGREES: [Option<Degree>; 12] = [
    Some(Degree {
        number: "1",
        thai: "โด",
        solfege: "Do",
        note: "C",
    }),
    None,
    Some(Degree {
        number: "2",
        thai: "เร",
        solfege: "Re",
        note: "D",
    }),
    None,
    Some(Degree {
        number: "3",
        thai: "มี",
        solfege: "Mi",
        note: "E",
    }),
    Some(Degree {
        number: "4",
        thai: "ฟา",
        solfege: "Fa",
        note: "F",
    }),
    None,
    Some(Degree {
        number: "5",
        thai: "ซอล",
        solfege: "Sol",
        note: "G",
    }),
    None,
    Some(Degree {
        number: "6",
        thai: "ลา",
        solfege: "La",
        note: "A",
    }),
    None,
    Some(Degree {
        number: "7",
        thai: "ที",
        solfege: "Ti",
        note: "B",
    }),
];

/// Octave marker drawn around the degree number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctaveMark {
    Below,
    Plain,
    Above,
    DoubleAbove,
}

impl OctaveMark {
    pub fn for_pitch(pitch: u8) -> Self {
        match pitch {
            0..60 => OctaveMark::Below,
            60..72 => OctaveMark::Plain,
            72..84 => OctaveMark::Above,
            84 => OctaveMark::DoubleAbove,
            _ => OctaveMark::Plain,
        }
    }
}

/// Label for a natural key, `None` for sharps.
pub fn key_label(pitch: u8, language: Language) -> Option<&'static str> {
    let degree = DEGREES[usize::from(pitch % 12)].as_ref()?;
    Some(match language {
        Language::Numbers => degree.number,
        Language::Thai => degree.thai,
        Language::Solfege => degree.solfege,
        Language::NoteNames => degree.note,
    })
}

/// Degree number stacked with its octave dots, one line per row.
pub fn degree_number(pitch: u8) -> Option<String> {
    let degree = DEGREES[usize::from(pitch % 12)].as_ref()?;
    Some(match OctaveMark::for_pitch(pitch) {
        OctaveMark::Below => format!("{}\n•", degree.number),
        OctaveMark::Plain => degree.number.to_string(),
        OctaveMark::Above => format!("•\n{}", degree.number),
        OctaveMark::DoubleAbove => format!("••\n{}", degree.number),
    })
}
