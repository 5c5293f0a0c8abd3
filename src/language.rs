//! Script-range language heuristic.
//!
//! Counts Arabic-block characters against ASCII letters and picks the larger.
//! Ties (including text with neither) fall back to English. This is a coarse
//! switch for choosing the response language, not language identification.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    /// BCP 47 primary tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub primary: Language,
}

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

pub fn detect(text: &str) -> Detection {
    let (arabic, latin) = text.chars().fold((0usize, 0usize), |(ar, la), c| {
        if is_arabic(c) {
            (ar + 1, la)
        } else if c.is_ascii_alphabetic() {
            (ar, la + 1)
        } else {
            (ar, la)
        }
    });

    let primary = if arabic > latin {
        Language::Ar
    } else {
        Language::En
    };
    Detection { primary }
}
