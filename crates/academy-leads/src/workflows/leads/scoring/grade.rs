use serde::{Deserialize, Serialize};
use std::fmt;

/// Letter grade derived from a clamped lead score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeadGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LeadGrade {
    pub const fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::A,
            60..=79 => Self::B,
            40..=59 => Self::C,
            20..=39 => Self::D,
            _ => Self::F,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Follow-up guidance for admissions staff, softening as the grade drops.
    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::A => "Hot lead: contact immediately and offer an enrollment call",
            Self::B => "Warm lead: follow up within 24 hours with course details",
            Self::C => "Interested lead: send course information and schedule a follow-up",
            Self::D => "Cool lead: add to the nurture sequence",
            Self::F => "Low intent: keep in the general newsletter only",
        }
    }
}

impl fmt::Display for LeadGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn recommendation(grade: LeadGrade) -> &'static str {
    grade.recommendation()
}
