//! The metric allow-list and everything keyed by it.
//!
//! A `Metric` can only be built from a canonical column name or an
//! allow-listed alias, so a raw alias never travels past this module.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ALIAS_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_-]+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AverageSparc,
    AvgEfficiency,
    AvgFPatient,
    Area,
    Timestampms,
}

/// Phrase → metric. Keys are already in normalized form.
const ALIASES: &[(&str, Metric)] = &[
    ("sparc", Metric::AverageSparc),
    ("smoothness", Metric::AverageSparc),
    ("efficiency", Metric::AvgEfficiency),
    ("efficient", Metric::AvgEfficiency),
    ("force", Metric::AvgFPatient),
    ("strength", Metric::AvgFPatient),
    ("f patient", Metric::AvgFPatient),
    ("range of motion", Metric::Area),
    ("rangeofmotion", Metric::Area),
    ("rom", Metric::Area),
    ("session duration", Metric::Timestampms),
    ("duration", Metric::Timestampms),
    ("how long", Metric::Timestampms),
];

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::AverageSparc,
        Metric::AvgEfficiency,
        Metric::AvgFPatient,
        Metric::Area,
        Metric::Timestampms,
    ];

    /// Canonical dataset column name.
    pub fn column(self) -> &'static str {
        match self {
            Metric::AverageSparc => "average_sparc",
            Metric::AvgEfficiency => "avg_efficiency",
            Metric::AvgFPatient => "avg_f_patient",
            Metric::Area => "area",
            Metric::Timestampms => "timestampms",
        }
    }

    pub fn from_column(name: &str) -> Option<Metric> {
        let lowered = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|m| m.column() == lowered)
    }

    /// Canonical name or allow-listed alias.
    pub fn from_name_or_alias(name: &str) -> Option<Metric> {
        Self::from_column(name).or_else(|| {
            let norm = normalize_alias_text(name);
            ALIASES
                .iter()
                .find(|(phrase, _)| *phrase == norm)
                .map(|(_, m)| *m)
        })
    }

    pub(crate) fn aliases() -> &'static [(&'static str, Metric)] {
        ALIASES
    }

    /// +1 when higher values mean improvement, -1 when lower is better.
    ///
    /// Every known metric is currently treated as higher-is-better.
    pub fn improvement_direction(self) -> f64 {
        match self {
            Metric::AverageSparc | Metric::AvgEfficiency | Metric::AvgFPatient | Metric::Area => {
                1.0
            }
            Metric::Timestampms => 1.0,
        }
    }

    /// Short phrase describing what a change means physiologically.
    pub fn interpretation(self, change: f64) -> &'static str {
        let (up, down, flat) = match self {
            Metric::AverageSparc => (
                "smoother, more continuous, better-coordinated movement",
                "less smooth, jerkier, more interrupted movement",
                "similar movement smoothness over this period",
            ),
            Metric::AvgFPatient => (
                "increased strength output",
                "reduced strength output",
                "similar strength over this period",
            ),
            Metric::AvgEfficiency => (
                "improved hand-eye coordination accuracy",
                "reduced hand-eye coordination accuracy",
                "similar hand-eye coordination over this period",
            ),
            Metric::Area => (
                "increased range of motion",
                "reduced range of motion",
                "similar range of motion over this period",
            ),
            Metric::Timestampms => (
                "longer session duration",
                "shorter session duration",
                "similar session duration over this period",
            ),
        };
        if change > 0.0 {
            up
        } else if change < 0.0 {
            down
        } else {
            flat
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Metric::AverageSparc => "smoothness (SPARC)",
            Metric::AvgEfficiency => "efficiency",
            Metric::AvgFPatient => "total force",
            Metric::Area => "range of motion (area)",
            Metric::Timestampms => "session duration",
        }
    }

    /// Lower-case label used inside sentences.
    pub fn label(self) -> &'static str {
        match self {
            Metric::AverageSparc => "movement smoothness",
            Metric::AvgEfficiency => "movement efficiency",
            Metric::AvgFPatient => "applied force",
            Metric::Area => "range of motion",
            Metric::Timestampms => "session duration",
        }
    }

    pub fn explanation(self) -> &'static str {
        match self {
            Metric::AverageSparc => {
                "SPARC measures movement smoothness. Values closer to 0 usually indicate smoother, \
                 more coordinated movement. More negative values suggest jerkier movement."
            }
            Metric::Area => {
                "Area is used here as a proxy for range of motion during the task. Higher values \
                 generally suggest a larger range of motion."
            }
            Metric::AvgEfficiency => {
                "Efficiency reflects how effectively the patient completes the movement. Higher \
                 values generally suggest more efficient, accurate movement."
            }
            Metric::AvgFPatient => {
                "Patient-applied force reflects how much force the patient is applying during the \
                 task. Higher values generally suggest greater force output."
            }
            Metric::Timestampms => {
                "Session duration is the elapsed time of the session in milliseconds. Longer or \
                 shorter sessions should be read alongside the other metrics."
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Lower-case, `_`/`-` to spaces, collapse whitespace.
pub fn normalize_alias_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let spaced = ALIAS_SPLIT.replace_all(&lowered, " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}
