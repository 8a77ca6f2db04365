//! Deterministic text signals over the raw question.
//!
//! Each function answers one question about what the user explicitly said.
//! None of them guess: an answer is either backed by a regex hit or an
//! allow-list entry, or it is absent.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::RESET_COMMANDS;
use crate::dates::extract_date_literals;
use crate::descriptor::{GameId, SESSION_REF, SessionId};
use crate::metric::{Metric, normalize_alias_text};

static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:_[MFmf])?\b").unwrap());
static GAME_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bgame\s*(\d+)\b").unwrap());
static SNAKE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+_[a-zA-Z0-9_]+\b").unwrap());
static SESSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^session_\d+$").unwrap());
static CANONICAL_TOKENS: LazyLock<Vec<(Regex, Metric)>> = LazyLock::new(|| {
    Metric::ALL
        .iter()
        .map(|m| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(m.column()))).unwrap();
            (re, *m)
        })
        .collect()
});
/// Single-word aliases need word boundaries; phrases match as substrings.
static ALIAS_MATCHERS: LazyLock<Vec<(&'static str, Option<Regex>, Metric)>> =
    LazyLock::new(|| {
        Metric::aliases()
            .iter()
            .map(|(phrase, m)| {
                let re = (!phrase.contains(' '))
                    .then(|| Regex::new(&format!(r"\b{}\b", regex::escape(phrase))).unwrap());
                (*phrase, re, *m)
            })
            .collect()
    });

fn alias_position(norm: &str, phrase: &str, re: Option<&Regex>) -> Option<usize> {
    match re {
        Some(re) => re.find(norm).map(|hit| hit.start()),
        None => norm.find(phrase),
    }
}

/// Relative reference to a session in the dataset's own ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeCue {
    First,
    Latest,
    Previous,
    Next,
}

const CUE_PHRASES: [(RelativeCue, &[&str]); 4] = [
    (RelativeCue::First, &["first session", "earliest session"]),
    (
        RelativeCue::Latest,
        &["latest session", "last session", "most recent session"],
    ),
    (
        RelativeCue::Previous,
        &["previous session", "prior session", "session before"],
    ),
    (
        RelativeCue::Next,
        &["next session", "following session", "session after"],
    ),
];

pub fn relative_cue(text: &str) -> Option<RelativeCue> {
    let lowered = text.to_lowercase();
    CUE_PHRASES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(cue, _)| *cue)
}

fn spans(re: &Regex, text: &str) -> Vec<(usize, usize)> {
    re.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

/// A lone patient identifier (`46`, `45_M`) in the text.
///
/// Digits inside a date literal or a game/session reference are not
/// candidates. More than one remaining candidate means no answer.
pub fn extract_patient(text: &str) -> Option<String> {
    let mut claimed: Vec<(usize, usize)> = extract_date_literals(text)
        .into_iter()
        .map(|lit| (lit.start, lit.end))
        .collect();
    claimed.extend(spans(&GAME_REF, text));
    claimed.extend(spans(&SESSION_REF, text));

    let candidates: Vec<&str> = NUMERIC_TOKEN
        .find_iter(text)
        .filter(|m| {
            !claimed
                .iter()
                .any(|(start, end)| m.start() < *end && *start < m.end())
        })
        .map(|m| m.as_str())
        .collect();

    match candidates.as_slice() {
        [only] => Some(only.to_string()),
        _ => None,
    }
}

pub fn mentions_patient(text: &str) -> bool {
    extract_patient(text).is_some()
}

/// Every `game <n>` number in order, allow-listed or not.
pub fn game_numbers(text: &str) -> Vec<u32> {
    GAME_REF
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Game references in order. Out-of-range numbers are skipped.
pub fn extract_games(text: &str) -> Vec<GameId> {
    game_numbers(text).into_iter().filter_map(GameId::new).collect()
}

pub fn mentions_game(text: &str) -> bool {
    GAME_REF.is_match(text)
}

/// Absolute session references, in order of appearance.
pub fn extract_sessions(text: &str) -> Vec<SessionId> {
    SESSION_REF
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok().map(SessionId::new))
        .collect()
}

/// An absolute session reference or a relative session cue.
pub fn mentions_session(text: &str) -> bool {
    SESSION_REF.is_match(text) || relative_cue(text).is_some()
}

pub fn mentions_dates(text: &str) -> bool {
    !extract_date_literals(text).is_empty()
}

/// First metric named in the text: exact column tokens win over aliases.
pub fn extract_metric(text: &str) -> Option<Metric> {
    let lowered = text.to_lowercase();
    if let Some((_, m)) = CANONICAL_TOKENS.iter().find(|(re, _)| re.is_match(&lowered)) {
        return Some(*m);
    }
    let norm = normalize_alias_text(text);
    ALIAS_MATCHERS
        .iter()
        .find(|(phrase, re, _)| alias_position(&norm, phrase, re.as_ref()).is_some())
        .map(|(_, _, m)| *m)
}

/// Every distinct metric the text names, ordered by first appearance.
pub fn metrics_mentioned(text: &str) -> Vec<Metric> {
    let lowered = text.to_lowercase();
    let norm = normalize_alias_text(text);

    let mut hits: Vec<(usize, Metric)> = CANONICAL_TOKENS
        .iter()
        .filter_map(|(re, m)| re.find(&lowered).map(|hit| (hit.start(), *m)))
        .collect();
    hits.extend(ALIAS_MATCHERS.iter().filter_map(|(phrase, re, m)| {
        alias_position(&norm, phrase, re.as_ref()).map(|pos| (pos, *m))
    }));
    hits.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|(_, m)| seen.insert(*m))
        .map(|(_, m)| m)
        .collect()
}

/// A snake_case token that looks like a column name but is not allow-listed.
pub fn find_disallowed_metric_token(text: &str) -> Option<String> {
    SNAKE_TOKEN
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|tok| {
            let lowered = tok.to_lowercase();
            !SESSION_TOKEN.is_match(&lowered) && Metric::from_column(&lowered).is_none()
        })
        .map(str::to_string)
}

pub fn is_reset(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    RESET_COMMANDS.contains(&lowered.as_str())
}

pub fn is_comparison(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["compare", "differ", "difference"]
        .iter()
        .any(|w| lowered.contains(w))
}

pub fn is_session_range_question(text: &str) -> bool {
    let lowered = text.to_lowercase();
    (lowered.contains("from session") && lowered.contains("to session"))
        || (lowered.contains("between session") && lowered.contains("and session"))
}

pub fn is_definition_question(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.starts_with("what is ")
        || lowered.starts_with("what's ")
        || ["what does", "mean?", "meaning of", "define", "explain"]
            .iter()
            .any(|w| lowered.contains(w))
}

pub fn is_duration_question(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["how long", "session duration", "duration"]
        .iter()
        .any(|w| lowered.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_ignores_dates_games_sessions() {
        assert_eq!(
            extract_patient("area for patient 46 in game0 session 4 on 10/3/22"),
            Some("46".to_string())
        );
        assert_eq!(extract_patient("patient 45_M in game 2"), Some("45_M".to_string()));
    }

    #[test]
    fn test_patient_requires_exactly_one_candidate() {
        assert_eq!(extract_patient("what about force?"), None);
        assert_eq!(extract_patient("compare 46 and 47"), None);
    }

    #[test]
    fn test_relative_cues() {
        assert_eq!(relative_cue("compare with the previous session"), Some(RelativeCue::Previous));
        assert_eq!(relative_cue("and the session after?"), Some(RelativeCue::Next));
        assert_eq!(relative_cue("show the most recent session"), Some(RelativeCue::Latest));
        assert_eq!(relative_cue("the earliest session please"), Some(RelativeCue::First));
        assert_eq!(relative_cue("session 4"), None);
    }

    #[test]
    fn test_session_and_game_extraction() {
        let sessions = extract_sessions("between sessions 18 and session_21");
        assert_eq!(sessions, vec![SessionId::new(18), SessionId::new(21)]);
        assert_eq!(extract_games("game0 vs Game 3"), vec![GameId::new(0).unwrap(), GameId::new(3).unwrap()]);
        assert!(mentions_session("what about the next session"));
        assert!(!mentions_session("what about force"));
    }

    #[test]
    fn test_metric_extraction() {
        assert_eq!(extract_metric("what about force?"), Some(Metric::AvgFPatient));
        assert_eq!(extract_metric("show avg_efficiency"), Some(Metric::AvgEfficiency));
        assert_eq!(extract_metric("Range-of-motion trend"), Some(Metric::Area));
        assert_eq!(extract_metric("what was the session duration"), Some(Metric::Timestampms));
        assert_eq!(extract_metric("from session 1"), None);
    }

    #[test]
    fn test_metrics_mentioned_in_order() {
        assert_eq!(
            metrics_mentioned("compare force and sparc between sessions 18 and 21"),
            vec![Metric::AvgFPatient, Metric::AverageSparc]
        );
        assert_eq!(metrics_mentioned("smoothness and sparc"), vec![Metric::AverageSparc]);
    }

    #[test]
    fn test_disallowed_token() {
        assert_eq!(
            find_disallowed_metric_token("show avg_path_ratio for 46"),
            Some("avg_path_ratio".to_string())
        );
        assert_eq!(find_disallowed_metric_token("show area for session_4 in game0"), None);
        assert_eq!(find_disallowed_metric_token("avg_f_patient please"), None);
    }

    #[test]
    fn test_intents() {
        assert!(is_reset("  Clear Context "));
        assert!(!is_reset("clear the data for patient 4"));
        assert!(is_comparison("how does it differ from session 2"));
        assert!(is_session_range_question("sparc from session 1 to session 7"));
        assert!(is_definition_question("what is sparc"));
        assert!(mentions_dates("since 7th November 2022"));
    }
}
