//! Question → `RawQuery` without a remote model.

use crate::constants::{MISSING, MULTI, RETURN_COLUMNS};
use crate::dates::{extract_date_literals, parse_date};
use crate::descriptor::{RawQuery, RawSession};
use crate::error::Result;
use crate::signals;

/// Anything that turns a question into the permissive parser shape.
pub trait QueryParser {
    fn parse(&self, question: &str) -> Result<RawQuery>;
}

/// Regex and allow-list parser. Never guesses a value the text does not
/// state; open-ended date phrases are left to `RawQuery::normalize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicParser;

impl QueryParser for DeterministicParser {
    fn parse(&self, question: &str) -> Result<RawQuery> {
        let game = match signals::game_numbers(question).as_slice() {
            [] => None,
            [n] => Some(format!("game{n}")),
            _ => Some(MULTI.to_string()),
        };

        let session = if signals::relative_cue(question).is_some() {
            None
        } else {
            match signals::extract_sessions(question).as_slice() {
                [] => None,
                [id] => Some(RawSession::One(id.to_string())),
                _ => Some(RawSession::One(MULTI.to_string())),
            }
        };

        // A lone date with no open-ended cue is a single-day window.
        let literals = extract_date_literals(question);
        let (date_start, date_end) = match literals.as_slice() {
            [only] => match parse_date(&only.text) {
                Some(d) => (d.to_string(), d.to_string()),
                None => (only.text.clone(), only.text.clone()),
            },
            _ => (MISSING.to_string(), MISSING.to_string()),
        };

        Ok(RawQuery {
            action: Some("get_metric_timeseries".to_string()),
            patient: signals::extract_patient(question).map(serde_json::Value::String),
            metric: Some(
                signals::extract_metric(question)
                    .map_or(MISSING, |m| m.column())
                    .to_string(),
            ),
            date_start: Some(date_start),
            date_end: Some(date_end),
            game,
            session,
            return_columns: Some(RETURN_COLUMNS.iter().map(|c| c.to_string()).collect()),
        })
    }
}
