use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::descriptor::SessionId;

/// Coarse failure classes. Callers branch on these; nothing here is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required query field is unset for the requested mode.
    Precondition,
    /// Filtering produced nothing usable.
    NoData,
    /// A reference could not be pinned to exactly one thing.
    Ambiguity,
    /// The structured parser produced something outside the allow-lists.
    Contract,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    MissingInfo(Vec<&'static str>),
    GameRequiredForSession,
    GameRequiredForDateRange,
    GameRequiredForSessionRange,
    RangeFieldRequired(&'static str),
    CompareFieldRequired(&'static str),
    MetricColumnNotFound(String),
    NoMatchingRows,
    NoValidValues,
    SessionWithoutValues,
    MultipleGamesMatched(Vec<String>),

    NoBaseSession,
    NoBasePatient,
    NoBaseGame,
    NoBaseMetric,
    UnparseableSession(String),
    NoComparableSessions,
    NoPreviousSession,
    NoNextSession,
    AmbiguousSession,
    MultipleGamesRequested,
    MultipleMetricsInComparison(Vec<String>),
    CompareSessionNotGiven,
    InvalidSessionRange,
    FetchFailed {
        session: SessionId,
        source: Box<QueryError>,
    },

    DisallowedMetric(String),
    DisallowedGame(String),
    DisallowedSession(String),
    InvalidDate(String),
    DateOrder { start: String, end: String },
    MalformedParserOutput(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::MissingInfo(_)
            | QueryError::GameRequiredForSession
            | QueryError::GameRequiredForDateRange
            | QueryError::GameRequiredForSessionRange
            | QueryError::RangeFieldRequired(_)
            | QueryError::CompareFieldRequired(_)
            | QueryError::MetricColumnNotFound(_)
            | QueryError::NoBaseSession
            | QueryError::NoBasePatient
            | QueryError::NoBaseGame
            | QueryError::NoBaseMetric => ErrorKind::Precondition,

            QueryError::NoMatchingRows
            | QueryError::NoValidValues
            | QueryError::SessionWithoutValues
            | QueryError::NoComparableSessions => ErrorKind::NoData,

            QueryError::MultipleGamesMatched(_)
            | QueryError::UnparseableSession(_)
            | QueryError::NoPreviousSession
            | QueryError::NoNextSession
            | QueryError::AmbiguousSession
            | QueryError::MultipleGamesRequested
            | QueryError::MultipleMetricsInComparison(_)
            | QueryError::CompareSessionNotGiven
            | QueryError::InvalidSessionRange => ErrorKind::Ambiguity,

            QueryError::FetchFailed { source, .. } => source.kind(),

            QueryError::DisallowedMetric(_)
            | QueryError::DisallowedGame(_)
            | QueryError::DisallowedSession(_)
            | QueryError::InvalidDate(_)
            | QueryError::DateOrder { .. }
            | QueryError::MalformedParserOutput(_) => ErrorKind::Contract,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::MissingInfo(fields) => {
                write!(f, "Missing required info: {}", fields.join(", "))
            }
            QueryError::GameRequiredForSession => write!(
                f,
                "For session-based queries, please specify a game (e.g., 'game0') because the same session can exist in multiple games."
            ),
            QueryError::GameRequiredForDateRange => write!(
                f,
                "Please specify a game (e.g., 'game0') for date-range queries to avoid mixing data across games."
            ),
            QueryError::GameRequiredForSessionRange => write!(
                f,
                "Please specify a game (e.g., 'game0') for session-range queries."
            ),
            QueryError::RangeFieldRequired(field) => {
                write!(f, "Please specify a {field} for this session range.")
            }
            QueryError::CompareFieldRequired(field) => {
                write!(f, "Please specify a {field} to compare.")
            }
            QueryError::MetricColumnNotFound(metric) => {
                write!(f, "Metric column '{metric}' not found in the dataset.")
            }
            QueryError::NoMatchingRows => {
                write!(f, "No matching rows found in the dataset for that query.")
            }
            QueryError::NoValidValues => write!(
                f,
                "No valid numeric values (missing/inf/invalid) found for this metric."
            ),
            QueryError::SessionWithoutValues => {
                write!(f, "One of the sessions has no numeric metric values.")
            }
            QueryError::MultipleGamesMatched(games) => write!(
                f,
                "Multiple games matched this session ({}). Please specify a game.",
                games.join(", ")
            ),
            QueryError::NoBaseSession => write!(f, "No base session in context to compare from."),
            QueryError::NoBasePatient => write!(f, "No patient in context to compare."),
            QueryError::NoBaseGame => write!(f, "No game in context to compare."),
            QueryError::NoBaseMetric => write!(f, "No metric in context to compare."),
            QueryError::UnparseableSession(s) => {
                write!(f, "Could not parse session number from '{s}'.")
            }
            QueryError::NoComparableSessions => {
                write!(f, "No comparable sessions found for that patient/game.")
            }
            QueryError::NoPreviousSession => {
                write!(f, "No previous session found before the current session.")
            }
            QueryError::NoNextSession => {
                write!(f, "No next session found after the current session.")
            }
            QueryError::AmbiguousSession => write!(
                f,
                "More than one session was mentioned. Ask about one session, compare two sessions, or use 'from session X to session Y'."
            ),
            QueryError::MultipleGamesRequested => write!(
                f,
                "Multiple games mentioned. Please specify only one game for now."
            ),
            QueryError::MultipleMetricsInComparison(metrics) => write!(
                f,
                "Multiple metrics were requested in one session comparison ({}). Please compare one metric at a time.",
                metrics.join(", ")
            ),
            QueryError::CompareSessionNotGiven => write!(
                f,
                "Please mention the session number to compare (e.g. 'session 1')."
            ),
            QueryError::InvalidSessionRange => write!(
                f,
                "Could not parse session range. Use 'session 1 to session 7'."
            ),
            QueryError::FetchFailed { session, source } => {
                write!(f, "Could not fetch {session}: {source}")
            }
            QueryError::DisallowedMetric(m) => write!(f, "Metric '{m}' not allowed."),
            QueryError::DisallowedGame(g) => write!(
                f,
                "Game '{g}' not allowed. Must be one of game0..game10."
            ),
            QueryError::DisallowedSession(s) => write!(
                f,
                "Session '{s}' not allowed. Must match 'session_<number>'."
            ),
            QueryError::InvalidDate(d) => write!(f, "Could not parse date '{d}'."),
            QueryError::DateOrder { start, end } => write!(
                f,
                "Start date {start} is after end date {end}. Check D/M/Y vs M/D/Y."
            ),
            QueryError::MalformedParserOutput(msg) => {
                write!(f, "Parser output failed strict validation: {msg}")
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// `{"kind": ..., "message": ...}`, for transports that echo errors as data.
impl Serialize for QueryError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("QueryError", 2)?;
        s.serialize_field("kind", &self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_info_lists_fields() {
        let e = QueryError::MissingInfo(vec!["patient", "metric"]);
        assert_eq!(e.to_string(), "Missing required info: patient, metric");
        assert_eq!(e.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_fetch_failed_inherits_kind() {
        let e = QueryError::FetchFailed {
            session: SessionId::new(3),
            source: Box::new(QueryError::NoMatchingRows),
        };
        assert_eq!(e.kind(), ErrorKind::NoData);
        assert!(e.to_string().starts_with("Could not fetch session_3: "));
    }

    #[test]
    fn test_serializes_kind_and_message() {
        let value = serde_json::to_value(QueryError::NoNextSession).unwrap();
        assert_eq!(value["kind"], "ambiguity");
        assert_eq!(value["message"], "No next session found after the current session.");
    }
}
