//! The query descriptor and its boundary with the structured parser.
//!
//! The parser speaks a permissive, sentinel-laden shape (`RawQuery`). Exactly
//! one conversion turns it into a `QueryDescriptor`, where "unset",
//! "unconstrained" and "ambiguous" are distinct variants instead of strings.
//! The descriptor serializes back into the parser shape so a conversation
//! snapshot round-trips through JSON.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{MAX_GAME, MAX_SESSION_EXCLUSIVE, MISSING, MULTI, RETURN_COLUMNS};
use crate::dates::{IsoDate, apply_open_ended_dates, parse_date};
use crate::error::{QueryError, Result};
use crate::metric::Metric;
use crate::signals;

pub(crate) static SESSION_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsessions?[_\s]*(\d+)\b").unwrap());
static GAME_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^game\s*(\d+)$").unwrap());

/// A field that is either set or intentionally left unset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot<T> {
    #[default]
    Missing,
    Set(T),
}

impl<T> Slot<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Slot::Missing)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Slot::Missing => None,
            Slot::Set(v) => Some(v),
        }
    }
}

impl<T: Copy> Slot<T> {
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

/// `game<n>` with n in `0..=MAX_GAME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameId(u32);

impl GameId {
    pub fn new(n: u32) -> Option<Self> {
        (n <= MAX_GAME).then_some(Self(n))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// Accepts `game0` and `game 0`, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = GAME_NAME.captures(s.trim())?;
        Self::new(caps[1].parse().ok()?)
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game{}", self.0)
    }
}

impl Serialize for GameId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GameId::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("not a game id: {s}")))
    }
}

/// `session_<n>`, ordered by its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// Finds the first `session_2` / `session 2` / `Session2` reference in `s`.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = SESSION_REF.captures(s)?;
        caps[1].parse().ok().map(Self)
    }

    /// Inside the recorded range, `1 <= n < 20000`.
    pub fn is_allowed(self) -> bool {
        (1..MAX_SESSION_EXCLUSIVE).contains(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SessionId::parse(&s)
            .filter(|id| id.is_allowed())
            .ok_or_else(|| serde::de::Error::custom(format!("not an allowed session id: {s}")))
    }
}

/// Session constraint of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionSel {
    #[default]
    Unconstrained,
    /// More than one session referenced; must error or branch.
    Ambiguous,
    One(SessionId),
}

impl SessionSel {
    pub fn id(self) -> Option<SessionId> {
        match self {
            SessionSel::One(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_set(self) -> bool {
        !matches!(self, SessionSel::Unconstrained)
    }
}

/// Inclusive session span, e.g. session_1 through session_7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRange {
    pub start: SessionId,
    pub end: SessionId,
}

/// One data request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    pub patient: Slot<String>,
    pub metric: Slot<Metric>,
    pub date_start: Slot<IsoDate>,
    pub date_end: Slot<IsoDate>,
    pub game: Option<GameId>,
    pub session: SessionSel,
}

impl QueryDescriptor {
    pub fn return_columns(&self) -> &'static [&'static str] {
        &RETURN_COLUMNS
    }

    /// Same query pinned to one session with date filters dropped.
    pub fn for_session(&self, session: SessionId) -> Self {
        Self {
            date_start: Slot::Missing,
            date_end: Slot::Missing,
            session: SessionSel::One(session),
            ..self.clone()
        }
    }
}

/// Session field as emitted by a parser: a string, a list, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSession {
    One(String),
    Many(Vec<String>),
}

/// Permissive parser output. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, alias = "patient_id")]
    pub patient: Option<serde_json::Value>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub session: Option<RawSession>,
    #[serde(default)]
    pub return_columns: Option<Vec<String>>,
}

fn unset(value: Option<&str>) -> Option<&str> {
    match value.map(str::trim) {
        None | Some("") | Some(MISSING) => None,
        Some(v) => Some(v),
    }
}

fn sentinel_or<T: ToString>(value: Option<T>) -> Option<String> {
    Some(value.map_or_else(|| MISSING.to_string(), |v| v.to_string()))
}

impl From<&QueryDescriptor> for RawQuery {
    fn from(qd: &QueryDescriptor) -> Self {
        RawQuery {
            action: None,
            patient: Some(serde_json::Value::String(
                qd.patient.value().cloned().unwrap_or_else(|| MISSING.to_string()),
            )),
            metric: sentinel_or(qd.metric.get()),
            date_start: sentinel_or(qd.date_start.get()),
            date_end: sentinel_or(qd.date_end.get()),
            game: qd.game.map(|g| g.to_string()),
            session: match qd.session {
                SessionSel::Unconstrained => None,
                SessionSel::Ambiguous => Some(RawSession::One(MULTI.to_string())),
                SessionSel::One(id) => Some(RawSession::One(id.to_string())),
            },
            return_columns: Some(RETURN_COLUMNS.iter().map(|c| c.to_string()).collect()),
        }
    }
}

fn convert_patient(value: Option<serde_json::Value>) -> Result<Slot<String>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Slot::Missing),
        Some(serde_json::Value::String(s)) => Ok(match unset(Some(&s)) {
            None => Slot::Missing,
            Some(v) => Slot::Set(v.to_string()),
        }),
        Some(serde_json::Value::Number(n)) => Ok(Slot::Set(n.to_string())),
        Some(other) => Err(QueryError::MalformedParserOutput(format!(
            "patient must be a string, got {other}"
        ))),
    }
}

fn convert_date(value: Option<&str>) -> Result<Slot<IsoDate>> {
    match unset(value) {
        None => Ok(Slot::Missing),
        Some(v) => parse_date(v)
            .map(Slot::Set)
            .ok_or_else(|| QueryError::InvalidDate(v.to_string())),
    }
}

fn convert_session(value: Option<RawSession>) -> Result<SessionSel> {
    let text = match value {
        None => return Ok(SessionSel::Unconstrained),
        Some(RawSession::Many(list)) => match list.len() {
            0 => return Ok(SessionSel::Unconstrained),
            1 => list.into_iter().next().unwrap_or_default(),
            _ => return Ok(SessionSel::Ambiguous),
        },
        Some(RawSession::One(s)) => s,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(SessionSel::Unconstrained);
    }
    if trimmed == MULTI || SESSION_REF.find_iter(trimmed).count() >= 2 {
        return Ok(SessionSel::Ambiguous);
    }
    if let Some(id) = SessionId::parse(trimmed) {
        return if id.is_allowed() {
            Ok(SessionSel::One(id))
        } else {
            Err(QueryError::DisallowedSession(trimmed.to_string()))
        };
    }
    // Relative placeholders are resolved later from the text cue.
    match trimmed.to_uppercase().as_str() {
        "__NEXT__" | "__PREVIOUS__" | "__FIRST__" | "__LATEST__" => Ok(SessionSel::Unconstrained),
        _ => Err(QueryError::DisallowedSession(trimmed.to_string())),
    }
}

impl TryFrom<RawQuery> for QueryDescriptor {
    type Error = QueryError;

    fn try_from(raw: RawQuery) -> Result<Self> {
        let metric = match unset(raw.metric.as_deref()) {
            None => Slot::Missing,
            Some(m) => Slot::Set(
                Metric::from_name_or_alias(m)
                    .ok_or_else(|| QueryError::DisallowedMetric(m.to_string()))?,
            ),
        };

        let game = match raw.game.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(MULTI) => return Err(QueryError::MultipleGamesRequested),
            Some(g) => Some(GameId::parse(g).ok_or_else(|| QueryError::DisallowedGame(g.to_string()))?),
        };

        let qd = QueryDescriptor {
            patient: convert_patient(raw.patient)?,
            metric,
            date_start: convert_date(raw.date_start.as_deref())?,
            date_end: convert_date(raw.date_end.as_deref())?,
            game,
            session: convert_session(raw.session)?,
        };

        if let (Some(start), Some(end)) = (qd.date_start.get(), qd.date_end.get())
            && start > end
        {
            return Err(QueryError::DateOrder {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(qd)
    }
}

impl RawQuery {
    /// Apply the deterministic text overrides, then convert.
    ///
    /// The question text always wins over the parser for patient, metric
    /// aliases, relative session cues and date literals.
    pub fn normalize(mut self, question: &str, today: IsoDate) -> Result<QueryDescriptor> {
        if let Some(patient) = signals::extract_patient(question) {
            self.patient = Some(serde_json::Value::String(patient));
        }

        let metric_unset = unset(self.metric.as_deref()).is_none();
        if metric_unset && signals::is_duration_question(question) {
            self.metric = Some(Metric::Timestampms.column().to_string());
        } else if !metric_unset
            && self.metric.as_deref().and_then(Metric::from_column).is_none()
            && let Some(explicit) = signals::extract_metric(question)
        {
            self.metric = Some(explicit.column().to_string());
        }

        if signals::relative_cue(question).is_some() {
            self.session = None;
        }

        if let Some((start, end)) = apply_open_ended_dates(question, today)? {
            self.date_start = Some(start.to_string());
            self.date_end = Some(end.to_string());
        }

        QueryDescriptor::try_from(self)
    }
}

impl Serialize for QueryDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawQuery::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawQuery::deserialize(deserializer)?;
        QueryDescriptor::try_from(raw).map_err(serde::de::Error::custom)
    }
}
