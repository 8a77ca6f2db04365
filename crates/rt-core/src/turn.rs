//! One conversational turn, from raw question to structured outcome.
//!
//! Turns that can be answered from the text and the prior state alone
//! (reset, metric definitions, follow-up comparisons) finish in `begin`.
//! Everything else needs a structured parse; `begin` hands back a
//! `PendingTurn` so the caller can run the parser however it likes
//! (remote, async, cached) and then `finish` with its output.

use serde::Serialize;

use crate::compare::{ComparisonReport, compare};
use crate::context::{ConversationState, merge};
use crate::dataset::Dataset;
use crate::dates::IsoDate;
use crate::descriptor::{QueryDescriptor, RawQuery, SessionId, SessionRange, SessionSel};
use crate::error::{QueryError, Result};
use crate::fetch::{Row, fetch, fetch_session_range};
use crate::metric::Metric;
use crate::parser::QueryParser;
use crate::relative::resolve;
use crate::signals;
use crate::summarize::{
    PointResult, SeriesSummary, is_point, point_result, summarize_session_range,
    summarize_timeseries,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TurnOutcome {
    Reset,
    Definition {
        metric: Metric,
    },
    Point {
        query: QueryDescriptor,
        rows: Vec<Row>,
        point: PointResult,
    },
    Timeseries {
        query: QueryDescriptor,
        rows: Vec<Row>,
        summary: SeriesSummary<IsoDate>,
    },
    SessionRange {
        query: QueryDescriptor,
        range: SessionRange,
        rows: Vec<Row>,
        summary: SeriesSummary<String>,
    },
    #[serde(rename = "compare")]
    Comparison {
        query: QueryDescriptor,
        report: ComparisonReport,
    },
    Error(QueryError),
}

impl TurnOutcome {
    pub fn type_name(&self) -> &'static str {
        match self {
            TurnOutcome::Reset => "reset",
            TurnOutcome::Definition { .. } => "definition",
            TurnOutcome::Point { .. } => "point",
            TurnOutcome::Timeseries { .. } => "timeseries",
            TurnOutcome::SessionRange { .. } => "session_range",
            TurnOutcome::Comparison { .. } => "compare",
            TurnOutcome::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TurnOutcome::Error(_))
    }
}

/// Outcome plus the state to hand back on the next turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    pub state: ConversationState,
}

impl TurnResult {
    fn failed(err: QueryError, state: &ConversationState) -> Self {
        TurnResult {
            outcome: TurnOutcome::Error(err),
            state: state.clone(),
        }
    }
}

pub enum Step<'a> {
    Done(TurnResult),
    NeedsParse(PendingTurn<'a>),
}

/// Routes turns over one shared, read-only dataset.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'a> {
    dataset: &'a Dataset,
    today: IsoDate,
}

impl<'a> Engine<'a> {
    pub fn new(dataset: &'a Dataset, today: IsoDate) -> Self {
        Self { dataset, today }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Answer what can be answered without a parser.
    pub fn begin(&self, question: &str, state: &ConversationState) -> Step<'a> {
        if signals::is_reset(question) {
            return Step::Done(TurnResult {
                outcome: TurnOutcome::Reset,
                state: ConversationState::default(),
            });
        }

        if signals::is_definition_question(question)
            && !signals::mentions_patient(question)
            && !signals::mentions_game(question)
            && !signals::mentions_session(question)
            && !signals::mentions_dates(question)
            && !signals::is_comparison(question)
            && let Some(metric) = signals::extract_metric(question)
        {
            return Step::Done(TurnResult {
                outcome: TurnOutcome::Definition { metric },
                state: state.clone(),
            });
        }

        let comparison = signals::is_comparison(question);
        if comparison {
            let metrics = signals::metrics_mentioned(question);
            if metrics.len() > 1 {
                let names = metrics.iter().map(|m| m.column().to_string()).collect();
                return Step::Done(TurnResult::failed(
                    QueryError::MultipleMetricsInComparison(names),
                    state,
                ));
            }
        }

        if comparison
            && let Some(prior) = &state.last_query
            && !signals::mentions_patient(question)
            && !signals::mentions_game(question)
            && signals::extract_metric(question).is_none()
        {
            let outcome = match self.followup_comparison(question, prior) {
                Ok(report) => TurnOutcome::Comparison {
                    query: prior.clone(),
                    report,
                },
                Err(e) => TurnOutcome::Error(e),
            };
            return Step::Done(TurnResult {
                outcome,
                state: state.clone(),
            });
        }

        if let Some(token) = signals::find_disallowed_metric_token(question) {
            return Step::Done(TurnResult::failed(QueryError::DisallowedMetric(token), state));
        }

        Step::NeedsParse(PendingTurn {
            engine: *self,
            question: question.to_string(),
            state: state.clone(),
        })
    }

    /// Run a whole turn with a synchronous parser.
    pub fn ask(&self, question: &str, state: &ConversationState, parser: &impl QueryParser) -> TurnResult {
        match self.begin(question, state) {
            Step::Done(result) => result,
            Step::NeedsParse(pending) => {
                let raw = parser.parse(pending.question());
                pending.finish(raw)
            }
        }
    }

    fn followup_comparison(&self, question: &str, prior: &QueryDescriptor) -> Result<ComparisonReport> {
        match explicit_sessions(question)?.as_slice() {
            [] => {
                let cue = signals::relative_cue(question).ok_or(QueryError::CompareSessionNotGiven)?;
                let other = resolve(self.dataset, prior, cue)?;
                compare(self.dataset, prior, other)
            }
            [only] => compare(self.dataset, prior, *only),
            [first, second, ..] => {
                let base = QueryDescriptor {
                    session: SessionSel::One(*first),
                    ..prior.clone()
                };
                compare(self.dataset, &base, *second)
            }
        }
    }
}

/// A turn waiting for its structured parse.
pub struct PendingTurn<'a> {
    engine: Engine<'a>,
    question: String,
    state: ConversationState,
}

impl PendingTurn<'_> {
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Complete the turn. A parser failure is reported like any other error
    /// and leaves the state untouched.
    pub fn finish(self, raw: Result<RawQuery>) -> TurnResult {
        match self.route(raw) {
            Ok(result) => result,
            Err(e) => TurnResult::failed(e, &self.state),
        }
    }

    fn route(&self, raw: Result<RawQuery>) -> Result<TurnResult> {
        let question = self.question.as_str();
        let dataset = self.engine.dataset;
        let prior = self.state.last_query.as_ref();

        let parsed = raw?.normalize(question, self.engine.today)?;
        let mut qd = merge(parsed, question, prior);

        let sessions = explicit_sessions(question)?;
        let explicit_session = signals::mentions_session(question);
        let explicit_dates = signals::mentions_dates(question);

        if sessions.len() >= 2 && signals::is_session_range_question(question) {
            let range = SessionRange {
                start: sessions[0],
                end: sessions[1],
            };
            let outcome = session_range(dataset, &qd, range)?;
            return Ok(self.commit(outcome, Some(qd), Some(range)));
        }

        if let Some(range) = self.state.last_session_range
            && sessions.is_empty()
            && !explicit_session
            && !explicit_dates
        {
            let outcome = session_range(dataset, &qd, range)?;
            return Ok(self.commit(outcome, Some(qd), Some(range)));
        }

        let kept_range = if explicit_session || explicit_dates {
            None
        } else {
            self.state.last_session_range
        };

        if signals::is_comparison(question) {
            let (base, report) = single_prompt_comparison(dataset, &qd, question, &sessions)?;
            let outcome = TurnOutcome::Comparison {
                query: base.clone(),
                report,
            };
            return Ok(self.commit(outcome, Some(base), None));
        }

        if let Some(cue) = signals::relative_cue(question) {
            let base = QueryDescriptor {
                session: prior.map_or(qd.session, |p| p.session),
                ..qd.clone()
            };
            let resolved = resolve(dataset, &base, cue)?;
            qd = qd.for_session(resolved);
        }

        if qd.session == SessionSel::Ambiguous {
            return Err(QueryError::AmbiguousSession);
        }

        let rows = fetch(dataset, &qd)?;
        let metric = qd.metric.get().ok_or(QueryError::MissingInfo(vec!["metric"]))?;
        let outcome = if is_point(&qd, &rows) {
            let point = point_result(&rows, metric)?;
            TurnOutcome::Point {
                query: qd.clone(),
                rows,
                point,
            }
        } else {
            let summary = summarize_timeseries(&rows, metric, qd.date_start.get())?;
            TurnOutcome::Timeseries {
                query: qd.clone(),
                rows,
                summary,
            }
        };
        Ok(self.commit(outcome, Some(qd), kept_range))
    }

    fn commit(
        &self,
        outcome: TurnOutcome,
        last_query: Option<QueryDescriptor>,
        last_session_range: Option<SessionRange>,
    ) -> TurnResult {
        TurnResult {
            outcome,
            state: ConversationState {
                last_query,
                last_session_range,
            },
        }
    }
}

/// Sessions named in the question text, all inside the recorded range.
fn explicit_sessions(question: &str) -> Result<Vec<SessionId>> {
    let sessions = signals::extract_sessions(question);
    match sessions.iter().find(|id| !id.is_allowed()) {
        Some(id) => Err(QueryError::DisallowedSession(id.to_string())),
        None => Ok(sessions),
    }
}

fn session_range(dataset: &Dataset, qd: &QueryDescriptor, range: SessionRange) -> Result<TurnOutcome> {
    let metric = qd.metric.get().ok_or(QueryError::RangeFieldRequired("metric"))?;
    if qd.patient.is_missing() {
        return Err(QueryError::RangeFieldRequired("patient"));
    }
    if qd.game.is_none() {
        return Err(QueryError::RangeFieldRequired("game"));
    }
    let rows = fetch_session_range(dataset, qd, range)?;
    let baseline = range.start.min(range.end);
    let summary = summarize_session_range(&rows, metric, baseline)?;
    Ok(TurnOutcome::SessionRange {
        query: qd.clone(),
        range,
        rows,
        summary,
    })
}

/// Two sessions named in one question, or one session plus a relative cue.
fn single_prompt_comparison(
    dataset: &Dataset,
    qd: &QueryDescriptor,
    question: &str,
    sessions: &[SessionId],
) -> Result<(QueryDescriptor, ComparisonReport)> {
    if qd.metric.is_missing() {
        return Err(QueryError::CompareFieldRequired("metric"));
    }
    if qd.patient.is_missing() {
        return Err(QueryError::CompareFieldRequired("patient"));
    }
    if qd.game.is_none() {
        return Err(QueryError::CompareFieldRequired("game"));
    }

    let (base_session, other) = match (sessions, signals::relative_cue(question)) {
        ([first, second, ..], _) => (*first, *second),
        ([only], Some(cue)) => {
            let base = qd.for_session(*only);
            (*only, resolve(dataset, &base, cue)?)
        }
        _ => return Err(QueryError::CompareSessionNotGiven),
    };
    let base = qd.for_session(base_session);
    let report = compare(dataset, &base, other)?;
    Ok((base, report))
}
