//! Row filtering over the in-memory dataset.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Record};
use crate::dates::IsoDate;
use crate::descriptor::{QueryDescriptor, SessionId, SessionRange, SessionSel};
use crate::error::{QueryError, Result};
use crate::metric::Metric;

/// One filtered observation. `metric_value` is finite or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub date: Option<IsoDate>,
    pub patient: String,
    pub metric_value: Option<f64>,
    pub game: String,
    pub session: String,
}

impl Row {
    pub fn session_number(&self) -> Option<u32> {
        SessionId::parse(&self.session).map(SessionId::number)
    }

    fn from_record(record: &Record, column: usize) -> Self {
        Row {
            date: record.date,
            patient: record.patient.trim().to_string(),
            metric_value: record.values.get(column).and_then(|c| c.finite()),
            game: record.game.trim().to_string(),
            session: record.session.trim().to_string(),
        }
    }
}

/// Undated rows sort after dated ones.
fn cmp_dates(a: Option<IsoDate>, b: Option<IsoDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_sessions(a: &Row, b: &Row) -> Ordering {
    a.session_number()
        .cmp(&b.session_number())
        .then_with(|| a.session.cmp(&b.session))
}

fn required(qd: &QueryDescriptor) -> Result<(&str, Metric)> {
    match (qd.patient.value(), qd.metric.get()) {
        (Some(patient), Some(metric)) => Ok((patient.as_str(), metric)),
        (patient, metric) => {
            let mut missing = Vec::new();
            if patient.is_none() {
                missing.push("patient");
            }
            if metric.is_none() {
                missing.push("metric");
            }
            Err(QueryError::MissingInfo(missing))
        }
    }
}

fn column_for(dataset: &Dataset, metric: Metric) -> Result<usize> {
    dataset
        .column_index(metric)
        .ok_or_else(|| QueryError::MetricColumnNotFound(metric.column().to_string()))
}

/// Rows for a session query or a date-range query, sorted by
/// `(date, game, session)`.
pub fn fetch(dataset: &Dataset, qd: &QueryDescriptor) -> Result<Vec<Row>> {
    let (patient, metric) = required(qd)?;

    let session = match qd.session {
        SessionSel::One(id) => Some(id),
        SessionSel::Ambiguous => return Err(QueryError::AmbiguousSession),
        SessionSel::Unconstrained => None,
    };
    if qd.game.is_none() {
        return Err(match session {
            Some(_) => QueryError::GameRequiredForSession,
            None => QueryError::GameRequiredForDateRange,
        });
    }
    if session.is_none() && qd.date_start.is_missing() {
        return Err(QueryError::MissingInfo(vec!["date_start"]));
    }
    let column = column_for(dataset, metric)?;

    let game = qd.game.map(|g| g.to_string());
    let session = session.map(|s| s.to_string());
    let window = qd.date_start.get().zip(qd.date_end.get());

    let mut rows: Vec<Row> = dataset
        .records()
        .iter()
        .filter(|r| r.patient.trim() == patient)
        .filter(|r| game.as_deref().is_none_or(|g| r.game.trim() == g))
        .filter(|r| session.as_deref().is_none_or(|s| r.session.trim() == s))
        .filter(|r| match window {
            Some((start, end)) => r.date.is_some_and(|d| start <= d && d <= end),
            None => true,
        })
        .map(|r| Row::from_record(r, column))
        .collect();

    rows.sort_by(|a, b| {
        cmp_dates(a.date, b.date)
            .then_with(|| a.game.cmp(&b.game))
            .then_with(|| cmp_sessions(a, b))
    });

    if rows.is_empty() {
        return Err(QueryError::NoMatchingRows);
    }
    Ok(rows)
}

/// Rows for an inclusive session-number span in one game, sorted by
/// `(session number, date)`. Reversed bounds are swapped.
pub fn fetch_session_range(
    dataset: &Dataset,
    qd: &QueryDescriptor,
    range: SessionRange,
) -> Result<Vec<Row>> {
    let patient = qd
        .patient
        .value()
        .ok_or(QueryError::RangeFieldRequired("patient"))?;
    let metric = qd.metric.get().ok_or(QueryError::RangeFieldRequired("metric"))?;
    let game = qd.game.ok_or(QueryError::GameRequiredForSessionRange)?;
    let column = column_for(dataset, metric)?;

    let (a, b) = (range.start.number(), range.end.number());
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    let mut rows: Vec<Row> = dataset
        .patient_game(patient, &game.to_string())
        .filter(|r| {
            SessionId::parse(&r.session).is_some_and(|s| (lo..=hi).contains(&s.number()))
        })
        .map(|r| Row::from_record(r, column))
        .collect();

    rows.sort_by(|a, b| cmp_sessions(a, b).then_with(|| cmp_dates(a.date, b.date)));

    if rows.is_empty() {
        return Err(QueryError::NoMatchingRows);
    }
    Ok(rows)
}
