use serde::Serialize;

use crate::dataset::Dataset;
use crate::dates::IsoDate;
use crate::descriptor::{GameId, QueryDescriptor, SessionId};
use crate::error::{QueryError, Result};
use crate::fetch::{Row, fetch};
use crate::metric::Metric;
use crate::summarize::mean;

/// Two sessions of one patient/game/metric, labelled earlier and later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub patient: String,
    pub game: Option<GameId>,
    pub metric: Metric,
    pub session_a: SessionId,
    pub session_b: SessionId,
    pub value_a: f64,
    pub value_b: f64,
    pub session_earlier: SessionId,
    pub session_later: SessionId,
    pub value_earlier: f64,
    pub value_later: f64,
    pub change_later_minus_earlier: f64,
    pub diff_earlier_minus_later: f64,
    pub relative_change_pct_vs_earlier: Option<f64>,
    pub rows_earlier: Vec<Row>,
    pub rows_later: Vec<Row>,
}

struct Side {
    session: SessionId,
    mean: f64,
    rows: Vec<Row>,
}

impl Side {
    fn fetch(dataset: &Dataset, base: &QueryDescriptor, session: SessionId) -> Result<Self> {
        let rows = fetch(dataset, &base.for_session(session)).map_err(|e| QueryError::FetchFailed {
            session,
            source: Box::new(e),
        })?;
        let values: Vec<f64> = rows.iter().filter_map(|r| r.metric_value).collect();
        let mean = mean(&values).ok_or(QueryError::SessionWithoutValues)?;
        Ok(Side { session, mean, rows })
    }

    fn earliest_date(&self) -> Option<IsoDate> {
        self.rows.iter().filter_map(|r| r.date).min()
    }
}

/// Compare the base query's session against `other`, ignoring date filters.
///
/// Earlier/later follows session number when the numbers differ, then the
/// earliest observed date, then argument order.
pub fn compare(dataset: &Dataset, base: &QueryDescriptor, other: SessionId) -> Result<ComparisonReport> {
    let base_session = base.session.id().ok_or(QueryError::NoBaseSession)?;
    let metric = base.metric.get().ok_or(QueryError::NoBaseMetric)?;
    let patient = base.patient.value().ok_or(QueryError::NoBasePatient)?;

    let a = Side::fetch(dataset, base, base_session)?;
    let b = Side::fetch(dataset, base, other)?;

    let b_first = if a.session.number() != b.session.number() {
        b.session.number() < a.session.number()
    } else {
        match (a.earliest_date(), b.earliest_date()) {
            (Some(da), Some(db)) => db < da,
            _ => false,
        }
    };

    let (session_a, value_a, session_b, value_b) = (a.session, a.mean, b.session, b.mean);
    let (earlier, later) = if b_first { (b, a) } else { (a, b) };
    let change = later.mean - earlier.mean;

    Ok(ComparisonReport {
        patient: patient.clone(),
        game: base.game,
        metric,
        session_a,
        session_b,
        value_a,
        value_b,
        session_earlier: earlier.session,
        session_later: later.session,
        value_earlier: earlier.mean,
        value_later: later.mean,
        change_later_minus_earlier: change,
        diff_earlier_minus_later: earlier.mean - later.mean,
        relative_change_pct_vs_earlier: (earlier.mean != 0.0)
            .then(|| change / earlier.mean.abs() * 100.0),
        rows_earlier: earlier.rows,
        rows_later: later.rows,
    })
}
