//! Mode classification, point results and grouped trend summaries.
//!
//! A fetched row set is either a single logical observation (one session or
//! one date) or a series. Series are grouped by date or by session, each
//! group reduced to count/mean/min/max over valid values, and the sequence
//! of group means classified into a trend label.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::constants::{TREND_MIN_EPSILON, TREND_RELATIVE_EPSILON, TREND_SUPERMAJORITY};
use crate::dates::IsoDate;
use crate::descriptor::{QueryDescriptor, SessionId};
use crate::error::{QueryError, Result};
use crate::fetch::Row;
use crate::metric::Metric;

/// True for a session query, or when the rows cover exactly one date.
pub fn is_point(qd: &QueryDescriptor, rows: &[Row]) -> bool {
    if qd.session.is_set() {
        return true;
    }
    rows.iter().map(|r| r.date).collect::<BTreeSet<_>>().len() == 1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointResult {
    pub metric: Metric,
    pub value: f64,
    /// Valid values averaged into `value`.
    pub n: usize,
    pub date: Option<IsoDate>,
    pub session: String,
    pub game: String,
}

/// One value from a point query: the row itself, or the mean over a
/// session's rows when they all belong to one game.
pub fn point_result(rows: &[Row], metric: Metric) -> Result<PointResult> {
    let first = rows.first().ok_or(QueryError::NoValidValues)?;
    let build = |value, n| PointResult {
        metric,
        value,
        n,
        date: first.date,
        session: first.session.clone(),
        game: first.game.clone(),
    };

    if let [only] = rows {
        let value = only.metric_value.ok_or(QueryError::NoValidValues)?;
        return Ok(build(value, 1));
    }

    let games: BTreeSet<&str> = rows.iter().map(|r| r.game.as_str()).collect();
    if games.len() > 1 {
        return Err(QueryError::MultipleGamesMatched(
            games.into_iter().map(str::to_string).collect(),
        ));
    }

    let values: Vec<f64> = rows.iter().filter_map(|r| r.metric_value).collect();
    let mean = mean(&values).ok_or(QueryError::NoValidValues)?;
    Ok(build(mean, values.len()))
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary<K> {
    pub key: K,
    pub n: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl<K> GroupSummary<K> {
    fn from_values(key: K, values: &[f64]) -> Self {
        GroupSummary {
            key,
            n: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendLabel {
    #[serde(rename = "no clear trend")]
    NoClearTrend,
    #[serde(rename = "improving")]
    Improving,
    #[serde(rename = "worsening")]
    Worsening,
    #[serde(rename = "variable")]
    Variable,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendLabel::NoClearTrend => "no clear trend",
            TrendLabel::Improving => "improving",
            TrendLabel::Worsening => "worsening",
            TrendLabel::Variable => "variable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trend {
    pub label: TrendLabel,
    pub reason: &'static str,
}

impl Trend {
    fn of(label: TrendLabel) -> Self {
        let reason = match label {
            TrendLabel::NoClearTrend => "values stayed roughly stable between sessions",
            TrendLabel::Improving => "values generally improved from session to session",
            TrendLabel::Worsening => "values generally worsened from session to session",
            TrendLabel::Variable => "values fluctuated with rises and drops between sessions",
        };
        Trend { label, reason }
    }
}

/// Classify consecutive group means. Needs at least two groups.
///
/// Steps smaller than `max(1e-6, 1% of |baseline|)` are flat. A direction
/// needs an 80% share of the non-flat steps; mixed movement below that is
/// `Variable`, and a lone direction below it still gets its own label.
pub fn classify_trend(means: &[f64], metric: Metric) -> Option<Trend> {
    let (&baseline, _) = means.split_first()?;
    if means.len() < 2 {
        return None;
    }
    let epsilon = TREND_MIN_EPSILON.max(TREND_RELATIVE_EPSILON * baseline.abs());
    let direction = metric.improvement_direction();

    let (mut improving, mut worsening) = (0usize, 0usize);
    for step in means.windows(2) {
        let delta = (step[1] - step[0]) * direction;
        if delta > epsilon {
            improving += 1;
        } else if delta < -epsilon {
            worsening += 1;
        }
    }

    let total = improving + worsening;
    let label = if total == 0 {
        TrendLabel::NoClearTrend
    } else if improving as f64 / total as f64 >= TREND_SUPERMAJORITY {
        TrendLabel::Improving
    } else if worsening as f64 / total as f64 >= TREND_SUPERMAJORITY {
        TrendLabel::Worsening
    } else if improving > 0 && worsening > 0 {
        TrendLabel::Variable
    } else if improving > 0 {
        TrendLabel::Improving
    } else {
        TrendLabel::Worsening
    };
    Some(Trend::of(label))
}

/// Grouped statistics plus baseline-relative change for a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary<K> {
    pub metric: Metric,
    pub groups: Vec<GroupSummary<K>>,
    pub first: K,
    pub last: K,
    /// Last group mean minus first group mean.
    pub change: f64,
    /// `None` when the baseline mean is exactly zero.
    pub relative_change_pct: Option<f64>,
    pub baseline_note: Option<String>,
    pub interpretation: &'static str,
    pub trend: Option<Trend>,
}

impl<K: Clone> SeriesSummary<K> {
    fn build(metric: Metric, groups: Vec<GroupSummary<K>>, baseline_note: impl FnOnce(&K) -> Option<String>) -> Result<Self> {
        let (first, last) = match (groups.first(), groups.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(QueryError::NoValidValues),
        };
        let change = last.mean - first.mean;
        let relative_change_pct = (first.mean != 0.0).then(|| change / first.mean.abs() * 100.0);
        let means: Vec<f64> = groups.iter().map(|g| g.mean).collect();

        Ok(SeriesSummary {
            metric,
            first: first.key.clone(),
            last: last.key.clone(),
            change,
            relative_change_pct,
            baseline_note: baseline_note(&first.key),
            interpretation: metric.interpretation(change),
            trend: classify_trend(&means, metric),
            groups,
        })
    }
}

/// Group valid rows by date, oldest first. Undated rows are skipped.
pub fn summarize_timeseries(
    rows: &[Row],
    metric: Metric,
    requested_start: Option<IsoDate>,
) -> Result<SeriesSummary<IsoDate>> {
    let mut by_date: BTreeMap<IsoDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let (Some(date), Some(v)) = (row.date, row.metric_value) {
            by_date.entry(date).or_default().push(v);
        }
    }
    let groups = by_date
        .into_iter()
        .map(|(date, values)| GroupSummary::from_values(date, &values))
        .collect();

    SeriesSummary::build(metric, groups, |first| {
        requested_start.filter(|req| req != first).map(|req| {
            format!("No data on requested start date {req}; using first available date {first} as baseline.")
        })
    })
}

/// Group valid rows by session, ordered by session number.
pub fn summarize_session_range(
    rows: &[Row],
    metric: Metric,
    requested_start: SessionId,
) -> Result<SeriesSummary<String>> {
    let mut by_session: BTreeMap<(Option<u32>, String), Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let Some(v) = row.metric_value {
            by_session
                .entry((row.session_number(), row.session.clone()))
                .or_default()
                .push(v);
        }
    }
    let groups = by_session
        .into_iter()
        .map(|((_, session), values)| GroupSummary::from_values(session, &values))
        .collect();

    let requested = requested_start.to_string();
    SeriesSummary::build(metric, groups, |first| {
        (requested != *first).then(|| {
            format!(
                "No data on requested start session {requested}; using first available session {first} as baseline."
            )
        })
    })
}
