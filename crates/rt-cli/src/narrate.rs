//! Deterministic sentences for turn outcomes. No model is involved.

use std::fmt::Display;

use rt_core::{
    ComparisonReport, Metric, PointResult, QueryDescriptor, SeriesSummary, TrendLabel,
    TurnOutcome,
};

pub const RESET_ANSWER: &str = "Context cleared. Ask a new question with patient/metric/date.";

/// Hedge scaled to effect size.
fn hedge(relative_change_pct: Option<f64>) -> &'static str {
    match relative_change_pct.map(f64::abs) {
        None => "is consistent with",
        Some(m) if m == 0.0 => "is consistent with",
        Some(m) if m < 5.0 => "may indicate",
        Some(m) if m < 15.0 => "is consistent with",
        Some(_) => "suggests",
    }
}

fn direction(change: f64) -> &'static str {
    if change > 0.0 {
        "increased"
    } else if change < 0.0 {
        "decreased"
    } else {
        "remained stable"
    }
}

/// Milliseconds as `Hh Mm Ss`, dropping leading zero units.
pub fn format_duration_ms(value: f64) -> String {
    let total = (value.abs() / 1000.0).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    let sign = if value < 0.0 { "-" } else { "" };
    if hours > 0 {
        format!("{sign}{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m {seconds}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::Timestampms => format_duration_ms(value),
        _ => format!("{value:.4}"),
    }
}

fn format_change(metric: Metric, change: f64) -> String {
    format_value(metric, change.abs())
}

pub fn narrate(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::Reset => RESET_ANSWER.to_string(),
        TurnOutcome::Definition { metric } => narrate_definition(*metric),
        TurnOutcome::Point { query, point, .. } => narrate_point(query, point),
        TurnOutcome::Timeseries { summary, .. } => {
            narrate_series(summary, "Over this period", "date")
        }
        TurnOutcome::SessionRange { summary, .. } => {
            narrate_series(summary, "Over this session range", "session")
        }
        TurnOutcome::Comparison { report, .. } => narrate_comparison(report),
        TurnOutcome::Error(err) => err.to_string(),
    }
}

pub fn narrate_definition(metric: Metric) -> String {
    format!("{}: {}", metric.display_name(), metric.explanation())
}

fn narrate_point(query: &QueryDescriptor, point: &PointResult) -> String {
    let patient = query.patient.value().map_or("?", String::as_str);
    let lead = match point.metric {
        Metric::Timestampms => format!(
            "For patient {patient}, the {} is {}",
            point.metric.display_name(),
            format_value(point.metric, point.value)
        ),
        _ => format!(
            "For patient {patient}, the {} value is {}",
            point.metric.display_name(),
            format_value(point.metric, point.value)
        ),
    };
    let place = match (point.session.is_empty(), point.game.is_empty(), point.date) {
        (false, false, Some(date)) => format!("in {}, {} on {date}.", point.game, point.session),
        (false, false, None) => format!("in {}, {}.", point.game, point.session),
        (_, false, Some(date)) => format!("in {} on {date}.", point.game),
        (_, _, Some(date)) => format!("on {date}."),
        _ => "for the record I found.".to_string(),
    };
    let mut text = format!("{lead} {place}");
    if point.n > 1 {
        text.push_str(&format!(" This is the mean of {} rows.", point.n));
    }
    text
}

fn narrate_series<K: Display + Clone>(
    summary: &SeriesSummary<K>,
    span: &str,
    endpoint: &str,
) -> String {
    let metric = summary.metric;
    let mut text = format!(
        "I found patient records from {} to {}. {span}, the average {} {} by {}",
        summary.first,
        summary.last,
        metric.label(),
        direction(summary.change),
        format_change(metric, summary.change),
    );
    match summary.relative_change_pct {
        Some(pct) => text.push_str(&format!(
            ", which corresponds to a {:.2}% change from the baseline.",
            pct.abs()
        )),
        None => text.push('.'),
    }
    if let Some(note) = &summary.baseline_note {
        text.push(' ');
        text.push_str(note);
    }
    if !summary.interpretation.is_empty() {
        text.push_str(&format!(
            " This change {} {}.",
            hedge(summary.relative_change_pct),
            summary.interpretation.trim_end_matches('.')
        ));
    }
    if let Some(trend) = summary.trend {
        let sentence = match trend.label {
            TrendLabel::Variable => {
                let tail = if summary.change > 0.0 {
                    format!(", but it increased overall from the first to the last {endpoint}")
                } else if summary.change < 0.0 {
                    format!(", but it decreased overall from the first to the last {endpoint}")
                } else {
                    ", ending near the starting level".to_string()
                };
                format!("Overall, the trend shows fluctuations with rises and drops between sessions{tail}")
            }
            _ => capitalize(trend.reason),
        };
        text.push_str(&format!(" {sentence}."));
    }
    text
}

fn narrate_comparison(report: &ComparisonReport) -> String {
    let metric = report.metric;
    let game = report
        .game
        .map_or_else(|| "the selected game".to_string(), |g| g.to_string());
    let change = report.change_later_minus_earlier;
    let mut text = format!(
        "For patient {} in {game}, comparing {} to {}, the average {} {} by {} (from {} to {}).",
        report.patient,
        report.session_earlier,
        report.session_later,
        metric.label(),
        direction(change),
        format_change(metric, change),
        format_value(metric, report.value_earlier),
        format_value(metric, report.value_later),
    );
    text.push_str(&format!(
        " The difference (earlier - later) is {}.",
        format_value(metric, report.diff_earlier_minus_later)
    ));
    if let Some(pct) = report.relative_change_pct_vs_earlier {
        text.push_str(&format!(
            " This corresponds to a {:.2}% change relative to the earlier session.",
            pct.abs()
        ));
    }
    text.push_str(&format!(
        " This change {} {}.",
        hedge(report.relative_change_pct_vs_earlier),
        metric.interpretation(change)
    ));
    text
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::{
        Cell, ConversationState, DatasetBuilder, DeterministicParser, Engine, IsoDate, QueryError,
    };

    fn ask(q: &str) -> TurnOutcome {
        let ds = DatasetBuilder::with_metrics(&[Metric::Area, Metric::Timestampms])
            .row("2022-03-10", "46", "game0", "session_1", vec![Cell::Number(0.10), Cell::Number(61_000.0)])
            .row("2022-03-12", "46", "game0", "session_2", vec![Cell::Number(0.12), Cell::Number(3_725_000.0)])
            .row("2022-03-17", "46", "game0", "session_3", vec![Cell::Number(0.15), Cell::Number(59_000.0)])
            .build();
        let today = IsoDate::new(2022, 12, 31).unwrap();
        Engine::new(&ds, today)
            .ask(q, &ConversationState::default(), &DeterministicParser)
            .outcome
    }

    #[test]
    fn test_hedge_thresholds() {
        assert_eq!(hedge(None), "is consistent with");
        assert_eq!(hedge(Some(0.0)), "is consistent with");
        assert_eq!(hedge(Some(-4.9)), "may indicate");
        assert_eq!(hedge(Some(10.0)), "is consistent with");
        assert_eq!(hedge(Some(15.0)), "suggests");
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration_ms(59_000.0), "59s");
        assert_eq!(format_duration_ms(61_000.0), "1m 1s");
        assert_eq!(format_duration_ms(3_725_000.0), "1h 2m 5s");
        assert_eq!(format_duration_ms(-2_000.0), "-2s");
    }

    #[test]
    fn test_point_sentence() {
        let text = narrate(&ask("area for patient 46 in game0 session 2"));
        assert_eq!(
            text,
            "For patient 46, the range of motion (area) value is 0.1200 in game0, session_2 on 2022-03-12."
        );
    }

    #[test]
    fn test_duration_point_sentence() {
        let text = narrate(&ask("session duration for patient 46 in game0 session 2"));
        assert!(text.starts_with("For patient 46, the session duration is 1h 2m 5s"));
    }

    #[test]
    fn test_comparison_sentence() {
        let text = narrate(&ask("compare area for patient 46 in game0 session 1 with session 3"));
        assert!(text.starts_with("For patient 46 in game0, comparing session_1 to session_3"));
        assert!(text.contains("increased by 0.0500 (from 0.1000 to 0.1500)"));
        assert!(text.contains("50.00% change relative to the earlier session"));
        assert!(text.contains("suggests increased range of motion"));
    }

    #[test]
    fn test_range_sentence_has_trend() {
        let text = narrate(&ask("area for patient 46 in game0 from session 1 to session 3"));
        assert!(text.starts_with("I found patient records from session_1 to session_3."));
        assert!(text.contains("Over this session range, the average range of motion increased by 0.0500"));
        assert!(text.ends_with("Values generally improved from session to session."));
    }

    #[test]
    fn test_error_is_message() {
        let text = narrate(&TurnOutcome::Error(QueryError::NoNextSession));
        assert_eq!(text, QueryError::NoNextSession.to_string());
    }
}
