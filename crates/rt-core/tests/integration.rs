//! Integration tests exercising the full turn pipeline:
//! parse → normalize → merge → resolve → fetch → summarize/compare.

use approx::assert_relative_eq;
use proptest::prelude::*;
use rt_core::{
    Cell, ConversationState, Dataset, DatasetBuilder, DeterministicParser, Engine, GameId,
    IsoDate, Metric, QueryDescriptor, QueryError, QueryParser, RelativeCue, SessionId,
    SessionRange, SessionSel, Slot, TrendLabel, TurnOutcome, classify_trend, compare, fetch,
    fetch_session_range, merge, resolve, summarize_session_range,
};

/// Patient 46 plays game0 sessions 1-4 and game1 session 1; patient 47 has one row.
fn clinic() -> Dataset {
    DatasetBuilder::with_metrics(&[Metric::Area, Metric::AvgFPatient, Metric::AverageSparc])
        .row("2022-03-10", "46", "game0", "session_1", vec![Cell::Number(0.10), Cell::Number(11.0), Cell::Number(-3.0)])
        .row("2022-03-12", "46", "game0", "session_2", vec![Cell::Number(0.12), Cell::Number(12.0), Cell::Number(-2.5)])
        .row("2022-03-17", "46", "game0", "session_3", vec![Cell::Number(0.09), Cell::Number(13.0), Cell::Text("#NAME".into())])
        .row("2022-03-24", "46", "game0", "session_4", vec![Cell::Number(0.15), Cell::Number(14.0), Cell::Number(-2.0)])
        .row("2022-03-24", "46", "game0", "session_4", vec![Cell::Number(0.17), Cell::Number(16.0), Cell::Number(-1.8)])
        .row("2022-03-11", "46", "game1", "session_1", vec![Cell::Number(0.50), Cell::Number(20.0), Cell::Number(-1.0)])
        .row("2022-03-10", "47", "game0", "session_1", vec![Cell::Number(0.70), Cell::Empty, Cell::Number(f64::NAN)])
        .build()
}

fn today() -> IsoDate {
    IsoDate::new(2022, 12, 31).unwrap()
}

fn base(session: u32) -> QueryDescriptor {
    QueryDescriptor {
        patient: Slot::Set("46".into()),
        metric: Slot::Set(Metric::Area),
        game: GameId::new(0),
        session: SessionSel::One(SessionId::new(session)),
        ..Default::default()
    }
}

fn turn(ds: &Dataset, q: &str, state: &ConversationState) -> rt_core::TurnResult {
    Engine::new(ds, today()).ask(q, state, &DeterministicParser)
}

/// A follow-up that only names a new metric keeps patient and game.
#[test]
fn followup_metric_carries_patient_and_game() {
    let prior = base(2);
    let parsed = DeterministicParser
        .parse("what about force?")
        .unwrap()
        .normalize("what about force?", today())
        .unwrap();
    let merged = merge(parsed, "what about force?", Some(&prior));
    assert_eq!(merged.metric, Slot::Set(Metric::AvgFPatient));
    assert_eq!(merged.patient, Slot::Set("46".into()));
    assert_eq!(merged.game, GameId::new(0));
}

/// Explicit mentions are never overwritten by inheritance.
#[test]
fn explicit_mentions_block_inheritance() {
    let prior = base(2);
    let q = "area for patient 47 in game1";
    let parsed = DeterministicParser.parse(q).unwrap().normalize(q, today()).unwrap();
    let merged = merge(parsed, q, Some(&prior));
    assert_eq!(merged.patient, Slot::Set("47".into()));
    assert_eq!(merged.game, GameId::new(1));
}

/// next then previous returns to the start when both neighbours exist.
#[test]
fn next_then_previous_roundtrip() {
    let ds = clinic();
    for start in 2..=3 {
        let next = resolve(&ds, &base(start), RelativeCue::Next).unwrap();
        let back = resolve(&ds, &base(next.number()), RelativeCue::Previous).unwrap();
        assert_eq!(back, SessionId::new(start));
    }
}

/// A session query without a game is refused, never answered.
#[test]
fn session_without_game_is_refused() {
    let mut q = base(4);
    q.game = None;
    let err = fetch(&clinic(), &q).unwrap_err();
    assert_eq!(err, QueryError::GameRequiredForSession);
    assert!(err.to_string().contains("please specify a game"));
}

/// Fetching twice yields identical rows in identical order.
#[test]
fn fetch_is_idempotent() {
    let ds = clinic();
    let q = QueryDescriptor {
        session: SessionSel::Unconstrained,
        date_start: Slot::Set(IsoDate::new(2022, 3, 1).unwrap()),
        date_end: Slot::Set(IsoDate::new(2022, 3, 31).unwrap()),
        ..base(1)
    };
    assert_eq!(fetch(&ds, &q).unwrap(), fetch(&ds, &q).unwrap());
}

#[test]
fn trend_improving_and_variable() {
    let improving = classify_trend(&[1.0, 1.2, 1.5, 2.0], Metric::Area).unwrap();
    assert_eq!(improving.label, TrendLabel::Improving);
    assert_eq!(improving.reason, "values generally improved from session to session");

    let variable = classify_trend(&[1.0, 1.3, 0.9, 1.4, 0.85], Metric::Area).unwrap();
    assert_eq!(variable.label, TrendLabel::Variable);
}

/// Session 1-3 area means 0.10, 0.12, 0.09 → change -0.01, -10%.
#[test]
fn session_range_summary_scenario() {
    let ds = clinic();
    let range = SessionRange {
        start: SessionId::new(1),
        end: SessionId::new(3),
    };
    let rows = fetch_session_range(&ds, &base(1), range).unwrap();
    let summary = summarize_session_range(&rows, Metric::Area, SessionId::new(1)).unwrap();
    assert_relative_eq!(summary.change, -0.01, epsilon = 1e-9);
    assert_relative_eq!(summary.relative_change_pct.unwrap(), -10.0, epsilon = 1e-6);
    assert!(summary.baseline_note.is_none());
    assert_eq!(summary.first, "session_1");
    assert_eq!(summary.last, "session_3");
}

/// Earlier/later follow session number, whatever the argument order.
#[test]
fn comparison_orders_by_session_number() {
    let report = compare(&clinic(), &base(4), SessionId::new(1)).unwrap();
    assert_eq!(report.session_earlier, SessionId::new(1));
    assert_eq!(report.session_later, SessionId::new(4));
    assert_relative_eq!(report.value_later, 0.16, epsilon = 1e-9);
    assert_relative_eq!(report.change_later_minus_earlier, 0.16 - 0.10, epsilon = 1e-9);
    assert_relative_eq!(report.diff_earlier_minus_later, 0.10 - 0.16, epsilon = 1e-9);
}

/// A full conversation: point, relative move, comparison, range, reset.
#[test]
fn conversation_threads_state() {
    let ds = clinic();
    let s0 = ConversationState::default();

    let t1 = turn(&ds, "What was the area for patient 46 in game0 session 2?", &s0);
    assert_eq!(t1.outcome.type_name(), "point");

    let t2 = turn(&ds, "and the previous session?", &t1.state);
    let TurnOutcome::Point { query, point, .. } = &t2.outcome else {
        panic!("expected point, got {:?}", t2.outcome);
    };
    assert_eq!(query.session, SessionSel::One(SessionId::new(1)));
    assert_relative_eq!(point.value, 0.10);

    let t3 = turn(&ds, "how does that compare with the latest session?", &t2.state);
    let TurnOutcome::Comparison { report, .. } = &t3.outcome else {
        panic!("expected comparison, got {:?}", t3.outcome);
    };
    assert_eq!(report.session_later, SessionId::new(4));
    assert_eq!(t3.state, t2.state);

    let t4 = turn(&ds, "show sparc from session 1 to session 4", &t3.state);
    let TurnOutcome::SessionRange { summary, .. } = &t4.outcome else {
        panic!("expected range, got {:?}", t4.outcome);
    };
    // session_3 holds no valid sparc value
    assert_eq!(summary.groups.len(), 3);

    let t5 = turn(&ds, "reset", &t4.state);
    assert!(t5.state.is_empty());
}

/// The context snapshot survives a JSON round trip between turns.
#[test]
fn state_roundtrips_between_turns() {
    let ds = clinic();
    let t1 = turn(&ds, "area for patient 46 in game0 session 2", &ConversationState::default());
    let json = serde_json::to_string(&t1.state).unwrap();
    let restored: ConversationState = serde_json::from_str(&json).unwrap();
    let t2 = turn(&ds, "and the next session?", &restored);
    let TurnOutcome::Point { query, .. } = &t2.outcome else {
        panic!("expected point, got {:?}", t2.outcome);
    };
    assert_eq!(query.session, SessionSel::One(SessionId::new(3)));
}

/// Multiple metrics in one comparison fail with or without context.
#[test]
fn multi_metric_comparison_consistent_with_context() {
    let ds = clinic();
    let q = "For patient 46 in game0, compare force and sparc between sessions 1 and sessions 3";
    let cold = turn(&ds, q, &ConversationState::default());
    let primed = turn(&ds, "how does sparc change from session 1 to session 3 for patient 46 in game0?", &ConversationState::default());
    let warm = turn(&ds, q, &primed.state);
    for out in [cold, warm] {
        let TurnOutcome::Error(err) = out.outcome else {
            panic!("expected error");
        };
        assert!(err.to_string().contains("Multiple metrics were requested in one session comparison"));
    }
}

fn cell_strategy() -> impl Strategy<Value = Cell> {
    prop_oneof![
        any::<f64>().prop_map(Cell::Number),
        Just(Cell::Number(f64::NAN)),
        Just(Cell::Number(f64::INFINITY)),
        Just(Cell::Number(f64::NEG_INFINITY)),
        "[-+a-zA-Z0-9.#]{0,8}".prop_map(Cell::Text),
        Just(Cell::Text("inf".into())),
        Just(Cell::Text("NaN".into())),
        Just(Cell::Empty),
    ]
}

proptest! {
    /// Fetched values are finite or absent, never NaN or infinite.
    #[test]
    fn fetched_values_are_finite_or_null(cells in proptest::collection::vec(cell_strategy(), 1..20)) {
        let mut builder = DatasetBuilder::with_metrics(&[Metric::Area]);
        for (i, cell) in cells.iter().enumerate() {
            builder = builder.row("2022-03-10", "46", "game0", &format!("session_{}", i + 1), vec![cell.clone()]);
        }
        let ds = builder.build();
        let q = QueryDescriptor {
            session: SessionSel::Unconstrained,
            date_start: Slot::Set(IsoDate::new(2022, 3, 1).unwrap()),
            date_end: Slot::Set(IsoDate::new(2022, 3, 31).unwrap()),
            ..base(1)
        };
        let rows = fetch(&ds, &q).unwrap();
        prop_assert_eq!(rows.len(), cells.len());
        for row in rows {
            prop_assert!(row.metric_value.is_none_or(f64::is_finite));
        }
    }
}
