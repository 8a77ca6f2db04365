use std::collections::BTreeSet;

use crate::dataset::Dataset;
use crate::descriptor::{QueryDescriptor, SessionId};
use crate::error::{QueryError, Result};
use crate::signals::RelativeCue;

/// Distinct session numbers recorded for one patient in one game, ascending.
pub fn session_numbers(dataset: &Dataset, patient: &str, game: &str) -> BTreeSet<u32> {
    dataset
        .patient_game(patient, game)
        .filter_map(|r| SessionId::parse(&r.session))
        .map(SessionId::number)
        .collect()
}

/// Turn a relative cue into a concrete session for the base query's
/// patient and game. Ordering is by session number only.
pub fn resolve(dataset: &Dataset, base: &QueryDescriptor, cue: RelativeCue) -> Result<SessionId> {
    let current = base.session.id().ok_or(QueryError::NoBaseSession)?;
    let patient = base.patient.value().ok_or(QueryError::NoBasePatient)?;
    let game = base.game.ok_or(QueryError::NoBaseGame)?;

    let numbers = session_numbers(dataset, patient, &game.to_string());
    if numbers.is_empty() {
        return Err(QueryError::NoComparableSessions);
    }

    let n = current.number();
    let picked = match cue {
        RelativeCue::First => numbers.first().copied(),
        RelativeCue::Latest => numbers.last().copied(),
        RelativeCue::Previous => Some(
            numbers
                .range(..n)
                .next_back()
                .copied()
                .ok_or(QueryError::NoPreviousSession)?,
        ),
        RelativeCue::Next => Some(
            n.checked_add(1)
                .and_then(|after| numbers.range(after..).next().copied())
                .ok_or(QueryError::NoNextSession)?,
        ),
    };
    picked.map(SessionId::new).ok_or(QueryError::NoComparableSessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, DatasetBuilder};
    use crate::descriptor::{GameId, SessionSel, Slot};
    use crate::metric::Metric;

    fn dataset() -> Dataset {
        DatasetBuilder::with_metrics(&[Metric::Area])
            .row("2022-03-01", "46", "game0", "session_1", vec![Cell::Number(0.1)])
            .row("2022-03-03", "46", "game0", "session_3", vec![Cell::Number(0.2)])
            .row("2022-03-09", "46", "game0", "session_10", vec![Cell::Number(0.3)])
            .row("2022-03-04", "46", "game1", "session_5", vec![Cell::Number(0.9)])
            .row("2022-03-05", "47", "game0", "session_2", vec![Cell::Number(0.9)])
            .build()
    }

    fn base(session: u32) -> QueryDescriptor {
        QueryDescriptor {
            patient: Slot::Set("46".into()),
            game: GameId::new(0),
            session: SessionSel::One(SessionId::new(session)),
            ..Default::default()
        }
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let ds = dataset();
        assert_eq!(resolve(&ds, &base(3), RelativeCue::Next).unwrap(), SessionId::new(10));
        assert_eq!(resolve(&ds, &base(3), RelativeCue::Previous).unwrap(), SessionId::new(1));
        assert_eq!(resolve(&ds, &base(3), RelativeCue::Latest).unwrap(), SessionId::new(10));
        assert_eq!(resolve(&ds, &base(10), RelativeCue::First).unwrap(), SessionId::new(1));
    }

    #[test]
    fn test_base_need_not_exist_in_data() {
        let ds = dataset();
        assert_eq!(resolve(&ds, &base(2), RelativeCue::Next).unwrap(), SessionId::new(3));
    }

    #[test]
    fn test_edges() {
        let ds = dataset();
        assert_eq!(resolve(&ds, &base(1), RelativeCue::Previous), Err(QueryError::NoPreviousSession));
        assert_eq!(resolve(&ds, &base(10), RelativeCue::Next), Err(QueryError::NoNextSession));
        assert_eq!(
            resolve(&ds, &base(u32::MAX), RelativeCue::Next),
            Err(QueryError::NoNextSession)
        );
    }

    #[test]
    fn test_preconditions() {
        let ds = dataset();
        let mut q = base(3);
        q.game = None;
        assert_eq!(resolve(&ds, &q, RelativeCue::Next), Err(QueryError::NoBaseGame));
        q.session = SessionSel::Unconstrained;
        assert_eq!(resolve(&ds, &q, RelativeCue::Next), Err(QueryError::NoBaseSession));

        let mut q = base(3);
        q.patient = Slot::Set("99".into());
        assert_eq!(resolve(&ds, &q, RelativeCue::Next), Err(QueryError::NoComparableSessions));
    }
}
