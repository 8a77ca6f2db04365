//! Conversation context: the explicit per-conversation snapshot and the
//! field-by-field carry-over rules between consecutive turns.

use serde::{Deserialize, Serialize};

use crate::descriptor::{QueryDescriptor, SessionRange, SessionSel, Slot};
use crate::signals;

/// Everything a conversation remembers between turns. The caller owns it and
/// hands it back on every turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub last_query: Option<QueryDescriptor>,
    #[serde(default)]
    pub last_session_range: Option<SessionRange>,
}

impl ConversationState {
    pub fn is_empty(&self) -> bool {
        self.last_query.is_none() && self.last_session_range.is_none()
    }
}

/// Fill unset fields of `new` from `prior`, unless the question mentions them.
///
/// A metric named in the text beats both the parsed and the inherited value.
/// Dates carry over only as a pair. A question that mentions dates but no
/// session drops any session, parsed or inherited.
pub fn merge(new: QueryDescriptor, question: &str, prior: Option<&QueryDescriptor>) -> QueryDescriptor {
    let Some(prior) = prior else {
        return new;
    };
    let mut merged = new;

    if let Some(explicit) = signals::extract_metric(question) {
        merged.metric = Slot::Set(explicit);
    } else if merged.metric.is_missing() {
        merged.metric = prior.metric.clone();
    }

    if merged.patient.is_missing() && !signals::mentions_patient(question) {
        merged.patient = prior.patient.clone();
    }

    let dates_mentioned = signals::mentions_dates(question);
    if merged.date_start.is_missing() && merged.date_end.is_missing() && !dates_mentioned {
        merged.date_start = prior.date_start.clone();
        merged.date_end = prior.date_end.clone();
    }

    let session_mentioned = signals::mentions_session(question);
    if dates_mentioned && !session_mentioned {
        merged.session = SessionSel::Unconstrained;
    } else if merged.session == SessionSel::Unconstrained && !session_mentioned {
        merged.session = prior.session;
    }

    if merged.game.is_none() && !signals::mentions_game(question) {
        merged.game = prior.game;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::IsoDate;
    use crate::descriptor::{GameId, SessionId};
    use crate::metric::Metric;

    fn prior() -> QueryDescriptor {
        QueryDescriptor {
            patient: Slot::Set("46".into()),
            metric: Slot::Set(Metric::Area),
            date_start: Slot::Set(IsoDate::new(2022, 3, 1).unwrap()),
            date_end: Slot::Set(IsoDate::new(2022, 3, 24).unwrap()),
            game: GameId::new(0),
            session: SessionSel::Unconstrained,
        }
    }

    #[test]
    fn test_no_prior_is_identity() {
        let new = QueryDescriptor::default();
        assert_eq!(merge(new.clone(), "what about force?", None), new);
    }

    #[test]
    fn test_unset_unmentioned_fields_inherit() {
        let merged = merge(QueryDescriptor::default(), "and then?", Some(&prior()));
        assert_eq!(merged, prior());
    }

    #[test]
    fn test_text_metric_beats_parsed_metric() {
        let new = QueryDescriptor {
            metric: Slot::Set(Metric::Area),
            ..Default::default()
        };
        let merged = merge(new, "what about force?", Some(&prior()));
        assert_eq!(merged.metric, Slot::Set(Metric::AvgFPatient));
        assert_eq!(merged.patient, Slot::Set("46".into()));
    }

    #[test]
    fn test_mentioned_patient_not_inherited() {
        // The parser missed the patient but the text names one.
        let merged = merge(QueryDescriptor::default(), "same for patient 47", Some(&prior()));
        assert_eq!(merged.patient, Slot::Missing);
    }

    #[test]
    fn test_dates_only_inherit_as_pair() {
        let new = QueryDescriptor {
            date_start: Slot::Set(IsoDate::new(2022, 1, 1).unwrap()),
            ..Default::default()
        };
        let merged = merge(new, "and then?", Some(&prior()));
        assert_eq!(merged.date_start.get(), IsoDate::new(2022, 1, 1));
        assert_eq!(merged.date_end, Slot::Missing);
    }

    #[test]
    fn test_dates_without_session_drop_session() {
        let with_session = QueryDescriptor {
            session: SessionSel::One(SessionId::new(4)),
            ..prior()
        };
        let merged = merge(QueryDescriptor::default(), "what about since 1/4/22", Some(&with_session));
        assert_eq!(merged.session, SessionSel::Unconstrained);

        let merged = merge(QueryDescriptor::default(), "and the area?", Some(&with_session));
        assert_eq!(merged.session, SessionSel::One(SessionId::new(4)));
    }

    #[test]
    fn test_game_mention_blocks_inheritance() {
        let merged = merge(QueryDescriptor::default(), "in game 11 instead", Some(&prior()));
        assert_eq!(merged.game, None);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let state = ConversationState {
            last_query: Some(prior()),
            last_session_range: Some(SessionRange {
                start: SessionId::new(1),
                end: SessionId::new(7),
            }),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(ConversationState::default().is_empty());
    }
}
