//! Conversational query resolution over per-patient rehabilitation-game data.
//!
//! Turns free-form, multi-turn questions into typed query descriptors,
//! carries context between turns, resolves relative session references
//! against the data's own ordering, and reduces the fetched rows to point
//! values, grouped trend summaries, or two-session comparisons.
//!
//! Zero I/O: the dataset arrives already loaded, conversation state is an
//! explicit value the caller threads through, and nothing here formats
//! sentences.

pub mod compare;
pub mod constants;
pub mod context;
pub mod dataset;
pub mod dates;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod metric;
pub mod parser;
pub mod relative;
pub mod signals;
pub mod summarize;
pub mod turn;

pub use compare::{ComparisonReport, compare};
pub use context::{ConversationState, merge};
pub use dataset::{Cell, Dataset, DatasetBuilder, Record};
pub use dates::{IsoDate, parse_date};
pub use descriptor::{
    GameId, QueryDescriptor, RawQuery, RawSession, SessionId, SessionRange, SessionSel, Slot,
};
pub use error::{ErrorKind, QueryError};
pub use fetch::{Row, fetch, fetch_session_range};
pub use metric::Metric;
pub use parser::{DeterministicParser, QueryParser};
pub use relative::resolve;
pub use signals::RelativeCue;
pub use summarize::{
    GroupSummary, PointResult, SeriesSummary, Trend, TrendLabel, classify_trend, is_point,
    point_result, summarize_session_range, summarize_timeseries,
};
pub use turn::{Engine, PendingTurn, Step, TurnOutcome, TurnResult};
