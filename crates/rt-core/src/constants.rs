/// Highest allow-listed game number (`game0` ..= `game10`).
pub const MAX_GAME: u32 = 10;

/// Session numbers are accepted in `1..MAX_SESSION_EXCLUSIVE`.
pub const MAX_SESSION_EXCLUSIVE: u32 = 20_000;

/// Sentinel for a field the parser left unset.
pub const MISSING: &str = "__MISSING__";

/// Sentinel for "more than one value referenced".
pub const MULTI: &str = "__MULTI__";

/// Minimum share of non-flat steps in one direction to call a trend.
pub const TREND_SUPERMAJORITY: f64 = 0.8;

/// Noise floor for step deltas, as a fraction of the baseline mean.
pub const TREND_RELATIVE_EPSILON: f64 = 0.01;

/// Absolute noise floor for step deltas.
pub const TREND_MIN_EPSILON: f64 = 1e-6;

/// Fixed projection handed back to the narrator.
pub const RETURN_COLUMNS: [&str; 3] = ["date", "patient", "metric_value"];

/// Whole-message commands that clear conversation state.
pub const RESET_COMMANDS: [&str; 5] = [
    "reset",
    "reset context",
    "clear",
    "clear context",
    "new question",
];
