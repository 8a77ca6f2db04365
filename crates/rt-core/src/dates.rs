//! Calendar dates over `chrono::NaiveDate`.
//!
//! Text-facing parsing recognizes five literal shapes: ISO date, ISO datetime,
//! day-first slashes/dashes, "7th November 2022" and "November 7, 2022".
//! Regexes find and classify the literals; chrono does the calendar work.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

const MONTHS: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static ISO_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})T\d{2}:\d{2}:\d{2}(?:\.\d+)?\b").unwrap()
});
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
static SLASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b").unwrap());
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTHS})\s+(\d{{4}})\b"
    ))
    .unwrap()
});
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .unwrap()
});

/// A calendar day, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsoDate(NaiveDate);

impl IsoDate {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Current UTC date.
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }
}

impl From<NaiveDate> for IsoDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for IsoDate {
    type Err = chrono::ParseError;

    /// Strict `YYYY-MM-DD`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }
}

fn full_match<'h>(re: &Regex, s: &'h str) -> Option<regex::Captures<'h>> {
    re.captures(s)
        .filter(|c| c.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()))
}

fn parse_with(text: &str, format: &str) -> Option<IsoDate> {
    NaiveDate::parse_from_str(text, format).ok().map(IsoDate)
}

/// Month names and abbreviations ("Sept" included) cut to chrono's `%b` form.
fn month_abbrev(name: &str) -> String {
    name.chars().take(3).collect()
}

/// Parse one date literal of any supported shape. Slashed dates are day-first.
pub fn parse_date(text: &str) -> Option<IsoDate> {
    let s = text.trim();

    if full_match(&ISO_DATETIME, s).is_some() {
        return NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| IsoDate(dt.date()));
    }
    if full_match(&ISO_DATE, s).is_some() {
        return parse_with(s, "%Y-%m-%d");
    }
    if let Some(c) = full_match(&SLASHED, s) {
        let year_format = match c[3].len() {
            2 => "%y",
            4 => "%Y",
            _ => return None,
        };
        return parse_with(&format!("{}/{}/{}", &c[1], &c[2], &c[3]), &format!("%d/%m/{year_format}"));
    }
    if let Some(c) = full_match(&DAY_MONTH_YEAR, s) {
        return parse_with(&format!("{} {} {}", &c[1], month_abbrev(&c[2]), &c[3]), "%d %b %Y");
    }
    if let Some(c) = full_match(&MONTH_DAY_YEAR, s) {
        return parse_with(&format!("{} {}, {}", month_abbrev(&c[1]), &c[2], &c[3]), "%b %d, %Y");
    }
    None
}

/// A date literal found in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateLiteral {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// All date literals in `text`, in reading order. Overlapping matches
/// (an ISO date inside an ISO datetime) keep the earliest, longest one.
pub fn extract_date_literals(text: &str) -> Vec<DateLiteral> {
    let mut found: Vec<DateLiteral> = [
        &*ISO_DATETIME,
        &*ISO_DATE,
        &*SLASHED,
        &*DAY_MONTH_YEAR,
        &*MONTH_DAY_YEAR,
    ]
    .into_iter()
    .flat_map(|re| re.find_iter(text))
    .map(|m| DateLiteral {
        start: m.start(),
        end: m.end(),
        text: m.as_str().to_string(),
    })
    .collect();

    found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out: Vec<DateLiteral> = Vec::new();
    for lit in found {
        if out.last().is_some_and(|prev| lit.start < prev.end) {
            continue;
        }
        out.push(lit);
    }
    out
}

const OPEN_ENDED_CUES: [&str; 4] = ["since", "from", "starting", "after"];

/// Date range stated in the question, if any.
///
/// One literal plus an open-ended cue runs from that date to `today`; two or
/// more literals take the first two in reading order.
pub fn apply_open_ended_dates(question: &str, today: IsoDate) -> Result<Option<(IsoDate, IsoDate)>> {
    let literals = extract_date_literals(question);
    let parse = |lit: &DateLiteral| {
        parse_date(&lit.text).ok_or_else(|| QueryError::InvalidDate(lit.text.clone()))
    };
    let lowered = question.to_lowercase();
    match literals.as_slice() {
        [only] if OPEN_ENDED_CUES.iter().any(|cue| lowered.contains(cue)) => {
            Ok(Some((parse(only)?, today)))
        }
        [first, second, ..] => Ok(Some((parse(first)?, parse(second)?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> IsoDate {
        IsoDate::new(y, m, day).unwrap()
    }

    #[test]
    fn test_today_is_recent() {
        assert!(IsoDate::today().year() >= 2024);
    }

    #[test]
    fn test_rejects_impossible_dates() {
        assert!(IsoDate::new(2023, 2, 29).is_none());
        assert!(IsoDate::new(2024, 2, 29).is_some());
        assert!(IsoDate::new(2024, 13, 1).is_none());
        assert!("2024-04-31".parse::<IsoDate>().is_err());
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(parse_date("2022-03-10"), Some(d(2022, 3, 10)));
        assert_eq!(parse_date("2022-11-07T09:51:02.000"), Some(d(2022, 11, 7)));
        assert_eq!(parse_date("10/3/22"), Some(d(2022, 3, 10)));
        assert_eq!(parse_date("24-03-2022"), Some(d(2022, 3, 24)));
        assert_eq!(parse_date("7th November 2022"), Some(d(2022, 11, 7)));
        assert_eq!(parse_date("Nov 7, 2022"), Some(d(2022, 11, 7)));
        assert_eq!(parse_date("Sept 7th, 2022"), Some(d(2022, 9, 7)));
        assert_eq!(parse_date("29/02/2024"), Some(d(2024, 2, 29)));
        assert_eq!(parse_date("29/02/2023"), None);
        assert_eq!(parse_date("10/3/202"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_extract_in_text_order() {
        let lits = extract_date_literals("from 10/3/22 to 2022-03-24T10:00:00 please");
        let texts: Vec<&str> = lits.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["10/3/22", "2022-03-24T10:00:00"]);
    }

    #[test]
    fn test_open_ended_range() {
        let today = d(2024, 6, 1);
        assert_eq!(
            apply_open_ended_dates("area since 7th November 2022", today).unwrap(),
            Some((d(2022, 11, 7), today))
        );
        assert_eq!(
            apply_open_ended_dates("between 1/3/22 and 2022-03-24", today).unwrap(),
            Some((d(2022, 3, 1), d(2022, 3, 24)))
        );
        assert_eq!(apply_open_ended_dates("area on 1/3/22", today).unwrap(), None);
        assert!(apply_open_ended_dates("since 31/02/22", today).is_err());
    }

    #[test]
    fn test_display_and_serde() {
        let date = d(2022, 1, 5);
        assert_eq!(date.to_string(), "2022-01-05");
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2022-01-05\"");
        let back: IsoDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
    }
}
