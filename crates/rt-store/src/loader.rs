//! CSV dataset provider.
//!
//! Key columns are `date`, `patient` (or `patient_id`), `game` and `session`;
//! every other column is kept as a metric column of raw cells. Dates in ISO
//! form are read as-is, anything else day-first.

use std::io;
use std::path::Path;

use chrono::NaiveDateTime;
use rt_core::{Cell, Dataset, IsoDate, Record, parse_date};

use crate::error::{Result, StoreError};

struct KeyColumns {
    date: usize,
    patient: usize,
    game: usize,
    session: usize,
}

fn locate(headers: &[String]) -> Result<KeyColumns> {
    let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
    let require = |names: &[&str]| {
        find(names).ok_or_else(|| {
            StoreError::InvalidData(format!("CSV must contain a '{}' column", names[0]))
        })
    };
    Ok(KeyColumns {
        date: require(&["date"])?,
        patient: require(&["patient", "patient_id"])?,
        game: require(&["game"])?,
        session: require(&["session"])?,
    })
}

/// Every shape `parse_date` knows, plus space-separated ISO timestamps.
fn parse_cell_date(raw: &str) -> Option<IsoDate> {
    let raw = raw.trim();
    parse_date(raw).or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|dt| IsoDate::from(dt.date()))
    })
}

/// Load a dataset from any CSV reader. `source` only labels log lines.
pub fn load_csv_reader<R: io::Read>(reader: R, source: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let keys = locate(&headers)?;

    let metric_idx: Vec<usize> = (0..headers.len())
        .filter(|i| ![keys.date, keys.patient, keys.game, keys.session].contains(i))
        .collect();
    let mut dataset = Dataset::new(metric_idx.iter().map(|&i| headers[i].clone()).collect());

    let mut bad_dates = 0usize;
    for result in reader.records() {
        let row = result?;
        let field = |i: usize| row.get(i).unwrap_or("").trim();

        let date = parse_cell_date(field(keys.date));
        if date.is_none() {
            bad_dates += 1;
        }
        dataset.push(Record {
            date,
            patient: field(keys.patient).to_string(),
            game: field(keys.game).to_string(),
            session: field(keys.session).to_string(),
            values: metric_idx.iter().map(|&i| Cell::from(field(i))).collect(),
        });
    }

    if bad_dates > 0 {
        tracing::warn!(
            source,
            bad_dates,
            "rows have unparseable dates and will be ignored in date filtering"
        );
    }
    tracing::info!(
        source,
        rows = dataset.len(),
        metric_columns = dataset.metric_columns().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

pub fn load_csv(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)?;
    load_csv_reader(io::BufReader::new(file), &path.display().to_string())
}
