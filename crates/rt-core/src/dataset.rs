use crate::dates::IsoDate;
use crate::metric::Metric;

/// A raw metric cell as it came from the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Finite number or nothing. Text is parsed the way a spreadsheet
    /// export would be read; `inf`, `NaN` and `#NAME` all come back empty.
    pub fn finite(&self) -> Option<f64> {
        let v = match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Empty => return None,
        };
        v.is_finite().then_some(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            trimmed
                .parse::<f64>()
                .map(Cell::Number)
                .unwrap_or_else(|_| Cell::Text(trimmed.to_string()))
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

/// One source row. `values` is indexed like `Dataset::metric_columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: Option<IsoDate>,
    pub patient: String,
    pub game: String,
    pub session: String,
    pub values: Vec<Cell>,
}

/// Read-only, already-loaded table. Shared across turns; never mutated by
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    metric_columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(metric_columns: Vec<String>) -> Self {
        Self {
            metric_columns,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        debug_assert_eq!(record.values.len(), self.metric_columns.len());
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of the metric's column, if the provider supplied it.
    pub fn column_index(&self, metric: Metric) -> Option<usize> {
        self.metric_columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(metric.column()))
    }

    /// Records for one patient in one game, keys compared trimmed.
    pub fn patient_game<'a>(
        &'a self,
        patient: &'a str,
        game: &'a str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .iter()
            .filter(move |r| r.patient.trim() == patient.trim() && r.game.trim() == game)
    }
}

/// Builds small in-memory datasets; used by tests and by the store.
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    dataset: Dataset,
}

impl DatasetBuilder {
    pub fn with_metrics(metrics: &[Metric]) -> Self {
        Self {
            dataset: Dataset::new(metrics.iter().map(|m| m.column().to_string()).collect()),
        }
    }

    pub fn row(
        mut self,
        date: &str,
        patient: &str,
        game: &str,
        session: &str,
        values: Vec<Cell>,
    ) -> Self {
        self.dataset.push(Record {
            date: date.parse().ok(),
            patient: patient.to_string(),
            game: game.to_string(),
            session: session.to_string(),
            values,
        });
        self
    }

    pub fn build(self) -> Dataset {
        self.dataset
    }
}
