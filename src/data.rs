use std::{borrow::Cow, fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coerce::{self, Coerced};

/// One spreadsheet cell after normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_display(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Number(n) => Cow::Owned(format_number(*n)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_display())
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// A record keyed by canonical column name, in header order.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Row {
    cells: IndexMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `cell` under `key` unless a non-empty cell already sits there.
    pub fn insert(&mut self, key: impl Into<String>, cell: Cell) {
        let key = key.into();
        match self.cells.get_mut(&key) {
            Some(existing) if !existing.is_empty() => {}
            Some(existing) => *existing = cell,
            None => {
                self.cells.insert(key, cell);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.get(key)
    }

    /// Display form of the cell, `""` when absent.
    pub fn string(&self, key: &str) -> Cow<'_, str> {
        self.get(key)
            .map(Cell::as_display)
            .unwrap_or(Cow::Borrowed(""))
    }

    /// Numeric form of the cell, `0` when absent or unparseable.
    pub fn number(&self, key: &str) -> f64 {
        self.get(key).map(coerce::to_number).unwrap_or(0.0)
    }

    pub fn coerced(&self, key: &str) -> Coerced {
        self.get(key)
            .map(coerce::coerce_number)
            .unwrap_or_default()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(Cell::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, Cell)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (key, cell) in iter {
            row.insert(key, cell);
        }
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rows from one successful upload. Never mutated after construction.
#[derive(Debug)]
pub struct Dataset {
    id: DatasetId,
    source: String,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(source: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            id: DatasetId::new(),
            source: source.into(),
            headers,
            rows,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_cell_wins_on_duplicate_keys() {
        let mut row = Row::new();
        row.insert("Register Number", Cell::Empty);
        row.insert("Register Number", Cell::text("21CS001"));
        row.insert("Register Number", Cell::text("ignored"));
        assert_eq!(row.string("Register Number"), "21CS001");
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn accessors_default_for_absent_columns() {
        let row: Row = [("Dept", Cell::text("CSE"))].into_iter().collect();
        assert_eq!(row.string("Package"), "");
        assert_eq!(row.number("Package"), 0.0);
        assert!(!row.coerced("Package").was_coerced);
    }

    #[test]
    fn numbers_display_without_trailing_fraction() {
        assert_eq!(Cell::Number(60000.0).as_display(), "60000");
        assert_eq!(Cell::Number(4.5).as_display(), "4.5");
        assert_eq!(Cell::text(""), Cell::Empty);
    }

    #[test]
    fn datasets_get_distinct_ids() {
        let a = Dataset::new("a.csv", Vec::new(), Vec::new());
        let b = Dataset::new("a.csv", Vec::new(), Vec::new());
        assert_ne!(a.id(), b.id());
    }
}
