use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    coerce::{parse_lenient, to_number},
    data::Row,
    schema::Schema,
};

/// Sentinel accepted by exact-match filters meaning "no constraint".
pub const ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    All,
    Exact { value: String },
    Search { text: String },
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<String>,
    },
}

/// Current filter selections keyed by filter field. Ordered so that the
/// fingerprint does not depend on the order filters were set in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterState {
    constraints: BTreeMap<String, Constraint>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, constraint: Constraint) -> &mut Self {
        self.constraints.insert(field.into(), constraint);
        self
    }

    pub fn with(mut self, field: impl Into<String>, constraint: Constraint) -> Self {
        self.set(field, constraint);
        self
    }

    pub fn exact(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(
            field,
            Constraint::Exact {
                value: value.into(),
            },
        )
    }

    pub fn search(self, text: impl Into<String>) -> Self {
        self.with("search", Constraint::Search { text: text.into() })
    }

    pub fn range(self, field: impl Into<String>, min: Option<&str>, max: Option<&str>) -> Self {
        self.with(
            field,
            Constraint::Range {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
            },
        )
    }

    pub fn clear(&mut self, field: &str) {
        self.constraints.remove(field);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Structural SHA-256 of the state, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (field, constraint) in &self.constraints {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
            match constraint {
                Constraint::All => hasher.update(b"all"),
                Constraint::Exact { value } => {
                    hasher.update(b"exact\0");
                    hasher.update(value.as_bytes());
                }
                Constraint::Search { text } => {
                    hasher.update(b"search\0");
                    hasher.update(text.as_bytes());
                }
                Constraint::Range { min, max } => {
                    hasher.update(b"range\0");
                    hasher.update(min.as_deref().unwrap_or("\u{1}").as_bytes());
                    hasher.update([0u8]);
                    hasher.update(max.as_deref().unwrap_or("\u{1}").as_bytes());
                }
            }
            hasher.update([0xffu8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Exact { column: String, value: String },
    Search { needle: String },
    Range {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl Clause {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Clause::Exact { column, value } => row.string(column) == value.as_str(),
            Clause::Search { needle } => row
                .iter()
                .any(|(_, cell)| cell.as_display().to_lowercase().contains(needle.as_str())),
            Clause::Range { column, min, max } => {
                let value = row.number(column);
                min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
            }
        }
    }
}

/// Conjunction of the active constraints of a [`FilterState`].
#[derive(Debug, Clone, Default)]
pub struct RowPredicate {
    clauses: Vec<Clause>,
}

impl RowPredicate {
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| clause.matches(row))
    }

    /// True when every row passes.
    pub fn is_trivial(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn apply<'p, 'r: 'p>(&'p self, rows: &'r [Row]) -> impl Iterator<Item = &'r Row> + 'p {
        rows.iter().filter(move |row| self.matches(row))
    }
}

pub fn build_predicate(state: &FilterState, schema: &Schema) -> RowPredicate {
    let mut clauses = Vec::new();
    for (field, constraint) in state.iter() {
        match constraint {
            Constraint::All => {}
            Constraint::Exact { value } => {
                let value = crate::text::normalize(value);
                if value.is_empty() || value.eq_ignore_ascii_case(ALL) {
                    continue;
                }
                clauses.push(Clause::Exact {
                    column: schema.resolve(field),
                    value,
                });
            }
            Constraint::Search { text } => {
                let needle = text.trim().to_lowercase();
                if needle.is_empty() {
                    continue;
                }
                clauses.push(Clause::Search { needle });
            }
            Constraint::Range { min, max } => {
                let min = parse_bound(min.as_deref());
                let max = parse_bound(max.as_deref());
                if min.is_none() && max.is_none() {
                    continue;
                }
                clauses.push(Clause::Range {
                    column: schema.resolve(field),
                    min,
                    max,
                });
            }
        }
    }
    RowPredicate { clauses }
}

fn parse_bound(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(to_number(&crate::data::Cell::text(raw)))
}

/// Parses `column=value`, `column>=n` and `column<=n` into `state`. Bounds
/// on the same column merge into one range.
pub fn parse_filters(filters: &[String], state: &mut FilterState) -> Result<()> {
    for filter in filters {
        parse_filter(filter, state)?;
    }
    Ok(())
}

fn parse_filter(filter: &str, state: &mut FilterState) -> Result<()> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }

    for (needle, is_min) in [(">=", true), ("<=", false)] {
        if let Some(idx) = trimmed.find(needle) {
            let column = trimmed[..idx].trim();
            let bound = unquote(trimmed[idx + needle.len()..].trim());
            if column.is_empty() {
                return Err(anyhow!("Filter '{trimmed}' is missing a column name"));
            }
            if parse_lenient(bound).was_coerced {
                return Err(anyhow!("Filter '{trimmed}' bound '{bound}' is not numeric"));
            }
            let (mut min, mut max) = match state.constraints.get(column) {
                Some(Constraint::Range { min, max }) => (min.clone(), max.clone()),
                _ => (None, None),
            };
            if is_min {
                min = Some(bound.to_string());
            } else {
                max = Some(bound.to_string());
            }
            state.set(column, Constraint::Range { min, max });
            return Ok(());
        }
    }

    if let Some((column, value)) = trimmed.split_once('=') {
        let column = column.trim();
        if column.is_empty() {
            return Err(anyhow!("Filter '{trimmed}' is missing a column name"));
        }
        let value = unquote(value.trim());
        let constraint = if value.eq_ignore_ascii_case(ALL) {
            Constraint::All
        } else {
            Constraint::Exact {
                value: value.to_string(),
            }
        };
        state.set(column, constraint);
        return Ok(());
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Cell, schema::ValidationMode};

    fn schema() -> Schema {
        Schema::new("test", ValidationMode::Lenient, ["Dept", "Package"])
            .with_aliases("Dept", ["Department"])
    }

    fn row(dept: &str, package: &str, name: &str) -> Row {
        [
            ("Dept", Cell::text(dept)),
            ("Package", Cell::text(package)),
            ("Name", Cell::text(name)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn all_and_empty_are_no_ops() {
        let state = FilterState::new()
            .exact("Dept", "All")
            .exact("Batch", "")
            .search("  ")
            .range("Package", Some(""), None)
            .with("Gender", Constraint::All);
        assert!(build_predicate(&state, &schema()).is_trivial());
    }

    #[test]
    fn exact_match_resolves_aliases() {
        let predicate = build_predicate(&FilterState::new().exact("department", "CSE"), &schema());
        assert!(predicate.matches(&row("CSE", "1", "a")));
        assert!(!predicate.matches(&row("ECE", "1", "a")));
    }

    #[test]
    fn search_matches_any_cell_case_insensitively() {
        let predicate = build_predicate(&FilterState::new().search("PRIYA"), &schema());
        assert!(predicate.matches(&row("CSE", "1", "Priya S")));
        assert!(!predicate.matches(&row("CSE", "1", "Arun")));
    }

    #[test]
    fn range_bounds_are_inclusive_and_coerced() {
        let predicate = build_predicate(
            &FilterState::new().range("Package", Some("₹50,000"), Some("80000")),
            &schema(),
        );
        let passing: Vec<bool> = ["40000", "50000", "80000", "80001"]
            .iter()
            .map(|p| predicate.matches(&row("CSE", p, "x")))
            .collect();
        assert_eq!(passing, vec![false, true, true, false]);
    }

    #[test]
    fn constraints_compose_with_and() {
        let state = FilterState::new()
            .exact("Dept", "CSE")
            .range("Package", Some("50000"), None);
        let predicate = build_predicate(&state, &schema());
        assert!(predicate.matches(&row("CSE", "60000", "x")));
        assert!(!predicate.matches(&row("ECE", "60000", "x")));
        assert!(!predicate.matches(&row("CSE", "40000", "x")));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = FilterState::new().exact("Dept", "CSE").search("x");
        let b = FilterState::new().search("x").exact("Dept", "CSE");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), FilterState::new().fingerprint());
        let min_only = FilterState::new().range("Package", Some("5"), None);
        let max_only = FilterState::new().range("Package", None, Some("5"));
        assert_ne!(min_only.fingerprint(), max_only.fingerprint());
    }

    #[test]
    fn parse_filters_merges_bounds() {
        let mut state = FilterState::new();
        parse_filters(
            &[
                "Package>=50000".to_string(),
                "Package <= 90000".to_string(),
                "Dept = 'CSE'".to_string(),
                "Batch=all".to_string(),
            ],
            &mut state,
        )
        .expect("parse filters");
        let collected: Vec<_> = state.iter().collect();
        assert_eq!(
            collected,
            vec![
                ("Batch", &Constraint::All),
                (
                    "Dept",
                    &Constraint::Exact {
                        value: "CSE".to_string()
                    }
                ),
                (
                    "Package",
                    &Constraint::Range {
                        min: Some("50000".to_string()),
                        max: Some("90000".to_string())
                    }
                ),
            ]
        );
    }

    #[test]
    fn parse_filters_rejects_garbage() {
        let mut state = FilterState::new();
        assert!(parse_filters(&["Dept".to_string()], &mut state).is_err());
        assert!(parse_filters(&[">=5".to_string()], &mut state).is_err());
        assert!(parse_filters(&["Package>=lots".to_string()], &mut state).is_err());
    }
}
