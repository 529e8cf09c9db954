//! Single-pass grouping of filtered rows along categorical dimensions.
//!
//! An [`Aggregator`] is fed every filtered row exactly once. Each row updates
//! one bucket per configured dimension plus the whole-set totals, so the cost
//! is O(rows × fields) however many dimensions a view asks for. Buckets are
//! created on first sight and kept in encounter order.
//!
//! The `offers` dimension is the exception to "one bucket per row": a student
//! with three company offers contributes to three company buckets, and that
//! dimension's counts add up to offers rather than rows.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    coerce::{self, Offer},
    data::Row,
};

/// Bucket key for rows whose dimension cell is missing or empty.
pub const NA_KEY: &str = "NA";

const COMPOSITE_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DimensionKey {
    Column { column: String },
    Composite { outer: String, inner: String },
    Offers,
}

impl DimensionKey {
    pub fn column(column: impl Into<String>) -> Self {
        DimensionKey::Column {
            column: column.into(),
        }
    }

    pub fn composite(outer: impl Into<String>, inner: impl Into<String>) -> Self {
        DimensionKey::Composite {
            outer: outer.into(),
            inner: inner.into(),
        }
    }

    /// One column groups directly; two compose outer × inner.
    pub fn from_columns(columns: &[&str]) -> Option<Self> {
        match columns {
            [column] => Some(Self::column(*column)),
            [outer, inner] => Some(Self::composite(*outer, *inner)),
            _ => None,
        }
    }

    /// Columns this key reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            DimensionKey::Column { column } => vec![column.as_str()],
            DimensionKey::Composite { outer, inner } => vec![outer.as_str(), inner.as_str()],
            DimensionKey::Offers => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub key: DimensionKey,
}

impl Dimension {
    pub fn new(name: impl Into<String>, key: DimensionKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSource {
    Column { column: String },
    /// The offer's salary inside the `offers` dimension, otherwise the
    /// row's best offer salary.
    OfferSalary,
    /// `1` inside the `offers` dimension, otherwise the row's offer count.
    OfferCount,
}

impl ValueSource {
    pub fn column(column: impl Into<String>) -> Self {
        ValueSource::Column {
            column: column.into(),
        }
    }

    fn needs_offers(&self) -> bool {
        !matches!(self, ValueSource::Column { .. })
    }

    fn read(&self, contribution: &Contribution<'_>) -> f64 {
        match self {
            ValueSource::Column { column } => contribution.row.number(column),
            ValueSource::OfferSalary => match contribution.offer {
                Some(offer) => offer.salary,
                None => contribution
                    .offers
                    .iter()
                    .map(|offer| offer.salary)
                    .fold(0.0, f64::max),
            },
            ValueSource::OfferCount => match contribution.offer {
                Some(_) => 1.0,
                None => contribution.offers.len() as f64,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Substring status inference; see [`coerce::is_placed`].
    Placed { column: String },
    /// Case-insensitive equality with the normalized cell.
    Equals { column: String, value: String },
    NonEmpty { column: String },
    Positive { source: ValueSource },
}

impl Condition {
    fn holds(&self, contribution: &Contribution<'_>) -> bool {
        let row = contribution.row;
        match self {
            Condition::Placed { column } => row.get(column).is_some_and(coerce::is_placed),
            Condition::Equals { column, value } => {
                row.string(column).to_lowercase() == value.to_lowercase()
            }
            Condition::NonEmpty { column } => row.get(column).is_some_and(|c| !c.is_empty()),
            Condition::Positive { source } => source.read(contribution) > 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldOp {
    Sum {
        source: ValueSource,
    },
    CountIf {
        condition: Condition,
    },
    /// Keeps every value for later averaging or ranking. Zero values are
    /// skipped unless `include_zero` is set.
    Collect {
        source: ValueSource,
        #[serde(default)]
        include_zero: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub op: FieldOp,
}

impl FieldSpec {
    pub fn sum(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::sum_of(name, ValueSource::column(column))
    }

    pub fn sum_of(name: impl Into<String>, source: ValueSource) -> Self {
        Self {
            name: name.into(),
            op: FieldOp::Sum { source },
        }
    }

    pub fn count_if(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            op: FieldOp::CountIf { condition },
        }
    }

    pub fn collect(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::collect_of(name, ValueSource::column(column))
    }

    pub fn collect_of(name: impl Into<String>, source: ValueSource) -> Self {
        Self {
            name: name.into(),
            op: FieldOp::Collect {
                source,
                include_zero: false,
            },
        }
    }

    fn needs_offers(&self) -> bool {
        match &self.op {
            FieldOp::Sum { source } | FieldOp::Collect { source, .. } => source.needs_offers(),
            FieldOp::CountIf {
                condition: Condition::Positive { source },
            } => source.needs_offers(),
            FieldOp::CountIf { .. } => false,
        }
    }

    /// Column whose coercion quality this field depends on, if numeric.
    fn numeric_column(&self) -> Option<&str> {
        match &self.op {
            FieldOp::Sum {
                source: ValueSource::Column { column },
            }
            | FieldOp::Collect {
                source: ValueSource::Column { column },
                ..
            }
            | FieldOp::CountIf {
                condition:
                    Condition::Positive {
                        source: ValueSource::Column { column },
                    },
            } => Some(column.as_str()),
            _ => None,
        }
    }

    fn empty_accumulator(&self) -> Accumulator {
        match self.op {
            FieldOp::Sum { .. } => Accumulator::Sum(0.0),
            FieldOp::CountIf { .. } => Accumulator::Count(0),
            FieldOp::Collect { .. } => Accumulator::List(Vec::new()),
        }
    }

    fn update(&self, accumulator: &mut Accumulator, contribution: &Contribution<'_>) {
        match (&self.op, accumulator) {
            (FieldOp::Sum { source }, Accumulator::Sum(total)) => {
                *total += source.read(contribution);
            }
            (FieldOp::CountIf { condition }, Accumulator::Count(count)) => {
                if condition.holds(contribution) {
                    *count += 1;
                }
            }
            (
                FieldOp::Collect {
                    source,
                    include_zero,
                },
                Accumulator::List(values),
            ) => {
                let value = source.read(contribution);
                if *include_zero || value != 0.0 {
                    values.push(value);
                }
            }
            (op, accumulator) => {
                debug!("Field '{}' ({op:?}) cannot update {accumulator:?}", self.name);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Accumulator {
    Sum(f64),
    Count(u64),
    List(Vec<f64>),
}

impl Accumulator {
    /// Numeric total: the sum, the count, or the sum of the list.
    pub fn total(&self) -> f64 {
        match self {
            Accumulator::Sum(value) => *value,
            Accumulator::Count(count) => *count as f64,
            Accumulator::List(values) => values.iter().sum(),
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Accumulator::List(values) => values,
            _ => &[],
        }
    }

    fn merge(&mut self, other: &Accumulator) {
        match (self, other) {
            (Accumulator::Sum(a), Accumulator::Sum(b)) => *a += b,
            (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (Accumulator::List(a), Accumulator::List(b)) => a.extend_from_slice(b),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<String>,
    pub count: u64,
    pub fields: IndexMap<String, Accumulator>,
}

impl Bucket {
    fn new(key: String, inner: Option<String>, fields: &[FieldSpec]) -> Self {
        Self {
            key,
            inner,
            count: 0,
            fields: fields
                .iter()
                .map(|field| (field.name.clone(), field.empty_accumulator()))
                .collect(),
        }
    }

    fn record(&mut self, fields: &[FieldSpec], contribution: &Contribution<'_>) {
        self.count += 1;
        for field in fields {
            if let Some(accumulator) = self.fields.get_mut(&field.name) {
                field.update(accumulator, contribution);
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&Accumulator> {
        self.fields.get(name)
    }

    /// Field total, `0` for unknown fields.
    pub fn total(&self, name: &str) -> f64 {
        self.field(name).map(Accumulator::total).unwrap_or(0.0)
    }

    pub fn values(&self, name: &str) -> &[f64] {
        self.field(name).map(Accumulator::values).unwrap_or(&[])
    }

    /// `key` for single dimensions, `key / inner` for composite ones.
    pub fn label(&self) -> String {
        match &self.inner {
            Some(inner) => format!("{} / {}", self.key, inner),
            None => self.key.clone(),
        }
    }
}

pub type Grouping = IndexMap<String, Bucket>;

struct Contribution<'a> {
    row: &'a Row,
    offer: Option<&'a Offer>,
    offers: &'a [Offer],
}

fn key_for(row: &Row, column: &str) -> String {
    let value = row.string(column);
    if value.is_empty() {
        NA_KEY.to_string()
    } else {
        value.into_owned()
    }
}

fn bucket_for<'g>(
    grouping: &'g mut Grouping,
    key: String,
    inner: Option<String>,
    fields: &[FieldSpec],
) -> &'g mut Bucket {
    let map_key = match &inner {
        Some(inner) => format!("{key}{COMPOSITE_SEPARATOR}{inner}"),
        None => key.clone(),
    };
    grouping
        .entry(map_key)
        .or_insert_with(|| Bucket::new(key, inner, fields))
}

/// Everything one pass produced: a grouping per dimension plus totals over
/// all filtered rows.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub groupings: IndexMap<String, Grouping>,
    pub totals: Bucket,
    pub rows: u64,
    pub coerced_cells: IndexMap<String, u64>,
}

impl Aggregation {
    pub fn grouping(&self, dimension: &str) -> Option<&Grouping> {
        self.groupings.get(dimension)
    }
}

pub struct Aggregator<'a> {
    dimensions: &'a [Dimension],
    fields: &'a [FieldSpec],
    needs_offers: bool,
    numeric_columns: Vec<String>,
    groupings: Vec<Grouping>,
    totals: Bucket,
    coerced_cells: IndexMap<String, u64>,
}

impl<'a> Aggregator<'a> {
    pub fn new(dimensions: &'a [Dimension], fields: &'a [FieldSpec]) -> Self {
        let needs_offers = fields.iter().any(FieldSpec::needs_offers)
            || dimensions
                .iter()
                .any(|dimension| dimension.key == DimensionKey::Offers);
        let mut numeric_columns: Vec<String> = Vec::new();
        for column in fields.iter().filter_map(FieldSpec::numeric_column) {
            if !numeric_columns.iter().any(|c| c == column) {
                numeric_columns.push(column.to_string());
            }
        }
        Self {
            dimensions,
            fields,
            needs_offers,
            numeric_columns,
            groupings: vec![Grouping::new(); dimensions.len()],
            totals: Bucket::new("TOTAL".to_string(), None, fields),
            coerced_cells: IndexMap::new(),
        }
    }

    pub fn push(&mut self, row: &Row) {
        let offers = if self.needs_offers {
            coerce::company_offers(row)
        } else {
            Vec::new()
        };
        let whole_row = Contribution {
            row,
            offer: None,
            offers: &offers,
        };
        self.totals.record(self.fields, &whole_row);

        for column in &self.numeric_columns {
            if row.coerced(column).was_coerced {
                *self.coerced_cells.entry(column.clone()).or_insert(0) += 1;
            }
        }

        for (dimension, grouping) in self.dimensions.iter().zip(self.groupings.iter_mut()) {
            match &dimension.key {
                DimensionKey::Column { column } => {
                    bucket_for(grouping, key_for(row, column), None, self.fields)
                        .record(self.fields, &whole_row);
                }
                DimensionKey::Composite { outer, inner } => {
                    let inner = Some(key_for(row, inner));
                    bucket_for(grouping, key_for(row, outer), inner, self.fields)
                        .record(self.fields, &whole_row);
                }
                DimensionKey::Offers => {
                    for offer in &offers {
                        let contribution = Contribution {
                            row,
                            offer: Some(offer),
                            offers: &offers,
                        };
                        bucket_for(grouping, offer.company.clone(), None, self.fields)
                            .record(self.fields, &contribution);
                    }
                }
            }
        }
    }

    pub fn finish(self) -> Aggregation {
        let groupings = self
            .dimensions
            .iter()
            .map(|dimension| dimension.name.clone())
            .zip(self.groupings)
            .collect();
        Aggregation {
            groupings,
            rows: self.totals.count,
            totals: self.totals,
            coerced_cells: self.coerced_cells,
        }
    }
}

/// Groups `rows` along one dimension key.
pub fn aggregate<'r, I>(rows: I, key: &DimensionKey, fields: &[FieldSpec]) -> Grouping
where
    I: IntoIterator<Item = &'r Row>,
{
    let dimensions = [Dimension::new("dimension", key.clone())];
    let mut aggregator = Aggregator::new(&dimensions, fields);
    for row in rows {
        aggregator.push(row);
    }
    aggregator
        .finish()
        .groupings
        .into_values()
        .next()
        .unwrap_or_default()
}

/// Folds the composite buckets of `grouping` back onto their outer keys.
pub fn roll_up(grouping: &Grouping) -> Grouping {
    let mut rolled = Grouping::new();
    for bucket in grouping.values() {
        let target = rolled.entry(bucket.key.clone()).or_insert_with(|| Bucket {
            key: bucket.key.clone(),
            inner: None,
            count: 0,
            fields: bucket
                .fields
                .iter()
                .map(|(name, acc)| {
                    let empty = match acc {
                        Accumulator::Sum(_) => Accumulator::Sum(0.0),
                        Accumulator::Count(_) => Accumulator::Count(0),
                        Accumulator::List(_) => Accumulator::List(Vec::new()),
                    };
                    (name.clone(), empty)
                })
                .collect(),
        });
        target.count += bucket.count;
        for (name, acc) in &bucket.fields {
            if let Some(existing) = target.fields.get_mut(name) {
                existing.merge(acc);
            }
        }
    }
    rolled
}

/// All buckets of `grouping` merged into one, keyed `key`.
pub fn merge_all(grouping: &Grouping, key: &str) -> Option<Bucket> {
    let mut buckets = grouping.values();
    let mut merged = buckets.next()?.clone();
    merged.key = key.to_string();
    merged.inner = None;
    for bucket in buckets {
        merged.count += bucket.count;
        for (name, acc) in &bucket.fields {
            if let Some(existing) = merged.fields.get_mut(name) {
                existing.merge(acc);
            }
        }
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn rows(depts: &[Option<&str>], totals: &[f64]) -> Vec<Row> {
        depts
            .iter()
            .zip(totals)
            .map(|(dept, total)| {
                let mut row = Row::new();
                if let Some(dept) = dept {
                    row.insert("Dept", Cell::text(*dept));
                }
                row.insert("Total", Cell::Number(*total));
                row
            })
            .collect()
    }

    #[test]
    fn groups_in_encounter_order_with_sums() {
        let data = rows(&[Some("CSE"), Some("ECE"), Some("CSE")], &[100.0, 80.0, 50.0]);
        let grouping = aggregate(
            &data,
            &DimensionKey::column("Dept"),
            &[FieldSpec::sum("total", "Total")],
        );
        let keys: Vec<_> = grouping.keys().cloned().collect();
        assert_eq!(keys, vec!["CSE".to_string(), "ECE".to_string()]);
        assert_eq!(grouping["CSE"].count, 2);
        assert_eq!(grouping["CSE"].total("total"), 150.0);
        assert_eq!(grouping["ECE"].total("total"), 80.0);
    }

    #[test]
    fn missing_and_empty_keys_group_under_na() {
        let mut data = rows(&[None, Some("CSE")], &[1.0, 2.0]);
        data.push([("Dept", Cell::Empty)].into_iter().collect());
        let grouping = aggregate(&data, &DimensionKey::column("Dept"), &[]);
        assert_eq!(grouping[NA_KEY].count, 2);
        let counted: u64 = grouping.values().map(|b| b.count).sum();
        assert_eq!(counted, data.len() as u64);
    }

    #[test]
    fn composite_keys_keep_both_parts_and_roll_up() {
        let data: Vec<Row> = [("CSE", "MQ"), ("CSE", "GQ"), ("ECE", "MQ"), ("CSE", "MQ")]
            .iter()
            .map(|(dept, quota)| {
                [("Dept", Cell::text(*dept)), ("Quota", Cell::text(*quota))]
                    .into_iter()
                    .collect()
            })
            .collect();
        let key = DimensionKey::from_columns(&["Dept", "Quota"]).expect("two columns");
        let grouping = aggregate(&data, &key, &[]);
        assert_eq!(grouping.len(), 3);
        let first = grouping.values().next().expect("bucket");
        assert_eq!(first.key, "CSE");
        assert_eq!(first.inner.as_deref(), Some("MQ"));
        assert_eq!(first.count, 2);
        assert_eq!(first.label(), "CSE / MQ");

        let rolled = roll_up(&grouping);
        assert_eq!(rolled["CSE"].count, 3);
        assert_eq!(rolled["ECE"].count, 1);
    }

    #[test]
    fn count_if_and_collect_update_in_one_pass() {
        let data: Vec<Row> = [
            ("Placed", "₹4,00,000"),
            ("Not Placed", ""),
            ("Higher Studies", "n/a"),
        ]
        .iter()
        .map(|(status, package)| {
            [
                ("Dept", Cell::text("CSE")),
                ("Placement Status", Cell::text(*status)),
                ("Package", Cell::text(*package)),
            ]
            .into_iter()
            .collect()
        })
        .collect();
        let fields = [
            FieldSpec::count_if(
                "placed",
                Condition::Placed {
                    column: "Placement Status".to_string(),
                },
            ),
            FieldSpec::collect("packages", "Package"),
        ];
        let dimensions = [Dimension::new("department", DimensionKey::column("Dept"))];
        let mut aggregator = Aggregator::new(&dimensions, &fields);
        for row in &data {
            aggregator.push(row);
        }
        let aggregation = aggregator.finish();
        let bucket = &aggregation.grouping("department").expect("grouping")["CSE"];
        assert_eq!(bucket.total("placed"), 2.0);
        assert_eq!(bucket.values("packages"), &[400000.0]);
        assert_eq!(aggregation.rows, 3);
        assert_eq!(aggregation.coerced_cells.get("Package"), Some(&1));
        assert_eq!(aggregation.totals.total("placed"), 2.0);
    }

    #[test]
    fn offers_dimension_explodes_rows() {
        let data: Vec<Row> = vec![
            [
                ("Company 1", Cell::text("TCS")),
                ("Salary (Company 1)", Cell::Number(350000.0)),
                ("Company 2", Cell::text("Zoho")),
                ("Salary (Company 2)", Cell::Number(600000.0)),
            ]
            .into_iter()
            .collect(),
            [
                ("Company 1", Cell::text("Zoho")),
                ("Salary (Company 1)", Cell::Number(650000.0)),
            ]
            .into_iter()
            .collect(),
            Row::new(),
        ];
        let fields = [
            FieldSpec::sum_of("offers", ValueSource::OfferCount),
            FieldSpec::collect_of("salaries", ValueSource::OfferSalary),
        ];
        let grouping = aggregate(&data, &DimensionKey::Offers, &fields);
        assert_eq!(grouping["Zoho"].count, 2);
        assert_eq!(grouping["Zoho"].values("salaries"), &[600000.0, 650000.0]);
        assert_eq!(grouping["TCS"].total("offers"), 1.0);

        let per_row = aggregate(&data, &DimensionKey::column("Dept"), &fields);
        assert_eq!(per_row[NA_KEY].total("offers"), 3.0);
        assert_eq!(per_row[NA_KEY].values("salaries"), &[600000.0, 650000.0]);
    }

    #[test]
    fn field_specs_load_from_yaml() {
        let yaml = "- name: placed\n  kind: count_if\n  condition:\n    kind: placed\n    column: Placement Status\n- name: total\n  kind: sum\n  source:\n    kind: column\n    column: Total\n";
        let fields: Vec<FieldSpec> = serde_yaml::from_str(yaml).expect("parse fields");
        assert_eq!(fields[1], FieldSpec::sum("total", "Total"));
        assert!(matches!(fields[0].op, FieldOp::CountIf { .. }));
    }
}
