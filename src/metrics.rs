//! Derived metrics: averages, percentages, rankings and gauges.
//!
//! Every function here is total. Empty lists average to `0`, a zero
//! denominator yields a `0` percentage, and nothing returns `NaN`.

use std::cmp::Ordering;

use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, Aggregation, Bucket, Grouping};

/// Rounds to the nearest integer, halves towards positive infinity.
pub fn round_half_up(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value + 0.5).floor() as i64
}

pub fn average(values: &[f64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    round_half_up(values.iter().sum::<f64>() / values.len() as f64)
}

/// `round(numerator / denominator * 100)`, clamped to `0..=100`.
pub fn percentage(numerator: f64, denominator: f64) -> i64 {
    if denominator == 0.0 {
        return 0;
    }
    round_half_up(numerator / denominator * 100.0).clamp(0, 100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gauge {
    pub value: i64,
    pub remaining: i64,
}

/// A percentage and its complement; `value + remaining == 100`.
pub fn gauge(percent: i64) -> Gauge {
    let value = percent.clamp(0, 100);
    Gauge {
        value,
        remaining: 100 - value,
    }
}

/// Stable descending sort by `metric`, truncated to `n`.
pub fn top_n<T, F>(mut items: Vec<T>, n: usize, metric: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    items.sort_by(|a, b| {
        metric(b)
            .partial_cmp(&metric(a))
            .unwrap_or(Ordering::Equal)
    });
    items.truncate(n);
    items
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Number(f64),
}

impl MetricValue {
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            MetricValue::Integer(0)
        } else if value.fract() == 0.0 && value.abs() < 9.0e15 {
            MetricValue::Integer(value as i64)
        } else {
            MetricValue::Number(value)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Integer(value) => value as f64,
            MetricValue::Number(value) => value,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(value) => write!(f, "{value}"),
            MetricValue::Number(value) => write!(f, "{value:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    /// Rows (or offers) in the bucket.
    Count,
    Field { field: String },
}

impl Operand {
    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field { field: name.into() }
    }

    fn read(&self, bucket: &Bucket) -> f64 {
        match self {
            Operand::Count => bucket.count as f64,
            Operand::Field { field } => bucket.total(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSpec {
    Count,
    Total { field: String },
    Average { field: String },
    Max { field: String },
    Min { field: String },
    Percentage { numerator: Operand, denominator: Operand },
    /// `100 -` an earlier percentage metric.
    Remaining { of: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: MetricSpec,
}

impl MetricDef {
    pub fn new(name: impl Into<String>, spec: MetricSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Output key: the snake-cased metric name.
    pub fn key(&self) -> String {
        self.name.to_snake_case()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSpec {
    pub name: String,
    pub dimension: String,
    /// Name of a metric defined on the view.
    pub metric: String,
    pub top: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSpec {
    pub name: String,
    pub numerator: Operand,
    pub denominator: Operand,
}

/// One finalized bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<String>,
    pub count: u64,
    pub metrics: IndexMap<String, MetricValue>,
}

impl BucketSummary {
    pub fn label(&self) -> String {
        match &self.inner {
            Some(inner) => format!("{} / {}", self.key, inner),
            None => self.key.clone(),
        }
    }

    pub fn metric(&self, key: &str) -> f64 {
        self.metrics.get(key).map(|m| m.as_f64()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionSummary {
    pub name: String,
    pub buckets: Vec<BucketSummary>,
    pub totals: IndexMap<String, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub key: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub name: String,
    pub dimension: String,
    pub metric: String,
    pub entries: Vec<RankEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeResult {
    pub name: String,
    #[serde(flatten)]
    pub gauge: Gauge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledMetrics {
    pub dimensions: Vec<DimensionSummary>,
    pub rankings: Vec<Ranking>,
    pub gauges: Vec<GaugeResult>,
    pub totals: IndexMap<String, MetricValue>,
}

pub fn compile_bucket(bucket: &Bucket, metrics: &[MetricDef]) -> BucketSummary {
    BucketSummary {
        key: bucket.key.clone(),
        inner: bucket.inner.clone(),
        count: bucket.count,
        metrics: evaluate(bucket, metrics),
    }
}

fn evaluate(bucket: &Bucket, metrics: &[MetricDef]) -> IndexMap<String, MetricValue> {
    let mut values: IndexMap<String, MetricValue> = IndexMap::with_capacity(metrics.len());
    for metric in metrics {
        let value = match &metric.spec {
            MetricSpec::Count => MetricValue::Integer(bucket.count as i64),
            MetricSpec::Total { field } => MetricValue::from_f64(bucket.total(field)),
            MetricSpec::Average { field } => MetricValue::Integer(average(bucket.values(field))),
            MetricSpec::Max { field } => {
                MetricValue::from_f64(bucket.values(field).iter().copied().fold(0.0, f64::max))
            }
            MetricSpec::Min { field } => {
                let list = bucket.values(field);
                let min = list.iter().copied().reduce(f64::min).unwrap_or(0.0);
                MetricValue::from_f64(min)
            }
            MetricSpec::Percentage {
                numerator,
                denominator,
            } => MetricValue::Integer(percentage(
                numerator.read(bucket),
                denominator.read(bucket),
            )),
            MetricSpec::Remaining { of } => {
                let key = of.to_snake_case();
                let base = values.get(&key).map(|v| v.as_f64()).unwrap_or(0.0);
                MetricValue::Integer(gauge(round_half_up(base)).remaining)
            }
        };
        values.insert(metric.key(), value);
    }
    values
}

fn summarize(name: &str, grouping: &Grouping, metrics: &[MetricDef]) -> DimensionSummary {
    let totals = aggregate::merge_all(grouping, "TOTAL")
        .map(|merged| evaluate(&merged, metrics))
        .unwrap_or_default();
    DimensionSummary {
        name: name.to_string(),
        buckets: grouping
            .values()
            .map(|bucket| compile_bucket(bucket, metrics))
            .collect(),
        totals,
    }
}

pub fn rank(summary: &DimensionSummary, spec: &RankingSpec) -> Ranking {
    let metric_key = spec.metric.to_snake_case();
    let ranked = top_n(summary.buckets.iter().collect(), spec.top, |bucket| {
        bucket.metric(&metric_key)
    });
    Ranking {
        name: spec.name.clone(),
        dimension: spec.dimension.clone(),
        metric: metric_key.clone(),
        entries: ranked
            .into_iter()
            .map(|bucket| RankEntry {
                key: bucket.label(),
                value: bucket
                    .metrics
                    .get(&metric_key)
                    .copied()
                    .unwrap_or(MetricValue::Integer(0)),
            })
            .collect(),
    }
}

pub fn compile(
    aggregation: &Aggregation,
    metrics: &[MetricDef],
    rankings: &[RankingSpec],
    gauges: &[GaugeSpec],
) -> CompiledMetrics {
    let dimensions: Vec<DimensionSummary> = aggregation
        .groupings
        .iter()
        .map(|(name, grouping)| summarize(name, grouping, metrics))
        .collect();
    let rankings = rankings
        .iter()
        .filter_map(|spec| {
            dimensions
                .iter()
                .find(|summary| summary.name == spec.dimension)
                .map(|summary| rank(summary, spec))
        })
        .collect();
    let gauges = gauges
        .iter()
        .map(|spec| GaugeResult {
            name: spec.name.clone(),
            gauge: gauge(percentage(
                spec.numerator.read(&aggregation.totals),
                spec.denominator.read(&aggregation.totals),
            )),
        })
        .collect();
    CompiledMetrics {
        dimensions,
        rankings,
        gauges,
        totals: evaluate(&aggregation.totals, metrics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::{DimensionKey, FieldSpec, aggregate},
        data::{Cell, Row},
    };
    use proptest::prelude::*;

    #[test]
    fn average_rounds_and_guards_empty() {
        assert_eq!(average(&[]), 0);
        assert_eq!(average(&[1.0, 2.0]), 2);
        assert_eq!(average(&[300000.0, 450000.0, 520000.0]), 423333);
    }

    #[test]
    fn percentage_guards_zero_denominator() {
        assert_eq!(percentage(5.0, 0.0), 0);
        assert_eq!(percentage(2.0, 3.0), 67);
        assert_eq!(percentage(1.0, 8.0), 13);
        assert_eq!(percentage(9.0, 3.0), 100);
    }

    #[test]
    fn gauge_complements_degenerate_values() {
        assert_eq!(gauge(0), Gauge { value: 0, remaining: 100 });
        assert_eq!(gauge(67), Gauge { value: 67, remaining: 33 });
    }

    #[test]
    fn top_n_is_stable_on_ties() {
        let items = vec![("a", 5.0), ("b", 9.0), ("c", 5.0), ("d", 1.0), ("e", 9.0)];
        let ranked = top_n(items, 4, |(_, v)| *v);
        let keys: Vec<_> = ranked.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "e", "a", "c"]);
    }

    #[test]
    fn compile_produces_percentages_and_rankings() {
        let rows: Vec<Row> = [("CSE", 100.0, 80.0), ("ECE", 50.0, 40.0), ("CSE", 20.0, 5.0)]
            .iter()
            .map(|(dept, total, placed)| {
                [
                    ("Dept", Cell::text(*dept)),
                    ("Total", Cell::Number(*total)),
                    ("Placed", Cell::Number(*placed)),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        let fields = [
            FieldSpec::sum("total", "Total"),
            FieldSpec::sum("placed", "Placed"),
        ];
        let metrics = [
            MetricDef::new("Total", MetricSpec::Total { field: "total".into() }),
            MetricDef::new(
                "Placed Percent",
                MetricSpec::Percentage {
                    numerator: Operand::field("placed"),
                    denominator: Operand::field("total"),
                },
            ),
            MetricDef::new(
                "Balance Percent",
                MetricSpec::Remaining {
                    of: "Placed Percent".into(),
                },
            ),
        ];
        let grouping = aggregate(&rows, &DimensionKey::column("Dept"), &fields);
        let summary = summarize("department", &grouping, &metrics);
        assert_eq!(summary.buckets[0].metric("placed_percent"), 71.0);
        assert_eq!(summary.buckets[0].metric("balance_percent"), 29.0);
        assert_eq!(summary.totals["total"], MetricValue::Integer(170));

        let ranking = rank(
            &summary,
            &RankingSpec {
                name: "best".into(),
                dimension: "department".into(),
                metric: "Placed Percent".into(),
                top: 5,
            },
        );
        let keys: Vec<_> = ranking.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["ECE", "CSE"]);
    }

    proptest! {
        #[test]
        fn percentage_stays_in_bounds(num in 0u32..10_000, den in 0u32..10_000) {
            let p = percentage(f64::from(num.min(den)), f64::from(den));
            prop_assert!((0..=100).contains(&p));
            let pair = gauge(p);
            prop_assert_eq!(pair.value + pair.remaining, 100);
        }

        #[test]
        fn top_n_is_bounded_and_sorted(
            values in proptest::collection::vec(0u32..50, 0..40),
            n in 0usize..25,
        ) {
            let ranked = top_n(values.clone(), n, |v| f64::from(*v));
            prop_assert!(ranked.len() <= n);
            prop_assert!(ranked.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
