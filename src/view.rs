//! Schema-parameterized dashboard pipeline.
//!
//! A [`ViewDefinition`] is everything one dashboard needs: its [`Schema`],
//! the dimensions to group by, the fields to accumulate, and the metrics,
//! rankings and gauges to derive. [`ViewDefinition::run`] is a pure function
//! of the dataset and the filter state.
//!
//! Column names in a definition may be written with any alias the schema
//! knows; they are resolved once in [`ViewDefinition::resolved`].

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{Aggregator, Condition, Dimension, DimensionKey, FieldOp, FieldSpec, ValueSource},
    data::{Dataset, DatasetId, Row},
    filter::{FilterState, build_predicate},
    metrics::{
        self, DimensionSummary, GaugeResult, GaugeSpec, MetricDef, MetricSpec, MetricValue,
        Operand, Ranking, RankingSpec,
    },
    schema::Schema,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub metrics: Vec<MetricDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rankings: Vec<RankingSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gauges: Vec<GaugeSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQuality {
    /// Non-empty cells per column that fell back to `0`.
    pub coerced_cells: IndexMap<String, u64>,
    /// Columns the view reads that the dataset does not have.
    pub missing_columns: Vec<String>,
    /// Inputs inferred with reduced accuracy.
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub view: String,
    pub dataset_id: DatasetId,
    pub source: String,
    pub rows_total: usize,
    pub rows_matched: u64,
    pub dimensions: Vec<DimensionSummary>,
    pub rankings: Vec<Ranking>,
    pub gauges: Vec<GaugeResult>,
    pub totals: IndexMap<String, MetricValue>,
    pub data_quality: DataQuality,
}

impl AggregationResult {
    pub fn dimension(&self, name: &str) -> Option<&DimensionSummary> {
        self.dimensions.iter().find(|summary| summary.name == name)
    }

    pub fn ranking(&self, name: &str) -> Option<&Ranking> {
        self.rankings.iter().find(|ranking| ranking.name == name)
    }

    pub fn gauge(&self, name: &str) -> Option<&GaugeResult> {
        self.gauges.iter().find(|gauge| gauge.name == name)
    }
}

impl ViewDefinition {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            description: String::new(),
            dimensions: Vec::new(),
            fields: Vec::new(),
            metrics: Vec::new(),
            rankings: Vec::new(),
            gauges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening view file {path:?}"))?;
        let reader = BufReader::new(file);
        let view: ViewDefinition =
            serde_yaml::from_reader(reader).context("Parsing view definition YAML")?;
        view.check_references()?;
        Ok(view)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating view file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing view definition YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing view definition to YAML string")
    }

    /// Rejects rankings on unknown dimensions or metrics and metrics over
    /// unknown fields.
    pub fn check_references(&self) -> Result<()> {
        let field_names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        if let Some(duplicate) = field_names.iter().duplicates().next() {
            bail!(
                "View '{}' defines field '{duplicate}' more than once",
                self.name()
            );
        }
        if let Some(duplicate) = self.metrics.iter().map(MetricDef::key).duplicates().next() {
            bail!(
                "View '{}' defines more than one metric with key '{duplicate}'",
                self.name()
            );
        }
        if let Some(duplicate) =
            self.dimensions.iter().map(|d| d.name.as_str()).duplicates().next()
        {
            bail!(
                "View '{}' defines dimension '{duplicate}' more than once",
                self.name()
            );
        }
        for metric in &self.metrics {
            let mut referenced: Vec<&str> = Vec::new();
            match &metric.spec {
                MetricSpec::Total { field }
                | MetricSpec::Average { field }
                | MetricSpec::Max { field }
                | MetricSpec::Min { field } => referenced.push(field),
                MetricSpec::Percentage {
                    numerator,
                    denominator,
                } => {
                    for operand in [numerator, denominator] {
                        if let Operand::Field { field } = operand {
                            referenced.push(field);
                        }
                    }
                }
                MetricSpec::Count | MetricSpec::Remaining { .. } => {}
            }
            if let Some(unknown) = referenced.iter().find(|f| !field_names.contains(f)) {
                bail!(
                    "Metric '{}' in view '{}' references unknown field '{unknown}'",
                    metric.name,
                    self.name()
                );
            }
        }
        for ranking in &self.rankings {
            if !self.dimensions.iter().any(|d| d.name == ranking.dimension) {
                bail!(
                    "Ranking '{}' references unknown dimension '{}'",
                    ranking.name,
                    ranking.dimension
                );
            }
            if !self.metrics.iter().any(|m| m.name == ranking.metric) {
                bail!(
                    "Ranking '{}' references unknown metric '{}'",
                    ranking.name,
                    ranking.metric
                );
            }
        }
        Ok(())
    }

    /// Copy of the definition with every column name mapped to its canonical form.
    pub fn resolved(&self) -> Self {
        let schema = &self.schema;
        let resolve_source = |source: &ValueSource| match source {
            ValueSource::Column { column } => ValueSource::column(schema.resolve(column)),
            other => other.clone(),
        };
        let resolve_condition = |condition: &Condition| match condition {
            Condition::Placed { column } => Condition::Placed {
                column: schema.resolve(column),
            },
            Condition::Equals { column, value } => Condition::Equals {
                column: schema.resolve(column),
                value: value.clone(),
            },
            Condition::NonEmpty { column } => Condition::NonEmpty {
                column: schema.resolve(column),
            },
            Condition::Positive { source } => Condition::Positive {
                source: resolve_source(source),
            },
        };

        let mut view = self.clone();
        for dimension in &mut view.dimensions {
            dimension.key = match &dimension.key {
                DimensionKey::Column { column } => DimensionKey::column(schema.resolve(column)),
                DimensionKey::Composite { outer, inner } => {
                    DimensionKey::composite(schema.resolve(outer), schema.resolve(inner))
                }
                DimensionKey::Offers => DimensionKey::Offers,
            };
        }
        for field in &mut view.fields {
            field.op = match &field.op {
                FieldOp::Sum { source } => FieldOp::Sum {
                    source: resolve_source(source),
                },
                FieldOp::CountIf { condition } => FieldOp::CountIf {
                    condition: resolve_condition(condition),
                },
                FieldOp::Collect {
                    source,
                    include_zero,
                } => FieldOp::Collect {
                    source: resolve_source(source),
                    include_zero: *include_zero,
                },
            };
        }
        view
    }

    /// Columns read by dimensions and fields, in first-use order.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |column: &str| {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        };
        for dimension in &self.dimensions {
            for column in dimension.key.columns() {
                push(column);
            }
        }
        for field in &self.fields {
            match &field.op {
                FieldOp::Sum {
                    source: ValueSource::Column { column },
                }
                | FieldOp::Collect {
                    source: ValueSource::Column { column },
                    ..
                }
                | FieldOp::CountIf {
                    condition:
                        Condition::Placed { column }
                        | Condition::Equals { column, .. }
                        | Condition::NonEmpty { column }
                        | Condition::Positive {
                            source: ValueSource::Column { column },
                        },
                } => push(column.as_str()),
                _ => {}
            }
        }
        columns
    }

    /// Status columns counted through substring matching.
    pub fn degraded_inputs(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|field| match &field.op {
                FieldOp::CountIf {
                    condition: Condition::Placed { column },
                } => Some(format!(
                    "'{}' counts rows whose '{}' contains \"placed\", which also matches \"Not Placed\"",
                    field.name, column
                )),
                _ => None,
            })
            .collect()
    }

    /// Rows of `dataset` passing `filter`, in dataset order.
    pub fn filtered_rows<'d>(&self, dataset: &'d Dataset, filter: &FilterState) -> Vec<&'d Row> {
        let predicate = build_predicate(filter, &self.schema);
        dataset
            .rows()
            .iter()
            .filter(|row| predicate.matches(row))
            .collect()
    }

    pub fn run(&self, dataset: &Dataset, filter: &FilterState) -> AggregationResult {
        let view = self.resolved();
        let predicate = build_predicate(filter, &view.schema);
        let mut aggregator = Aggregator::new(&view.dimensions, &view.fields);
        for row in predicate.apply(dataset.rows()) {
            aggregator.push(row);
        }
        let aggregation = aggregator.finish();
        debug!(
            "View '{}' matched {} of {} row(s)",
            view.name(),
            aggregation.rows,
            dataset.len()
        );

        let compiled = metrics::compile(&aggregation, &view.metrics, &view.rankings, &view.gauges);
        let missing_columns = view
            .referenced_columns()
            .into_iter()
            .filter(|column| !dataset.has_column(column))
            .collect();

        AggregationResult {
            view: view.name().to_string(),
            dataset_id: dataset.id(),
            source: dataset.source().to_string(),
            rows_total: dataset.len(),
            rows_matched: aggregation.rows,
            dimensions: compiled.dimensions,
            rankings: compiled.rankings,
            gauges: compiled.gauges,
            totals: compiled.totals,
            data_quality: DataQuality {
                coerced_cells: aggregation.coerced_cells,
                missing_columns,
                degraded: view.degraded_inputs(),
            },
        }
    }
}
