//! Plain-text rendering of results for the terminal.

use std::{borrow::Cow, fmt::Write as _};

use itertools::Itertools;

use crate::{
    metrics::{DimensionSummary, MetricValue, Ranking},
    view::AggregationResult,
};

const COLUMN_GAP: &str = "  ";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = single_line(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .join(COLUMN_GAP);
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn metric_headers(metrics: &indexmap::IndexMap<String, MetricValue>) -> Vec<String> {
    metrics.keys().cloned().collect()
}

/// One line per bucket followed by a `TOTAL` line.
pub fn render_dimension(summary: &DimensionSummary) -> String {
    let keys = summary
        .buckets
        .first()
        .map(|bucket| metric_headers(&bucket.metrics))
        .unwrap_or_else(|| metric_headers(&summary.totals));
    let composite = summary.buckets.iter().any(|bucket| bucket.inner.is_some());

    let mut headers = vec![summary.name.clone()];
    if composite {
        headers.push("within".to_string());
    }
    headers.push("count".to_string());
    headers.extend(keys.iter().cloned());

    let mut rows: Vec<Vec<String>> = summary
        .buckets
        .iter()
        .map(|bucket| {
            let mut row = vec![bucket.key.clone()];
            if composite {
                row.push(bucket.inner.clone().unwrap_or_default());
            }
            row.push(bucket.count.to_string());
            row.extend(keys.iter().map(|key| metric_cell(bucket.metrics.get(key))));
            row
        })
        .collect();
    if !summary.buckets.is_empty() {
        let count: u64 = summary.buckets.iter().map(|bucket| bucket.count).sum();
        let mut row = vec!["TOTAL".to_string()];
        if composite {
            row.push(String::new());
        }
        row.push(count.to_string());
        row.extend(keys.iter().map(|key| metric_cell(summary.totals.get(key))));
        rows.push(row);
    }
    render_table(&headers, &rows)
}

fn metric_cell(value: Option<&MetricValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn render_ranking(ranking: &Ranking) -> String {
    let headers = vec![
        "#".to_string(),
        ranking.dimension.clone(),
        ranking.metric.clone(),
    ];
    let rows: Vec<Vec<String>> = ranking
        .entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| vec![(idx + 1).to_string(), entry.key.clone(), entry.value.to_string()])
        .collect();
    render_table(&headers, &rows)
}

pub fn render_result(result: &AggregationResult) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{}: {} of {} row(s) from '{}'",
        result.view, result.rows_matched, result.rows_total, result.source
    );
    for summary in &result.dimensions {
        let _ = writeln!(output, "\n[{}]", summary.name);
        output.push_str(&render_dimension(summary));
    }
    for ranking in &result.rankings {
        let _ = writeln!(output, "\n[{}]", ranking.name);
        output.push_str(&render_ranking(ranking));
    }
    if !result.gauges.is_empty() {
        let _ = writeln!(output, "\n[gauges]");
        let headers = vec!["gauge".to_string(), "value".to_string(), "remaining".to_string()];
        let rows: Vec<Vec<String>> = result
            .gauges
            .iter()
            .map(|g| {
                vec![
                    g.name.clone(),
                    g.gauge.value.to_string(),
                    g.gauge.remaining.to_string(),
                ]
            })
            .collect();
        output.push_str(&render_table(&headers, &rows));
    }

    let quality = &result.data_quality;
    if !quality.coerced_cells.is_empty() {
        let _ = writeln!(
            output,
            "\ncoerced to 0: {}",
            quality
                .coerced_cells
                .iter()
                .map(|(column, count)| format!("{column} ({count})"))
                .join(", ")
        );
    }
    if !quality.missing_columns.is_empty() {
        let _ = writeln!(
            output,
            "missing columns read as 0: {}",
            quality.missing_columns.join(", ")
        );
    }
    for note in &quality.degraded {
        let _ = writeln!(output, "degraded: {note}");
    }
    output
}
