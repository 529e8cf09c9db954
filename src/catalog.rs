//! Built-in dashboard views.
//!
//! Every view starts from the same alias table so that a sheet exported for
//! one dashboard loads into any other. Views fed by sheets with explicit
//! `Placed`/`Balance` count columns are strict; views over student-level
//! registers infer placement from the status column and are lenient.

use crate::{
    aggregate::{Condition, Dimension, DimensionKey, FieldSpec, ValueSource},
    metrics::{GaugeSpec, MetricDef, MetricSpec, Operand, RankingSpec},
    schema::{Schema, ValidationMode},
    view::ViewDefinition,
};

pub const SERIAL: &str = "S.No";
pub const REGISTER_NUMBER: &str = "Register Number";
pub const NAME: &str = "Name";
pub const DEPT: &str = "Dept";
pub const BATCH: &str = "Batch";
pub const PI: &str = "PI";
pub const GENDER: &str = "Gender";
pub const QUOTA: &str = "Quota";
pub const PACKAGE: &str = "Package";
pub const HOSTEL: &str = "Hostel";
pub const STATUS: &str = "Placement Status";
pub const TOTAL: &str = "Total";
pub const PLACED: &str = "Placed";
pub const BALANCE: &str = "Balance";
pub const WILLING: &str = "Willing";
pub const OFFERS: &str = "Offers";

const COMMON_ALIASES: &[(&str, &[&str])] = &[
    (SERIAL, &["S No", "SNo", "S.No.", "Sl No", "Sl.No", "Serial No", "Serial Number"]),
    (
        REGISTER_NUMBER,
        &[
            "Reg Number",
            "Reg No",
            "Reg. No",
            "Register No",
            "Registration Number",
            "Roll No",
            "Roll Number",
        ],
    ),
    (NAME, &["Student Name", "Name of the Student", "Candidate Name"]),
    (DEPT, &["Department", "Dept.", "Branch", "Dept Name"]),
    (BATCH, &["Year", "Batch Year", "Passing Year", "Year of Passing"]),
    (PI, &["PI Name", "Placement Incharge", "Faculty Incharge"]),
    (GENDER, &["Sex", "M/F"]),
    (QUOTA, &["Admission Quota", "Admission Type", "Category"]),
    (
        PACKAGE,
        &["Maximum Salary", "Max Salary", "Highest Package", "CTC", "Salary", "Package (LPA)"],
    ),
    (
        HOSTEL,
        &[
            "Hostel/Day Scholar",
            "Hosteller/Day Scholar",
            "Day Scholar/Hosteller",
            "Hostel Type",
            "Residence",
        ],
    ),
    (STATUS, &["Status", "Placed Status", "Placement"]),
    (TOTAL, &["Total Students", "Total Strength", "Strength", "No of Students"]),
    (PLACED, &["Placed Count", "No of Placed", "Students Placed", "Total Placed"]),
    (BALANCE, &["Balance Count", "Not Placed", "Unplaced", "Yet to be Placed"]),
    (WILLING, &["Willingness", "Willing for Placement", "Interested"]),
    (OFFERS, &["No of Offers", "Offer Count", "Total Offers", "Number of Offers"]),
];

/// Names of the built-in views, in catalogue order.
pub const VIEW_NAMES: [&str; 11] = [
    "department-summary",
    "batch-summary",
    "pi-summary",
    "student-placements",
    "gender-analysis",
    "quota-analysis",
    "hostel-analysis",
    "company-offers",
    "package-distribution",
    "offer-summary",
    "willingness",
];

/// A schema carrying the shared alias table.
pub fn common_schema(name: &str, mode: ValidationMode, required: &[&str]) -> Schema {
    let mut schema = Schema::new(name, mode, required.iter().copied());
    for (canonical, spellings) in COMMON_ALIASES {
        schema.add_aliases(canonical, spellings.iter().copied());
    }
    schema
}

pub fn all() -> Vec<ViewDefinition> {
    VIEW_NAMES.iter().filter_map(|name| find(name)).collect()
}

pub fn find(name: &str) -> Option<ViewDefinition> {
    let view = match name.trim().to_ascii_lowercase().as_str() {
        "department-summary" => department_summary(),
        "batch-summary" => batch_summary(),
        "pi-summary" => pi_summary(),
        "student-placements" => student_placements(),
        "gender-analysis" => status_breakdown("gender-analysis", GENDER, "gender"),
        "quota-analysis" => status_breakdown("quota-analysis", QUOTA, "quota"),
        "hostel-analysis" => status_breakdown("hostel-analysis", HOSTEL, "hostel"),
        "company-offers" => company_offers(),
        "package-distribution" => package_distribution(),
        "offer-summary" => offer_summary(),
        "willingness" => willingness(),
        _ => return None,
    };
    Some(view)
}

fn by(name: &str, column: &str) -> Dimension {
    Dimension::new(name, DimensionKey::column(column))
}

fn by_pair(name: &str, outer: &str, inner: &str) -> Dimension {
    Dimension::new(name, DimensionKey::composite(outer, inner))
}

fn metric(name: &str, spec: MetricSpec) -> MetricDef {
    MetricDef::new(name, spec)
}

fn total(field: &str) -> MetricSpec {
    MetricSpec::Total {
        field: field.to_string(),
    }
}

fn percent_of(numerator: Operand, denominator: Operand) -> MetricSpec {
    MetricSpec::Percentage {
        numerator,
        denominator,
    }
}

fn remaining(of: &str) -> MetricSpec {
    MetricSpec::Remaining { of: of.to_string() }
}

fn ranking(name: &str, dimension: &str, metric: &str, top: usize) -> RankingSpec {
    RankingSpec {
        name: name.to_string(),
        dimension: dimension.to_string(),
        metric: metric.to_string(),
        top,
    }
}

fn gauge(name: &str, numerator: Operand, denominator: Operand) -> GaugeSpec {
    GaugeSpec {
        name: name.to_string(),
        numerator,
        denominator,
    }
}

fn placed_by_status() -> FieldSpec {
    FieldSpec::count_if(
        "placed",
        Condition::Placed {
            column: STATUS.to_string(),
        },
    )
}

/// Total/Placed/Balance count columns and the ratios derived from them.
fn count_sheet_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::sum("total", TOTAL),
        FieldSpec::sum("placed", PLACED),
        FieldSpec::sum("balance", BALANCE),
    ]
}

fn count_sheet_metrics() -> Vec<MetricDef> {
    vec![
        metric("Total", total("total")),
        metric("Placed", total("placed")),
        metric("Balance", total("balance")),
        metric(
            "Placed Percent",
            percent_of(Operand::field("placed"), Operand::field("total")),
        ),
        metric("Unplaced Percent", remaining("Placed Percent")),
    ]
}

fn department_summary() -> ViewDefinition {
    let schema = common_schema(
        "department-summary",
        ValidationMode::Strict,
        &[DEPT, TOTAL, PLACED, BALANCE],
    );
    let mut view = ViewDefinition::new(schema);
    view.description = "Placed and balance counts per department".to_string();
    view.dimensions = vec![by("department", DEPT)];
    view.fields = count_sheet_fields();
    view.metrics = count_sheet_metrics();
    view.rankings = vec![
        ranking("top-departments", "department", "Placed Percent", 10),
        ranking("most-placed", "department", "Placed", 5),
    ];
    view.gauges = vec![gauge(
        "overall-placement",
        Operand::field("placed"),
        Operand::field("total"),
    )];
    view
}

fn batch_summary() -> ViewDefinition {
    let schema = common_schema(
        "batch-summary",
        ValidationMode::Strict,
        &[BATCH, DEPT, TOTAL, PLACED],
    );
    let mut view = ViewDefinition::new(schema);
    view.description = "Placement counts per batch and per batch within department".to_string();
    view.dimensions = vec![
        by("batch", BATCH),
        by_pair("department-batch", DEPT, BATCH),
    ];
    view.fields = count_sheet_fields();
    view.metrics = count_sheet_metrics();
    view.rankings = vec![ranking("top-batches", "batch", "Placed Percent", 5)];
    view.gauges = vec![gauge(
        "overall-placement",
        Operand::field("placed"),
        Operand::field("total"),
    )];
    view
}

fn pi_summary() -> ViewDefinition {
    let schema = common_schema("pi-summary", ValidationMode::Lenient, &[PI, DEPT, STATUS]);
    let mut view = ViewDefinition::new(schema);
    view.description = "Students and placements handled by each placement incharge".to_string();
    view.dimensions = vec![by("pi", PI), by_pair("pi-department", PI, DEPT)];
    view.fields = vec![placed_by_status(), FieldSpec::collect("packages", PACKAGE)];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Placed", total("placed")),
        metric(
            "Placed Percent",
            percent_of(Operand::field("placed"), Operand::Count),
        ),
        metric(
            "Average Package",
            MetricSpec::Average {
                field: "packages".to_string(),
            },
        ),
    ];
    view.rankings = vec![ranking("top-pis", "pi", "Placed", 10)];
    view
}

fn student_placements() -> ViewDefinition {
    let schema = common_schema(
        "student-placements",
        ValidationMode::Lenient,
        &[REGISTER_NUMBER, NAME, DEPT, STATUS, PACKAGE],
    );
    let mut view = ViewDefinition::new(schema);
    view.description = "Student register with package statistics per department".to_string();
    view.dimensions = vec![by("department", DEPT), by("status", STATUS)];
    view.fields = vec![placed_by_status(), FieldSpec::collect("packages", PACKAGE)];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Placed", total("placed")),
        metric(
            "Placed Percent",
            percent_of(Operand::field("placed"), Operand::Count),
        ),
        metric(
            "Average Package",
            MetricSpec::Average {
                field: "packages".to_string(),
            },
        ),
        metric(
            "Highest Package",
            MetricSpec::Max {
                field: "packages".to_string(),
            },
        ),
        metric(
            "Lowest Package",
            MetricSpec::Min {
                field: "packages".to_string(),
            },
        ),
    ];
    view.rankings = vec![
        ranking("top-average-package", "department", "Average Package", 5),
        ranking("top-highest-package", "department", "Highest Package", 10),
    ];
    view.gauges = vec![gauge("placement-rate", Operand::field("placed"), Operand::Count)];
    view
}

/// Gender, quota and hostel views: one attribute, alone and within department.
fn status_breakdown(name: &str, column: &str, dimension: &str) -> ViewDefinition {
    let schema = common_schema(name, ValidationMode::Lenient, &[column, DEPT, STATUS]);
    let mut view = ViewDefinition::new(schema);
    view.description = format!("Placement split by {}", column.to_lowercase());
    view.dimensions = vec![
        by(dimension, column),
        by_pair(&format!("department-{dimension}"), DEPT, column),
    ];
    view.fields = vec![placed_by_status(), FieldSpec::collect("packages", PACKAGE)];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Placed", total("placed")),
        metric(
            "Placed Percent",
            percent_of(Operand::field("placed"), Operand::Count),
        ),
        metric("Unplaced Percent", remaining("Placed Percent")),
        metric(
            "Average Package",
            MetricSpec::Average {
                field: "packages".to_string(),
            },
        ),
    ];
    view.rankings = vec![ranking(
        &format!("top-{dimension}"),
        dimension,
        "Placed Percent",
        5,
    )];
    view.gauges = vec![gauge("placement-rate", Operand::field("placed"), Operand::Count)];
    view
}

fn company_offers() -> ViewDefinition {
    let schema = common_schema(
        "company-offers",
        ValidationMode::Lenient,
        &[NAME, DEPT, "Company 1"],
    );
    let mut view = ViewDefinition::new(schema);
    view.description = "Offers per recruiting company from the company slot columns".to_string();
    view.dimensions = vec![
        Dimension::new("company", DimensionKey::Offers),
        by("department", DEPT),
    ];
    view.fields = vec![
        FieldSpec::sum_of("offers", ValueSource::OfferCount),
        FieldSpec::collect_of("salaries", ValueSource::OfferSalary),
        FieldSpec::count_if(
            "with_offers",
            Condition::Positive {
                source: ValueSource::OfferCount,
            },
        ),
    ];
    view.metrics = vec![
        metric("Offers", total("offers")),
        metric("Students With Offers", total("with_offers")),
        metric(
            "Average Salary",
            MetricSpec::Average {
                field: "salaries".to_string(),
            },
        ),
        metric(
            "Highest Salary",
            MetricSpec::Max {
                field: "salaries".to_string(),
            },
        ),
    ];
    view.rankings = vec![
        ranking("top-recruiters", "company", "Offers", 20),
        ranking("top-paying", "company", "Highest Salary", 15),
    ];
    view
}

fn package_distribution() -> ViewDefinition {
    let schema = common_schema(
        "package-distribution",
        ValidationMode::Strict,
        &[DEPT, PACKAGE],
    );
    let mut view = ViewDefinition::new(schema);
    view.description = "Package statistics per department and batch".to_string();
    view.dimensions = vec![by("department", DEPT), by("batch", BATCH)];
    view.fields = vec![
        FieldSpec::collect("packages", PACKAGE),
        FieldSpec::count_if(
            "offered",
            Condition::Positive {
                source: ValueSource::column(PACKAGE),
            },
        ),
    ];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Offered", total("offered")),
        metric(
            "Offered Percent",
            percent_of(Operand::field("offered"), Operand::Count),
        ),
        metric(
            "Average Package",
            MetricSpec::Average {
                field: "packages".to_string(),
            },
        ),
        metric(
            "Highest Package",
            MetricSpec::Max {
                field: "packages".to_string(),
            },
        ),
        metric(
            "Lowest Package",
            MetricSpec::Min {
                field: "packages".to_string(),
            },
        ),
    ];
    view.rankings = vec![
        ranking("top-highest-package", "department", "Highest Package", 10),
        ranking("top-average-package", "department", "Average Package", 5),
    ];
    view
}

fn offer_summary() -> ViewDefinition {
    let schema = common_schema("offer-summary", ValidationMode::Strict, &[DEPT, OFFERS]);
    let mut view = ViewDefinition::new(schema);
    view.description = "Offer counts per department and batch".to_string();
    view.dimensions = vec![by("department", DEPT), by("batch", BATCH)];
    view.fields = vec![
        FieldSpec::sum("offers", OFFERS),
        FieldSpec::count_if(
            "with_offers",
            Condition::Positive {
                source: ValueSource::column(OFFERS),
            },
        ),
    ];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Offers", total("offers")),
        metric("Students With Offers", total("with_offers")),
        metric(
            "Offer Percent",
            percent_of(Operand::field("with_offers"), Operand::Count),
        ),
        metric("No Offer Percent", remaining("Offer Percent")),
    ];
    view.rankings = vec![ranking("top-offer-departments", "department", "Offers", 10)];
    view.gauges = vec![gauge(
        "students-with-offers",
        Operand::field("with_offers"),
        Operand::Count,
    )];
    view
}

fn willingness() -> ViewDefinition {
    let schema = common_schema("willingness", ValidationMode::Lenient, &[DEPT, WILLING]);
    let mut view = ViewDefinition::new(schema);
    view.description = "Students willing to take part in placement".to_string();
    view.dimensions = vec![by("department", DEPT), by("gender", GENDER)];
    view.fields = vec![
        FieldSpec::count_if(
            "willing",
            Condition::Equals {
                column: WILLING.to_string(),
                value: "yes".to_string(),
            },
        ),
        placed_by_status(),
    ];
    view.metrics = vec![
        metric("Students", MetricSpec::Count),
        metric("Willing", total("willing")),
        metric(
            "Willing Percent",
            percent_of(Operand::field("willing"), Operand::Count),
        ),
        metric("Not Willing Percent", remaining("Willing Percent")),
        metric("Placed", total("placed")),
    ];
    view.rankings = vec![ranking("most-willing", "department", "Willing Percent", 5)];
    view.gauges = vec![gauge("willingness", Operand::field("willing"), Operand::Count)];
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_holds_every_view() {
        let views = all();
        assert_eq!(views.len(), VIEW_NAMES.len());
        for (view, name) in views.iter().zip(VIEW_NAMES) {
            assert_eq!(view.name(), name);
            view.check_references()
                .unwrap_or_else(|err| panic!("{name}: {err}"));
        }
    }

    #[test]
    fn find_is_case_insensitive() {
        assert!(find("Department-Summary").is_some());
        assert!(find("unknown").is_none());
    }

    #[test]
    fn common_aliases_collapse_across_views() {
        for view in all() {
            let schema = &view.schema;
            assert_eq!(schema.resolve("Maximum Salary"), PACKAGE);
            assert_eq!(schema.resolve("reg no"), REGISTER_NUMBER);
            assert_eq!(schema.resolve("DEPARTMENT"), DEPT);
            assert_eq!(schema.resolve("Hostel/Day Scholar"), HOSTEL);
            assert_eq!(schema.resolve("S.No."), SERIAL);
        }
    }

    #[test]
    fn ranking_sizes_come_from_the_supported_set() {
        for view in all() {
            for ranking in &view.rankings {
                assert!([5, 10, 15, 20].contains(&ranking.top), "{}", ranking.name);
            }
        }
    }

    #[test]
    fn strict_views_use_explicit_count_columns() {
        let strict: Vec<String> = all()
            .into_iter()
            .filter(|view| view.schema.mode() == ValidationMode::Strict)
            .map(|view| view.name().to_string())
            .collect();
        assert_eq!(
            strict,
            vec![
                "department-summary",
                "batch-summary",
                "package-distribution",
                "offer-summary"
            ]
        );
        for name in &strict {
            let view = find(name).expect("strict view");
            assert!(view.degraded_inputs().is_empty(), "{name}");
        }
    }

    #[test]
    fn status_views_are_flagged_degraded() {
        let view = find("gender-analysis").expect("gender view");
        assert_eq!(view.degraded_inputs().len(), 1);
    }
}
