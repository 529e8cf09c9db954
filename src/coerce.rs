//! Cell coercion: numbers, placement status, and company-slot extraction.
//!
//! Numeric coercion is total. Anything that does not parse becomes `0`, so
//! aggregates stay finite; [`coerce_number()`] additionally reports whether a
//! non-empty cell had to fall back, which feeds the data-quality counters.

use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::{
    data::{Cell, Row},
    text,
};

/// Highest numbered company slot read from a row.
pub const COMPANY_SLOTS: u8 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Coerced {
    pub value: f64,
    pub was_coerced: bool,
}

pub fn to_number(cell: &Cell) -> f64 {
    coerce_number(cell).value
}

pub fn coerce_number(cell: &Cell) -> Coerced {
    match cell {
        Cell::Empty => Coerced::default(),
        Cell::Number(n) if n.is_finite() => Coerced {
            value: *n,
            was_coerced: false,
        },
        Cell::Number(_) => Coerced {
            value: 0.0,
            was_coerced: true,
        },
        Cell::Text(raw) => parse_lenient(raw),
    }
}

/// Parses the leading float of `raw` after dropping every character other
/// than digits, `.` and `-`. `"3.5 - 4 LPA"` reads as `3.5`.
pub fn parse_lenient(raw: &str) -> Coerced {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let leading = number_prefix().find(&stripped).map(|m| m.as_str());
    match leading.map(str::parse::<f64>) {
        Some(Ok(value)) if value.is_finite() => Coerced {
            value,
            was_coerced: false,
        },
        _ => Coerced {
            value: 0.0,
            was_coerced: !raw.trim().is_empty(),
        },
    }
}

/// Substring test on the lowercased cell. Also true for "Not Placed".
pub fn is_placed(cell: &Cell) -> bool {
    cell.as_display().to_lowercase().contains("placed")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OfferSlot {
    Numbered(u8),
    Joined,
}

impl OfferSlot {
    /// Slots in extraction order: 1..=10, then the joined slot.
    pub fn all() -> impl Iterator<Item = OfferSlot> {
        (1..=COMPANY_SLOTS)
            .map(OfferSlot::Numbered)
            .chain(std::iter::once(OfferSlot::Joined))
    }

    pub fn company_column(self) -> String {
        format!("Company {self}")
    }

    pub fn salary_column(self) -> String {
        format!("Salary (Company {self})")
    }
}

impl fmt::Display for OfferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferSlot::Numbered(n) => write!(f, "{n}"),
            OfferSlot::Joined => f.write_str("Joined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    pub slot: OfferSlot,
    pub company: String,
    pub salary: f64,
}

/// Offers present on `row`, one per slot whose company cell is non-empty.
pub fn company_offers(row: &Row) -> Vec<Offer> {
    OfferSlot::all()
        .filter_map(|slot| {
            let company = text::normalize(&row.string(&slot.company_column()));
            if company.is_empty() {
                return None;
            }
            Some(Offer {
                slot,
                company,
                salary: row.number(&slot.salary_column()),
            })
        })
        .collect()
}

fn number_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)").expect("number prefix pattern"))
}

fn company_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^company\s*[-_#]?\s*(\d{1,2}|joined)$").expect("company slot pattern")
    })
}

fn salary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:salary|package|ctc)\s*[-_(]?\s*company\s*[-_#]?\s*(\d{1,2}|joined)\s*\)?$",
        )
        .expect("salary slot pattern")
    })
}

fn slot_from_token(token: &str) -> Option<OfferSlot> {
    if token == "joined" {
        return Some(OfferSlot::Joined);
    }
    match token.parse::<u8>() {
        Ok(n) if (1..=COMPANY_SLOTS).contains(&n) => Some(OfferSlot::Numbered(n)),
        _ => None,
    }
}

/// Canonical company-slot column for a lookup key (see [`text::lookup_key`]).
pub fn canonical_slot_header(key: &str) -> Option<String> {
    if let Some(captures) = company_pattern().captures(key) {
        return slot_from_token(&captures[1]).map(OfferSlot::company_column);
    }
    if let Some(captures) = salary_pattern().captures(key) {
        return slot_from_token(&captures[1]).map(OfferSlot::salary_column);
    }
    None
}
