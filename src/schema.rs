//! Per-view column schema: alias resolution and required-column validation.
//!
//! A [`Schema`] owns the alias table that collapses the many spellings found
//! in spreadsheet exports ("Reg No", "Register Number", "REGISTER  NO.") onto
//! one canonical column name, plus the ordered list of columns the view
//! cannot work without. Whether a missing column blocks ingestion is the
//! schema's [`ValidationMode`].
//!
//! On disk the alias table is written canonical-first (`Dept: [department,
//! branch]`); the lowercase lookup table is rebuilt on load.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{coerce, text};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Any missing required column rejects the upload.
    Strict,
    /// Missing required columns warn; aggregates over them read as zero.
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Ok,
    SoftWarn,
    HardFail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub missing: Vec<String>,
}

impl ValidationReport {
    pub fn is_rejected(&self) -> bool {
        self.status == ValidationStatus::HardFail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SchemaFile", into = "SchemaFile")]
pub struct Schema {
    name: String,
    mode: ValidationMode,
    required_columns: Vec<String>,
    aliases: IndexMap<String, Vec<String>>,
    alias_table: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaFile {
    name: String,
    #[serde(default)]
    mode: ValidationMode,
    #[serde(default)]
    required_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    aliases: IndexMap<String, Vec<String>>,
}

impl From<SchemaFile> for Schema {
    fn from(file: SchemaFile) -> Self {
        let mut schema = Schema::new(file.name, file.mode, file.required_columns);
        for (canonical, spellings) in file.aliases {
            schema.add_aliases(&canonical, spellings);
        }
        schema
    }
}

impl From<Schema> for SchemaFile {
    fn from(schema: Schema) -> Self {
        SchemaFile {
            name: schema.name,
            mode: schema.mode,
            required_columns: schema.required_columns,
            aliases: schema.aliases,
        }
    }
}

impl Schema {
    pub fn new<I, S>(name: impl Into<String>, mode: ValidationMode, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema {
            name: name.into(),
            mode,
            required_columns: Vec::new(),
            aliases: IndexMap::new(),
            alias_table: HashMap::new(),
        };
        for column in required {
            let column = text::normalize(&column.into());
            if column.is_empty() || schema.required_columns.contains(&column) {
                continue;
            }
            schema.register_canonical(&column);
            schema.required_columns.push(column);
        }
        schema
    }

    /// Maps each spelling onto `canonical`. Later registrations of an
    /// already-known spelling are ignored.
    pub fn add_aliases<I, S>(&mut self, canonical: &str, spellings: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let canonical = text::normalize(canonical);
        self.register_canonical(&canonical);
        for spelling in spellings {
            let spelling = text::normalize(&spelling.into());
            let key = spelling.to_lowercase();
            if key.is_empty() || self.alias_table.contains_key(&key) {
                continue;
            }
            self.alias_table.insert(key, canonical.clone());
            self.aliases
                .entry(canonical.clone())
                .or_default()
                .push(spelling);
        }
        self
    }

    pub fn with_aliases<I, S>(mut self, canonical: &str, spellings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_aliases(canonical, spellings);
        self
    }

    fn register_canonical(&mut self, canonical: &str) {
        self.alias_table
            .entry(canonical.to_lowercase())
            .or_insert_with(|| canonical.to_string());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }

    pub fn alias_count(&self) -> usize {
        self.alias_table.len()
    }

    /// Canonical name for `raw_header`; unknown headers come back normalized.
    pub fn resolve(&self, raw_header: &str) -> String {
        let normalized = text::normalize(raw_header);
        let key = normalized.to_lowercase();
        if let Some(canonical) = self.alias_table.get(&key) {
            return canonical.clone();
        }
        coerce::canonical_slot_header(&key).unwrap_or(normalized)
    }

    pub fn resolve_headers(&self, raw_headers: &[String]) -> Vec<String> {
        raw_headers.iter().map(|h| self.resolve(h)).collect()
    }

    pub fn validate(&self, canonical_headers: &[String]) -> ValidationReport {
        let present: HashSet<&str> = canonical_headers.iter().map(String::as_str).collect();
        let missing: Vec<String> = self
            .required_columns
            .iter()
            .filter(|column| !present.contains(column.as_str()))
            .cloned()
            .collect();
        let status = match (missing.is_empty(), self.mode) {
            (true, _) => ValidationStatus::Ok,
            (false, ValidationMode::Strict) => ValidationStatus::HardFail,
            (false, ValidationMode::Lenient) => ValidationStatus::SoftWarn,
        };
        ValidationReport { status, missing }
    }
}
