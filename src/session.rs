//! The consumer-owned mutable state: current dataset and current filter.
//!
//! Uploads are all-or-nothing. A failed upload leaves the previous dataset in
//! place, and an upload that completes after a newer one was started is
//! discarded. Results are memoized per `(dataset, filter)` pair.

use std::{path::Path, sync::Arc};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::{
    data::{Dataset, DatasetId, Row},
    filter::FilterState,
    ingest::{self, IngestError, IngestOptions, Ingested},
    view::{AggregationResult, ViewDefinition},
};

pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Identifies one upload attempt. Only the ticket of the most recent
/// attempt can install a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    generation: u64,
    file_name: String,
}

impl UploadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Installed {
        dataset_id: DatasetId,
        rows: usize,
        warnings: Vec<String>,
    },
    /// A newer upload was started before this one finished.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    dataset: DatasetId,
    filter: String,
}

/// Bounded memo of computed results; the oldest entry is evicted first.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: IndexMap<CacheKey, Arc<AggregationResult>>,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<AggregationResult>> {
        match self.entries.get(key) {
            Some(result) => {
                self.hits += 1;
                Some(Arc::clone(result))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: CacheKey, result: Arc<AggregationResult>) {
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, result);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[derive(Debug)]
pub struct Session {
    view: ViewDefinition,
    options: IngestOptions,
    dataset: Option<Arc<Dataset>>,
    filter: FilterState,
    generation: u64,
    cache: ResultCache,
}

impl Session {
    pub fn new(view: ViewDefinition, options: IngestOptions) -> Self {
        Self {
            view,
            options,
            dataset: None,
            filter: FilterState::new(),
            generation: 0,
            cache: ResultCache::new(DEFAULT_CACHE_CAPACITY),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = ResultCache::new(capacity);
        self
    }

    pub fn view(&self) -> &ViewDefinition {
        &self.view
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.dataset.as_ref()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterState) {
        self.filter = filter;
    }

    pub fn filter_mut(&mut self) -> &mut FilterState {
        &mut self.filter
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Starts an upload attempt, superseding any attempt still in flight.
    pub fn begin_upload(&mut self, file_name: impl Into<String>) -> UploadTicket {
        self.generation += 1;
        UploadTicket {
            generation: self.generation,
            file_name: file_name.into(),
        }
    }

    /// Installs the outcome of `ticket`'s parse. Errors leave the current
    /// dataset untouched.
    pub fn complete_upload(
        &mut self,
        ticket: UploadTicket,
        parsed: Result<Ingested, IngestError>,
    ) -> Result<UploadOutcome, IngestError> {
        if ticket.generation != self.generation {
            debug!(
                "Discarding upload '{}' (generation {}); generation {} is current",
                ticket.file_name, ticket.generation, self.generation
            );
            return Ok(UploadOutcome::Superseded);
        }
        let ingested = match parsed {
            Ok(ingested) => ingested,
            Err(err) => {
                warn!(
                    "Upload '{}' failed; keeping the previous dataset: {err}",
                    ticket.file_name
                );
                return Err(err);
            }
        };

        let warnings = ingested.warnings();
        let dataset = ingested.dataset.into_shared();
        let outcome = UploadOutcome::Installed {
            dataset_id: dataset.id(),
            rows: dataset.len(),
            warnings,
        };
        info!(
            "Installed dataset {} from '{}' ({} row(s))",
            dataset.id(),
            ticket.file_name,
            dataset.len()
        );
        self.dataset = Some(dataset);
        self.cache.clear();
        Ok(outcome)
    }

    pub fn upload_bytes(
        &mut self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<UploadOutcome, IngestError> {
        let ticket = self.begin_upload(file_name);
        let parsed = ingest::ingest_bytes(bytes, file_name, &self.view.schema, &self.options);
        self.complete_upload(ticket, parsed)
    }

    pub fn upload_path(&mut self, path: &Path) -> Result<UploadOutcome, IngestError> {
        let ticket = self.begin_upload(path.display().to_string());
        let parsed = ingest::ingest_path(path, &self.view.schema, &self.options);
        self.complete_upload(ticket, parsed)
    }

    /// Result for the current dataset and filter, computed at most once per
    /// distinct pair while it stays cached.
    pub fn result(&mut self) -> Option<Arc<AggregationResult>> {
        let dataset = Arc::clone(self.dataset.as_ref()?);
        let key = CacheKey {
            dataset: dataset.id(),
            filter: self.filter.fingerprint(),
        };
        if let Some(result) = self.cache.get(&key) {
            return Some(result);
        }
        let result = Arc::new(self.view.run(&dataset, &self.filter));
        self.cache.insert(key, Arc::clone(&result));
        Some(result)
    }

    /// Rows passing the current filter, for export.
    pub fn filtered_rows(&self) -> Vec<&Row> {
        match &self.dataset {
            Some(dataset) => self.view.filtered_rows(dataset, &self.filter),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    const SHEET: &str = "Dept,Total,Placed,Balance\nCSE,120,85,35\nECE,50,40,10\n";

    fn session() -> Session {
        let view = catalog::find("department-summary").expect("view");
        Session::new(view, IngestOptions::default())
    }

    #[test]
    fn failed_upload_keeps_previous_dataset() {
        let mut session = session();
        session
            .upload_bytes(SHEET.as_bytes(), "first.csv")
            .expect("first upload");
        let first = session.dataset().map(|d| d.id()).expect("dataset");

        let err = session
            .upload_bytes(b"Dept\nCSE\n", "second.csv")
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingRequiredColumns { .. }));
        assert_eq!(session.dataset().map(|d| d.id()), Some(first));

        let err = session.upload_bytes(b"", "third.pdf").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType { .. }));
        assert_eq!(session.dataset().map(|d| d.id()), Some(first));
    }

    #[test]
    fn stale_upload_is_discarded() {
        let mut session = session();
        let stale = session.begin_upload("slow.csv");
        let fresh = session.begin_upload("fast.csv");
        let schema = session.view().schema.clone();
        let parse = |name: &str| {
            ingest::ingest_bytes(SHEET.as_bytes(), name, &schema, &IngestOptions::default())
        };

        let installed = session
            .complete_upload(fresh, parse("fast.csv"))
            .expect("fresh upload");
        assert!(matches!(installed, UploadOutcome::Installed { rows: 2, .. }));
        let current = session.dataset().map(|d| d.id());

        let outcome = session
            .complete_upload(stale, parse("slow.csv"))
            .expect("stale upload");
        assert_eq!(outcome, UploadOutcome::Superseded);
        assert_eq!(session.dataset().map(|d| d.id()), current);
        assert_eq!(
            session.dataset().map(|d| d.source().to_string()),
            Some("fast.csv".to_string())
        );
    }

    #[test]
    fn results_are_memoized_per_filter() {
        let mut session = session();
        assert!(session.result().is_none());
        session
            .upload_bytes(SHEET.as_bytes(), "sheet.csv")
            .expect("upload");

        let first = session.result().expect("result");
        let again = session.result().expect("cached result");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(session.cache().hits(), 1);

        session.set_filter(FilterState::new().exact("Dept", "CSE"));
        let filtered = session.result().expect("filtered result");
        assert_eq!(filtered.rows_matched, 1);
        assert_eq!(session.cache().len(), 2);

        session
            .upload_bytes(SHEET.as_bytes(), "sheet.csv")
            .expect("reupload");
        assert!(session.cache().is_empty());
    }

    #[test]
    fn cache_evicts_oldest_entry() {
        let mut session = session().with_cache_capacity(2);
        session
            .upload_bytes(SHEET.as_bytes(), "sheet.csv")
            .expect("upload");
        for dept in ["CSE", "ECE", "all"] {
            session.set_filter(FilterState::new().exact("Dept", dept));
            session.result();
        }
        assert_eq!(session.cache().len(), 2);
        session.set_filter(FilterState::new().exact("Dept", "CSE"));
        session.result();
        assert_eq!(session.cache().misses(), 4);
    }

    #[test]
    fn filtered_rows_follow_the_filter() {
        let mut session = session();
        assert!(session.filtered_rows().is_empty());
        session
            .upload_bytes(SHEET.as_bytes(), "sheet.csv")
            .expect("upload");
        session.filter_mut().set(
            "Placed",
            crate::filter::Constraint::Range {
                min: Some("50".to_string()),
                max: None,
            },
        );
        let rows = session.filtered_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].string("Dept"), "CSE");
    }
}
