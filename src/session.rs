//! Paging and filter session for one dataset.
//!
//! The session owns the loaded page and dictionary. Every user action that needs new
//! rows returns a [`LoadRequest`]; the caller runs it (see [`crate::backend::spawn_load`])
//! and feeds the resulting [`SessionEvent`]s back through [`DatasetSession::handle`].
//! Only events carrying the latest sequence number are applied.

use crate::chart_data::{build_field_panels, build_grouped_panels, ChartPanel, PanelContext};
use crate::dictionary::DataDictionary;
use crate::query::{ComposeQuery, QueryBuilder};
use crate::recommend::GroupedChartKind;
use crate::value::RowPage;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
}

/// Row-page fetch parameters. `query` is `None` when unfiltered.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub key: String,
    pub version: String,
    pub page: usize,
    pub page_size: usize,
    pub query: Option<ComposeQuery>,
}

/// A fetch the caller should run, tagged with its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub seq: u64,
    pub page: PageRequest,
    /// Also fetch the data dictionary (first load of a dataset).
    pub dictionary: bool,
}

/// Results reported back by a load.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    DictionaryLoaded { seq: u64, dictionary: DataDictionary },
    PageLoaded { seq: u64, page: RowPage },
    LoadFailed { seq: u64, message: String },
}

impl SessionEvent {
    pub fn seq(&self) -> u64 {
        match self {
            SessionEvent::DictionaryLoaded { seq, .. }
            | SessionEvent::PageLoaded { seq, .. }
            | SessionEvent::LoadFailed { seq, .. } => *seq,
        }
    }
}

/// Session settings, normally taken from the `[session]` and `[charts]` config sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub page_size: usize,
    /// Fields with a display order at most this are selected when a dictionary arrives.
    pub default_column_order: i64,
    pub id_column: Option<String>,
    pub histogram_bins: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            default_column_order: 5,
            id_column: Some("sample_id".to_string()),
            histogram_bins: None,
        }
    }
}

#[derive(Debug)]
pub struct DatasetSession {
    key: String,
    version: String,
    options: SessionOptions,
    state: LoadState,
    seq: u64,
    dictionary: Option<Arc<DataDictionary>>,
    dictionary_pending: bool,
    page_pending: bool,
    page: RowPage,
    page_number: usize,
    page_size: usize,
    query: Option<ComposeQuery>,
    selected: Vec<String>,
    notification: Option<String>,
}

impl DatasetSession {
    pub fn new(key: &str, version: &str, options: SessionOptions) -> Self {
        let page_size = options.page_size.max(1);
        Self {
            key: key.to_string(),
            version: version.to_string(),
            options,
            state: LoadState::Idle,
            seq: 0,
            dictionary: None,
            dictionary_pending: false,
            page_pending: false,
            page: RowPage::default(),
            page_number: 1,
            page_size,
            query: None,
            selected: Vec::new(),
            notification: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Latest issued sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn dictionary(&self) -> Option<&Arc<DataDictionary>> {
        self.dictionary.as_ref()
    }

    /// Last successfully loaded page. Kept when a later load fails.
    pub fn page(&self) -> &RowPage {
        &self.page
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn query(&self) -> Option<&ComposeQuery> {
        self.query.as_ref()
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn notification(&self) -> Option<&str> {
        self.notification.as_deref()
    }

    pub fn take_notification(&mut self) -> Option<String> {
        self.notification.take()
    }

    /// Human-readable filter, e.g. `(sex = M AND age >= 40)`.
    pub fn filter_description(&self) -> String {
        match &self.query {
            Some(q) => q.to_string(),
            None => "No filters".to_string(),
        }
    }

    /// First load of the current dataset.
    pub fn start(&mut self) -> LoadRequest {
        self.issue()
    }

    /// Switch datasets. Dictionary, filters, selection and page are reset.
    pub fn open_dataset(&mut self, key: &str, version: &str) -> LoadRequest {
        info!(dataset = key, version, "opening dataset");
        self.key = key.to_string();
        self.version = version.to_string();
        self.dictionary = None;
        self.page = RowPage::default();
        self.page_number = 1;
        self.query = None;
        self.selected.clear();
        self.issue()
    }

    pub fn set_page(&mut self, page: usize) -> LoadRequest {
        self.page_number = page.max(1);
        self.issue()
    }

    /// Next page, unless the current page is the last.
    pub fn next_page(&mut self) -> Option<LoadRequest> {
        if self.page_number >= self.page_count() {
            return None;
        }
        Some(self.set_page(self.page_number + 1))
    }

    pub fn prev_page(&mut self) -> Option<LoadRequest> {
        if self.page_number <= 1 {
            return None;
        }
        Some(self.set_page(self.page_number - 1))
    }

    /// Pages at the current page size, from the last known total.
    pub fn page_count(&self) -> usize {
        if self.page.total == 0 {
            return 1;
        }
        self.page.total.div_ceil(self.page_size)
    }

    /// Change the page size and return to the first page.
    pub fn set_page_size(&mut self, page_size: usize) -> LoadRequest {
        self.page_size = page_size.max(1);
        self.page_number = 1;
        self.issue()
    }

    /// Load every matching row as one page.
    pub fn load_all(&mut self) -> LoadRequest {
        self.page_size = self.page.total.max(self.page_size);
        self.page_number = 1;
        self.issue()
    }

    /// Apply the builder's current tree. An empty tree means unfiltered.
    pub fn apply_filters(&mut self, builder: &QueryBuilder) -> LoadRequest {
        self.query = builder.to_wire_query();
        debug!(filter = %self.filter_description(), "filters applied");
        self.page_number = 1;
        self.issue()
    }

    pub fn clear_filters(&mut self) -> LoadRequest {
        self.query = None;
        self.page_number = 1;
        self.issue()
    }

    /// Replace the selection. Keys unknown to a loaded dictionary are dropped.
    pub fn set_selected(&mut self, keys: Vec<String>) {
        self.selected = match &self.dictionary {
            Some(dict) => keys
                .into_iter()
                .filter(|k| {
                    let known = dict.contains(k);
                    if !known {
                        warn!(field = %k, "ignoring unknown column");
                    }
                    known
                })
                .collect(),
            None => keys,
        };
    }

    /// Every load asks for the dictionary until one has been applied, so a
    /// superseded or failed first load is retried by the next request.
    fn issue(&mut self) -> LoadRequest {
        let dictionary = self.dictionary.is_none();
        self.seq += 1;
        self.state = LoadState::Loading;
        self.dictionary_pending = dictionary;
        self.page_pending = true;
        let request = LoadRequest {
            seq: self.seq,
            page: PageRequest {
                key: self.key.clone(),
                version: self.version.clone(),
                page: self.page_number,
                page_size: self.page_size,
                query: self.query.clone(),
            },
            dictionary,
        };
        debug!(
            seq = request.seq,
            page = request.page.page,
            page_size = request.page.page_size,
            dictionary,
            "load requested"
        );
        request
    }

    /// Apply a load result. Returns false when the event was stale and dropped.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        if event.seq() != self.seq {
            debug!(seq = event.seq(), latest = self.seq, "dropping stale load result");
            return false;
        }
        match event {
            SessionEvent::DictionaryLoaded { dictionary, .. } => {
                let dups = dictionary.duplicate_keys();
                if !dups.is_empty() {
                    warn!(keys = ?dups, "data dictionary has duplicate keys");
                }
                let repeated = dictionary.fields_with_repeated_values();
                if !repeated.is_empty() {
                    warn!(fields = ?repeated, "allowed values repeat, cardinality may be understated");
                }
                if self.selected.is_empty() {
                    self.selected =
                        dictionary.default_selected_keys(self.options.default_column_order);
                } else {
                    self.selected.retain(|k| dictionary.contains(k));
                }
                self.dictionary = Some(Arc::new(dictionary));
                self.dictionary_pending = false;
            }
            SessionEvent::PageLoaded { page, .. } => {
                info!(rows = page.records.len(), total = page.total, "page loaded");
                self.page = page;
                self.page_pending = false;
            }
            SessionEvent::LoadFailed { message, .. } => {
                warn!(%message, "load failed, keeping previous page");
                self.notification = Some(message);
                self.dictionary_pending = false;
                self.page_pending = false;
            }
        }
        if !self.dictionary_pending && !self.page_pending {
            self.state = LoadState::Ready;
        }
        true
    }

    fn panel_context(&self) -> Option<PanelContext<'_>> {
        self.dictionary.as_deref().map(|dictionary| PanelContext {
            dictionary,
            page: &self.page,
            selected: &self.selected,
            id_column: self.options.id_column.as_deref(),
            histogram_bins: self.options.histogram_bins,
        })
    }

    /// One panel per selected field. Empty until a dictionary is loaded.
    pub fn field_panels(&self) -> Vec<ChartPanel> {
        self.panel_context()
            .map(|ctx| build_field_panels(&ctx))
            .unwrap_or_default()
    }

    /// Panels comparing the selected fields against `group_by`.
    pub fn grouped_panels(
        &self,
        group_by: Option<&str>,
        kind: Option<GroupedChartKind>,
    ) -> Vec<ChartPanel> {
        self.panel_context()
            .map(|ctx| build_grouped_panels(&ctx, group_by, kind))
            .unwrap_or_default()
    }
}
