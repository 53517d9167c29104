//! Dataset sources: the studio HTTP API or local JSON files.

use crate::dictionary::DataDictionary;
use crate::error_display::user_message_from_report;
use crate::session::{LoadRequest, PageRequest, SessionEvent};
use crate::value::{Record, RowPage};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Deserialize;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where dictionaries and row pages come from.
pub trait DatasetBackend: Send + Sync {
    fn fetch_data_dictionary(&self, key: &str, version: &str) -> Result<DataDictionary>;
    fn fetch_page(&self, request: &PageRequest) -> Result<RowPage>;
}

/// Client for `{base}/api/v1/datasets/{key}/{version}/...`.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: std::time::Duration::from_secs(timeout_secs),
        }
    }

    pub fn dataset_url(&self, key: &str, version: &str, resource: &str) -> String {
        format!(
            "{}/api/v1/datasets/{}/{}/{}",
            self.base_url, key, version, resource
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, request: ureq::Request) -> Result<T> {
        let response = request.timeout(self.timeout).call()?;
        let status = response.status();
        if status >= 400 {
            return Err(color_eyre::eyre::eyre!(
                "Server returned {} {}.",
                status,
                response.status_text()
            ));
        }
        let body = response.into_string()?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(feature = "http")]
impl DatasetBackend for HttpBackend {
    fn fetch_data_dictionary(&self, key: &str, version: &str) -> Result<DataDictionary> {
        let url = self.dataset_url(key, version, "data-dictionary");
        debug!(%url, "fetching data dictionary");
        self.get_json(ureq::get(&url))
            .wrap_err_with(|| format!("Fetching data dictionary for {key}"))
    }

    fn fetch_page(&self, request: &PageRequest) -> Result<RowPage> {
        let url = self.dataset_url(&request.key, &request.version, "data");
        let mut call = ureq::get(&url)
            .query("page", &request.page.to_string())
            .query("page_size", &request.page_size.to_string());
        if let Some(query) = &request.query {
            call = call.query("query", &query.to_query_param());
        }
        debug!(%url, page = request.page, page_size = request.page_size, "fetching page");
        self.get_json(call)
            .wrap_err_with(|| format!("Fetching page {} of {}", request.page, request.key))
    }
}

/// Dictionary and records read once from local JSON files.
///
/// Paging is applied locally. Filters are not evaluated; the full record set is paged.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    dictionary: DataDictionary,
    records: Vec<Record>,
}

/// A records file is either a bare array or a page object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    Records(Vec<Record>),
    Page(RowPage),
}

impl StaticBackend {
    pub fn new(dictionary: DataDictionary, records: Vec<Record>) -> Self {
        Self {
            dictionary,
            records,
        }
    }

    pub fn from_files(dictionary: &Path, records: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(dictionary)
            .wrap_err_with(|| format!("Reading {}", dictionary.display()))?;
        let dict: DataDictionary = serde_json::from_str(&text)
            .wrap_err_with(|| format!("Parsing {}", dictionary.display()))?;
        let text = std::fs::read_to_string(records)
            .wrap_err_with(|| format!("Reading {}", records.display()))?;
        let rows = match serde_json::from_str::<RecordsFile>(&text)
            .wrap_err_with(|| format!("Parsing {}", records.display()))?
        {
            RecordsFile::Records(rows) => rows,
            RecordsFile::Page(page) => page.records,
        };
        Ok(Self::new(dict, rows))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl DatasetBackend for StaticBackend {
    fn fetch_data_dictionary(&self, _key: &str, _version: &str) -> Result<DataDictionary> {
        Ok(self.dictionary.clone())
    }

    fn fetch_page(&self, request: &PageRequest) -> Result<RowPage> {
        if let Some(query) = &request.query {
            warn!(filter = %query, "local records are not filtered");
        }
        let page_size = request.page_size.max(1);
        let start = (request.page.max(1) - 1).saturating_mul(page_size);
        let records = self
            .records
            .iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        Ok(RowPage {
            records,
            total: self.records.len(),
            page: request.page.max(1),
            page_size,
        })
    }
}

/// Run a load synchronously and report each result as an event.
pub fn run_load(backend: &dyn DatasetBackend, request: &LoadRequest) -> Vec<SessionEvent> {
    let seq = request.seq;
    let mut events = Vec::with_capacity(2);
    if request.dictionary {
        match backend.fetch_data_dictionary(&request.page.key, &request.page.version) {
            Ok(dictionary) => events.push(SessionEvent::DictionaryLoaded { seq, dictionary }),
            Err(e) => {
                events.push(SessionEvent::LoadFailed {
                    seq,
                    message: user_message_from_report(&e, Some("Data dictionary load failed")),
                });
                return events;
            }
        }
    }
    match backend.fetch_page(&request.page) {
        Ok(page) => events.push(SessionEvent::PageLoaded { seq, page }),
        Err(e) => events.push(SessionEvent::LoadFailed {
            seq,
            message: user_message_from_report(&e, Some("Data load failed")),
        }),
    }
    events
}

/// Run a load on a worker thread; results arrive on `events`.
pub fn spawn_load<E>(backend: Arc<dyn DatasetBackend>, request: LoadRequest, events: Sender<E>)
where
    E: From<SessionEvent> + Send + 'static,
{
    std::thread::spawn(move || {
        for event in run_load(backend.as_ref(), &request) {
            // Receiver gone means the app is shutting down.
            if events.send(event.into()).is_err() {
                break;
            }
        }
    });
}
