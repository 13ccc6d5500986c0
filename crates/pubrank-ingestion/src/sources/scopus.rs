//! Scopus Search API client.
//!
//! Endpoint used:
//!   search: https://api.elsevier.com/content/search/scopus?query=AU-ID(<id>)
//!
//! Results are paged with `start`/`count` until `opensearch:totalResults`
//! is reached. An author without publications comes back as a single
//! entry carrying `"error": "Result set was empty"`.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use pubrank_common::sandbox::SandboxClient as Client;
use pubrank_common::{ExternalPublicationSource, PubrankError, RawPublication, SourceError};
use serde_json::Value;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.elsevier.com/content/search/scopus";
/// The search API refuses to page past this offset.
const MAX_OFFSET: usize = 5000;

#[derive(Debug, Clone)]
pub struct ScopusSettings {
    pub base_url: String,
    pub api_key: String,
    pub inst_token: Option<String>,
    pub page_size: usize,
    pub view: String,
    pub request_timeout: Duration,
}

impl Default for ScopusSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            inst_token: None,
            page_size: 25,
            view: "STANDARD".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ScopusClient {
    client: Client,
    settings: ScopusSettings,
}

/// One page of search results.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SearchPage {
    pub total: usize,
    /// Length of the returned `entry` array, including entries that did not parse.
    pub raw_len: usize,
    pub entries: Vec<RawPublication>,
}

impl ScopusClient {
    pub fn new(settings: ScopusSettings) -> Result<Self, PubrankError> {
        let mut client = Client::with_timeout(settings.request_timeout)?;
        client.allow_url_host(&settings.base_url)?;
        Ok(Self { client, settings })
    }

    /// Fetch one page of an author's publications.
    #[instrument(skip(self))]
    async fn search_page(&self, author_id: &str, start: usize) -> Result<SearchPage, SourceError> {
        let mut request = self
            .client
            .get(&self.settings.base_url)?
            .query(&[
                ("query", format!("AU-ID({author_id})")),
                ("start", start.to_string()),
                ("count", self.settings.page_size.to_string()),
                ("view", self.settings.view.clone()),
            ])
            .header("Accept", "application/json")
            .header("X-ELS-APIKey", &self.settings.api_key);
        if let Some(token) = &self.settings.inst_token {
            request = request.header("X-ELS-Insttoken", token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Authentication(format!("HTTP {status}: {}", snippet(&body))));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status { code: status.as_u16(), message: snippet(&body) });
        }

        let body: Value = resp.json().await?;
        parse_search_page(&body)
    }
}

#[async_trait]
impl ExternalPublicationSource for ScopusClient {
    async fn fetch_by_canonical_id(&self, id: &str) -> Result<Vec<RawPublication>, SourceError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(SourceError::Authentication("no Scopus API key configured".to_string()));
        }
        let publications = collect_pages(|start| self.search_page(id, start)).await?;
        debug!(author_id = id, n = publications.len(), "Scopus author publications retrieved");
        Ok(publications)
    }

    fn name(&self) -> &'static str {
        "scopus"
    }
}

/// Page through results until the reported total is reached or a page
/// comes back empty. Offsets advance by the raw entry count so unparseable
/// entries neither shift nor end paging. Duplicate IDs across pages are dropped.
pub(crate) async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<RawPublication>, SourceError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<SearchPage, SourceError>>,
{
    let mut seen = HashSet::new();
    let mut publications = Vec::new();
    let mut start = 0usize;

    loop {
        let page = fetch_page(start).await?;
        let n = page.raw_len;
        if n > page.entries.len() {
            debug!(start, skipped = n - page.entries.len(), "Search entries without an identifier skipped");
        }
        for entry in page.entries {
            if seen.insert(entry.id.clone()) {
                publications.push(entry);
            }
        }

        start += n;
        if n == 0 || start >= page.total {
            break;
        }
        if start >= MAX_OFFSET {
            warn!(total = page.total, "Result set exceeds the search paging limit; truncating");
            break;
        }
    }

    Ok(publications)
}

/// Convert one search-results document into a page.
pub(crate) fn parse_search_page(body: &Value) -> Result<SearchPage, SourceError> {
    let results = body
        .get("search-results")
        .ok_or_else(|| SourceError::Decode("missing search-results".to_string()))?;

    let total = match &results["opensearch:totalResults"] {
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    };

    let items = results["entry"].as_array().map(Vec::as_slice).unwrap_or_default();
    let entries = items.iter().filter_map(entry_to_publication).collect();

    Ok(SearchPage { total, raw_len: items.len(), entries })
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn entry_to_publication(entry: &Value) -> Option<RawPublication> {
    // "Result set was empty" sentinel
    if entry.get("error").is_some() {
        return None;
    }

    let eid = str_field(entry, "eid");
    let id = str_field(entry, "dc:identifier")
        .map(|s| s.trim_start_matches("SCOPUS_ID:").to_string())
        .or_else(|| eid.clone())?;

    let year = str_field(entry, "prism:coverDate")
        .and_then(|d| d.get(..4).and_then(|y| y.parse().ok()));

    let affiliation = entry["affiliation"]
        .as_array()
        .and_then(|affs| affs.first())
        .and_then(|a| a["affilname"].as_str())
        .map(String::from);

    let subject_areas = entry["subject-area"]
        .as_array()
        .map(|areas| {
            areas
                .iter()
                .filter_map(|a| a["$"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Some(RawPublication {
        id,
        eid,
        doi: str_field(entry, "prism:doi"),
        title: str_field(entry, "dc:title").unwrap_or_default(),
        year,
        source_title: str_field(entry, "prism:publicationName"),
        document_type: str_field(entry, "subtypeDescription"),
        affiliation,
        subject_areas,
    })
}

fn str_field(entry: &Value, key: &str) -> Option<String> {
    entry[key].as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
