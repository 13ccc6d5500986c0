//! Shared fixtures for pubrank tests: scripted collaborators and dataset builders.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pubrank_common::{
    AccountDirectory, AccountLink, ExternalPublicationSource, LookupError, RawPublication, SourceError,
};

pub use pretty_assertions;

/// Dataset from the reference scenario: Journal A tops `Software` (4 journals) in 2023.
pub const SCENARIO_DATASET: &str = "\
Rank;Title;Categories;SJR;year
1;\"Journal A\";\"Software (Q1); AI (Q2)\";\"2,5\";2023
2;\"Journal B\";\"Software (Q2)\";\"1,0\";2023
3;\"Journal C\";\"Software (Q3)\";\"0,5\";2023
4;\"Journal D\";\"Software (Q4)\";\"0,1\";2023
";

/// Build a raw publication with the fields the pipeline cares about.
pub fn raw_publication(id: &str, title: &str, year: i32, journal: &str) -> RawPublication {
    RawPublication {
        id: id.to_string(),
        eid: Some(format!("2-s2.0-{id}")),
        doi: None,
        title: title.to_string(),
        year: Some(year),
        source_title: Some(journal.to_string()),
        document_type: Some("Article".to_string()),
        affiliation: Some("Example University".to_string()),
        subject_areas: Vec::new(),
    }
}

/// Write `content` to `dir/name` and return the path.
pub fn write_dataset(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write dataset fixture");
    path
}

// ── Publication source ──────────────────────────────────────────────────────

/// Scripted publication source.
///
/// Unknown identifiers return an empty list. Every call is recorded so
/// tests can assert whether the cache short-circuited a fetch.
#[derive(Default)]
pub struct MockPublicationSource {
    responses: HashMap<String, Result<Vec<RawPublication>, SourceError>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl MockPublicationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publications(mut self, id: &str, publications: Vec<RawPublication>) -> Self {
        self.responses.insert(id.to_string(), Ok(publications));
        self
    }

    pub fn with_failure(mut self, id: &str, error: SourceError) -> Self {
        self.responses.insert(id.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Delay applied to identifiers without their own delay.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, id: &str) -> usize {
        self.calls.lock().expect("calls lock").iter().filter(|c| c.as_str() == id).count()
    }
}

#[async_trait]
impl ExternalPublicationSource for MockPublicationSource {
    async fn fetch_by_canonical_id(&self, id: &str) -> Result<Vec<RawPublication>, SourceError> {
        self.calls.lock().expect("calls lock").push(id.to_string());

        let delay = self.delays.get(id).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.responses.get(id).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ── Account directory ───────────────────────────────────────────────────────

/// Scripted account directory with optional failing references.
#[derive(Default)]
pub struct MockAccountDirectory {
    accounts: HashMap<String, Vec<AccountLink>>,
    failing: HashSet<String>,
    lookups: Mutex<Vec<String>>,
}

impl MockAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: &str, links: Vec<AccountLink>) -> Self {
        self.accounts.insert(reference.to_string(), links);
        self
    }

    /// Lookups for `reference` return an error.
    pub fn failing(mut self, reference: &str) -> Self {
        self.failing.insert(reference.to_string());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lookups lock").clone()
    }
}

#[async_trait]
impl AccountDirectory for MockAccountDirectory {
    async fn lookup_canonical_ids_for_account(
        &self,
        reference: &str,
    ) -> Result<Option<Vec<AccountLink>>, LookupError> {
        self.lookups.lock().expect("lookups lock").push(reference.to_string());
        if self.failing.contains(reference) {
            return Err(LookupError::new(reference, "directory unavailable"));
        }
        Ok(self.accounts.get(reference).cloned())
    }
}
