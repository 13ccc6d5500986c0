//! Account directory: maps internal account references to external author IDs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{LookupError, PubrankError};

/// One external author ID linked to an internal account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLink {
    pub canonical_id: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

impl AccountLink {
    pub fn active(canonical_id: impl Into<String>) -> Self {
        Self { canonical_id: canonical_id.into(), is_active: true }
    }

    pub fn inactive(canonical_id: impl Into<String>) -> Self {
        Self { canonical_id: canonical_id.into(), is_active: false }
    }
}

/// Lookup collaborator used by identifier resolution.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// All links recorded for `reference`, active or not.
    ///
    /// Returns `Ok(None)` when the reference is unknown.
    async fn lookup_canonical_ids_for_account(
        &self,
        reference: &str,
    ) -> Result<Option<Vec<AccountLink>>, LookupError>;
}

/// In-memory account directory, optionally loaded from a TOML file:
///
/// ```toml
/// [[accounts]]
/// reference = "acct-42"
/// links = [{ canonical_id = "98765432109", is_active = true }]
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticAccountDirectory {
    accounts: HashMap<String, Vec<AccountLink>>,
}

#[derive(Debug, Deserialize)]
struct AccountFile {
    #[serde(default)]
    accounts: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    reference: String,
    #[serde(default)]
    links: Vec<AccountLink>,
}

impl StaticAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with its links.
    pub fn with(mut self, reference: &str, links: Vec<AccountLink>) -> Self {
        self.accounts.insert(reference.to_string(), links);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PubrankError> {
        let file: AccountFile = toml::from_str(content)
            .map_err(|e| PubrankError::Config(format!("invalid account directory: {e}")))?;
        let accounts = file
            .accounts
            .into_iter()
            .map(|entry| (entry.reference, entry.links))
            .collect();
        Ok(Self { accounts })
    }

    pub fn load(path: &Path) -> Result<Self, PubrankError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for StaticAccountDirectory {
    async fn lookup_canonical_ids_for_account(
        &self,
        reference: &str,
    ) -> Result<Option<Vec<AccountLink>>, LookupError> {
        Ok(self.accounts.get(reference).cloned())
    }
}
