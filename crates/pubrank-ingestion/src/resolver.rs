//! Identifier resolution.
//!
//! Input tokens are either external author IDs (all digits, 10–11 long),
//! taken as-is, or internal account references looked up in an
//! [`AccountDirectory`]. A failed lookup or an unknown reference falls back
//! to the literal token, so no non-blank token is lost. Blank tokens are
//! skipped with a debug log. Resolution never fails as a whole.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::future::join_all;
use pubrank_common::{is_canonical_id, AccountDirectory};
use serde::Serialize;
use tracing::{debug, warn};

/// A canonical identifier and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolvedIdentifier {
    pub id: String,
    /// Account reference the ID was resolved through; `None` when given directly.
    pub via_account: Option<String>,
}

impl ResolvedIdentifier {
    pub fn direct(id: impl Into<String>) -> Self {
        Self { id: id.into(), via_account: None }
    }

    pub fn via(id: impl Into<String>, account: impl Into<String>) -> Self {
        Self { id: id.into(), via_account: Some(account.into()) }
    }

    pub fn is_direct(&self) -> bool {
        self.via_account.is_none()
    }
}

#[derive(Clone)]
pub struct IdentifierResolver {
    directory: Arc<dyn AccountDirectory>,
}

impl IdentifierResolver {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self { directory }
    }

    /// Deduplicated set of canonical identifiers for `tokens`.
    pub async fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> BTreeSet<String> {
        self.resolve_detailed(tokens)
            .await
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    /// Like [`resolve`](Self::resolve), keeping the provenance of each ID.
    ///
    /// An ID reached both directly and through an account is reported as
    /// direct; one reached through several accounts reports the smallest
    /// account reference, so the result does not depend on token order.
    /// Output is sorted by ID.
    pub async fn resolve_detailed<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<ResolvedIdentifier> {
        let mut direct = BTreeSet::new();
        let mut accounts = BTreeSet::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                debug!("Skipping blank identifier token");
                continue;
            }
            if is_canonical_id(token) {
                direct.insert(token.to_string());
            } else {
                accounts.insert(token.to_string());
            }
        }

        let lookups = accounts.iter().map(|reference| self.resolve_account(reference));
        let from_accounts = join_all(lookups).await;

        let mut resolved: BTreeMap<String, Option<String>> = BTreeMap::new();
        // accounts are visited in sorted order, so the smallest reference wins
        for found in from_accounts.into_iter().flatten() {
            match found.via_account {
                Some(account) => {
                    resolved.entry(found.id).or_insert(Some(account));
                }
                None => {
                    direct.insert(found.id);
                }
            }
        }
        for id in direct {
            resolved.insert(id, None);
        }

        resolved
            .into_iter()
            .map(|(id, via_account)| ResolvedIdentifier { id, via_account })
            .collect()
    }

    /// Canonical IDs for one account reference. Falls back to the
    /// reference itself, reported as direct, when the lookup fails or the
    /// account is unknown.
    async fn resolve_account(&self, reference: &str) -> Vec<ResolvedIdentifier> {
        match self.directory.lookup_canonical_ids_for_account(reference).await {
            Ok(Some(links)) => {
                let active: Vec<ResolvedIdentifier> = links
                    .into_iter()
                    .filter(|l| l.is_active)
                    .map(|l| ResolvedIdentifier::via(l.canonical_id, reference))
                    .collect();
                if active.is_empty() {
                    warn!(account = reference, "Account has no active author identifiers");
                } else {
                    debug!(account = reference, n = active.len(), "Account resolved");
                }
                active
            }
            Ok(None) => {
                debug!(account = reference, "Unknown account reference; using token as identifier");
                vec![ResolvedIdentifier::direct(reference)]
            }
            Err(e) => {
                warn!(account = reference, error = %e, "Account lookup failed; using token as identifier");
                vec![ResolvedIdentifier::direct(reference)]
            }
        }
    }
}
