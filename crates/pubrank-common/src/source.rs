//! Publication source abstraction.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::RawPublication;

/// Common interface for bibliographic metadata services.
///
/// Implementations page through the service until it reports no more
/// results. An author with no publications is `Ok(vec![])`, not an error.
#[async_trait]
pub trait ExternalPublicationSource: Send + Sync {
    /// Fetch every publication attributed to one canonical author ID.
    async fn fetch_by_canonical_id(&self, id: &str) -> Result<Vec<RawPublication>, SourceError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "external"
    }
}
