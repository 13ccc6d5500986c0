//! pubrank-common — Shared types, errors, and collaborator traits used across all pubrank crates.

pub mod accounts;
pub mod error;
pub mod models;
pub mod sandbox;
pub mod source;

// Re-export commonly used types
pub use accounts::{AccountDirectory, AccountLink, StaticAccountDirectory};
pub use error::{LookupError, PubrankError, Result, SourceError};
pub use models::{is_canonical_id, Publication, Quartile, RawPublication, SjrMetric};
pub use source::ExternalPublicationSource;
