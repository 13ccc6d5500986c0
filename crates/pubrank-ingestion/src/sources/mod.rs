//! Bibliographic source clients.

pub mod scopus;

pub use pubrank_common::ExternalPublicationSource;
pub use scopus::{ScopusClient, ScopusSettings};
