use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::PubrankError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "pubrank/0.1 (publication-aggregation)";

/// An HTTP client that only allows requests to approved domains.
/// Every outbound call to a bibliographic service goes through it.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist of bibliographic domains.
    pub fn new() -> Result<Self, PubrankError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, PubrankError> {
        let mut allowlist = HashSet::new();
        let domains = [
            "api.elsevier.com", // Scopus search
            "www.scimagojr.com", // SJR dataset downloads
            "api.crossref.org", // DOI metadata
            "localhost",
            "127.0.0.1",
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PubrankError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of `url`, e.g. a configured API base URL.
    pub fn allow_url_host(&mut self, url: &str) -> Result<(), PubrankError> {
        let parsed = Url::parse(url)
            .map_err(|e| PubrankError::Config(format!("invalid URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| PubrankError::Config(format!("URL has no host: {url}")))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// GET request builder for an allowed URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PubrankError> {
        if !self.is_allowed(url) {
            return Err(PubrankError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_matches_subdomains() {
        let client = SandboxClient::new().unwrap();
        assert!(client.is_allowed("https://api.elsevier.com/content/search/scopus"));
        assert!(client.is_allowed("http://localhost:8080/mock"));
        assert!(!client.is_allowed("https://evil.example.com/"));
        assert!(!client.is_allowed("not a url"));
    }

    #[test]
    fn test_allow_url_host() {
        let mut client = SandboxClient::new().unwrap();
        assert!(!client.is_allowed("https://mirror.example.org/search"));
        client.allow_url_host("https://mirror.example.org/search").unwrap();
        assert!(client.is_allowed("https://mirror.example.org/search?start=25"));
    }

    #[test]
    fn test_get_rejects_unlisted_domain() {
        let client = SandboxClient::new().unwrap();
        let err = client.get("https://evil.example.com/").unwrap_err();
        assert!(matches!(err, PubrankError::Security(_)));
    }
}
