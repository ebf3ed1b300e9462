//! URL acceptance rules applied before any job work starts

use crate::config::ValidationConfig;
use crate::error::ValidationError;
use url::Url;

/// Accepted schemes and hosts for submitted URLs
#[derive(Clone, Debug)]
pub struct UrlPolicy {
    schemes: Vec<String>,
    hosts: Vec<String>,
}

impl UrlPolicy {
    /// Build a policy from configuration (matching is case-insensitive)
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Validate a raw URL and return its trimmed form
    ///
    /// The returned string is what gets handed to the downloader, untouched
    /// apart from surrounding whitespace.
    pub fn check<'a>(&self, raw: &'a str) -> Result<&'a str, ValidationError> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            return Err(ValidationError::Empty);
        }

        let parsed = Url::parse(candidate).map_err(|e| ValidationError::Malformed {
            url: candidate.to_string(),
            reason: e.to_string(),
        })?;

        // Url lowercases the scheme while parsing
        if !self.schemes.iter().any(|s| s == parsed.scheme()) {
            return Err(ValidationError::UnsupportedScheme {
                scheme: parsed.scheme().to_string(),
            });
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ValidationError::MissingHost {
                url: candidate.to_string(),
            })?;

        if !self.host_allowed(host) {
            return Err(ValidationError::HostNotAllowed {
                host: host.to_string(),
            });
        }

        Ok(candidate)
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}
