//! Configuration for adding validation information.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum certificate chain depth (issuer hops from the signer).
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 5;

/// LTV processing configuration.
///
/// Passed explicitly into the revocation fetcher, the certificate collector
/// and the DSS builder.
///
/// # Example
///
/// ```
/// use pdf_ltv::config::LtvConfig;
///
/// let config = LtvConfig::default()
///     .with_http_timeout(5)
///     .with_fetch_missing_issuers(false);
/// assert_eq!(config.timeout().as_secs(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LtvConfig {
    /// Timeout in seconds for each OCSP, CRL or issuer download.
    pub http_timeout: u64,

    /// Maximum number of issuer hops followed from a certificate.
    pub max_chain_depth: usize,

    /// Download issuer certificates named by the AIA caIssuers URL when they
    /// are not among the known certificates.
    pub fetch_missing_issuers: bool,

    /// Flate-encode certificate, OCSP and CRL streams.
    pub compress_streams: bool,

    /// User-Agent header sent with HTTP requests.
    pub user_agent: String,
}

impl Default for LtvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LtvConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            http_timeout: 10,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            fetch_missing_issuers: true,
            compress_streams: true,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }

    /// Parse configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// HTTP timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Set the HTTP timeout in seconds.
    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout = seconds;
        self
    }

    /// Set the maximum chain depth.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Enable or disable issuer certificate downloads.
    pub fn with_fetch_missing_issuers(mut self, enable: bool) -> Self {
        self.fetch_missing_issuers = enable;
        self
    }

    /// Enable or disable Flate compression of evidence streams.
    pub fn with_compress_streams(mut self, enable: bool) -> Self {
        self.compress_streams = enable;
        self
    }
}
