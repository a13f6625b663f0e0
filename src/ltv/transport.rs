//! HTTP transport for OCSP, CRL and issuer certificate downloads.

use std::sync::Arc;

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Connection, timeout or body read failure
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Requested URL
        url: String,
        /// Underlying error
        reason: String,
    },
}

/// Blocking HTTP client used by the revocation fetcher and the certificate
/// collector.
pub trait HttpTransport {
    /// GET `url` and return the body.
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;

    /// POST `body` to `url` with the given content type and return the body.
    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).get(url)
    }

    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).post(url, content_type, body)
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).get(url)
    }

    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).post(url, content_type, body)
    }
}

#[cfg(feature = "http")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use super::{HttpTransport, TransportError};
    use crate::config::LtvConfig;
    use reqwest::blocking::Client;
    use reqwest::header::{ACCEPT, CONTENT_TYPE};

    /// [`HttpTransport`] backed by a blocking reqwest client.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
    }

    impl ReqwestTransport {
        /// Create a client with the configured timeout and user agent.
        pub fn new(config: &LtvConfig) -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(config.timeout())
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| TransportError::Request {
                    url: String::new(),
                    reason: format!("failed to create HTTP client: {}", e),
                })?;
            Ok(Self { client })
        }

        fn finish(
            url: &str,
            response: reqwest::Result<reqwest::blocking::Response>,
        ) -> Result<Vec<u8>, TransportError> {
            let request_err = |e: reqwest::Error| TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            };
            let response = response.map_err(request_err)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(response.bytes().map_err(request_err)?.to_vec())
        }
    }

    impl HttpTransport for ReqwestTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            log::debug!("GET {}", url);
            Self::finish(url, self.client.get(url).send())
        }

        fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>, TransportError> {
            log::debug!("POST {} ({} bytes, {})", url, body.len(), content_type);
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, content_type)
                .header(ACCEPT, "application/ocsp-response")
                .body(body.to_vec())
                .send();
            Self::finish(url, response)
        }
    }
}
