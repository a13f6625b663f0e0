//! Revocation evidence retrieval.
//!
//! The fetcher turns one [`CertNode`] into a verified OCSP response or CRL,
//! evaluated as of the signing time. It never decides between OCSP and CRL;
//! that is the assembler's job.

use super::cert_node::CertNode;
use super::transport::{HttpTransport, TransportError};
use crate::crypto::crl::Crl;
use crate::crypto::ocsp::{self, CertStatus, OcspResponse, ResponseStatus};
use crate::crypto::Certificate;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

/// Why a fetch produced no evidence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Network, parsing, verification or service failure
    #[error("revocation information unavailable: {reason}")]
    Unavailable {
        /// What went wrong
        reason: String,
        /// Whether the failure came from the network or a temporarily
        /// unavailable service
        retryable: bool,
    },

    /// The certificate was revoked at or before the signing time
    #[error("certificate revoked at {revoked_at}")]
    Revoked {
        /// Revocation time reported by the service
        revoked_at: DateTime<Utc>,
    },
}

impl FetchError {
    /// Failure reaching the service; a later attempt may succeed.
    pub fn network(reason: impl Into<String>) -> Self {
        FetchError::Unavailable {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// The service answered with something unusable.
    pub fn invalid(reason: impl Into<String>) -> Self {
        FetchError::Unavailable {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Unavailable { retryable: true, .. })
    }
}

impl From<crate::error::Error> for FetchError {
    fn from(err: crate::error::Error) -> Self {
        FetchError::invalid(err.to_string())
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        FetchError::network(err.to_string())
    }
}

/// A verified OCSP response.
#[derive(Debug, Clone)]
pub struct OcspEvidence {
    /// Encoded OCSPResponse, stored verbatim
    pub encoded: Bytes,
    /// VRI key of the response signature
    pub signature_hash: String,
    /// Certificate that signed the response
    pub responder: Certificate,
    /// Certificates shipped inside the response
    pub certificates: Vec<Certificate>,
}

/// A verified CRL.
#[derive(Debug, Clone)]
pub struct CrlEvidence {
    /// Encoded CRL, stored verbatim
    pub encoded: Bytes,
    /// VRI key of the CRL signature
    pub signature_hash: String,
    /// Certificate that signed the CRL
    pub issuer: Certificate,
}

/// Source of revocation evidence for single certificates.
pub trait RevocationFetcher {
    /// Query the node's OCSP responder about `node.certificate`.
    fn fetch_ocsp(
        &self,
        node: &CertNode,
        sign_date: DateTime<Utc>,
        known_certs: &[Certificate],
    ) -> Result<OcspEvidence, FetchError>;

    /// Download and check the node's CRL.
    fn fetch_crl(
        &self,
        node: &CertNode,
        sign_date: DateTime<Utc>,
        known_certs: &[Certificate],
    ) -> Result<CrlEvidence, FetchError>;
}

/// [`RevocationFetcher`] that talks to the services named in the
/// certificates.
#[derive(Debug, Clone)]
pub struct OnlineRevocationFetcher<T> {
    transport: T,
}

impl<T: HttpTransport> OnlineRevocationFetcher<T> {
    /// Create a fetcher using `transport` for all requests.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: HttpTransport> RevocationFetcher for OnlineRevocationFetcher<T> {
    fn fetch_ocsp(
        &self,
        node: &CertNode,
        sign_date: DateTime<Utc>,
        known_certs: &[Certificate],
    ) -> Result<OcspEvidence, FetchError> {
        let (Some(url), Some(issuer)) = (node.ocsp_url.as_deref(), node.issuer_certificate.as_ref())
        else {
            return Err(FetchError::invalid("no OCSP URL or issuer certificate".to_string()));
        };

        let request = ocsp::build_request(&node.certificate, issuer)?;
        debug!("OCSP request for {} to {}", node.subject(), url);
        let body = self.transport.post(url, "application/ocsp-request", &request)?;

        let response = OcspResponse::parse(&body)?;
        if response.status != ResponseStatus::Successful {
            let reason = format!("OCSP responder {} answered {:?}", url, response.status);
            return Err(match response.status {
                ResponseStatus::TryLater | ResponseStatus::InternalError => FetchError::network(reason),
                _ => FetchError::invalid(reason),
            });
        }
        let basic = response
            .basic
            .ok_or_else(|| FetchError::invalid("OCSP response has no basic response".to_string()))?;

        let certificates: Vec<Certificate> = basic
            .certificates
            .iter()
            .filter_map(|der| match Certificate::from_der(der) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    warn!("Skipping unreadable certificate in OCSP response: {}", e);
                    None
                },
            })
            .collect();

        let responder = certificates
            .iter()
            .chain(known_certs)
            .chain(std::iter::once(issuer))
            .find(|cert| basic.is_responder(cert))
            .cloned()
            .ok_or_else(|| FetchError::invalid("OCSP responder certificate not found".to_string()))?;

        if responder != *issuer && !responder.is_issued_by(issuer) {
            return Err(FetchError::invalid(format!(
                "OCSP responder {} is not authorized by {}",
                responder.subject(),
                issuer.subject()
            )));
        }
        basic.verify(&responder)?;

        let single = basic.response_for(&node.certificate).ok_or_else(|| {
            FetchError::invalid(format!(
                "OCSP response does not cover serial {}",
                node.certificate.serial_hex()
            ))
        })?;
        check_status(node, single.status, sign_date)?;

        Ok(OcspEvidence {
            signature_hash: basic.signature_hash(),
            encoded: Bytes::from(body),
            responder,
            certificates,
        })
    }

    fn fetch_crl(
        &self,
        node: &CertNode,
        sign_date: DateTime<Utc>,
        known_certs: &[Certificate],
    ) -> Result<CrlEvidence, FetchError> {
        let Some(url) = node.crl_url.as_deref() else {
            return Err(FetchError::invalid("no CRL distribution point".to_string()));
        };

        debug!("Downloading CRL for {} from {}", node.subject(), url);
        let body = self.transport.get(url)?;
        let crl = Crl::from_der(&body)?;

        let issuer = crl
            .issuer_candidates(known_certs)
            .chain(node.issuer_certificate.iter())
            .find(|candidate| match crl.verify(candidate) {
                Ok(()) => true,
                Err(e) => {
                    debug!("CRL not signed by {}: {}", candidate.subject(), e);
                    false
                },
            })
            .cloned()
            .ok_or_else(|| {
                FetchError::invalid(format!("no certificate verifies the CRL from {}", url))
            })?;

        if let Some(revoked_at) = crl.revocation_time(&node.certificate)? {
            check_status(node, CertStatus::Revoked { revoked_at }, sign_date)?;
        }

        Ok(CrlEvidence {
            signature_hash: crl.signature_hash(),
            encoded: Bytes::from(body),
            issuer,
        })
    }
}

/// Apply the status as of `sign_date`.
///
/// A revocation after the signing time does not invalidate the signature.
fn check_status(
    node: &CertNode,
    status: CertStatus,
    sign_date: DateTime<Utc>,
) -> Result<(), FetchError> {
    match status {
        CertStatus::Good => Ok(()),
        CertStatus::Revoked { revoked_at } if revoked_at <= sign_date => {
            Err(FetchError::Revoked { revoked_at })
        },
        CertStatus::Revoked { revoked_at } => {
            info!(
                "Certificate {} was revoked at {}, after signing at {}",
                node.subject(),
                revoked_at,
                sign_date
            );
            Ok(())
        },
        CertStatus::Unknown => Err(FetchError::invalid(format!(
            "OCSP status of {} is unknown",
            node.subject()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CertificateParts;
    use chrono::TimeZone;
    use std::cell::RefCell;

    struct FixedTransport {
        body: Result<Vec<u8>, u16>,
        requests: RefCell<Vec<String>>,
    }

    impl HttpTransport for FixedTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.requests.borrow_mut().push(format!("GET {}", url));
            self.body.clone().map_err(|status| TransportError::Status {
                url: url.to_string(),
                status,
            })
        }

        fn post(&self, url: &str, content_type: &str, _body: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.requests
                .borrow_mut()
                .push(format!("POST {} {}", url, content_type));
            self.body.clone().map_err(|status| TransportError::Status {
                url: url.to_string(),
                status,
            })
        }
    }

    fn node() -> CertNode {
        let issuer = Certificate::from_parts(CertificateParts {
            der: b"ca".to_vec(),
            subject: "CN=CA".to_string(),
            issuer: "CN=CA".to_string(),
            self_signed: true,
            ..Default::default()
        });
        let leaf = Certificate::from_parts(CertificateParts {
            der: b"leaf".to_vec(),
            subject: "CN=Leaf".to_string(),
            issuer: "CN=CA".to_string(),
            serial: vec![0x11],
            ocsp_url: Some("http://ocsp.example".to_string()),
            crl_url: Some("http://crl.example/ca.crl".to_string()),
            ..Default::default()
        });
        CertNode::new(leaf).with_parent(CertNode::new(issuer))
    }

    fn sign_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_ocsp_http_error_is_unavailable() {
        let fetcher = OnlineRevocationFetcher::new(FixedTransport {
            body: Err(500),
            requests: RefCell::new(Vec::new()),
        });
        let err = fetcher.fetch_ocsp(&node(), sign_date(), &[]).unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { ref reason, retryable: true } if reason.contains("HTTP 500")));
        assert_eq!(
            *fetcher.transport.requests.borrow(),
            vec!["POST http://ocsp.example application/ocsp-request"]
        );
    }

    #[test]
    fn test_ocsp_garbage_is_unavailable() {
        let fetcher = OnlineRevocationFetcher::new(FixedTransport {
            body: Ok(b"<html>busy</html>".to_vec()),
            requests: RefCell::new(Vec::new()),
        });
        let err = fetcher.fetch_ocsp(&node(), sign_date(), &[]).unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { retryable: false, .. }));
    }

    #[test]
    fn test_ocsp_without_issuer_makes_no_request() {
        let fetcher = OnlineRevocationFetcher::new(FixedTransport {
            body: Ok(Vec::new()),
            requests: RefCell::new(Vec::new()),
        });
        let orphan = CertNode::new(node().certificate);
        assert!(fetcher.fetch_ocsp(&orphan, sign_date(), &[]).is_err());
        assert!(fetcher.transport.requests.borrow().is_empty());
    }

    #[test]
    fn test_crl_garbage_is_unavailable() {
        let fetcher = OnlineRevocationFetcher::new(FixedTransport {
            body: Ok(b"not a crl".to_vec()),
            requests: RefCell::new(Vec::new()),
        });
        let err = fetcher.fetch_crl(&node(), sign_date(), &[]).unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { retryable: false, .. }));
        assert_eq!(
            *fetcher.transport.requests.borrow(),
            vec!["GET http://crl.example/ca.crl"]
        );
    }

    #[test]
    fn test_check_status_relative_to_sign_date() {
        let n = node();
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(check_status(&n, CertStatus::Good, sign_date()).is_ok());
        assert_eq!(
            check_status(&n, CertStatus::Revoked { revoked_at: before }, sign_date()),
            Err(FetchError::Revoked { revoked_at: before })
        );
        assert!(check_status(&n, CertStatus::Revoked { revoked_at: after }, sign_date()).is_ok());
        assert!(matches!(
            check_status(&n, CertStatus::Unknown, sign_date()),
            Err(FetchError::Unavailable { retryable: false, .. })
        ));
    }
}
