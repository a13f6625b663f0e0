//! Error types for the LTV library.
//!
//! This module defines all error types that can occur while collecting
//! validation information and writing the Document Security Store.

/// Result type alias for LTV library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while adding validation information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document carries no signature that could be validated
    #[error("No certificate information or signature found in the document")]
    NoSignatureFound,

    /// The RFC 3161 timestamp token of the signature could not be parsed
    #[error("Failed to parse timestamp token: {0}")]
    TimestampParseError(String),

    /// An existing DSS entry in the document has the wrong shape
    #[error("Malformed document security store: {0}")]
    StructureError(String),

    /// Neither OCSP nor CRL evidence could be obtained for a certificate
    /// that declares a revocation service
    #[error("Could not fetch revocation information for certificate {subject}: {reason}")]
    RevocationUnavailable {
        /// Subject of the certificate
        subject: String,
        /// Last failure reported by the fetcher
        reason: String,
        /// Whether that failure came from the network
        retryable: bool,
    },

    /// A certificate in the chain was revoked at signing time
    #[error("Certificate {subject} (serial {serial}) was revoked at {revoked_at}")]
    CertificateRevoked {
        /// Subject of the revoked certificate
        subject: String,
        /// Hex-encoded serial number
        serial: String,
        /// Revocation time reported by the OCSP responder or CRL
        revoked_at: chrono::DateTime<chrono::Utc>,
    },

    /// The chain does not end in a self-signed or OCSP no-check certificate
    #[error("Incomplete certificate chain: no issuer found for {0}")]
    IncompleteChain(String),

    /// A certificate is reachable from itself
    #[error("Cyclic certificate chain detected at {0}")]
    CyclicChain(String),

    /// Certificate chain exceeds the configured depth
    #[error("Certificate chain depth limit exceeded (max: {0})")]
    ChainTooLong(usize),

    /// X.509 certificate could not be parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// CMS SignedData could not be parsed
    #[error("CMS error: {0}")]
    Cms(String),

    /// OCSP request could not be built or the response could not be decoded
    #[error("OCSP error: {0}")]
    Ocsp(String),

    /// CRL could not be parsed or verified
    #[error("CRL error: {0}")]
    Crl(String),

    /// The HTTP client could not be set up
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Referenced object not found in the document
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the whole build later may succeed.
    ///
    /// Only network-origin failures are retryable; a revoked certificate or a
    /// malformed document will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RevocationUnavailable { retryable: true, .. })
    }
}
