//! Cryptographic and ASN.1 capabilities used by the LTV builder.
//!
//! - **Certificates**: X.509 parsing and the revocation-related extensions
//!   (Authority Information Access, CRL Distribution Points, OCSP no-check)
//! - **CMS**: signer and certificate extraction from SignedData, RFC 3161
//!   timestamp generation time
//! - **OCSP**: RFC 6960 request encoding and response decoding
//! - **CRL**: parsing, signature verification and serial lookup
//! - **Digests**: VRI keys (upper-case hex SHA-1)
//!
//! ## Standards Reference
//!
//! - RFC 5280 - X.509 certificates and CRLs
//! - RFC 6960 - OCSP
//! - RFC 5652 - CMS, RFC 3161 - Time-Stamp Protocol
//! - ETSI TS 102 778-4 - PAdES Long Term Validation

mod asn1;
mod certificate;
pub mod cms;
pub mod crl;
mod digest;
pub mod ocsp;

pub use certificate::{Certificate, CertificateId};
#[doc(hidden)]
pub use certificate::CertificateParts;
pub use digest::{sha1_hex, signature_identity_hash, to_hex};
