// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF LTV
//!
//! PAdES long-term validation for signed PDFs: adds a Document Security
//! Store (DSS) so that a signature can still be verified after the signer's
//! certificate, OCSP responders and CRLs are gone.
//!
//! ## Core Features
//!
//! - **Signature selection**: latest content signature, document timestamps
//!   as fallback, signing time from the RFC 3161 token or `/M`
//! - **Certificate chains**: signer chain from the CMS SignedData, issuer
//!   download through AIA caIssuers, timestamp authority chain
//! - **Revocation evidence**: OCSP first, CRL as fallback, both evaluated at
//!   signing time; a revoked certificate aborts the build
//! - **VRI records**: one per signature, plus nested records for OCSP
//!   responders and CRL issuers (ETSI TS 102 778-4)
//! - **Incremental saves**: the original bytes and every signature stay
//!   untouched
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_ltv::config::LtvConfig;
//! use pdf_ltv::document::IncrementalDocument;
//! use pdf_ltv::ltv::add_validation_information;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut document = IncrementalDocument::new(bytes, trailer, objects)?;
//! let config = LtvConfig::default().with_http_timeout(5);
//! let output = add_validation_information(&mut document, &config)?;
//! std::fs::write("signed-ltv.pdf", output)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// PDF objects and document access
pub mod document;
pub mod object;
pub mod writer;

// Signatures and cryptography
pub mod crypto;
pub mod signatures;

// Long-term validation
pub mod ltv;

// Re-exports
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
