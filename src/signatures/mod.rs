//! PDF signature dictionaries.
//!
//! Reads the signature fields of a signed document and decides which
//! signature receives validation information.
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PKCS#7 SHA-1 signatures (adbe.pkcs7.sha1)
//! - PAdES signatures (ETSI.CAdES.detached)
//! - Document timestamps (ETSI.RFC3161)
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ISO 32000-1:2008 Section 12.8.2.2 - DocMDP
//! - ETSI TS 102 778-4 - PAdES Long Term Validation

mod date;
mod selection;
mod types;

pub use date::{format_pdf_date, parse_pdf_date};
pub use selection::{docmdp_permission, last_relevant_signature};
pub use types::{SignatureInfo, SignatureKind, SignatureSubFilter};
