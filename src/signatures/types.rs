//! Signature dictionary types.

use super::date::parse_pdf_date;
use crate::object::Object;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - PKCS#7 with SHA-1 digest
    Pkcs7Sha1,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
    /// ETSI.RFC3161 - Timestamp token
    Rfc3161,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }

    /// Whether `/Contents` is an RFC 3161 timestamp token whose generation
    /// time is the signing time.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, SignatureSubFilter::Rfc3161)
    }
}

/// Value of the signature dictionary's `/Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `/Type /Sig` or no `/Type`
    Signature,
    /// `/Type /DocTimeStamp`
    DocTimeStamp,
    /// Any other `/Type`
    Other,
}

/// An existing signature in a PDF.
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    /// Signature dictionary kind
    pub kind: SignatureKind,
    /// Name of the signer
    pub signer_name: Option<String>,
    /// Declared signing time (`/M`)
    pub signing_time: Option<DateTime<Utc>>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signature sub-filter type
    pub sub_filter: Option<SignatureSubFilter>,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Raw `/Contents` (CMS SignedData or timestamp token, zero-padded)
    pub contents: Vec<u8>,
}

impl SignatureInfo {
    /// Read a signature dictionary.
    pub fn from_dict(dict: &HashMap<String, Object>) -> Self {
        let text = |key: &str| {
            dict.get(key)
                .and_then(Object::as_string)
                .map(|s| String::from_utf8_lossy(s).to_string())
        };

        let kind = match dict.get("Type").and_then(Object::as_name) {
            None | Some("Sig") => SignatureKind::Signature,
            Some("DocTimeStamp") => SignatureKind::DocTimeStamp,
            Some(_) => SignatureKind::Other,
        };

        let byte_range = dict
            .get("ByteRange")
            .and_then(Object::as_array)
            .map(|arr| arr.iter().filter_map(Object::as_integer).collect())
            .unwrap_or_default();

        Self {
            kind,
            signer_name: text("Name"),
            signing_time: text("M").and_then(|m| parse_pdf_date(&m)),
            reason: text("Reason"),
            sub_filter: dict
                .get("SubFilter")
                .and_then(Object::as_name)
                .and_then(SignatureSubFilter::from_pdf_name),
            byte_range,
            contents: dict
                .get("Contents")
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        }
    }

    /// Offset where the signed data is interrupted by `/Contents`
    /// (`ByteRange[1]`); later signatures have larger offsets.
    pub fn contents_offset(&self) -> Option<i64> {
        self.byte_range.get(1).copied()
    }
}
