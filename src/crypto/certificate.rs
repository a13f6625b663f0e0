//! X.509 certificate model.

use crate::error::{Error, Result};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use x509_parser::extensions::{
    CRLDistributionPoints, DistributionPointName, GeneralName, ParsedExtension,
};
use x509_parser::prelude::*;

const OID_AIA_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_AIA_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";
const OID_OCSP_NO_CHECK: &str = "1.3.6.1.5.5.7.48.1.5";

/// Identity of a certificate: SHA-256 of its DER encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificateId([u8; 32]);

impl CertificateId {
    /// Fingerprint of `der`.
    pub fn of(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Certificate attributes supplied directly, without parsing DER.
///
/// Only for tests that model chains by name. Certificates built this way
/// never have their signatures checked.
#[doc(hidden)]
#[derive(Debug, Clone, Default)]
pub struct CertificateParts {
    /// Encoded certificate, written to the DSS verbatim
    pub der: Vec<u8>,
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number, big-endian
    pub serial: Vec<u8>,
    /// DER SubjectPublicKeyInfo
    pub public_key_info: Vec<u8>,
    /// Subject public key bit string contents
    pub public_key: Vec<u8>,
    /// Subject key identifier extension
    pub subject_key_id: Option<Vec<u8>>,
    /// AIA OCSP responder URL
    pub ocsp_url: Option<String>,
    /// AIA caIssuers URL
    pub issuer_url: Option<String>,
    /// First HTTP(S) CRL distribution point
    pub crl_url: Option<String>,
    /// id-pkix-ocsp-nocheck extension present
    pub ocsp_no_check: bool,
    /// Issued by itself
    pub self_signed: bool,
}

/// A parsed X.509 certificate.
///
/// Cheap to clone; equality and hashing use the DER fingerprint.
#[derive(Clone)]
pub struct Certificate {
    inner: Arc<Inner>,
}

struct Inner {
    id: CertificateId,
    der: Bytes,
    subject: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    serial: Vec<u8>,
    public_key_info: Vec<u8>,
    public_key: Vec<u8>,
    subject_key_id: Option<Vec<u8>>,
    ocsp_url: Option<String>,
    issuer_url: Option<String>,
    crl_url: Option<String>,
    ocsp_no_check: bool,
    self_signed: bool,
    parsed: bool,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, x509) = X509Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {}", e)))?;

        let mut ocsp_url = None;
        let mut issuer_url = None;
        let mut crl_url = None;
        let mut subject_key_id = None;
        let mut ocsp_no_check = false;

        for ext in x509.extensions() {
            if ext.oid.to_id_string() == OID_OCSP_NO_CHECK {
                ocsp_no_check = true;
                continue;
            }
            match ext.parsed_extension() {
                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for access in &aia.accessdescs {
                        let GeneralName::URI(uri) = &access.access_location else {
                            continue;
                        };
                        match access.access_method.to_id_string().as_str() {
                            OID_AIA_OCSP if ocsp_url.is_none() => {
                                ocsp_url = Some(uri.to_string());
                            },
                            OID_AIA_CA_ISSUERS if issuer_url.is_none() => {
                                issuer_url = Some(uri.to_string());
                            },
                            _ => {},
                        }
                    }
                },
                ParsedExtension::CRLDistributionPoints(points) => {
                    if crl_url.is_none() {
                        crl_url = first_http_distribution_point(points);
                    }
                },
                ParsedExtension::SubjectKeyIdentifier(kid) => {
                    subject_key_id = Some(kid.0.to_vec());
                },
                _ => {},
            }
        }

        let subject_raw = x509.subject().as_raw().to_vec();
        let issuer_raw = x509.issuer().as_raw().to_vec();
        let self_signed = subject_raw == issuer_raw && x509.verify_signature(None).is_ok();
        let spki = x509.public_key();

        Ok(Self {
            inner: Arc::new(Inner {
                id: CertificateId::of(der),
                der: Bytes::copy_from_slice(der),
                subject: x509.subject().to_string(),
                subject_raw,
                issuer_raw,
                serial: x509.raw_serial().to_vec(),
                public_key_info: spki.raw.to_vec(),
                public_key: spki.subject_public_key.data.to_vec(),
                subject_key_id,
                ocsp_url,
                issuer_url,
                crl_url,
                ocsp_no_check,
                self_signed,
                parsed: true,
            }),
        })
    }

    /// Build a certificate from already extracted attributes.
    ///
    /// Names are compared as their UTF-8 bytes and no signature check is
    /// possible, so issuer matching relies on names alone. Real input goes
    /// through [`Certificate::from_der`].
    #[doc(hidden)]
    pub fn from_parts(parts: CertificateParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: CertificateId::of(&parts.der),
                der: Bytes::from(parts.der),
                subject_raw: parts.subject.as_bytes().to_vec(),
                issuer_raw: parts.issuer.as_bytes().to_vec(),
                subject: parts.subject,
                serial: parts.serial,
                public_key_info: parts.public_key_info,
                public_key: parts.public_key,
                subject_key_id: parts.subject_key_id,
                ocsp_url: parts.ocsp_url,
                issuer_url: parts.issuer_url,
                crl_url: parts.crl_url,
                ocsp_no_check: parts.ocsp_no_check,
                self_signed: parts.self_signed,
                parsed: false,
            }),
        }
    }

    /// Fingerprint identity.
    pub fn id(&self) -> CertificateId {
        self.inner.id
    }

    /// DER encoding.
    pub fn der(&self) -> &Bytes {
        &self.inner.der
    }

    /// Subject distinguished name, for display.
    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Encoded subject name.
    pub fn subject_raw(&self) -> &[u8] {
        &self.inner.subject_raw
    }

    /// Encoded issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.inner.issuer_raw
    }

    /// Serial number as encoded in the certificate.
    pub fn serial(&self) -> &[u8] {
        &self.inner.serial
    }

    /// Serial number as upper-case hex without leading zero bytes.
    pub fn serial_hex(&self) -> String {
        super::to_hex(strip_leading_zeros(&self.inner.serial))
    }

    /// DER SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> &[u8] {
        &self.inner.public_key_info
    }

    /// Subject public key bits (the value hashed for OCSP key hashes).
    pub fn public_key(&self) -> &[u8] {
        &self.inner.public_key
    }

    /// Subject key identifier, if the extension is present.
    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.inner.subject_key_id.as_deref()
    }

    /// OCSP responder URL from Authority Information Access.
    pub fn ocsp_url(&self) -> Option<&str> {
        self.inner.ocsp_url.as_deref()
    }

    /// Issuer certificate URL from Authority Information Access.
    pub fn issuer_url(&self) -> Option<&str> {
        self.inner.issuer_url.as_deref()
    }

    /// First HTTP(S) CRL distribution point.
    pub fn crl_url(&self) -> Option<&str> {
        self.inner.crl_url.as_deref()
    }

    /// Whether the certificate carries id-pkix-ocsp-nocheck.
    pub fn ocsp_no_check(&self) -> bool {
        self.inner.ocsp_no_check
    }

    /// Whether the certificate is issued by itself.
    pub fn is_self_signed(&self) -> bool {
        self.inner.self_signed
    }

    /// Whether the serial number equals `serial`, ignoring leading zeros.
    pub fn has_serial(&self, serial: &[u8]) -> bool {
        strip_leading_zeros(&self.inner.serial) == strip_leading_zeros(serial)
    }

    /// Whether `issuer` issued this certificate.
    ///
    /// Requires the issuer name to match the candidate's subject. When both
    /// certificates were parsed from DER, the signature must verify too.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        if self.inner.issuer_raw != issuer.inner.subject_raw {
            return false;
        }
        if !(self.inner.parsed && issuer.inner.parsed) {
            return true;
        }
        let (Ok((_, child)), Ok((_, parent))) = (
            X509Certificate::from_der(&self.inner.der),
            X509Certificate::from_der(&issuer.inner.der),
        ) else {
            return false;
        };
        child.verify_signature(Some(parent.public_key())).is_ok()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Certificate {}

impl std::hash::Hash for Certificate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.inner.subject)
            .field("serial", &self.serial_hex())
            .field("id", &self.inner.id)
            .finish()
    }
}

pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    &bytes[skip..]
}

fn first_http_distribution_point(points: &CRLDistributionPoints<'_>) -> Option<String> {
    for point in &points.points {
        if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
            for name in names {
                if let GeneralName::URI(uri) = name {
                    if uri.starts_with("http://") || uri.starts_with("https://") {
                        return Some(uri.to_string());
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(subject: &str, issuer: &str) -> CertificateParts {
        CertificateParts {
            der: format!("{}|{}", subject, issuer).into_bytes(),
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            serial: vec![0x00, 0x0A],
            ..Default::default()
        }
    }

    #[test]
    fn test_from_parts_identity() {
        let a = Certificate::from_parts(parts("CN=Leaf", "CN=CA"));
        let b = Certificate::from_parts(parts("CN=Leaf", "CN=CA"));
        let c = Certificate::from_parts(parts("CN=Other", "CN=CA"));
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_eq!(a.subject(), "CN=Leaf");
    }

    #[test]
    fn test_serial_helpers() {
        let cert = Certificate::from_parts(parts("CN=Leaf", "CN=CA"));
        assert_eq!(cert.serial_hex(), "0A");
        assert!(cert.has_serial(&[0x0A]));
        assert!(!cert.has_serial(&[0x0B]));
    }

    #[test]
    fn test_is_issued_by_name_match() {
        let leaf = Certificate::from_parts(parts("CN=Leaf", "CN=CA"));
        let ca = Certificate::from_parts(parts("CN=CA", "CN=Root"));
        assert!(leaf.is_issued_by(&ca));
        assert!(!ca.is_issued_by(&leaf));
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        let err = Certificate::from_der(b"not a certificate").unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }

    #[test]
    fn test_debug_shows_subject() {
        let cert = Certificate::from_parts(parts("CN=Leaf", "CN=CA"));
        let debug = format!("{:?}", cert);
        assert!(debug.contains("CN=Leaf"));
    }

    #[test]
    fn test_strip_leading_zeros() {
        assert_eq!(strip_leading_zeros(&[0, 0, 1, 0]), &[1, 0]);
        assert!(strip_leading_zeros(&[0, 0]).is_empty());
    }
}
