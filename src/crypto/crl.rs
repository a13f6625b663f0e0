//! Certificate revocation lists (RFC 5280 Section 5).

use super::{signature_identity_hash, Certificate};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

/// A parsed CRL.
///
/// Keeps the encoding; fields are re-read on demand.
#[derive(Debug, Clone)]
pub struct Crl {
    der: Vec<u8>,
    issuer: Vec<u8>,
    signature: Vec<u8>,
}

impl Crl {
    /// Parse a DER CRL.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, crl) = CertificateRevocationList::from_der(der)
            .map_err(|e| Error::Crl(format!("failed to parse CRL: {}", e)))?;
        Ok(Self {
            issuer: crl.issuer().as_raw().to_vec(),
            signature: crl.signature_value.data.to_vec(),
            der: der.to_vec(),
        })
    }

    /// Encoded issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer
    }

    /// VRI key of this CRL: SHA-1 of the signature wrapped in an OCTET
    /// STRING.
    pub fn signature_hash(&self) -> String {
        signature_identity_hash(&self.signature)
    }

    /// Certificates among `candidates` whose subject matches the CRL issuer.
    pub fn issuer_candidates<'a>(
        &'a self,
        candidates: &'a [Certificate],
    ) -> impl Iterator<Item = &'a Certificate> + 'a {
        candidates
            .iter()
            .filter(move |cert| cert.subject_raw() == self.issuer.as_slice())
    }

    /// Verify the CRL signature with `issuer`'s public key.
    pub fn verify(&self, issuer: &Certificate) -> Result<()> {
        let (_, crl) = CertificateRevocationList::from_der(&self.der)
            .map_err(|e| Error::Crl(e.to_string()))?;
        let (_, issuer_x509) = X509Certificate::from_der(issuer.der())
            .map_err(|e| Error::Crl(format!("cannot use {} as CRL issuer: {}", issuer.subject(), e)))?;
        crl.verify_signature(issuer_x509.public_key())
            .map_err(|e| Error::Crl(format!("CRL signature does not verify: {}", e)))
    }

    /// Revocation time of `cert`, if the CRL lists it.
    pub fn revocation_time(&self, cert: &Certificate) -> Result<Option<DateTime<Utc>>> {
        let (_, crl) = CertificateRevocationList::from_der(&self.der)
            .map_err(|e| Error::Crl(e.to_string()))?;
        for revoked in crl.iter_revoked_certificates() {
            if cert.has_serial(revoked.raw_serial()) {
                let at = DateTime::from_timestamp(revoked.revocation_date.timestamp(), 0)
                    .ok_or_else(|| Error::Crl("revocation date out of range".to_string()))?;
                return Ok(Some(at));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_der_rejects_garbage() {
        let err = Crl::from_der(b"-----BEGIN X509 CRL-----").unwrap_err();
        assert!(matches!(err, Error::Crl(_)));
    }
}
