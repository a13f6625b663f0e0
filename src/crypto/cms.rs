//! CMS SignedData inspection.
//!
//! Extracts what the certificate collector needs from a PDF signature's
//! `/Contents`: the embedded certificates, the signer identifier, the
//! signature value and the signature timestamp token. Also reads the
//! generation time of RFC 3161 timestamp tokens.

use super::asn1;
use super::certificate::strip_leading_zeros;
use super::Certificate;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::{Decode, Encode, Tag, Tagged};

/// id-signedData
const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
/// id-ct-TSTInfo
const OID_TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
/// id-aa-signatureTimeStampToken
const OID_SIGNATURE_TIMESTAMP: &str = "1.2.840.113549.1.9.16.2.14";

/// How a SignerInfo names its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerId {
    /// Encoded issuer name and serial number
    IssuerSerial {
        /// DER issuer Name
        issuer: Vec<u8>,
        /// Serial number contents
        serial: Vec<u8>,
    },
    /// Subject key identifier
    SubjectKeyId(Vec<u8>),
}

impl SignerId {
    /// Whether `cert` is the certificate this identifier names.
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            SignerId::IssuerSerial { issuer, serial } => {
                cert.issuer_raw() == issuer.as_slice() && cert.has_serial(serial)
            },
            SignerId::SubjectKeyId(kid) => cert.subject_key_id() == Some(kid.as_slice()),
        }
    }
}

/// The parts of a SignedData structure used for LTV.
#[derive(Debug, Clone)]
pub struct SignedDataInfo {
    /// DER certificates embedded in the SignedData
    pub certificates: Vec<Vec<u8>>,
    /// Identifier of the first signer
    pub signer: SignerId,
    /// Signature value of the first signer
    pub signature: Vec<u8>,
    /// Signature timestamp token (a ContentInfo), if the signer has one
    pub timestamp_token: Option<Vec<u8>>,
    /// Encapsulated content, present for timestamp tokens
    pub encapsulated_content: Option<Vec<u8>>,
}

impl SignedDataInfo {
    /// Parse a ContentInfo wrapping SignedData.
    ///
    /// Trailing bytes are ignored, so a zero-padded `/Contents` value can be
    /// passed as is.
    pub fn parse(contents: &[u8]) -> Result<Self> {
        let content_info: ContentInfo = asn1::first(contents)
            .map_err(|e| Error::Cms(format!("invalid ContentInfo: {}", e)))?;
        if content_info.content_type.to_string() != OID_SIGNED_DATA {
            return Err(Error::Cms(format!(
                "expected SignedData, found content type {}",
                content_info.content_type
            )));
        }

        let der = content_info
            .content
            .to_der()
            .map_err(|e| Error::Cms(e.to_string()))?;
        let signed_data =
            SignedData::from_der(&der).map_err(|e| Error::Cms(format!("invalid SignedData: {}", e)))?;

        let mut certificates = Vec::new();
        if let Some(set) = &signed_data.certificates {
            for choice in set.0.iter() {
                if let CertificateChoices::Certificate(cert) = choice {
                    certificates.push(cert.to_der().map_err(|e| Error::Cms(e.to_string()))?);
                }
            }
        }

        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Cms("SignedData has no SignerInfo".to_string()))?;

        let signer = match &signer_info.sid {
            SignerIdentifier::IssuerAndSerialNumber(ias) => SignerId::IssuerSerial {
                issuer: ias.issuer.to_der().map_err(|e| Error::Cms(e.to_string()))?,
                serial: strip_leading_zeros(ias.serial_number.as_bytes()).to_vec(),
            },
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                SignerId::SubjectKeyId(ski.0.as_bytes().to_vec())
            },
        };

        let mut timestamp_token = None;
        if let Some(attrs) = &signer_info.unsigned_attrs {
            for attr in attrs.iter() {
                if attr.oid.to_string() != OID_SIGNATURE_TIMESTAMP {
                    continue;
                }
                if let Some(value) = attr.values.iter().next() {
                    timestamp_token = Some(value.to_der().map_err(|e| Error::Cms(e.to_string()))?);
                }
            }
        }

        let encapsulated_content = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(|any| any.value().to_vec());

        Ok(Self {
            certificates,
            signer,
            signature: signer_info.signature.as_bytes().to_vec(),
            timestamp_token,
            encapsulated_content: if signed_data.encap_content_info.econtent_type.to_string()
                == OID_TST_INFO
            {
                encapsulated_content
            } else {
                None
            },
        })
    }
}

/// Generation time of an RFC 3161 timestamp token.
///
/// `token` is the ContentInfo of the token, possibly zero-padded.
pub fn timestamp_generation_time(token: &[u8]) -> Result<DateTime<Utc>> {
    let info = SignedDataInfo::parse(token).map_err(|e| Error::TimestampParseError(e.to_string()))?;
    let tst_info = info
        .encapsulated_content
        .ok_or_else(|| Error::TimestampParseError("token carries no TSTInfo".to_string()))?;
    tst_info_generation_time(&tst_info)
}

/// `genTime` of a DER TSTInfo, the first GeneralizedTime in the sequence.
fn tst_info_generation_time(tst_info: &[u8]) -> Result<DateTime<Utc>> {
    let parse_err = |e: der::Error| Error::TimestampParseError(format!("invalid TSTInfo: {}", e));
    let seq: der::Any = asn1::first(tst_info).map_err(parse_err)?;
    if seq.tag() != Tag::Sequence {
        return Err(Error::TimestampParseError("TSTInfo is not a SEQUENCE".to_string()));
    }
    asn1::items(seq.value())
        .map_err(parse_err)?
        .iter()
        .find(|item| item.tag() == Tag::GeneralizedTime)
        .and_then(asn1::generalized_time)
        .ok_or_else(|| Error::TimestampParseError("TSTInfo has no valid genTime".to_string()))
}
