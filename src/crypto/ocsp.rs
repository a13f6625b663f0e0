//! OCSP request encoding and response decoding (RFC 6960).
//!
//! ```text
//! OCSPResponse ::= SEQUENCE {
//!     responseStatus      OCSPResponseStatus,
//!     responseBytes       [0] EXPLICIT ResponseBytes OPTIONAL }
//!
//! BasicOCSPResponse ::= SEQUENCE {
//!     tbsResponseData     ResponseData,
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     signature           BIT STRING,
//!     certs               [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
//! ```
//!
//! Requests are built with derived DER types. Responses are walked by hand so
//! that the exact `tbsResponseData` bytes are available for signature checks.

use super::asn1;
use super::certificate::strip_leading_zeros;
use super::{signature_identity_hash, Certificate};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use der::asn1::{ObjectIdentifier, OctetString, Uint};
use der::oid::AssociatedOid;
use der::{Any, Encode, Sequence, Tag, Tagged};
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};
use spki::AlgorithmIdentifierOwned;

/// id-sha1
const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
/// id-pkix-ocsp-basic
const OID_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct OcspRequest {
    tbs_request: TbsRequest,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TbsRequest {
    request_list: Vec<Request>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct Request {
    req_cert: CertId,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct CertId {
    hash_algorithm: AlgorithmIdentifierOwned,
    issuer_name_hash: OctetString,
    issuer_key_hash: OctetString,
    serial_number: Uint,
}

/// Encode an unsigned OCSP request for `cert`, issued by `issuer`.
///
/// The CertID uses SHA-1 over the issuer's encoded subject name and public
/// key bits.
pub fn build_request(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
    let err = |e: der::Error| Error::Ocsp(format!("failed to encode request: {}", e));
    let cert_id = CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: OID_SHA1,
            parameters: Some(Any::new(Tag::Null, Vec::new()).map_err(err)?),
        },
        issuer_name_hash: OctetString::new(Sha1::digest(issuer.subject_raw()).to_vec())
            .map_err(err)?,
        issuer_key_hash: OctetString::new(Sha1::digest(issuer.public_key()).to_vec())
            .map_err(err)?,
        serial_number: Uint::new(strip_leading_zeros(cert.serial())).map_err(err)?,
    };
    let request = OcspRequest {
        tbs_request: TbsRequest {
            request_list: vec![Request { req_cert: cert_id }],
        },
    };
    request.to_der().map_err(err)
}

/// OCSPResponseStatus values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Response has valid confirmations
    Successful,
    /// Illegal confirmation request
    MalformedRequest,
    /// Internal error in issuer
    InternalError,
    /// Try again later
    TryLater,
    /// Must sign the request
    SigRequired,
    /// Request unauthorized
    Unauthorized,
    /// Any other value
    Other(u8),
}

impl From<u8> for ResponseStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseStatus::Successful,
            1 => ResponseStatus::MalformedRequest,
            2 => ResponseStatus::InternalError,
            3 => ResponseStatus::TryLater,
            5 => ResponseStatus::SigRequired,
            6 => ResponseStatus::Unauthorized,
            other => ResponseStatus::Other(other),
        }
    }
}

/// How the responder identifies itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// Encoded subject name of the responder certificate
    ByName(Vec<u8>),
    /// SHA-1 of the responder's public key bits
    ByKey(Vec<u8>),
}

/// Revocation status of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    /// Not revoked
    Good,
    /// Revoked at the given time
    Revoked {
        /// revocationTime
        revoked_at: DateTime<Utc>,
    },
    /// Responder does not know the certificate
    Unknown,
}

/// A SingleResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    /// Serial number from the CertID, leading zeros stripped
    pub serial: Vec<u8>,
    /// Certificate status
    pub status: CertStatus,
    /// thisUpdate
    pub this_update: Option<DateTime<Utc>>,
}

/// A decoded BasicOCSPResponse.
#[derive(Debug, Clone)]
pub struct BasicResponse {
    tbs_response_data: Vec<u8>,
    /// Responder identification
    pub responder: ResponderId,
    /// producedAt
    pub produced_at: Option<DateTime<Utc>>,
    /// One entry per requested certificate
    pub responses: Vec<SingleResponse>,
    /// Signature algorithm OID, dotted form
    pub signature_algorithm: String,
    /// Signature bits
    pub signature: Vec<u8>,
    /// DER certificates shipped with the response
    pub certificates: Vec<Vec<u8>>,
}

/// A decoded OCSPResponse.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    /// responseStatus
    pub status: ResponseStatus,
    /// Basic response, present when the status is successful
    pub basic: Option<BasicResponse>,
}

impl OcspResponse {
    /// Decode a DER OCSPResponse.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let err = |e: der::Error| Error::Ocsp(format!("malformed response: {}", e));
        let outer: Any = asn1::first(bytes).map_err(err)?;
        expect_tag(&outer, Tag::Sequence, "OCSPResponse")?;
        let items = asn1::items(outer.value()).map_err(err)?;

        let status = match items.first() {
            Some(item) if item.tag() == Tag::Enumerated && item.value().len() == 1 => {
                ResponseStatus::from(item.value()[0])
            },
            _ => return Err(Error::Ocsp("missing responseStatus".to_string())),
        };

        let basic = match items.get(1) {
            Some(explicit) if asn1::context_number(explicit) == Some(0) => {
                Some(parse_response_bytes(explicit.value())?)
            },
            _ => None,
        };

        Ok(Self { status, basic })
    }
}

impl BasicResponse {
    /// VRI key of this response: SHA-1 of the signature wrapped in an
    /// OCTET STRING.
    pub fn signature_hash(&self) -> String {
        signature_identity_hash(&self.signature)
    }

    /// Single response for `cert`, matched by serial number.
    pub fn response_for(&self, cert: &Certificate) -> Option<&SingleResponse> {
        self.responses
            .iter()
            .find(|single| cert.has_serial(&single.serial))
    }

    /// Whether `cert` is the certificate named by the responder ID.
    pub fn is_responder(&self, cert: &Certificate) -> bool {
        match &self.responder {
            ResponderId::ByName(name) => cert.subject_raw() == name.as_slice(),
            ResponderId::ByKey(hash) => Sha1::digest(cert.public_key()).as_slice() == hash.as_slice(),
        }
    }

    /// Verify the response signature with the responder's public key.
    ///
    /// RSA PKCS#1 v1.5 with SHA-1 or SHA-2 is supported.
    pub fn verify(&self, responder: &Certificate) -> Result<()> {
        let key = RsaPublicKey::from_public_key_der(responder.public_key_info())
            .map_err(|e| Error::Ocsp(format!("unsupported responder key: {}", e)))?;
        let tbs = &self.tbs_response_data;
        let sig = &self.signature;
        match self.signature_algorithm.as_str() {
            "1.2.840.113549.1.1.5" => verify_rsa::<Sha1>(key, tbs, sig),
            "1.2.840.113549.1.1.11" => verify_rsa::<sha2::Sha256>(key, tbs, sig),
            "1.2.840.113549.1.1.12" => verify_rsa::<sha2::Sha384>(key, tbs, sig),
            "1.2.840.113549.1.1.13" => verify_rsa::<sha2::Sha512>(key, tbs, sig),
            other => Err(Error::Ocsp(format!("unsupported signature algorithm {}", other))),
        }
    }
}

fn verify_rsa<D>(key: RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + AssociatedOid,
{
    let signature = RsaSignature::try_from(signature)
        .map_err(|e| Error::Ocsp(format!("invalid signature encoding: {}", e)))?;
    VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .map_err(|_| Error::Ocsp("response signature does not verify".to_string()))
}

fn expect_tag(any: &Any, tag: Tag, what: &str) -> Result<()> {
    if any.tag() == tag {
        Ok(())
    } else {
        Err(Error::Ocsp(format!("{} has tag {}, expected {}", what, any.tag(), tag)))
    }
}

/// ResponseBytes ::= SEQUENCE { responseType OID, response OCTET STRING }
fn parse_response_bytes(explicit: &[u8]) -> Result<BasicResponse> {
    let err = |e: der::Error| Error::Ocsp(format!("malformed responseBytes: {}", e));
    let seq: Any = asn1::first(explicit).map_err(err)?;
    expect_tag(&seq, Tag::Sequence, "ResponseBytes")?;
    let items = asn1::items(seq.value()).map_err(err)?;
    let (Some(kind), Some(response)) = (items.first(), items.get(1)) else {
        return Err(Error::Ocsp("incomplete ResponseBytes".to_string()));
    };

    let kind: ObjectIdentifier = asn1::decode_any(kind).map_err(err)?;
    if kind.to_string() != OID_OCSP_BASIC {
        return Err(Error::Ocsp(format!("unsupported response type {}", kind)));
    }
    expect_tag(response, Tag::OctetString, "response")?;
    parse_basic_response(response.value())
}

fn parse_basic_response(bytes: &[u8]) -> Result<BasicResponse> {
    let err = |e: der::Error| Error::Ocsp(format!("malformed BasicOCSPResponse: {}", e));
    let seq: Any = asn1::first(bytes).map_err(err)?;
    expect_tag(&seq, Tag::Sequence, "BasicOCSPResponse")?;
    let items = asn1::items(seq.value()).map_err(err)?;
    if items.len() < 3 {
        return Err(Error::Ocsp("incomplete BasicOCSPResponse".to_string()));
    }

    let tbs = &items[0];
    expect_tag(tbs, Tag::Sequence, "tbsResponseData")?;
    let tbs_response_data = tbs.to_der().map_err(err)?;

    expect_tag(&items[1], Tag::Sequence, "signatureAlgorithm")?;
    let alg_items = asn1::items(items[1].value()).map_err(err)?;
    let signature_algorithm = match alg_items.first() {
        Some(oid) => asn1::decode_any::<ObjectIdentifier>(oid)
            .map_err(err)?
            .to_string(),
        None => return Err(Error::Ocsp("empty signatureAlgorithm".to_string())),
    };

    expect_tag(&items[2], Tag::BitString, "signature")?;
    let signature = match items[2].value().split_first() {
        Some((0, bits)) => bits.to_vec(),
        _ => return Err(Error::Ocsp("signature has unused bits".to_string())),
    };

    let mut certificates = Vec::new();
    if let Some(explicit) = items.get(3).filter(|i| asn1::context_number(i) == Some(0)) {
        let list: Any = asn1::first(explicit.value()).map_err(err)?;
        for cert in asn1::items(list.value()).map_err(err)? {
            certificates.push(cert.to_der().map_err(err)?);
        }
    }

    let (responder, produced_at, responses) = parse_response_data(tbs.value())?;

    Ok(BasicResponse {
        tbs_response_data,
        responder,
        produced_at,
        responses,
        signature_algorithm,
        signature,
        certificates,
    })
}

type ResponseData = (ResponderId, Option<DateTime<Utc>>, Vec<SingleResponse>);

fn parse_response_data(content: &[u8]) -> Result<ResponseData> {
    let err = |e: der::Error| Error::Ocsp(format!("malformed ResponseData: {}", e));
    let mut items = asn1::items(content).map_err(err)?.into_iter().peekable();

    // version [0] EXPLICIT DEFAULT v1
    if items.peek().and_then(asn1::context_number) == Some(0) {
        items.next();
    }

    let responder = match items.next() {
        Some(id) if asn1::context_number(&id) == Some(1) => ResponderId::ByName(id.value().to_vec()),
        Some(id) if asn1::context_number(&id) == Some(2) => {
            let key: OctetString = asn1::first(id.value()).map_err(err)?;
            ResponderId::ByKey(key.as_bytes().to_vec())
        },
        _ => return Err(Error::Ocsp("missing responderID".to_string())),
    };

    let produced_at = items.next().as_ref().and_then(asn1::generalized_time);

    let responses = match items.next() {
        Some(list) if list.tag() == Tag::Sequence => asn1::items(list.value())
            .map_err(err)?
            .iter()
            .map(parse_single_response)
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(Error::Ocsp("missing responses".to_string())),
    };

    Ok((responder, produced_at, responses))
}

fn parse_single_response(single: &Any) -> Result<SingleResponse> {
    let err = |e: der::Error| Error::Ocsp(format!("malformed SingleResponse: {}", e));
    expect_tag(single, Tag::Sequence, "SingleResponse")?;
    let items = asn1::items(single.value()).map_err(err)?;
    if items.len() < 3 {
        return Err(Error::Ocsp("incomplete SingleResponse".to_string()));
    }

    expect_tag(&items[0], Tag::Sequence, "CertID")?;
    let cert_id = asn1::items(items[0].value()).map_err(err)?;
    let serial = match cert_id.get(3) {
        Some(serial) if serial.tag() == Tag::Integer => strip_leading_zeros(serial.value()).to_vec(),
        _ => return Err(Error::Ocsp("CertID without serialNumber".to_string())),
    };

    let status = match asn1::context_number(&items[1]) {
        Some(0) => CertStatus::Good,
        Some(1) => {
            let revoked_at = asn1::items(items[1].value())
                .map_err(err)?
                .first()
                .and_then(asn1::generalized_time)
                .ok_or_else(|| Error::Ocsp("RevokedInfo without revocationTime".to_string()))?;
            CertStatus::Revoked { revoked_at }
        },
        Some(2) => CertStatus::Unknown,
        _ => return Err(Error::Ocsp("invalid certStatus".to_string())),
    };

    Ok(SingleResponse {
        serial,
        status,
        this_update: asn1::generalized_time(&items[2]),
    })
}
