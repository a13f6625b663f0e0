//! Digest helpers for VRI keys.

use sha1::{Digest, Sha1};

/// Upper-case hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Upper-case hex SHA-1 of `data`.
pub fn sha1_hex(data: &[u8]) -> String {
    to_hex(&Sha1::digest(data))
}

/// VRI key of a signature value.
///
/// The key is the SHA-1 of the signature bytes wrapped in a primitive
/// OCTET STRING (tag, definite length, contents). This is the key used for
/// the CMS signature of the document as well as for OCSP response and CRL
/// signatures.
pub fn signature_identity_hash(signature: &[u8]) -> String {
    let mut encoded = Vec::with_capacity(signature.len() + 6);
    encoded.push(0x04);
    encode_length(&mut encoded, signature.len());
    encoded.extend_from_slice(signature);
    sha1_hex(&encoded)
}

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}
