//! Small DER walking helpers shared by the CMS and OCSP decoders.

use chrono::{DateTime, NaiveDateTime, Utc};
use der::{Any, Decode, DecodeOwned, Encode, Reader, SliceReader, Tag, Tagged};

/// Decode every TLV in `content`, which must be the value of a constructed
/// element (SEQUENCE, SET or explicit context tag).
pub(crate) fn items(content: &[u8]) -> der::Result<Vec<Any>> {
    let mut reader = SliceReader::new(content)?;
    let mut items = Vec::new();
    while !reader.is_finished() {
        items.push(Any::decode(&mut reader)?);
    }
    Ok(items)
}

/// Decode the first TLV of `bytes`, ignoring trailing data.
pub(crate) fn first<'a, T: Decode<'a>>(bytes: &'a [u8]) -> der::Result<T> {
    let mut reader = SliceReader::new(bytes)?;
    T::decode(&mut reader)
}

/// Re-decode an [`Any`] as a concrete type.
pub(crate) fn decode_any<T: DecodeOwned>(any: &Any) -> der::Result<T> {
    let der = any.to_der()?;
    T::from_der(&der)
}

/// Context-specific tag number of `any`, if it has one.
pub(crate) fn context_number(any: &Any) -> Option<u8> {
    match any.tag() {
        Tag::ContextSpecific { number, .. } => Some(number.value()),
        _ => None,
    }
}

/// Parse a GeneralizedTime, tolerating fractional seconds.
///
/// `YYYYMMDDHHMMSS[.fff]Z`
pub(crate) fn generalized_time(any: &Any) -> Option<DateTime<Utc>> {
    if any.tag() != Tag::GeneralizedTime {
        return None;
    }
    let text = std::str::from_utf8(any.value()).ok()?;
    if text.len() < 15 || !text.ends_with('Z') {
        return None;
    }
    NaiveDateTime::parse_from_str(&text[..14], "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}
