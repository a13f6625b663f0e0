//! Choosing the signature that receives validation information.

use super::types::{SignatureInfo, SignatureKind};
use crate::document::SignedDocument;
use crate::error::Result;
use crate::object::Object;
use log::debug;

/// Pick the signature to validate among `signatures`.
///
/// The latest content signature (largest `ByteRange[1]`) wins. Document
/// timestamps are only chosen when the document has no content signature.
pub fn last_relevant_signature(signatures: Vec<SignatureInfo>) -> Option<SignatureInfo> {
    let latest = |kind: SignatureKind, list: &[SignatureInfo]| {
        list.iter()
            .filter(|sig| sig.kind == kind)
            .filter(|sig| sig.contents_offset().is_some())
            .max_by_key(|sig| sig.contents_offset())
            .cloned()
    };

    let selected = latest(SignatureKind::Signature, &signatures)
        .or_else(|| latest(SignatureKind::DocTimeStamp, &signatures));
    if let Some(sig) = &selected {
        debug!(
            "Selected {:?} signature at offset {:?}",
            sig.kind,
            sig.contents_offset()
        );
    }
    selected
}

/// DocMDP permission level (`/Perms /DocMDP /Reference [..] /TransformParams /P`).
///
/// `None` when the document is not certified. A certified document without
/// an explicit `/P` has level 2.
pub fn docmdp_permission<D: SignedDocument + ?Sized>(document: &D) -> Result<Option<i64>> {
    let Some(perms) = document.catalog_entry("Perms") else {
        return Ok(None);
    };
    let perms = document.resolve(&perms)?;
    let Some(docmdp) = perms.as_dict().and_then(|d| d.get("DocMDP")) else {
        return Ok(None);
    };
    let docmdp = document.resolve(docmdp)?;

    let references = match docmdp.as_dict().and_then(|d| d.get("Reference")) {
        Some(reference) => document.resolve(reference)?,
        None => return Ok(Some(2)),
    };
    for reference in references.as_array().map(Vec::as_slice).unwrap_or(&[]) {
        let reference = document.resolve(reference)?;
        let Some(dict) = reference.as_dict() else {
            continue;
        };
        if dict.get("TransformMethod").and_then(Object::as_name) != Some("DocMDP") {
            continue;
        }
        let params = match dict.get("TransformParams") {
            Some(params) => document.resolve(params)?,
            None => return Ok(Some(2)),
        };
        let level = params
            .as_dict()
            .and_then(|p| p.get("P"))
            .and_then(Object::as_integer)
            .unwrap_or(2);
        return Ok(Some(level));
    }
    Ok(Some(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::types::SignatureSubFilter;

    fn sig(kind: SignatureKind, offset: i64) -> SignatureInfo {
        SignatureInfo {
            kind,
            signer_name: Some(format!("{:?}@{}", kind, offset)),
            signing_time: None,
            reason: None,
            sub_filter: Some(SignatureSubFilter::Pkcs7Detached),
            byte_range: vec![0, offset, offset + 100, 10],
            contents: Vec::new(),
        }
    }

    #[test]
    fn test_latest_content_signature_wins() {
        let chosen = last_relevant_signature(vec![
            sig(SignatureKind::Signature, 100),
            sig(SignatureKind::Signature, 5000),
            sig(SignatureKind::DocTimeStamp, 9000),
            sig(SignatureKind::Signature, 300),
        ])
        .unwrap();
        assert_eq!(chosen.contents_offset(), Some(5000));
        assert_eq!(chosen.kind, SignatureKind::Signature);
    }

    #[test]
    fn test_doc_timestamp_when_no_content_signature() {
        let chosen = last_relevant_signature(vec![
            sig(SignatureKind::DocTimeStamp, 100),
            sig(SignatureKind::DocTimeStamp, 700),
            sig(SignatureKind::Other, 900),
        ])
        .unwrap();
        assert_eq!(chosen.contents_offset(), Some(700));
    }

    #[test]
    fn test_nothing_to_select() {
        assert!(last_relevant_signature(Vec::new()).is_none());
        assert!(last_relevant_signature(vec![sig(SignatureKind::Other, 10)]).is_none());

        let mut no_range = sig(SignatureKind::Signature, 10);
        no_range.byte_range.clear();
        assert!(last_relevant_signature(vec![no_range]).is_none());
    }
}
