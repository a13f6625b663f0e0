//! DSS builder.
//!
//! Entry point that turns a signed document into the same document plus an
//! incremental update carrying the Document Security Store.

use super::assembler::VriAssembler;
use super::collector::CertGraphSource;
use super::fetcher::RevocationFetcher;
use super::store::DssStore;
use crate::config::LtvConfig;
use crate::crypto::cms::timestamp_generation_time;
use crate::document::SignedDocument;
use crate::error::{Error, Result};
use crate::signatures::{docmdp_permission, last_relevant_signature, SignatureInfo};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

/// Adds long-term validation information to one document.
///
/// A builder is consumed by [`DssBuilder::build`]; every build gets a fresh
/// store and fresh revocation bookkeeping.
///
/// # Example
///
/// ```ignore
/// use pdf_ltv::ltv::{CertInfoCollector, DssBuilder, OnlineRevocationFetcher, ReqwestTransport};
///
/// let transport = ReqwestTransport::new(&config)?;
/// let builder = DssBuilder::new(
///     OnlineRevocationFetcher::new(transport.clone()),
///     CertInfoCollector::new(transport, config.clone()),
///     config,
/// );
/// let bytes = builder.build(&mut document)?;
/// ```
#[derive(Debug)]
pub struct DssBuilder<F, S> {
    fetcher: F,
    source: S,
    config: LtvConfig,
}

impl<F: RevocationFetcher, S: CertGraphSource> DssBuilder<F, S> {
    /// Create a builder from its collaborators.
    pub fn new(fetcher: F, source: S, config: LtvConfig) -> Self {
        Self {
            fetcher,
            source,
            config,
        }
    }

    /// Add a DSS for the last relevant signature of `document` and return
    /// the updated file.
    ///
    /// On error nothing is written and the document is left unchanged.
    pub fn build<D: SignedDocument + ?Sized>(mut self, document: &mut D) -> Result<Vec<u8>> {
        let signatures = document
            .signature_dictionaries()?
            .iter()
            .map(SignatureInfo::from_dict)
            .collect();
        let signature = last_relevant_signature(signatures).ok_or(Error::NoSignatureFound)?;
        let sign_date = signing_time(&signature)?;
        info!("Adding validation information for signature of {}", sign_date);

        if docmdp_permission(&*document)? == Some(1) {
            warn!(
                "Document is certified to forbid changes; some viewers may report it as \
                 invalid although DSS additions are allowed"
            );
        }

        let store = DssStore::merge_or_create(&*document)?;

        let root = self.source.signature_node(&signature.contents)?;
        root.verify_complete()?;

        let mut assembler = VriAssembler::new(&self.fetcher, &mut self.source, store, sign_date);
        assembler.assemble(&root)?;
        let mut store = assembler.into_store();

        store.finalize(&self.source.certificates());
        store.write_into(document, &self.config)?;

        let mut out = Vec::new();
        document.write_incremental(&mut out)?;
        debug!("Incremental update written ({} bytes total)", out.len());
        Ok(out)
    }
}

/// Authoritative signing time of `signature`.
///
/// Document timestamps use the token's generation time; other signatures
/// use `/M`, falling back to the current time when it is absent.
pub fn signing_time(signature: &SignatureInfo) -> Result<DateTime<Utc>> {
    if signature.sub_filter.map_or(false, |f| f.is_timestamp()) {
        return timestamp_generation_time(&signature.contents);
    }
    match signature.signing_time {
        Some(time) => Ok(time),
        None => {
            warn!("Signature has no signing time; evaluating revocation as of now");
            Ok(Utc::now())
        },
    }
}

/// Add validation information using the network.
///
/// Convenience wrapper around [`DssBuilder`] with an
/// [`OnlineRevocationFetcher`](super::OnlineRevocationFetcher) and a
/// [`CertInfoCollector`](super::CertInfoCollector) sharing one
/// [`ReqwestTransport`](super::ReqwestTransport).
#[cfg(feature = "http")]
pub fn add_validation_information<D: SignedDocument + ?Sized>(
    document: &mut D,
    config: &LtvConfig,
) -> Result<Vec<u8>> {
    use super::collector::CertInfoCollector;
    use super::fetcher::OnlineRevocationFetcher;
    use super::transport::ReqwestTransport;
    use std::sync::Arc;

    let transport =
        Arc::new(ReqwestTransport::new(config).map_err(|e| Error::Transport(e.to_string()))?);
    DssBuilder::new(
        OnlineRevocationFetcher::new(Arc::clone(&transport)),
        CertInfoCollector::new(transport, config.clone()),
        config.clone(),
    )
    .build(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::{SignatureKind, SignatureSubFilter};
    use chrono::TimeZone;

    fn signature(sub_filter: SignatureSubFilter, time: Option<DateTime<Utc>>) -> SignatureInfo {
        SignatureInfo {
            kind: SignatureKind::Signature,
            signer_name: None,
            signing_time: time,
            reason: None,
            sub_filter: Some(sub_filter),
            byte_range: vec![0, 10, 20, 10],
            contents: vec![0u8; 16],
        }
    }

    #[test]
    fn test_signing_time_from_dictionary() {
        let time = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let sig = signature(SignatureSubFilter::CadesDetached, Some(time));
        assert_eq!(signing_time(&sig).unwrap(), time);
    }

    #[test]
    fn test_signing_time_defaults_to_now() {
        let before = Utc::now();
        let sig = signature(SignatureSubFilter::Pkcs7Detached, None);
        assert!(signing_time(&sig).unwrap() >= before);
    }

    #[test]
    fn test_bad_timestamp_token_is_fatal() {
        let sig = signature(SignatureSubFilter::Rfc3161, None);
        assert!(matches!(signing_time(&sig), Err(Error::TimestampParseError(_))));
    }
}
