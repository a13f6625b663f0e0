//! VRI assembly.
//!
//! Walks a signature's certificate graph, asks the [`RevocationFetcher`] for
//! evidence (OCSP first, CRL as fallback) and records one VRI per signature
//! that needs proof: the document signature itself and every OCSP response
//! or CRL whose signer must in turn be proven.
//!
//! Evidence gathered by a call is returned to the caller as a
//! [`CollectedEvidence`] value. A nested VRI built for a responder keeps its
//! own evidence, so it never shows up in the VRI of the certificate that
//! triggered the nested build.

use super::cert_node::CertNode;
use super::collector::CertGraphSource;
use super::fetcher::{CrlEvidence, FetchError, OcspEvidence, RevocationFetcher};
use super::store::DssStore;
use crate::crypto::{Certificate, CertificateId};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Revocation progress for one certificate within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationState {
    /// Nothing has been tried yet
    #[default]
    NotChecked,
    /// OCSP was queried and failed; only CRL remains
    OcspAttempted,
    /// Evidence was fetched and its signer is being proven
    InProgress,
    /// Evidence is in the store
    Satisfied,
}

/// Pool indices of the evidence gathered by one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedEvidence {
    /// Indices into the OCSP pool
    pub ocsp: Vec<usize>,
    /// Indices into the CRL pool
    pub crl: Vec<usize>,
}

impl CollectedEvidence {
    /// Whether nothing was gathered.
    pub fn is_empty(&self) -> bool {
        self.ocsp.is_empty() && self.crl.is_empty()
    }

    fn extend(&mut self, other: CollectedEvidence) {
        self.ocsp.extend(other.ocsp);
        self.crl.extend(other.crl);
    }
}

/// Builds VRI records into a [`DssStore`].
///
/// One assembler serves exactly one build.
pub struct VriAssembler<'a, F: ?Sized, S: ?Sized> {
    fetcher: &'a F,
    source: &'a mut S,
    store: DssStore,
    sign_date: DateTime<Utc>,
    states: HashMap<CertificateId, RevocationState>,
}

impl<'a, F, S> VriAssembler<'a, F, S>
where
    F: RevocationFetcher + ?Sized,
    S: CertGraphSource + ?Sized,
{
    /// Create an assembler evaluating revocation as of `sign_date`.
    pub fn new(fetcher: &'a F, source: &'a mut S, store: DssStore, sign_date: DateTime<Utc>) -> Self {
        Self {
            fetcher,
            source,
            store,
            sign_date,
            states: HashMap::new(),
        }
    }

    /// Build the VRI of the document signature rooted at `root`, then
    /// gather evidence for its timestamp authority chain.
    ///
    /// TSA evidence goes into the pools only; no VRI references it.
    pub fn assemble(&mut self, root: &CertNode) -> Result<()> {
        self.build_vri(root)?;

        if let Some(tsa) = root.tsa_chain.as_deref() {
            debug!("Collecting revocation information for TSA {}", tsa.subject());
            let discarded = self.collect_revocation(tsa, &mut Vec::new())?;
            debug!(
                "TSA chain added {} OCSP responses and {} CRLs",
                discarded.ocsp.len(),
                discarded.crl.len()
            );
            for node in tsa.chain() {
                self.store.add_visited(&node.certificate);
            }
        }
        Ok(())
    }

    /// Create or extend the VRI keyed by `node.signature_hash`.
    pub fn build_vri(&mut self, node: &CertNode) -> Result<()> {
        node.verify_complete()?;
        let key = node.signature_hash.clone();
        debug!("Building VRI {} for {}", key, node.subject());

        // Reserve the key first so a nested build for the same signature
        // stops instead of recursing.
        self.store.vri_entry(&key);
        let (evidence, certs) = self.populate(node)?;
        self.store
            .vri_entry(&key)
            .merge(&evidence.ocsp, &evidence.crl, &certs);
        Ok(())
    }

    /// Evidence and certificate list for one VRI.
    fn populate(&mut self, node: &CertNode) -> Result<(CollectedEvidence, Vec<CertificateId>)> {
        let evidence = if node.ocsp_no_check() {
            debug!("Skipping revocation for OCSP no-check certificate {}", node.subject());
            CollectedEvidence::default()
        } else {
            self.collect_revocation(node, &mut Vec::new())?
        };

        let mut certs = Vec::new();
        for current in node.chain() {
            self.store.add_visited(&current.certificate);
            certs.push(current.id());
            if current.ocsp_no_check() {
                break;
            }
        }
        Ok((evidence, certs))
    }

    /// Revocation evidence for `node`, its alternate chain and its ancestors.
    pub fn collect_revocation(
        &mut self,
        node: &CertNode,
        path: &mut Vec<CertificateId>,
    ) -> Result<CollectedEvidence> {
        let mut collected = CollectedEvidence::default();
        if node.is_self_signed() {
            return Ok(collected);
        }
        if path.contains(&node.id()) {
            return Err(Error::CyclicChain(node.subject().to_string()));
        }
        path.push(node.id());

        if matches!(
            self.state(node.id()),
            RevocationState::Satisfied | RevocationState::InProgress
        ) {
            debug!("Revocation information for {} already collected", node.subject());
        } else {
            self.collect_for_node(node, &mut collected)?;
        }

        if let Some(alternate) = node.alternate_chain.as_deref() {
            collected.extend(self.collect_revocation(alternate, path)?);
        }
        if let Some(parent) = node.chain_parent.as_deref() {
            collected.extend(self.collect_revocation(parent, path)?);
        }

        path.pop();
        Ok(collected)
    }

    /// Revocation state of a certificate.
    pub fn state(&self, id: CertificateId) -> RevocationState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// The store being filled.
    pub fn store(&self) -> &DssStore {
        &self.store
    }

    /// Give up the assembler and keep the store.
    pub fn into_store(self) -> DssStore {
        self.store
    }

    fn collect_for_node(&mut self, node: &CertNode, collected: &mut CollectedEvidence) -> Result<()> {
        let mut last_failure = None;

        if node.ocsp_url.is_some() && node.issuer_certificate.is_some() {
            if self.state(node.id()) == RevocationState::OcspAttempted {
                debug!("OCSP already attempted for {}", node.subject());
            } else {
                let known = self.source.certificates();
                let outcome = self
                    .fetcher
                    .fetch_ocsp(node, self.sign_date, &known)
                    .and_then(|evidence| self.accept_ocsp(node, evidence, collected));
                match outcome {
                    Ok(()) => return Ok(()),
                    Err(FetchError::Revoked { revoked_at }) => {
                        return Err(revoked(node, revoked_at))
                    },
                    Err(failure) => {
                        warn!(
                            "OCSP for {} at {} failed: {}",
                            node.subject(),
                            node.ocsp_url.as_deref().unwrap_or_default(),
                            failure
                        );
                        self.states.insert(node.id(), RevocationState::OcspAttempted);
                        last_failure = Some(failure);
                    },
                }
            }
        }

        if node.crl_url.is_some() {
            let known = self.source.certificates();
            let outcome = self
                .fetcher
                .fetch_crl(node, self.sign_date, &known)
                .and_then(|evidence| self.accept_crl(node, evidence, collected));
            match outcome {
                Ok(()) => return Ok(()),
                Err(FetchError::Revoked { revoked_at }) => return Err(revoked(node, revoked_at)),
                Err(failure) => {
                    warn!("CRL for {} failed: {}", node.subject(), failure);
                    last_failure = Some(failure);
                },
            }
        }

        if node.ocsp_url.is_none() && node.crl_url.is_none() {
            info!("No revocation information for certificate {}", node.subject());
            return Ok(());
        }

        let (reason, retryable) = match last_failure {
            Some(FetchError::Unavailable { reason, retryable }) => (reason, retryable),
            _ => ("no issuer certificate for OCSP and no CRL URL".to_string(), false),
        };
        Err(Error::RevocationUnavailable {
            subject: node.subject().to_string(),
            reason,
            retryable,
        })
    }

    fn accept_ocsp(
        &mut self,
        node: &CertNode,
        evidence: OcspEvidence,
        collected: &mut CollectedEvidence,
    ) -> std::result::Result<(), FetchError> {
        self.source.add_certificates(evidence.certificates);
        if !self.store.has_vri(&evidence.signature_hash) {
            self.prove_signer(node, &evidence.responder, evidence.signature_hash)?;
        }
        self.states.insert(node.id(), RevocationState::Satisfied);
        collected.ocsp.push(self.store.push_ocsp(evidence.encoded));
        Ok(())
    }

    fn accept_crl(
        &mut self,
        node: &CertNode,
        evidence: CrlEvidence,
        collected: &mut CollectedEvidence,
    ) -> std::result::Result<(), FetchError> {
        if !self.store.has_vri(&evidence.signature_hash) {
            self.prove_signer(node, &evidence.issuer, evidence.signature_hash)?;
        }
        self.states.insert(node.id(), RevocationState::Satisfied);
        collected.crl.push(self.store.push_crl(evidence.encoded));
        Ok(())
    }

    /// Build the nested VRI `key` for the certificate that signed evidence
    /// about `node`.
    ///
    /// A failure is reported as unusable evidence for `node`; every record,
    /// pool entry and state the attempt produced is discarded.
    fn prove_signer(
        &mut self,
        node: &CertNode,
        signer: &Certificate,
        key: String,
    ) -> std::result::Result<(), FetchError> {
        let checkpoint = self.store.checkpoint();
        let states = self.states.clone();
        self.states.insert(node.id(), RevocationState::InProgress);

        let result = self
            .source
            .node_for(signer)
            .and_then(|signer_node| self.build_vri(&signer_node.with_signature_hash(key)));
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.store.rollback(checkpoint);
                self.states = states;
                Err(FetchError::Unavailable {
                    reason: format!("signer {} could not be proven: {}", signer.subject(), err),
                    retryable: err.is_retryable(),
                })
            },
        }
    }
}

fn revoked(node: &CertNode, revoked_at: DateTime<Utc>) -> Error {
    Error::CertificateRevoked {
        subject: node.subject().to_string(),
        serial: node.certificate.serial_hex(),
        revoked_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CertificateParts;
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn cert(subject: &str, issuer: &str, ocsp: bool, crl: bool) -> Certificate {
        Certificate::from_parts(CertificateParts {
            der: subject.as_bytes().to_vec(),
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            serial: vec![0x0A],
            ocsp_url: ocsp.then(|| format!("http://ocsp/{}", subject)),
            crl_url: crl.then(|| format!("http://crl/{}", subject)),
            self_signed: subject == issuer,
            ..Default::default()
        })
    }

    fn chain(certs: &[Certificate]) -> CertNode {
        let mut node: Option<CertNode> = None;
        for cert in certs.iter().rev() {
            let current = CertNode::new(cert.clone());
            node = Some(match node {
                Some(parent) => current.with_parent(parent),
                None => current,
            });
        }
        node.unwrap()
    }

    struct Source {
        known: Vec<Certificate>,
    }

    impl CertGraphSource for Source {
        fn signature_node(&mut self, _contents: &[u8]) -> Result<CertNode> {
            Err(Error::NoSignatureFound)
        }

        fn node_for(&mut self, certificate: &Certificate) -> Result<CertNode> {
            let root = self.known.iter().find(|c| c.is_self_signed()).cloned();
            Ok(match root {
                Some(root) if root != *certificate => {
                    CertNode::new(certificate.clone()).with_parent(CertNode::new(root))
                },
                _ => CertNode::new(certificate.clone()),
            })
        }

        fn add_certificates(&mut self, certificates: Vec<Certificate>) {
            self.known.extend(certificates);
        }

        fn certificates(&self) -> Vec<Certificate> {
            self.known.clone()
        }
    }

    #[derive(Default)]
    struct Fetcher {
        ocsp_calls: RefCell<Vec<String>>,
        crl_calls: RefCell<Vec<String>>,
        ocsp_fails: bool,
        ocsp_rejected: bool,
        revoked: bool,
        responder: Option<Certificate>,
        crl_unavailable: Vec<&'static str>,
        crl_revoked: Vec<&'static str>,
    }

    impl RevocationFetcher for Fetcher {
        fn fetch_ocsp(
            &self,
            node: &CertNode,
            _sign_date: DateTime<Utc>,
            _known: &[Certificate],
        ) -> std::result::Result<OcspEvidence, FetchError> {
            self.ocsp_calls.borrow_mut().push(node.subject().to_string());
            if self.revoked {
                return Err(FetchError::Revoked {
                    revoked_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                });
            }
            if self.ocsp_fails {
                return Err(FetchError::network("timeout"));
            }
            if self.ocsp_rejected {
                return Err(FetchError::invalid("response signature does not verify"));
            }
            let responder = self
                .responder
                .clone()
                .unwrap_or_else(|| node.issuer_certificate.clone().unwrap());
            Ok(OcspEvidence {
                encoded: Bytes::from(format!("ocsp:{}", node.subject())),
                signature_hash: format!("OCSP-{}", node.subject()),
                responder,
                certificates: Vec::new(),
            })
        }

        fn fetch_crl(
            &self,
            node: &CertNode,
            _sign_date: DateTime<Utc>,
            _known: &[Certificate],
        ) -> std::result::Result<CrlEvidence, FetchError> {
            self.crl_calls.borrow_mut().push(node.subject().to_string());
            if self.crl_unavailable.iter().any(|s| *s == node.subject()) {
                return Err(FetchError::network("timed out"));
            }
            if self.crl_revoked.iter().any(|s| *s == node.subject()) {
                return Err(FetchError::Revoked {
                    revoked_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
                });
            }
            Ok(CrlEvidence {
                encoded: Bytes::from(format!("crl:{}", node.subject())),
                signature_hash: format!("CRL-{}", node.subject()),
                issuer: node.issuer_certificate.clone().unwrap(),
            })
        }
    }

    fn sign_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_self_signed_needs_nothing() {
        let root = cert("CN=Root", "CN=Root", true, true);
        let fetcher = Fetcher::default();
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let node = CertNode::new(root).with_signature_hash("SIG");
        assembler.build_vri(&node).unwrap();
        assert!(fetcher.ocsp_calls.borrow().is_empty());
        let record = assembler.store().vri("SIG").unwrap();
        assert!(record.ocsp.is_empty() && record.crl.is_empty());
        assert_eq!(record.certs.len(), 1);
    }

    #[test]
    fn test_ocsp_failure_falls_back_to_crl() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, true);
        let fetcher = Fetcher {
            ocsp_fails: true,
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone(), leaf.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let node = chain(&[leaf.clone(), root]).with_signature_hash("SIG");
        assembler.build_vri(&node).unwrap();

        assert_eq!(*fetcher.crl_calls.borrow(), vec!["CN=Leaf"]);
        assert_eq!(assembler.state(leaf.id()), RevocationState::Satisfied);
        let record = assembler.store().vri("SIG").unwrap();
        assert!(record.ocsp.is_empty());
        assert_eq!(record.crl, vec![0]);
    }

    #[test]
    fn test_revoked_is_fatal() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, true);
        let fetcher = Fetcher {
            revoked: true,
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let err = assembler
            .build_vri(&chain(&[leaf, root]).with_signature_hash("SIG"))
            .unwrap_err();
        assert!(matches!(err, Error::CertificateRevoked { ref serial, .. } if serial == "0A"));
        assert!(fetcher.crl_calls.borrow().is_empty());
    }

    #[test]
    fn test_unreachable_service_is_fatal() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, false);
        let fetcher = Fetcher {
            ocsp_fails: true,
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let err = assembler
            .build_vri(&chain(&[leaf, root]).with_signature_hash("SIG"))
            .unwrap_err();
        assert!(matches!(err, Error::RevocationUnavailable { ref reason, .. } if reason == "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejected_response_is_not_retryable() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, false);
        let fetcher = Fetcher {
            ocsp_rejected: true,
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let err = assembler
            .build_vri(&chain(&[leaf, root]).with_signature_hash("SIG"))
            .unwrap_err();
        assert!(matches!(err, Error::RevocationUnavailable { retryable: false, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_collect_twice_fetches_once() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, false);
        let fetcher = Fetcher::default();
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let node = chain(&[leaf, root]);
        let first = assembler.collect_revocation(&node, &mut Vec::new()).unwrap();
        let second = assembler.collect_revocation(&node, &mut Vec::new()).unwrap();
        assert_eq!(first.ocsp, vec![0]);
        assert!(second.is_empty());
        assert_eq!(fetcher.ocsp_calls.borrow().len(), 1);
        assert_eq!(assembler.store().ocsp_pool().len(), 1);
    }

    #[test]
    fn test_responder_evidence_stays_in_nested_vri() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let ca = cert("CN=CA", "CN=Root", false, true);
        let leaf = cert("CN=Leaf", "CN=CA", true, false);
        let responder = cert("CN=Responder", "CN=Root", false, true);

        let fetcher = Fetcher {
            responder: Some(responder.clone()),
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone(), ca.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let node = chain(&[leaf, ca, root]).with_signature_hash("SIG");
        assembler.build_vri(&node).unwrap();
        let store = assembler.into_store();

        // Responder CRL lands in the nested VRI only.
        let nested = store.vri("OCSP-CN=Leaf").unwrap();
        assert!(nested.ocsp.is_empty());
        assert_eq!(nested.crl.len(), 1);
        assert_eq!(store.crl_pool()[nested.crl[0]], Bytes::from("crl:CN=Responder"));

        let outer = store.vri("SIG").unwrap();
        assert_eq!(outer.ocsp.len(), 1);
        assert_eq!(outer.crl.len(), 1);
        assert_eq!(store.crl_pool()[outer.crl[0]], Bytes::from("crl:CN=CA"));
        assert!(!outer.crl.contains(&nested.crl[0]));
        assert_eq!(outer.certs.len(), 3);
    }

    fn unproven_responder(fetcher: &Fetcher) -> DssStore {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, true);
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(fetcher, &mut source, DssStore::new(), sign_date());

        let node = chain(&[leaf.clone(), root]).with_signature_hash("SIG");
        assembler.build_vri(&node).unwrap();
        assert_eq!(assembler.state(leaf.id()), RevocationState::Satisfied);
        assembler.into_store()
    }

    #[test]
    fn test_unavailable_responder_falls_back_to_crl() {
        let fetcher = Fetcher {
            responder: Some(cert("CN=Responder", "CN=Root", false, true)),
            crl_unavailable: vec!["CN=Responder"],
            ..Default::default()
        };
        let store = unproven_responder(&fetcher);

        assert_eq!(*fetcher.crl_calls.borrow(), vec!["CN=Responder", "CN=Leaf"]);
        assert!(store.ocsp_pool().is_empty());
        assert_eq!(store.crl_pool(), &[Bytes::from("crl:CN=Leaf")]);
        assert!(!store.has_vri("OCSP-CN=Leaf"));
        let record = store.vri("SIG").unwrap();
        assert!(record.ocsp.is_empty());
        assert_eq!(record.crl, vec![0]);
        assert_eq!(record.certs.len(), 2);
    }

    #[test]
    fn test_revoked_responder_falls_back_to_crl() {
        let fetcher = Fetcher {
            responder: Some(cert("CN=Responder", "CN=Root", false, true)),
            crl_revoked: vec!["CN=Responder"],
            ..Default::default()
        };
        let store = unproven_responder(&fetcher);

        assert_eq!(*fetcher.crl_calls.borrow(), vec!["CN=Responder", "CN=Leaf"]);
        assert!(store.ocsp_pool().is_empty());
        assert!(!store.has_vri("OCSP-CN=Leaf"));
        assert_eq!(store.vri("SIG").unwrap().crl, vec![0]);
        let keys: Vec<_> = store.vri_records().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["SIG", "CRL-CN=Leaf"]);
    }

    #[test]
    fn test_unproven_signer_without_fallback_is_reported() {
        let root = cert("CN=Root", "CN=Root", false, false);
        let leaf = cert("CN=Leaf", "CN=Root", true, false);
        let fetcher = Fetcher {
            responder: Some(cert("CN=Responder", "CN=Root", false, true)),
            crl_revoked: vec!["CN=Responder"],
            ..Default::default()
        };
        let mut source = Source { known: vec![root.clone()] };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());

        let err = assembler
            .build_vri(&chain(&[leaf, root]).with_signature_hash("SIG"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RevocationUnavailable { ref subject, ref reason, retryable: false }
                if subject == "CN=Leaf" && reason.contains("CN=Responder")
        ));
        assert!(assembler.store().ocsp_pool().is_empty());
    }

    #[test]
    fn test_cycle_is_detected() {
        let a = cert("CN=A", "CN=B", false, false);
        let b = cert("CN=B", "CN=A", false, false);
        let inner = CertNode::new(a.clone());
        let mid = CertNode::new(b).with_parent(inner);
        let node = CertNode::new(a).with_parent(mid);

        let fetcher = Fetcher::default();
        let mut source = Source { known: Vec::new() };
        let mut assembler = VriAssembler::new(&fetcher, &mut source, DssStore::new(), sign_date());
        let err = assembler.collect_revocation(&node, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::CyclicChain(_)));
    }
}
