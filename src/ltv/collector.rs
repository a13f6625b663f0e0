//! Certificate graph construction from signature contents.

use super::cert_node::CertNode;
use super::transport::HttpTransport;
use crate::config::LtvConfig;
use crate::crypto::cms::SignedDataInfo;
use crate::crypto::{sha1_hex, Certificate, CertificateId};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;

/// Builds [`CertNode`] graphs and tracks every certificate seen so far.
pub trait CertGraphSource {
    /// Graph for the signer of a CMS signature (`/Contents` bytes).
    fn signature_node(&mut self, contents: &[u8]) -> Result<CertNode>;

    /// Graph rooted at `certificate`, with an empty signature hash.
    fn node_for(&mut self, certificate: &Certificate) -> Result<CertNode>;

    /// Add certificates to the known set.
    fn add_certificates(&mut self, certificates: Vec<Certificate>);

    /// Every known certificate, in insertion order.
    fn certificates(&self) -> Vec<Certificate>;
}

/// [`CertGraphSource`] that reads CMS structures and optionally downloads
/// missing issuer certificates.
#[derive(Debug)]
pub struct CertInfoCollector<T> {
    transport: Option<T>,
    config: LtvConfig,
    known: IndexMap<CertificateId, Certificate>,
    downloaded: HashMap<String, Option<Certificate>>,
}

impl<T: HttpTransport> CertInfoCollector<T> {
    /// Collector that downloads issuers through `transport` when
    /// `config.fetch_missing_issuers` is set.
    pub fn new(transport: T, config: LtvConfig) -> Self {
        Self {
            transport: Some(transport),
            config,
            known: IndexMap::new(),
            downloaded: HashMap::new(),
        }
    }

    /// Collector restricted to the certificates it is given.
    pub fn offline(config: LtvConfig) -> Self {
        Self {
            transport: None,
            config,
            known: IndexMap::new(),
            downloaded: HashMap::new(),
        }
    }

    fn traverse(
        &mut self,
        cert: &Certificate,
        remaining: usize,
        path: &mut Vec<CertificateId>,
    ) -> Result<CertNode> {
        if path.contains(&cert.id()) {
            return Err(Error::CyclicChain(cert.subject().to_string()));
        }
        let mut node = CertNode::new(cert.clone());
        if cert.is_self_signed() {
            return Ok(node);
        }
        if remaining == 0 {
            return Err(Error::ChainTooLong(self.config.max_chain_depth));
        }
        path.push(cert.id());

        let downloaded = cert.issuer_url().and_then(|url| self.download_issuer(url));
        let issuer = self
            .known
            .values()
            .find(|candidate| candidate.id() != cert.id() && cert.is_issued_by(candidate))
            .cloned();

        let alternate = match (&issuer, downloaded) {
            (Some(found), Some(alt)) if alt != *found && cert.is_issued_by(&alt) => Some(alt),
            (None, Some(alt)) if cert.is_issued_by(&alt) => {
                debug!("Using downloaded issuer {} for {}", alt.subject(), cert.subject());
                node = node.with_parent(self.traverse(&alt, remaining - 1, path)?);
                None
            },
            _ => None,
        };

        if let Some(issuer) = issuer {
            node = node.with_parent(self.traverse(&issuer, remaining - 1, path)?);
        } else if node.chain_parent.is_none() && !cert.ocsp_no_check() {
            return Err(Error::IncompleteChain(cert.subject().to_string()));
        }

        if let Some(alt) = alternate {
            node.alternate_chain = Some(Box::new(self.traverse(&alt, remaining - 1, path)?));
        }

        path.pop();
        Ok(node)
    }

    /// Fetch the caIssuers certificate at `url`, once per URL.
    fn download_issuer(&mut self, url: &str) -> Option<Certificate> {
        if !self.config.fetch_missing_issuers {
            return None;
        }
        if let Some(cached) = self.downloaded.get(url) {
            return cached.clone();
        }
        let transport = self.transport.as_ref()?;
        let cert = match transport.get(url) {
            Ok(der) => match Certificate::from_der(&der) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    warn!("Ignoring issuer certificate from {}: {}", url, e);
                    None
                },
            },
            Err(e) => {
                warn!("Could not download issuer certificate: {}", e);
                None
            },
        };
        if let Some(cert) = &cert {
            self.known.entry(cert.id()).or_insert_with(|| cert.clone());
        }
        self.downloaded.insert(url.to_string(), cert.clone());
        cert
    }

    fn signer_node(&mut self, signed: &SignedDataInfo) -> Result<CertNode> {
        let mut embedded = Vec::with_capacity(signed.certificates.len());
        for der in &signed.certificates {
            embedded.push(Certificate::from_der(der)?);
        }
        self.add_certificates(embedded);

        let signer = self
            .known
            .values()
            .find(|cert| signed.signer.matches(cert))
            .cloned()
            .ok_or_else(|| Error::Cms("signer certificate not found in SignedData".to_string()))?;
        debug!("Signer certificate: {}", signer.subject());

        let node = self.node_for(&signer)?;
        Ok(node.with_signature_hash(sha1_hex(&signed.signature)))
    }
}

impl<T: HttpTransport> CertGraphSource for CertInfoCollector<T> {
    fn signature_node(&mut self, contents: &[u8]) -> Result<CertNode> {
        let signed = SignedDataInfo::parse(contents)?;
        let mut node = self.signer_node(&signed)?;

        if let Some(token) = &signed.timestamp_token {
            let tsa = SignedDataInfo::parse(token)?;
            debug!("Signature carries a timestamp token");
            node.tsa_chain = Some(Box::new(self.signer_node(&tsa)?));
        }
        Ok(node)
    }

    fn node_for(&mut self, certificate: &Certificate) -> Result<CertNode> {
        self.traverse(certificate, self.config.max_chain_depth, &mut Vec::new())
    }

    fn add_certificates(&mut self, certificates: Vec<Certificate>) {
        for cert in certificates {
            self.known.entry(cert.id()).or_insert(cert);
        }
    }

    fn certificates(&self) -> Vec<Certificate> {
        self.known.values().cloned().collect()
    }
}
