//! Certificate graph nodes.

use crate::crypto::{Certificate, CertificateId};
use crate::error::{Error, Result};

/// One certificate in a signature's certificate graph.
///
/// `chain_parent` points at the issuer's node, `alternate_chain` at a chain
/// built from a downloaded issuer certificate and `tsa_chain` at the chain of
/// the signature timestamp authority.
#[derive(Debug, Clone)]
pub struct CertNode {
    /// The certificate itself
    pub certificate: Certificate,
    /// Its issuer, when known
    pub issuer_certificate: Option<Certificate>,
    /// OCSP responder URL
    pub ocsp_url: Option<String>,
    /// CRL distribution point
    pub crl_url: Option<String>,
    /// Next node up the chain
    pub chain_parent: Option<Box<CertNode>>,
    /// Chain through a downloaded issuer certificate
    pub alternate_chain: Option<Box<CertNode>>,
    /// Chain of the signature timestamp authority
    pub tsa_chain: Option<Box<CertNode>>,
    /// VRI key of the signature this node helps validate
    pub signature_hash: String,
}

impl CertNode {
    /// Node for `certificate` with URLs taken from its extensions.
    pub fn new(certificate: Certificate) -> Self {
        Self {
            ocsp_url: certificate.ocsp_url().map(str::to_string),
            crl_url: certificate.crl_url().map(str::to_string),
            certificate,
            issuer_certificate: None,
            chain_parent: None,
            alternate_chain: None,
            tsa_chain: None,
            signature_hash: String::new(),
        }
    }

    /// Attach `parent` as the issuer node.
    pub fn with_parent(mut self, parent: CertNode) -> Self {
        self.issuer_certificate = Some(parent.certificate.clone());
        self.chain_parent = Some(Box::new(parent));
        self
    }

    /// Set the VRI key.
    pub fn with_signature_hash(mut self, hash: impl Into<String>) -> Self {
        self.signature_hash = hash.into();
        self
    }

    /// Identity of the node's certificate.
    pub fn id(&self) -> CertificateId {
        self.certificate.id()
    }

    /// Subject of the node's certificate.
    pub fn subject(&self) -> &str {
        self.certificate.subject()
    }

    /// Whether the certificate is self-signed.
    pub fn is_self_signed(&self) -> bool {
        self.certificate.is_self_signed()
    }

    /// Whether the certificate carries id-pkix-ocsp-nocheck.
    pub fn ocsp_no_check(&self) -> bool {
        self.certificate.ocsp_no_check()
    }

    /// Whether this node may end a chain.
    pub fn is_terminal(&self) -> bool {
        self.is_self_signed() || self.ocsp_no_check()
    }

    /// This node followed by its ancestors through `chain_parent`.
    pub fn chain(&self) -> impl Iterator<Item = &CertNode> {
        std::iter::successors(Some(self), |node| node.chain_parent.as_deref())
    }

    /// Check that every chain reachable from this node ends at a
    /// self-signed or OCSP no-check certificate, and that no certificate is
    /// its own ancestor.
    pub fn verify_complete(&self) -> Result<()> {
        self.verify_from(&mut Vec::new())
    }

    fn verify_from(&self, path: &mut Vec<CertificateId>) -> Result<()> {
        if path.contains(&self.id()) {
            return Err(Error::CyclicChain(self.subject().to_string()));
        }
        path.push(self.id());

        match &self.chain_parent {
            Some(parent) => parent.verify_from(path)?,
            None if self.is_terminal() => {},
            None => return Err(Error::IncompleteChain(self.subject().to_string())),
        }
        if let Some(alternate) = &self.alternate_chain {
            alternate.verify_from(path)?;
        }
        if let Some(tsa) = &self.tsa_chain {
            tsa.verify_from(&mut Vec::new())?;
        }

        path.pop();
        Ok(())
    }
}
