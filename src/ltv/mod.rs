//! Long-term validation (PAdES LTV).
//!
//! ## Architecture
//!
//! ```text
//! signature /Contents
//!     ↓
//! [CertInfoCollector] (CMS signer, certificate chain, TSA chain)
//!     ↓
//! [CertNode] graph
//!     ↓
//! [VriAssembler] ←→ [RevocationFetcher] (OCSP, CRL fallback)
//!     ↓
//! [DssStore] (VRI records, OCSP/CRL/certificate pools)
//!     ↓
//! [DssBuilder] (merges into /DSS, writes the incremental update)
//! ```
//!
//! The builder is the usual entry point. The other pieces are public so
//! that callers can supply their own fetcher or certificate source.

mod assembler;
mod builder;
mod cert_node;
mod collector;
mod fetcher;
mod store;
mod transport;

pub use assembler::{CollectedEvidence, RevocationState, VriAssembler};
#[cfg(feature = "http")]
pub use builder::add_validation_information;
pub use builder::{signing_time, DssBuilder};
pub use cert_node::CertNode;
pub use collector::{CertGraphSource, CertInfoCollector};
pub use fetcher::{CrlEvidence, FetchError, OcspEvidence, OnlineRevocationFetcher, RevocationFetcher};
pub use store::{DssStore, VriRecord};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{HttpTransport, TransportError};
