//! Document Security Store aggregate.
//!
//! PAdES Part 4 (ETSI TS 102 778-4), Section 4. The store collects OCSP
//! responses, CRLs and certificates for one build, keeps the VRI records
//! that point into them, and finally merges everything into the catalog's
//! `/DSS` dictionary.

use crate::config::LtvConfig;
use crate::crypto::{Certificate, CertificateId};
use crate::document::SignedDocument;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::signatures::format_pdf_date;
use crate::writer::data_stream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// Developer extension level announcing DSS support.
const ADBE_EXTENSION_LEVEL: i64 = 5;
/// PDF version required by the ADBE extension.
const BASE_VERSION: &str = "1.7";

/// Validation-related information for one signature.
///
/// `ocsp` and `crl` are indices into the store's pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VriRecord {
    /// OCSP responses gathered for this signature
    pub ocsp: Vec<usize>,
    /// CRLs gathered for this signature
    pub crl: Vec<usize>,
    /// The signer certificate and its ancestors
    pub certs: Vec<CertificateId>,
    /// When the record was built (`/TU`)
    pub updated: DateTime<Utc>,
}

impl Default for VriRecord {
    fn default() -> Self {
        Self {
            ocsp: Vec::new(),
            crl: Vec::new(),
            certs: Vec::new(),
            updated: Utc::now(),
        }
    }
}

impl VriRecord {
    /// Add evidence indices and certificates, skipping ones already present.
    pub fn merge(&mut self, ocsp: &[usize], crl: &[usize], certs: &[CertificateId]) {
        fn extend_unique<T: PartialEq + Copy>(target: &mut Vec<T>, items: &[T]) {
            for item in items {
                if !target.contains(item) {
                    target.push(*item);
                }
            }
        }
        extend_unique(&mut self.ocsp, ocsp);
        extend_unique(&mut self.crl, crl);
        extend_unique(&mut self.certs, certs);
        self.updated = Utc::now();
    }
}

/// Where the `/DSS` dictionary lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DssLocation {
    /// Not present yet
    #[default]
    New,
    /// Direct value of the catalog entry
    Inline,
    /// Indirect object
    Indirect(ObjectRef),
}

/// An existing DSS sub-structure and the indirect object that holds it.
#[derive(Debug, Clone, Default)]
struct Entry<T> {
    value: T,
    reference: Option<ObjectRef>,
}

/// Sizes of the store's collections at one point of a build.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StoreCheckpoint {
    vri: usize,
    visited: usize,
    ocsps: usize,
    crls: usize,
}

/// The DSS of one build.
#[derive(Debug, Default)]
pub struct DssStore {
    location: DssLocation,
    other_entries: HashMap<String, Object>,
    vri_base: Entry<HashMap<String, Object>>,
    ocsp_array: Entry<Vec<Object>>,
    crl_array: Entry<Vec<Object>>,
    cert_array: Entry<Vec<Object>>,
    extensions: Entry<HashMap<String, Object>>,
    existing_certs: HashSet<CertificateId>,
    existing_cert_refs: HashMap<CertificateId, ObjectRef>,

    vri: IndexMap<String, VriRecord>,
    visited: IndexMap<CertificateId, Certificate>,
    cert_pool: IndexMap<CertificateId, Certificate>,
    ocsps: Vec<Bytes>,
    crls: Vec<Bytes>,
}

impl DssStore {
    /// Empty store for a document without DSS.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the document's existing `/DSS` and `/Extensions`, or start empty.
    ///
    /// Fails with [`Error::StructureError`] when `/DSS`, `/VRI`, `/OCSPs`,
    /// `/CRLs`, `/Certs` or `/Extensions` has the wrong type.
    pub fn merge_or_create<D: SignedDocument + ?Sized>(document: &D) -> Result<Self> {
        let mut store = Self::new();

        if let Some(dss) = document.catalog_entry("DSS") {
            store.location = match &dss {
                Object::Reference(id) => DssLocation::Indirect(*id),
                _ => DssLocation::Inline,
            };
            let mut dict = match resolve_structure(document, &dss, "DSS")? {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(Error::StructureError(format!(
                        "/DSS is {}, expected Dictionary",
                        other.type_name()
                    )))
                },
            };

            store.vri_base = dictionary_entry(document, dict.remove("VRI"), "VRI")?;
            store.ocsp_array = array_entry(document, dict.remove("OCSPs"), "OCSPs")?;
            store.crl_array = array_entry(document, dict.remove("CRLs"), "CRLs")?;
            store.cert_array = array_entry(document, dict.remove("Certs"), "Certs")?;
            store.other_entries = dict;

            for cert in &store.cert_array.value {
                if let Some(id) = stream_certificate_id(document, cert) {
                    store.existing_certs.insert(id);
                    if let Object::Reference(reference) = cert {
                        store.existing_cert_refs.entry(id).or_insert(*reference);
                    }
                }
            }
            debug!(
                "Merging into existing DSS ({} VRI, {} OCSP, {} CRL, {} certificates)",
                store.vri_base.value.len(),
                store.ocsp_array.value.len(),
                store.crl_array.value.len(),
                store.cert_array.value.len()
            );
        }

        store.extensions =
            dictionary_entry(document, document.catalog_entry("Extensions"), "Extensions")?;
        Ok(store)
    }

    /// Whether a VRI record for `key` was created in this build.
    pub fn has_vri(&self, key: &str) -> bool {
        self.vri.contains_key(key)
    }

    /// The record for `key`, created empty if missing.
    pub fn vri_entry(&mut self, key: &str) -> &mut VriRecord {
        self.vri.entry(key.to_string()).or_default()
    }

    /// The record for `key`.
    pub fn vri(&self, key: &str) -> Option<&VriRecord> {
        self.vri.get(key)
    }

    /// Every VRI record of this build, in creation order.
    pub fn vri_records(&self) -> impl Iterator<Item = (&str, &VriRecord)> {
        self.vri.iter().map(|(key, record)| (key.as_str(), record))
    }

    /// Append an OCSP response to the pool and return its index.
    pub fn push_ocsp(&mut self, encoded: Bytes) -> usize {
        self.ocsps.push(encoded);
        self.ocsps.len() - 1
    }

    /// Append a CRL to the pool and return its index.
    pub fn push_crl(&mut self, encoded: Bytes) -> usize {
        self.crls.push(encoded);
        self.crls.len() - 1
    }

    /// OCSP responses gathered in this build.
    pub fn ocsp_pool(&self) -> &[Bytes] {
        &self.ocsps
    }

    /// CRLs gathered in this build.
    pub fn crl_pool(&self) -> &[Bytes] {
        &self.crls
    }

    /// Mark the current contents so a failed nested build can be undone.
    pub(crate) fn checkpoint(&self) -> StoreCheckpoint {
        StoreCheckpoint {
            vri: self.vri.len(),
            visited: self.visited.len(),
            ocsps: self.ocsps.len(),
            crls: self.crls.len(),
        }
    }

    /// Drop every VRI record, visited certificate and pool entry added
    /// after `checkpoint`.
    ///
    /// Records existing at the checkpoint must not have been extended since.
    pub(crate) fn rollback(&mut self, checkpoint: StoreCheckpoint) {
        debug!(
            "Discarding {} VRI records, {} OCSP responses and {} CRLs",
            self.vri.len().saturating_sub(checkpoint.vri),
            self.ocsps.len().saturating_sub(checkpoint.ocsps),
            self.crls.len().saturating_sub(checkpoint.crls)
        );
        self.vri.truncate(checkpoint.vri);
        self.visited.truncate(checkpoint.visited);
        self.ocsps.truncate(checkpoint.ocsps);
        self.crls.truncate(checkpoint.crls);
    }

    /// Record a certificate that takes part in a chain.
    pub fn add_visited(&mut self, certificate: &Certificate) {
        self.visited
            .entry(certificate.id())
            .or_insert_with(|| certificate.clone());
    }

    /// Fill the certificate pool from every visited certificate and
    /// `known`, each distinct certificate once. Call after all evidence has
    /// been collected.
    pub fn finalize(&mut self, known: &[Certificate]) {
        for cert in self.visited.values().chain(known) {
            self.cert_pool
                .entry(cert.id())
                .or_insert_with(|| cert.clone());
        }
        debug!("Certificate pool holds {} certificates", self.cert_pool.len());
    }

    /// Certificates that will be listed in `/Certs`.
    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.cert_pool.values()
    }

    /// Write the store into `document`.
    ///
    /// Every stream is encoded before the document is touched, so an
    /// encoding failure leaves the document unchanged.
    pub fn write_into<D: SignedDocument + ?Sized>(
        &self,
        document: &mut D,
        config: &LtvConfig,
    ) -> Result<()> {
        let compress = config.compress_streams;

        // Certificates already stored as indirect streams are referenced,
        // not written again. Visited certificates outside the pool only get
        // a stream when some VRI lists them.
        let referenced: HashSet<CertificateId> = self
            .vri
            .values()
            .flat_map(|record| record.certs.iter().copied())
            .collect();
        let mut cert_sources: IndexMap<CertificateId, &Certificate> = IndexMap::new();
        for (id, cert) in self.cert_pool.iter().chain(self.visited.iter()) {
            if self.existing_cert_refs.contains_key(id) {
                continue;
            }
            if self.cert_pool.contains_key(id) || referenced.contains(id) {
                cert_sources.entry(*id).or_insert(cert);
            }
        }
        let cert_streams = cert_sources
            .iter()
            .map(|(id, cert)| -> Result<(CertificateId, Object)> {
                Ok((*id, data_stream(cert.der(), compress)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let ocsp_streams = self
            .ocsps
            .iter()
            .map(|data| data_stream(data, compress))
            .collect::<Result<Vec<_>>>()?;
        let crl_streams = self
            .crls
            .iter()
            .map(|data| data_stream(data, compress))
            .collect::<Result<Vec<_>>>()?;

        let mut cert_refs = self.existing_cert_refs.clone();
        let mut certs = self.cert_array.value.clone();
        for (id, stream) in cert_streams {
            let reference = document.add_object(stream);
            cert_refs.insert(id, reference);
            if self.cert_pool.contains_key(&id) && !self.existing_certs.contains(&id) {
                certs.push(Object::Reference(reference));
            }
        }
        let ocsp_refs: Vec<ObjectRef> = ocsp_streams
            .into_iter()
            .map(|stream| document.add_object(stream))
            .collect();
        let crl_refs: Vec<ObjectRef> = crl_streams
            .into_iter()
            .map(|stream| document.add_object(stream))
            .collect();

        let mut ocsps = self.ocsp_array.value.clone();
        ocsps.extend(ocsp_refs.iter().copied().map(Object::Reference));
        let mut crls = self.crl_array.value.clone();
        crls.extend(crl_refs.iter().copied().map(Object::Reference));

        let mut vri_base = self.vri_base.value.clone();
        for (key, record) in &self.vri {
            let refs = |indices: &[usize], pool: &[ObjectRef]| {
                Object::Array(
                    indices
                        .iter()
                        .filter_map(|i| pool.get(*i))
                        .copied()
                        .map(Object::Reference)
                        .collect(),
                )
            };
            let mut vri = HashMap::new();
            if !record.ocsp.is_empty() {
                vri.insert("OCSP".to_string(), refs(&record.ocsp, &ocsp_refs));
            }
            if !record.crl.is_empty() {
                vri.insert("CRL".to_string(), refs(&record.crl, &crl_refs));
            }
            let record_certs = record
                .certs
                .iter()
                .filter_map(|id| cert_refs.get(id))
                .copied()
                .map(Object::Reference)
                .collect();
            vri.insert("Cert".to_string(), Object::Array(record_certs));
            vri.insert(
                "TU".to_string(),
                Object::String(format_pdf_date(&record.updated).into_bytes()),
            );
            vri_base.insert(key.clone(), Object::Dictionary(vri));
        }

        let mut dss = self.other_entries.clone();
        dss.insert(
            "VRI".to_string(),
            place(document, self.vri_base.reference, Object::Dictionary(vri_base))?,
        );
        dss.insert(
            "OCSPs".to_string(),
            place(document, self.ocsp_array.reference, Object::Array(ocsps))?,
        );
        dss.insert(
            "CRLs".to_string(),
            place(document, self.crl_array.reference, Object::Array(crls))?,
        );
        dss.insert(
            "Certs".to_string(),
            place(document, self.cert_array.reference, Object::Array(certs))?,
        );

        match self.location {
            DssLocation::Indirect(id) => {
                document.update_object(id, Object::Dictionary(dss))?;
                document.set_catalog_entry("DSS", Object::Reference(id));
            },
            DssLocation::Inline => document.set_catalog_entry("DSS", Object::Dictionary(dss)),
            DssLocation::New => {
                let id = document.add_object(Object::Dictionary(dss));
                document.set_catalog_entry("DSS", Object::Reference(id));
            },
        }

        self.write_extensions(document)?;
        debug!(
            "Wrote DSS with {} VRI records, {} OCSP responses, {} CRLs",
            self.vri.len(),
            self.ocsps.len(),
            self.crls.len()
        );
        Ok(())
    }

    /// Announce DSS support in `/Extensions` and raise `/Version`.
    fn write_extensions<D: SignedDocument + ?Sized>(&self, document: &mut D) -> Result<()> {
        let mut extensions = self.extensions.value.clone();
        let current_level = extensions
            .get("ADBE")
            .map(|adbe| document.resolve(adbe))
            .transpose()?
            .as_ref()
            .and_then(Object::as_dict)
            .and_then(|adbe| adbe.get("ExtensionLevel"))
            .and_then(Object::as_integer);
        if current_level.map_or(true, |level| level < ADBE_EXTENSION_LEVEL) {
            extensions.insert(
                "ADBE".to_string(),
                Object::dict([
                    ("BaseVersion", Object::name(BASE_VERSION)),
                    ("ExtensionLevel", Object::Integer(ADBE_EXTENSION_LEVEL)),
                ]),
            );
        }
        let value = place(document, self.extensions.reference, Object::Dictionary(extensions))?;
        document.set_catalog_entry("Extensions", value);

        let version = document
            .catalog_entry("Version")
            .and_then(|v| v.as_name().and_then(|name| name.parse::<f64>().ok()));
        if version.map_or(true, |v| v < 1.7) {
            document.set_catalog_entry("Version", Object::name(BASE_VERSION));
        }
        Ok(())
    }
}

/// Store `value` back into its indirect object, or return it for direct use.
fn place<D: SignedDocument + ?Sized>(
    document: &mut D,
    reference: Option<ObjectRef>,
    value: Object,
) -> Result<Object> {
    match reference {
        Some(id) => {
            document.update_object(id, value)?;
            Ok(Object::Reference(id))
        },
        None => Ok(value),
    }
}

fn resolve_structure<D: SignedDocument + ?Sized>(
    document: &D,
    value: &Object,
    key: &str,
) -> Result<Object> {
    document.resolve(value).map_err(|e| match e {
        Error::ObjectNotFound(id, gen) => {
            Error::StructureError(format!("/{} points at missing object {} {} R", key, id, gen))
        },
        other => other,
    })
}

fn dictionary_entry<D: SignedDocument + ?Sized>(
    document: &D,
    value: Option<Object>,
    key: &str,
) -> Result<Entry<HashMap<String, Object>>> {
    let Some(value) = value else {
        return Ok(Entry::default());
    };
    match resolve_structure(document, &value, key)? {
        Object::Dictionary(dict) => Ok(Entry {
            value: dict,
            reference: value.as_reference(),
        }),
        other => Err(Error::StructureError(format!(
            "/{} is {}, expected Dictionary",
            key,
            other.type_name()
        ))),
    }
}

fn array_entry<D: SignedDocument + ?Sized>(
    document: &D,
    value: Option<Object>,
    key: &str,
) -> Result<Entry<Vec<Object>>> {
    let Some(value) = value else {
        return Ok(Entry::default());
    };
    match resolve_structure(document, &value, key)? {
        Object::Array(items) => Ok(Entry {
            value: items,
            reference: value.as_reference(),
        }),
        other => Err(Error::StructureError(format!(
            "/{} is {}, expected Array",
            key,
            other.type_name()
        ))),
    }
}

/// Identity of the certificate held by an existing `/Certs` stream.
fn stream_certificate_id<D: SignedDocument + ?Sized>(
    document: &D,
    value: &Object,
) -> Option<CertificateId> {
    let Ok(Object::Stream { dict, data }) = document.resolve(value) else {
        return None;
    };
    match dict.get("Filter") {
        None => Some(CertificateId::of(&data)),
        Some(Object::Name(filter)) if filter == "FlateDecode" => {
            let mut decoded = Vec::new();
            match ZlibDecoder::new(&data[..]).read_to_end(&mut decoded) {
                Ok(_) => Some(CertificateId::of(&decoded)),
                Err(e) => {
                    debug!("Cannot decode existing certificate stream: {}", e);
                    None
                },
            }
        },
        Some(_) => None,
    }
}
