//! Structured access to a signed PDF.
//!
//! The LTV builder reads and writes the document only through
//! [`SignedDocument`]: catalog entries, indirect objects, the signature
//! dictionaries of the AcroForm, and an append-only incremental write.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::IncrementalWriter;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;

/// Maximum depth of the AcroForm field tree that is searched for signatures.
const MAX_FIELD_DEPTH: usize = 32;

/// Document operations needed to add a Document Security Store.
pub trait SignedDocument {
    /// Value of a catalog entry, unresolved.
    fn catalog_entry(&self, key: &str) -> Option<Object>;

    /// Replace a catalog entry and mark the catalog as modified.
    fn set_catalog_entry(&mut self, key: &str, value: Object);

    /// Follow `obj` if it is a reference; other objects are returned as is.
    fn resolve(&self, obj: &Object) -> Result<Object>;

    /// Add a new indirect object.
    fn add_object(&mut self, obj: Object) -> ObjectRef;

    /// Replace an existing indirect object and mark it as modified.
    fn update_object(&mut self, id: ObjectRef, obj: Object) -> Result<()>;

    /// Every signature dictionary reachable from the AcroForm fields.
    fn signature_dictionaries(&self) -> Result<Vec<HashMap<String, Object>>>;

    /// Write the original bytes followed by an incremental update holding
    /// the new and modified objects.
    fn write_incremental(&self, out: &mut dyn Write) -> Result<()>;
}

/// In-memory [`SignedDocument`] over the bytes of a signed PDF and its
/// already parsed objects.
#[derive(Debug, Clone)]
pub struct IncrementalDocument {
    original: Vec<u8>,
    trailer: HashMap<String, Object>,
    catalog_ref: ObjectRef,
    objects: HashMap<ObjectRef, Object>,
    modified: BTreeSet<ObjectRef>,
    next_id: u32,
}

impl IncrementalDocument {
    /// Wrap `original` whose trailer is `trailer` and whose indirect objects
    /// are `objects`.
    ///
    /// The trailer must reference a catalog dictionary through `/Root`.
    pub fn new(
        original: Vec<u8>,
        trailer: HashMap<String, Object>,
        objects: HashMap<ObjectRef, Object>,
    ) -> Result<Self> {
        let catalog_ref = trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidObjectType {
                expected: "trailer /Root reference".to_string(),
                found: "nothing".to_string(),
            })?;
        match objects.get(&catalog_ref) {
            Some(Object::Dictionary(_)) => {},
            Some(other) => {
                return Err(Error::InvalidObjectType {
                    expected: "Dictionary".to_string(),
                    found: other.type_name().to_string(),
                })
            },
            None => return Err(Error::ObjectNotFound(catalog_ref.id, catalog_ref.gen)),
        }

        let size = trailer
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        let max_id = objects.keys().map(|r| r.id).max().unwrap_or(0);

        Ok(Self {
            original,
            trailer,
            catalog_ref,
            objects,
            modified: BTreeSet::new(),
            next_id: size.max(max_id + 1),
        })
    }

    /// Indirect object by reference.
    pub fn get_object(&self, id: ObjectRef) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Reference of the catalog.
    pub fn catalog_ref(&self) -> ObjectRef {
        self.catalog_ref
    }

    /// Whether `id` will be written in the update section.
    pub fn is_modified(&self, id: ObjectRef) -> bool {
        self.modified.contains(&id)
    }

    /// Number of objects in the update section.
    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }

    fn catalog_mut(&mut self) -> Option<&mut HashMap<String, Object>> {
        match self.objects.get_mut(&self.catalog_ref) {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }
    }

    fn collect_signatures(
        &self,
        field: &Object,
        inherited_sig: bool,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<HashMap<String, Object>>,
    ) -> Result<()> {
        if depth > MAX_FIELD_DEPTH {
            return Ok(());
        }
        if let Some(id) = field.as_reference() {
            if !visited.insert(id) {
                return Ok(());
            }
        }
        let field = self.resolve(field)?;
        let Some(dict) = field.as_dict() else {
            return Ok(());
        };

        let is_sig = match dict.get("FT").and_then(Object::as_name) {
            Some(ft) => ft == "Sig",
            None => inherited_sig,
        };
        if is_sig {
            if let Some(value) = dict.get("V") {
                if let Object::Dictionary(sig) = self.resolve(value)? {
                    out.push(sig);
                }
            }
        }
        if let Some(kids) = dict.get("Kids") {
            if let Object::Array(kids) = self.resolve(kids)? {
                for kid in &kids {
                    self.collect_signatures(kid, is_sig, depth + 1, visited, out)?;
                }
            }
        }
        Ok(())
    }
}

impl SignedDocument for IncrementalDocument {
    fn catalog_entry(&self, key: &str) -> Option<Object> {
        self.objects
            .get(&self.catalog_ref)
            .and_then(Object::as_dict)
            .and_then(|dict| dict.get(key))
            .cloned()
    }

    fn set_catalog_entry(&mut self, key: &str, value: Object) {
        let catalog_ref = self.catalog_ref;
        if let Some(catalog) = self.catalog_mut() {
            catalog.insert(key.to_string(), value);
            self.modified.insert(catalog_ref);
        }
    }

    fn resolve(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(id) => self
                .objects
                .get(id)
                .cloned()
                .ok_or(Error::ObjectNotFound(id.id, id.gen)),
            other => Ok(other.clone()),
        }
    }

    fn add_object(&mut self, obj: Object) -> ObjectRef {
        let id = ObjectRef::new(self.next_id, 0);
        self.next_id += 1;
        self.objects.insert(id, obj);
        self.modified.insert(id);
        id
    }

    fn update_object(&mut self, id: ObjectRef, obj: Object) -> Result<()> {
        if !self.objects.contains_key(&id) {
            return Err(Error::ObjectNotFound(id.id, id.gen));
        }
        self.objects.insert(id, obj);
        self.modified.insert(id);
        Ok(())
    }

    fn signature_dictionaries(&self) -> Result<Vec<HashMap<String, Object>>> {
        let mut signatures = Vec::new();
        let Some(acro_form) = self.catalog_entry("AcroForm") else {
            return Ok(signatures);
        };
        let acro_form = self.resolve(&acro_form)?;
        let Some(fields) = acro_form.as_dict().and_then(|d| d.get("Fields")) else {
            return Ok(signatures);
        };

        let mut visited = HashSet::new();
        if let Object::Array(fields) = self.resolve(fields)? {
            for field in &fields {
                self.collect_signatures(field, false, 0, &mut visited, &mut signatures)?;
            }
        }
        Ok(signatures)
    }

    fn write_incremental(&self, out: &mut dyn Write) -> Result<()> {
        let mut writer = IncrementalWriter::new(&self.original, &self.trailer, self.next_id);
        for id in &self.modified {
            if let Some(obj) = self.objects.get(id) {
                writer.add_object(*id, obj);
            }
        }
        writer.write_to(out)
    }
}
