//! Incremental update writer.
//!
//! PDF Spec: ISO 32000-1:2008, Section 7.5.6 - Incremental Updates.
//! New and modified objects are appended after the original `%%EOF`, followed
//! by a cross-reference section whose trailer points back at the previous one
//! through `/Prev`.

use super::ObjectSerializer;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// Writes an incremental update section after the original document bytes.
#[derive(Debug)]
pub struct IncrementalWriter<'a> {
    original: &'a [u8],
    objects: BTreeMap<ObjectRef, &'a Object>,
    trailer: &'a HashMap<String, Object>,
    size: u32,
}

impl<'a> IncrementalWriter<'a> {
    /// Create a writer for `original`, whose trailer dictionary is `trailer`
    /// and whose highest object number plus one is `size`.
    pub fn new(original: &'a [u8], trailer: &'a HashMap<String, Object>, size: u32) -> Self {
        Self {
            original,
            objects: BTreeMap::new(),
            trailer,
            size,
        }
    }

    /// Queue an object for the update section.
    pub fn add_object(&mut self, id: ObjectRef, obj: &'a Object) {
        if id.id >= self.size {
            self.size = id.id + 1;
        }
        self.objects.insert(id, obj);
    }

    /// Number of queued objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no object is queued.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write the original bytes followed by the update section.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let prev_xref = find_startxref(self.original)?;
        let serializer = ObjectSerializer::compact();

        let mut buf: Vec<u8> = Vec::with_capacity(self.original.len() + 4096);
        buf.extend_from_slice(self.original);
        if !matches!(self.original.last(), Some(b'\n') | Some(b'\r')) {
            buf.push(b'\n');
        }

        let mut xref_entries: Vec<(ObjectRef, usize)> = Vec::with_capacity(self.objects.len());
        for (&obj_ref, obj) in &self.objects {
            let offset = buf.len();
            serializer.write_indirect(&mut buf, obj_ref.id, obj_ref.gen, obj)?;
            xref_entries.push((obj_ref, offset));
        }

        let xref_offset = buf.len();
        write!(buf, "xref\n")?;
        for run in contiguous_runs(&xref_entries) {
            write!(buf, "{} {}\n", run[0].0.id, run.len())?;
            for (obj_ref, offset) in run {
                write!(buf, "{:010} {:05} n\r\n", offset, obj_ref.gen)?;
            }
        }

        write!(buf, "trailer\n<<")?;
        write!(buf, " /Size {}", self.size)?;
        write!(buf, " /Prev {}", prev_xref)?;
        for key in ["Root", "Info", "ID", "Encrypt"] {
            if let Some(value) = self.trailer.get(key) {
                write!(buf, " /{} ", key)?;
                serializer.write_object(&mut buf, value)?;
            }
        }
        write!(buf, " >>\nstartxref\n{}\n%%EOF\n", xref_offset)?;

        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }
}

/// Split sorted xref entries into runs of consecutive object numbers.
fn contiguous_runs(entries: &[(ObjectRef, usize)]) -> Vec<&[(ObjectRef, usize)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0.id != entries[i - 1].0.id + 1 {
            if start < i {
                runs.push(&entries[start..i]);
            }
            start = i;
        }
    }
    runs
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_startxref(bytes: &[u8]) -> Result<u64> {
    let search = b"startxref";
    if bytes.len() < search.len() {
        return Err(Error::InvalidObjectType {
            expected: "PDF file with startxref".to_string(),
            found: format!("{} bytes", bytes.len()),
        });
    }

    let mut pos = bytes.len() - search.len();
    loop {
        if bytes[pos..].starts_with(search) {
            let offset_str: String = bytes[pos + search.len()..]
                .iter()
                .skip_while(|&&b| b == b' ' || b == b'\n' || b == b'\r')
                .take_while(|&&b| b.is_ascii_digit())
                .map(|&b| b as char)
                .collect();

            if let Ok(offset) = offset_str.parse::<u64>() {
                return Ok(offset);
            }
        }
        if pos == 0 {
            break;
        }
        pos -= 1;
    }

    Err(Error::InvalidObjectType {
        expected: "PDF file with startxref".to_string(),
        found: "no startxref keyword".to_string(),
    })
}
