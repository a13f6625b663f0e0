//! PDF writing for incremental updates.
//!
//! ## Architecture
//!
//! ```text
//! DSS objects (dictionaries + evidence streams)
//!     ↓
//! [IncrementalWriter] (appends objects, xref section, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! original bytes + appended update
//! ```
//!
//! The original file bytes are copied verbatim; every signature's ByteRange
//! therefore stays valid.

mod incremental;
mod object_serializer;

pub use incremental::{find_startxref, IncrementalWriter};
pub use object_serializer::ObjectSerializer;

use crate::error::Result;
use crate::object::Object;
use std::collections::HashMap;
use std::io::Write;

/// Build a stream object holding `data`, Flate-encoded when `compress` is set.
pub fn data_stream(data: &[u8], compress: bool) -> Result<Object> {
    let mut dict = HashMap::new();
    let encoded = if compress {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        encoder.finish()?
    } else {
        data.to_vec()
    };
    dict.insert("Length".to_string(), Object::Integer(encoded.len() as i64));

    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(encoded),
    })
}
