//! xrewrite – streaming XML rewriting engine
//!
//! A [`TransformWriter`] sits in front of any [`XmlSink`] and rewrites the
//! call stream on the fly: elements and attributes are renamed, namespaces
//! substituted or suppressed, elements unwrapped or removed with their
//! subtree, attributes turned into child elements and content injected
//! around trigger elements. Rules are compiled once from a
//! [`TransformConfig`] and shared between writers.
//!
//! # Beispiel
//!
//! ```
//! use xrewrite::{transform_str, TransformConfig};
//!
//! let config = TransformConfig::default()
//!     .with_element_rename("{http://foo}*", "{http://bar}*")
//!     .with_drop_element("envelope");
//!
//! let out = transform_str(
//!     r#"<envelope><f:test xmlns:f="http://foo"><f:a>1</f:a></f:test></envelope>"#,
//!     &config,
//! )
//! .unwrap();
//! assert_eq!(out, r#"<f:test xmlns:f="http://bar"><f:a>1</f:a></f:test>"#);
//! ```

pub mod append;
pub mod config;
pub mod error;
pub mod event;
pub mod namespace;
pub mod qname;
pub mod rules;
pub mod sink;
pub mod writer;
pub mod xml;
pub mod xml_serializer;

use std::io::{Read, Write};

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent — für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Types
pub use event::XmlEvent;
pub use qname::QName;

// Public API: Sinks
pub use sink::{EventRecorder, NamespaceBindings, NamespaceContext, XmlSink};
pub use xml_serializer::XmlStreamSerializer;

// Public API: Rules
pub use append::{AppendDirective, AppendMode};
pub use config::TransformConfig;
pub use namespace::NamespaceScope;
pub use rules::TransformRules;

// Public API: Writer
pub use writer::TransformWriter;

// Public API: XML
pub use xml::{copy_xml, copy_xml_str};

/// Parses `xml`, rewrites it with `config` and returns the serialized
/// result.
///
/// # Errors
///
/// Configuration errors from compiling `config`, parse errors from the input
/// and any error raised while rewriting.
pub fn transform_str(xml: &str, config: &TransformConfig) -> Result<String> {
    let mut writer = TransformWriter::new(XmlStreamSerializer::new(Vec::new()), config)?;
    copy_xml_str(xml, &mut writer)?;
    let bytes = writer.into_inner().finish()?;
    String::from_utf8(bytes).map_err(|e| Error::Sink(e.to_string()))
}

/// Streaming-Variante von [`transform_str`]: liest aus `input`, schreibt
/// nach `output`.
pub fn transform_writer<R: Read, W: Write>(input: R, output: W, config: &TransformConfig) -> Result<W> {
    let mut writer = TransformWriter::new(XmlStreamSerializer::new(output), config)?;
    copy_xml(input, &mut writer)?;
    writer.into_inner().finish()
}
