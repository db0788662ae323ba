//! Sink calls → XML text.
//!
//! [`XmlStreamSerializer`] implements [`XmlSink`] on top of any
//! `std::io::Write`. Start tags are buffered until the first content so
//! empty elements come out as `<a/>` and late declarations and attributes
//! still land in the tag. The serializer keeps its own namespace bindings,
//! which makes it a usable outer [`NamespaceContext`] for the writer, and
//! declares any prefix a start tag uses but nobody declared.

use std::io::Write;
use std::sync::Arc;

use crate::qname::QName;
use crate::sink::{NamespaceBindings, NamespaceContext, XML_NS, XmlSink};
use crate::{Error, Result};

// ============================================================================
// Freie Hilfsfunktionen
// ============================================================================

/// Schreibt einen String als Bytes in den Writer.
#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    writer.write_all(s.as_bytes()).map_err(Error::from)
}

/// QName als `prefix:local` schreiben.
fn write_qname(writer: &mut impl Write, q: &QName) -> Result<()> {
    let prefix = q.prefix_str();
    if !prefix.is_empty() {
        w(writer, prefix)?;
        w(writer, ":")?;
    }
    w(writer, &q.local_name)
}

/// XML-Escaping mit memchr3-SIMD: Sucht drei Zeichen gleichzeitig und ersetzt sie.
/// Grosse Bloecke ohne Escape-Zeichen werden in einem Stueck geschrieben.
fn write_escaped_memchr3(
    w: &mut impl Write,
    s: &str,
    needle: [u8; 3],
    replacement: [&[u8]; 3],
) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while let Some(offset) = memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
        let pos = start + offset;
        w.write_all(&bytes[start..pos])?;
        let idx = needle.iter().position(|&n| n == bytes[pos]).unwrap_or(0);
        w.write_all(replacement[idx])?;
        start = pos + 1;
    }
    w.write_all(&bytes[start..])?;
    Ok(())
}

/// XML-Escaping fuer Text-Inhalt: & < > → &amp; &lt; &gt;
fn write_escaped_text(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'>'], [b"&amp;", b"&lt;", b"&gt;"])
}

/// XML-Escaping fuer Attribut-Werte: & < " → &amp; &lt; &quot;
fn write_escaped_attr(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])
}

// ============================================================================
// XmlStreamSerializer
// ============================================================================

/// Buffered start tag.
struct PendingStart {
    name: QName,
    ns_decls: Vec<(Arc<str>, Arc<str>)>,
    attrs: Vec<(QName, Arc<str>)>,
}

/// Streaming XML serializer writing straight into `W: Write`.
pub struct XmlStreamSerializer<W: Write> {
    writer: W,
    element_stack: Vec<QName>,
    pending: Option<PendingStart>,
    bindings: NamespaceBindings,
    synthetic_ns_counter: usize,
}

impl<W: Write> XmlStreamSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            element_stack: Vec::new(),
            pending: None,
            bindings: NamespaceBindings::new(),
            synthetic_ns_counter: 0,
        }
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.bindings.depth()
    }

    /// Writes a buffered start tag, flushes and returns the writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush_pending_start(false)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn pending_mut(&mut self, operation: &'static str) -> Result<&mut PendingStart> {
        self.pending
            .as_mut()
            .ok_or_else(|| Error::invalid_sequence(operation, "no start tag to attach to"))
    }

    /// Declares in the pending tag, replacing an earlier declaration of the
    /// same prefix.
    fn declare_pending(&mut self, prefix: &str, uri: &str) -> Result<()> {
        let pending = self.pending_mut("namespace_decl")?;
        pending.ns_decls.retain(|(p, _)| &**p != prefix);
        pending.ns_decls.push((Arc::from(prefix), Arc::from(uri)));
        self.bindings.declare(prefix, uri);
        Ok(())
    }

    /// Ergaenzt fehlende NS-Deklarationen fuer Element und Attribute.
    fn synthesize_missing_ns(&mut self) -> Result<()> {
        let Some(pending) = self.pending.as_ref() else {
            return Ok(());
        };
        let name = pending.name.clone();
        let attr_names: Vec<QName> = pending.attrs.iter().map(|(q, _)| q.clone()).collect();

        let element_prefix = name.prefix_str();
        let bound = self.bindings.namespace_uri(element_prefix);
        let bound = bound.as_deref().unwrap_or("");
        if bound != &*name.uri && !(element_prefix == "xml" && &*name.uri == XML_NS) {
            self.declare_pending(element_prefix, &name.uri)?;
        }

        let mut renamed = Vec::new();
        for (idx, attr) in attr_names.iter().enumerate() {
            if !attr.has_namespace() || &*attr.uri == XML_NS {
                continue;
            }
            let prefix = attr.prefix_str();
            if !prefix.is_empty() {
                if self.bindings.namespace_uri(prefix).as_deref() != Some(&*attr.uri) {
                    self.declare_pending(prefix, &attr.uri)?;
                }
                continue;
            }
            let prefix = match self.bindings.prefix(&attr.uri) {
                Some(p) if !p.is_empty() => p,
                _ => {
                    let candidate = loop {
                        let candidate = format!("ns{}", self.synthetic_ns_counter);
                        self.synthetic_ns_counter += 1;
                        if self.bindings.namespace_uri(&candidate).is_none() {
                            break candidate;
                        }
                    };
                    self.declare_pending(&candidate, &attr.uri)?;
                    Arc::from(candidate)
                }
            };
            renamed.push((idx, attr.reprefixed(prefix)));
        }
        if let Some(pending) = self.pending.as_mut() {
            for (idx, name) in renamed {
                pending.attrs[idx].0 = name;
            }
        }
        Ok(())
    }

    /// Schreibt den gepufferten Start-Tag.
    fn flush_pending_start(&mut self, self_closing: bool) -> Result<()> {
        self.synthesize_missing_ns()?;
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        w(&mut self.writer, "<")?;
        write_qname(&mut self.writer, &pending.name)?;
        for (prefix, uri) in &pending.ns_decls {
            if prefix.is_empty() {
                w(&mut self.writer, " xmlns=\"")?;
            } else {
                w(&mut self.writer, " xmlns:")?;
                w(&mut self.writer, prefix)?;
                w(&mut self.writer, "=\"")?;
            }
            write_escaped_attr(&mut self.writer, uri)?;
            w(&mut self.writer, "\"")?;
        }
        for (name, value) in &pending.attrs {
            w(&mut self.writer, " ")?;
            write_qname(&mut self.writer, name)?;
            w(&mut self.writer, "=\"")?;
            write_escaped_attr(&mut self.writer, value)?;
            w(&mut self.writer, "\"")?;
        }

        if self_closing {
            w(&mut self.writer, "/>")?;
        } else {
            w(&mut self.writer, ">")?;
            self.element_stack.push(pending.name);
        }
        Ok(())
    }
}

impl<W: Write> XmlSink for XmlStreamSerializer<W> {
    fn start_element(&mut self, name: &QName) -> Result<()> {
        self.flush_pending_start(false)?;
        self.bindings.push();
        self.pending = Some(PendingStart {
            name: name.clone(),
            ns_decls: Vec::new(),
            attrs: Vec::new(),
        });
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        if self.pending.is_some() {
            self.flush_pending_start(true)?;
        } else {
            let name = self
                .element_stack
                .pop()
                .ok_or_else(|| Error::invalid_sequence("end_element", "no open element"))?;
            w(&mut self.writer, "</")?;
            write_qname(&mut self.writer, &name)?;
            w(&mut self.writer, ">")?;
        }
        self.bindings.pop();
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        let pending = self.pending_mut("attribute")?;
        pending.attrs.push((name.clone(), Arc::from(value)));
        Ok(())
    }

    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.declare_pending(prefix, uri)
    }

    fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        self.declare_pending("", uri)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.flush_pending_start(false)?;
        write_escaped_text(&mut self.writer, text)
    }

    fn namespace_context(&self) -> &dyn NamespaceContext {
        &self.bindings
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
