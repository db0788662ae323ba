//! The streaming-writer contract.
//!
//! [`XmlSink`] is both what the [`TransformWriter`] implements for its
//! callers and what it drives downstream. [`NamespaceContext`] is the
//! read-only prefix/URI view a sink exposes of the bindings it has seen.
//!
//! [`TransformWriter`]: crate::writer::TransformWriter

use std::sync::Arc;

use crate::event::XmlEvent;
use crate::qname::QName;
use crate::{Error, Result};

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Read-only prefix ↔ namespace URI resolution.
pub trait NamespaceContext {
    /// The prefix currently bound to `uri`. `Some("")` means `uri` is the
    /// default namespace.
    fn prefix(&self, uri: &str) -> Option<Arc<str>>;

    /// The namespace URI currently bound to `prefix` (`""` = default
    /// namespace). `None` when unbound.
    fn namespace_uri(&self, prefix: &str) -> Option<Arc<str>>;
}

/// A context without any bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNamespaces;

impl NamespaceContext for NoNamespaces {
    fn prefix(&self, _uri: &str) -> Option<Arc<str>> {
        None
    }

    fn namespace_uri(&self, _prefix: &str) -> Option<Arc<str>> {
        None
    }
}

/// Call-by-call XML construction, in document order, from one thread.
///
/// Attributes and namespace declarations belong to the most recent
/// `start_element` and must come before any content of that element.
pub trait XmlSink {
    /// Opens an element. The name's prefix is used as given.
    fn start_element(&mut self, name: &QName) -> Result<()>;

    /// Closes the innermost open element.
    fn end_element(&mut self) -> Result<()>;

    /// Writes an attribute on the innermost start tag.
    fn attribute(&mut self, name: &QName, value: &str) -> Result<()>;

    /// Declares `xmlns:prefix="uri"` on the innermost start tag.
    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()>;

    /// Declares `xmlns="uri"` on the innermost start tag.
    fn default_namespace_decl(&mut self, uri: &str) -> Result<()>;

    /// Writes character data.
    fn characters(&mut self, text: &str) -> Result<()>;

    /// The bindings visible at the current position.
    fn namespace_context(&self) -> &dyn NamespaceContext;

    /// Pushes buffered output downstream.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: XmlSink + ?Sized> XmlSink for &mut S {
    fn start_element(&mut self, name: &QName) -> Result<()> {
        (**self).start_element(name)
    }
    fn end_element(&mut self) -> Result<()> {
        (**self).end_element()
    }
    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        (**self).attribute(name, value)
    }
    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        (**self).namespace_decl(prefix, uri)
    }
    fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        (**self).default_namespace_decl(uri)
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        (**self).characters(text)
    }
    fn namespace_context(&self) -> &dyn NamespaceContext {
        (**self).namespace_context()
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: XmlSink + ?Sized> XmlSink for Box<S> {
    fn start_element(&mut self, name: &QName) -> Result<()> {
        (**self).start_element(name)
    }
    fn end_element(&mut self) -> Result<()> {
        (**self).end_element()
    }
    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        (**self).attribute(name, value)
    }
    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        (**self).namespace_decl(prefix, uri)
    }
    fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        (**self).default_namespace_decl(uri)
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        (**self).characters(text)
    }
    fn namespace_context(&self) -> &dyn NamespaceContext {
        (**self).namespace_context()
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

// ============================================================================
// NamespaceBindings: Deklarationen pro offenem Element
// ============================================================================

/// Declarations seen so far, one frame per open element.
///
/// This is what a plain downstream writer knows about namespaces: only what
/// was explicitly declared on it.
#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    frames: Vec<Vec<(Arc<str>, Arc<str>)>>,
}

impl NamespaceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a frame for a new element.
    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Drops the innermost frame.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Binds `prefix` to `uri` in the innermost frame. Returns false when no
    /// element is open.
    pub fn declare(&mut self, prefix: &str, uri: &str) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        frame.retain(|(p, _)| &**p != prefix);
        frame.push((Arc::from(prefix), Arc::from(uri)));
        true
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn lookup(&self, prefix: &str) -> Option<&Arc<str>> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| &**p == prefix)
            .map(|(_, uri)| uri)
    }
}

impl NamespaceContext for NamespaceBindings {
    fn prefix(&self, uri: &str) -> Option<Arc<str>> {
        if uri.is_empty() {
            return None;
        }
        if uri == XML_NS {
            return Some(Arc::from("xml"));
        }
        // Erster Treffer von innen nach aussen, der nicht ueberschattet ist.
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .filter(|(_, u)| &**u == uri)
            .map(|(p, _)| p)
            .find(|p| self.lookup(p).is_some_and(|bound| &**bound == uri))
            .cloned()
    }

    fn namespace_uri(&self, prefix: &str) -> Option<Arc<str>> {
        if prefix == "xml" {
            return Some(Arc::from(XML_NS));
        }
        self.lookup(prefix).filter(|uri| !uri.is_empty()).cloned()
    }
}

// ============================================================================
// EventRecorder
// ============================================================================

/// A sink that records every call as an [`XmlEvent`].
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Vec<XmlEvent>,
    bindings: NamespaceBindings,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded events.
    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    /// Consumes the recorder and returns the events.
    pub fn into_events(self) -> Vec<XmlEvent> {
        self.events
    }

    fn require_open(&self, operation: &'static str) -> Result<()> {
        if self.bindings.depth() == 0 {
            return Err(Error::invalid_sequence(operation, "no open element"));
        }
        Ok(())
    }
}

impl XmlSink for EventRecorder {
    fn start_element(&mut self, name: &QName) -> Result<()> {
        self.bindings.push();
        self.events.push(XmlEvent::StartElement(name.clone()));
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        self.require_open("end_element")?;
        self.bindings.pop();
        self.events.push(XmlEvent::EndElement);
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        self.require_open("attribute")?;
        self.events.push(XmlEvent::Attribute(name.clone(), Arc::from(value)));
        Ok(())
    }

    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.require_open("namespace_decl")?;
        self.bindings.declare(prefix, uri);
        self.events.push(XmlEvent::Namespace {
            prefix: Arc::from(prefix),
            uri: Arc::from(uri),
        });
        Ok(())
    }

    fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        self.require_open("default_namespace_decl")?;
        self.bindings.declare("", uri);
        self.events.push(XmlEvent::DefaultNamespace(Arc::from(uri)));
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.events.push(XmlEvent::Characters(Arc::from(text)));
        Ok(())
    }

    fn namespace_context(&self) -> &dyn NamespaceContext {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_resolve_innermost() {
        let mut b = NamespaceBindings::new();
        b.push();
        b.declare("p", "urn:one");
        b.push();
        b.declare("p", "urn:two");
        assert_eq!(b.namespace_uri("p").as_deref(), Some("urn:two"));
        assert_eq!(b.prefix("urn:two").as_deref(), Some("p"));
        // urn:one ist durch p=urn:two ueberschattet
        assert_eq!(b.prefix("urn:one"), None);
        b.pop();
        assert_eq!(b.prefix("urn:one").as_deref(), Some("p"));
    }

    #[test]
    fn bindings_default_namespace() {
        let mut b = NamespaceBindings::new();
        b.push();
        b.declare("", "urn:d");
        assert_eq!(b.prefix("urn:d").as_deref(), Some(""));
        assert_eq!(b.namespace_uri("").as_deref(), Some("urn:d"));
        b.push();
        b.declare("", "");
        assert_eq!(b.namespace_uri(""), None);
        assert_eq!(b.prefix("urn:d"), None);
    }

    #[test]
    fn bindings_xml_prefix_is_predeclared() {
        let b = NamespaceBindings::new();
        assert_eq!(b.namespace_uri("xml").as_deref(), Some(XML_NS));
        assert_eq!(b.prefix(XML_NS).as_deref(), Some("xml"));
    }

    #[test]
    fn declare_without_frame_is_rejected() {
        let mut b = NamespaceBindings::new();
        assert!(!b.declare("p", "urn:x"));
    }

    #[test]
    fn recorder_rejects_unbalanced_end() {
        let mut r = EventRecorder::new();
        let err = r.end_element().unwrap_err();
        assert!(matches!(err, Error::InvalidSequence { .. }));
    }

    #[test]
    fn recorder_tracks_declarations() {
        let mut r = EventRecorder::new();
        r.start_element(&QName::with_prefix("urn:a", "x", "a")).unwrap();
        r.namespace_decl("a", "urn:a").unwrap();
        assert_eq!(r.namespace_context().prefix("urn:a").as_deref(), Some("a"));
        r.end_element().unwrap();
        assert_eq!(r.namespace_context().prefix("urn:a"), None);
        assert_eq!(r.events().len(), 3);
    }

    #[test]
    fn no_namespaces_resolves_nothing() {
        assert_eq!(NoNamespaces.prefix("urn:a"), None);
        assert_eq!(NoNamespaces.namespace_uri("p"), None);
    }
}
