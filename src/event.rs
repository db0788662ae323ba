//! Owned writer events.
//!
//! One variant per call of the [`XmlSink`] contract. Used for deferred
//! synthetic events inside the writer and by [`EventRecorder`] to capture a
//! rewritten stream.
//!
//! [`XmlSink`]: crate::sink::XmlSink
//! [`EventRecorder`]: crate::sink::EventRecorder

use std::sync::Arc;

use crate::qname::QName;
use crate::sink::XmlSink;
use crate::Result;

/// A single call on the sink contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// Start Element - opens an element with the given name and prefix.
    StartElement(QName),
    /// End Element - closes the innermost open element.
    EndElement,
    /// Attribute on the innermost start tag.
    Attribute(QName, Arc<str>),
    /// Prefixed namespace declaration on the innermost start tag.
    Namespace {
        /// The declared prefix.
        prefix: Arc<str>,
        /// The namespace URI it is bound to.
        uri: Arc<str>,
    },
    /// Default namespace declaration (`xmlns="uri"`).
    DefaultNamespace(Arc<str>),
    /// Character data.
    Characters(Arc<str>),
}

impl XmlEvent {
    /// Shorthand for a start event.
    pub fn start(name: QName) -> Self {
        Self::StartElement(name)
    }

    /// Shorthand for a characters event.
    pub fn text(value: impl Into<Arc<str>>) -> Self {
        Self::Characters(value.into())
    }

    /// Replays this event as the matching sink call.
    pub fn replay<S: XmlSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        match self {
            XmlEvent::StartElement(name) => sink.start_element(name),
            XmlEvent::EndElement => sink.end_element(),
            XmlEvent::Attribute(name, value) => sink.attribute(name, value),
            XmlEvent::Namespace { prefix, uri } => sink.namespace_decl(prefix, uri),
            XmlEvent::DefaultNamespace(uri) => sink.default_namespace_decl(uri),
            XmlEvent::Characters(text) => sink.characters(text),
        }
    }
}

/// Replays a slice of events in order.
pub fn replay_all<S: XmlSink + ?Sized>(events: &[XmlEvent], sink: &mut S) -> Result<()> {
    events.iter().try_for_each(|event| event.replay(sink))
}
