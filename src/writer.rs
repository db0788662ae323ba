//! The rewriting writer.
//!
//! [`TransformWriter`] sits between a producer of sink calls and a
//! downstream [`XmlSink`]. Every call is rewritten on the fly according to
//! the shared [`TransformRules`]; nothing is buffered beyond the open-element
//! stack and the synthetic events an open element still has to emit.
//!
//! # Beispiel
//!
//! ```
//! use xrewrite::{EventRecorder, QName, TransformConfig, TransformWriter, XmlSink};
//!
//! let config = TransformConfig::default().with_element_rename("b", "c");
//! let mut writer = TransformWriter::new(EventRecorder::new(), &config).unwrap();
//! writer.start_element(&QName::local("a")).unwrap();
//! writer.start_element(&QName::local("b")).unwrap();
//! writer.end_element().unwrap();
//! writer.end_element().unwrap();
//!
//! let events = writer.into_inner().into_events();
//! assert_eq!(events[1], xrewrite::XmlEvent::StartElement(QName::local("c")));
//! ```

use std::sync::Arc;

use log::debug;

use crate::append::{AppendDirective, AppendDirectiveTable, AppendMode};
use crate::config::TransformConfig;
use crate::event::XmlEvent;
use crate::namespace::NamespaceScope;
use crate::qname::QName;
use crate::rules::TransformRules;
use crate::sink::{NamespaceContext, XML_NS, XmlSink};
use crate::{Error, FastHashSet, Result};

/// What a start tag turns into, decided once per element.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StartAction {
    /// Written unchanged.
    Identity,
    /// Written under a new name, keeping the original prefix.
    Rename(QName),
    /// Moved from no namespace into a namespace; needs a prefix.
    Promote(QName),
    /// Moved out of its namespace; written unprefixed.
    Demote(QName),
    /// Tags suppressed, content kept.
    ShallowDrop,
    /// Element and its whole subtree suppressed.
    DeepDrop,
}

/// State of one open input element.
#[derive(Debug)]
struct ElementFrame {
    original: QName,
    /// The start tag as written downstream. `None` while the tag is being
    /// written and for suppressed elements.
    emitted: Option<QName>,
    suppressed: bool,
    /// Namespace URIs declared on this element or an ancestor.
    written: FastHashSet<Arc<str>>,
    /// Namespace the element was renamed away from.
    replaced_ns: Option<Arc<str>>,
    /// Text that replaces the next character data of this element.
    replacement: Option<Arc<str>>,
    /// Wrapper to open in front of the first content of this element.
    pending_wrapper: Option<QName>,
    /// Synthetic events replayed before the real end tag.
    before_close: Vec<XmlEvent>,
    /// Synthetic events replayed after the real end tag.
    after_close: Vec<XmlEvent>,
}

impl ElementFrame {
    fn new(original: QName, suppressed: bool, written: FastHashSet<Arc<str>>) -> Self {
        Self {
            original,
            emitted: None,
            suppressed,
            written,
            replaced_ns: None,
            replacement: None,
            pending_wrapper: None,
            before_close: Vec::new(),
            after_close: Vec::new(),
        }
    }
}

/// Streaming writer that rewrites element names, namespaces and content.
///
/// The writer is single-threaded and forward-only. Any error leaves the
/// downstream sink in an undefined, partially written state; the document
/// has to be discarded.
pub struct TransformWriter<S: XmlSink> {
    sink: S,
    rules: Arc<TransformRules>,
    scope: NamespaceScope,
    appends: AppendDirectiveTable,
    frames: Vec<ElementFrame>,
    /// Depth of the deep-dropped element, 0 when not dropping.
    drop_depth: usize,
}

impl<S: XmlSink> std::fmt::Debug for TransformWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformWriter")
            .field("depth", &self.frames.len())
            .field("drop_depth", &self.drop_depth)
            .field("pending_appends", &self.appends.len())
            .finish_non_exhaustive()
    }
}

impl<S: XmlSink> TransformWriter<S> {
    /// Compiles `config` and wraps `sink`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the configuration is invalid.
    pub fn new(sink: S, config: &TransformConfig) -> Result<Self> {
        Ok(Self::with_rules(sink, config.compile()?))
    }

    /// Wraps `sink` with already compiled rules.
    pub fn with_rules(sink: S, rules: Arc<TransformRules>) -> Self {
        let scope = NamespaceScope::with_substitutions(Arc::clone(rules.namespace_map()));
        let appends = AppendDirectiveTable::from_directives(rules.append_directives());
        Self {
            sink,
            rules,
            scope,
            appends,
            frames: Vec::new(),
            drop_depth: 0,
        }
    }

    /// The rules this writer applies.
    pub fn rules(&self) -> &Arc<TransformRules> {
        &self.rules
    }

    /// Number of open input elements, suppressed ones included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The downstream sink.
    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Returns the downstream sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    /// The writer's namespace view: its own bindings first, then the
    /// sink's.
    pub fn namespace_context(&self) -> &dyn NamespaceContext {
        self
    }

    // ------------------------------------------------------------------
    // start_element
    // ------------------------------------------------------------------

    /// Opens an element.
    pub fn start_element(&mut self, name: &QName) -> Result<()> {
        if self.in_deep_drop() {
            self.scope.enter_scope();
            self.frames.push(ElementFrame::new(name.clone(), true, FastHashSet::default()));
            return Ok(());
        }
        self.open_pending_wrapper()?;

        let action = self.classify(name);
        let directive = self.appends.take(name);
        let hint = match &action {
            StartAction::Identity => Some(name.clone()),
            StartAction::Rename(target) => Some(target.clone()),
            _ => None,
        };

        let mut after_close = Vec::new();
        let mut replacement = None;
        let mut inner = None;
        if let Some(directive) = directive {
            debug!(
                "append {:?} of {} at {}",
                directive.mode,
                directive.wrap.to_clark(),
                name.to_clark()
            );
            match directive.mode {
                AppendMode::Pre => {
                    self.open_synthetic(&directive.wrap, hint.as_ref())?;
                    if let Some(text) = directive.text() {
                        self.sink.characters(text)?;
                    }
                    self.close_synthetic()?;
                }
                AppendMode::PreWrap => {
                    self.open_synthetic(&directive.wrap, hint.as_ref())?;
                    after_close.push(XmlEvent::EndElement);
                }
                AppendMode::Replace => {
                    let text = directive.text.clone().unwrap_or_else(|| Arc::from(""));
                    replacement = Some(text);
                }
                AppendMode::Post | AppendMode::PostWrap => inner = Some(directive),
            }
        }

        let written = self
            .frames
            .last()
            .map(|frame| frame.written.clone())
            .unwrap_or_default();
        self.scope.enter_scope();

        let output = match action {
            StartAction::ShallowDrop | StartAction::DeepDrop => {
                let deep = action == StartAction::DeepDrop;
                debug!(
                    "{} drop of {}",
                    if deep { "deep" } else { "shallow" },
                    name.to_clark()
                );
                if inner.is_some() {
                    debug!("content append on dropped {} skipped", name.to_clark());
                }
                let mut frame = ElementFrame::new(name.clone(), true, written);
                frame.after_close = after_close;
                self.frames.push(frame);
                if deep {
                    self.drop_depth = self.frames.len();
                }
                return Ok(());
            }
            StartAction::Identity => name.clone(),
            StartAction::Rename(target) | StartAction::Demote(target) => target,
            StartAction::Promote(target) => {
                let prefix = match self.resolve_prefix(&target.uri) {
                    Some(prefix) => prefix,
                    None => self.allocate_prefix(&target.uri),
                };
                target.reprefixed(prefix)
            }
        };
        let promoted = !name.has_namespace() && output.has_namespace();

        let mut frame = ElementFrame::new(name.clone(), false, written);
        frame.after_close = after_close;
        frame.replacement = replacement;
        self.frames.push(frame);

        let emitted = self.open_tag(&output)?;
        if promoted {
            let prefix: Arc<str> = Arc::from(emitted.prefix_str());
            self.namespace_decl(&prefix, &emitted.uri)?;
        }

        if let Some(frame) = self.frames.last_mut() {
            if emitted.uri != name.uri {
                frame.replaced_ns = Some(Arc::clone(&name.uri));
            }
            if let Some(directive) = inner {
                queue_inner(frame, directive);
            }
            frame.emitted = Some(emitted);
        }
        Ok(())
    }

    fn classify(&self, name: &QName) -> StartAction {
        if self.rules.is_dropped(name) {
            return StartAction::ShallowDrop;
        }
        let Some(target) = self.rules.element_target(name) else {
            return StartAction::Identity;
        };
        if target.is_drop_sentinel() {
            return StartAction::DeepDrop;
        }
        let target = self.substitute_namespace(target);
        let prefix = name.prefix_str();
        if prefix.is_empty() && !name.has_namespace() && target.has_namespace() {
            StartAction::Promote(target)
        } else if !prefix.is_empty() && !target.has_namespace() {
            StartAction::Demote(target.unprefixed())
        } else if prefix.is_empty() {
            StartAction::Rename(target.unprefixed())
        } else {
            StartAction::Rename(target.reprefixed(prefix))
        }
    }

    /// Applies the namespace substitutions to a rename target. A suppressed
    /// namespace leaves the target without one.
    fn substitute_namespace(&self, target: QName) -> QName {
        if !target.has_namespace() {
            return target;
        }
        let map = self.rules.namespace_map();
        if map.is_suppressed(&target.uri) {
            return QName::new("", Arc::clone(&target.local_name));
        }
        match map.get(&target.uri) {
            Some(uri) if *uri != target.uri => {
                let moved = QName::new(Arc::clone(uri), Arc::clone(&target.local_name));
                match &target.prefix {
                    Some(prefix) => moved.reprefixed(Arc::clone(prefix)),
                    None => moved,
                }
            }
            _ => target,
        }
    }

    /// Writes the start tag for `name` and whatever declaration it needs.
    /// Returns the name as written.
    fn open_tag(&mut self, name: &QName) -> Result<QName> {
        let uri = Arc::clone(&name.uri);
        let mut prefix: Arc<str> = name.prefix.clone().unwrap_or_else(|| Arc::from(""));
        let mut declare = false;

        if !uri.is_empty() && prefix.is_empty() && self.rules.default_namespace().is_some() {
            match self.resolve_prefix(&uri) {
                Some(p) if !p.is_empty() => prefix = p,
                _ => {
                    prefix = self.allocate_prefix(&uri);
                    declare = true;
                }
            }
        }
        if self.rules.default_namespace() == Some(&*uri) {
            prefix = Arc::from("");
        }

        let emitted = if prefix.is_empty() {
            name.unprefixed()
        } else {
            name.reprefixed(Arc::clone(&prefix))
        };
        self.sink.start_element(&emitted)?;

        let bound = self.resolve_uri(&prefix).unwrap_or_else(|| Arc::from(""));
        if declare || bound != uri {
            self.namespace_decl(&prefix, &uri)?;
        }
        Ok(emitted)
    }

    // ------------------------------------------------------------------
    // end_element
    // ------------------------------------------------------------------

    /// Closes the innermost open element.
    pub fn end_element(&mut self) -> Result<()> {
        self.open_pending_wrapper()?;
        let Some(frame) = self.frames.pop() else {
            return Err(Error::invalid_sequence("end_element", "no open element"));
        };

        if let Some(emitted) = &frame.emitted {
            self.replay_synthetic(&frame.before_close, Some(emitted))?;
            self.sink.end_element()?;
        }
        self.scope.exit_scope();
        self.replay_synthetic(&frame.after_close, None)?;

        if self.drop_depth > 0 && self.frames.len() < self.drop_depth {
            debug!("deep drop of {} finished", frame.original.to_clark());
            self.drop_depth = 0;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // attribute
    // ------------------------------------------------------------------

    /// Writes an attribute of the innermost open element.
    pub fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        let Some(frame) = self.frames.last() else {
            return Err(Error::invalid_sequence("attribute", "no open element"));
        };
        if frame.suppressed || self.in_deep_drop() {
            return Ok(());
        }

        let name = match self.rules.attribute_target(name) {
            Some(target) if target.is_drop_sentinel() => return Ok(()),
            Some(target) => self.substitute_namespace(target),
            None => name.clone(),
        };

        if self.rules.attributes_to_elements() {
            self.start_element(&name.unprefixed())?;
            self.characters(value)?;
            return self.end_element();
        }

        if !name.has_namespace() {
            return self.sink.attribute(&name.unprefixed(), value);
        }
        let prefix = self.attribute_prefix(&name)?;
        self.sink.attribute(&name.reprefixed(prefix), value)
    }

    /// A non-empty prefix bound to the attribute's namespace, declared on
    /// the current element when necessary.
    fn attribute_prefix(&mut self, name: &QName) -> Result<Arc<str>> {
        if &*name.uri == XML_NS {
            return Ok(Arc::from("xml"));
        }
        let own = name.prefix_str();
        if !own.is_empty() {
            match self.resolve_uri(own) {
                Some(uri) if uri == name.uri => return Ok(Arc::from(own)),
                None => {
                    let prefix: Arc<str> = Arc::from(own);
                    self.declare_direct(&prefix, &name.uri)?;
                    return Ok(prefix);
                }
                Some(_) => {}
            }
        }
        if let Some(prefix) = self.resolve_prefix(&name.uri)
            && !prefix.is_empty()
        {
            return Ok(prefix);
        }
        let prefix = self.allocate_prefix(&name.uri);
        self.declare_direct(&prefix, &name.uri)?;
        Ok(prefix)
    }

    // ------------------------------------------------------------------
    // namespace declarations
    // ------------------------------------------------------------------

    /// Declares `prefix` for `uri` on the innermost open element. An empty
    /// prefix or `xmlns` is treated as a default namespace declaration.
    pub fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() || prefix == "xmlns" {
            return self.default_namespace_decl(uri);
        }
        let Some(frame) = self.frames.last() else {
            return Err(Error::invalid_sequence("namespace_decl", "no open element"));
        };
        if prefix == "xml"
            || frame.suppressed
            || self.in_deep_drop()
            || frame.replaced_ns.as_deref() == Some(uri)
        {
            return Ok(());
        }
        let Some(uri) = self.rules.namespace_map().apply(uri) else {
            return Ok(());
        };
        if self.is_written(&uri) && self.resolve_prefix(&uri).as_deref() == Some(prefix) {
            return Ok(());
        }

        if self.rules.default_namespace() == Some(&*uri) {
            self.sink.default_namespace_decl(&uri)?;
            self.scope.bind("", &uri);
        } else {
            self.sink.namespace_decl(prefix, &uri)?;
            self.scope.bind(prefix, &uri);
        }
        self.mark_written(uri);
        Ok(())
    }

    /// Declares the default namespace on the innermost open element.
    pub fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        let Some(frame) = self.frames.last() else {
            return Err(Error::invalid_sequence(
                "default_namespace_decl",
                "no open element",
            ));
        };
        if frame.suppressed || self.in_deep_drop() || frame.replaced_ns.as_deref() == Some(uri) {
            return Ok(());
        }
        if let Some(forced) = self.rules.default_namespace()
            && !uri.is_empty()
            && forced != uri
        {
            return Ok(());
        }
        let Some(uri) = self.rules.namespace_map().apply(uri) else {
            return Ok(());
        };
        let redundant = if uri.is_empty() {
            // resolve_prefix kennt keine Undeklaration
            self.scope.lookup_uri("").is_some_and(|bound| bound.is_empty())
        } else {
            self.resolve_prefix(&uri).as_deref() == Some("")
        };
        if redundant && self.is_written(&uri) {
            return Ok(());
        }

        self.sink.default_namespace_decl(&uri)?;
        self.scope.bind("", &uri);
        self.mark_written(uri);
        Ok(())
    }

    // ------------------------------------------------------------------
    // characters
    // ------------------------------------------------------------------

    /// Writes character data.
    pub fn characters(&mut self, text: &str) -> Result<()> {
        if self.in_deep_drop() {
            return Ok(());
        }
        self.open_pending_wrapper()?;
        // nur der erste Textblock wird ersetzt
        if let Some(replacement) = self.frames.last_mut().and_then(|f| f.replacement.take()) {
            return self.sink.characters(&replacement);
        }
        self.sink.characters(text)
    }

    /// Flushes the downstream sink.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    // ------------------------------------------------------------------
    // synthetic elements
    // ------------------------------------------------------------------

    /// Opens an injected element. Its declarations bypass the rewrite
    /// filters.
    fn open_synthetic(&mut self, name: &QName, hint: Option<&QName>) -> Result<()> {
        self.scope.enter_scope();
        let uri = Arc::clone(&name.uri);
        let forced = self.rules.default_namespace().map(Arc::<str>::from);
        let mut declare = false;

        let prefix: Arc<str> = if uri.is_empty() || forced.as_deref() == Some(&*uri) {
            Arc::from("")
        } else {
            match self.resolve_prefix(&uri) {
                Some(p) if !(p.is_empty() && forced.is_some()) => p,
                _ => {
                    declare = true;
                    match hint {
                        Some(h) if h.uri == uri && !h.prefix_str().is_empty() => {
                            Arc::from(h.prefix_str())
                        }
                        _ => self.allocate_prefix(&uri),
                    }
                }
            }
        };
        if prefix.is_empty() && self.resolve_uri("").unwrap_or_else(|| Arc::from("")) != uri {
            declare = true;
        }

        let emitted = if prefix.is_empty() {
            name.unprefixed()
        } else {
            name.reprefixed(Arc::clone(&prefix))
        };
        self.sink.start_element(&emitted)?;
        if declare {
            if prefix.is_empty() {
                self.sink.default_namespace_decl(&uri)?;
            } else {
                self.sink.namespace_decl(&prefix, &uri)?;
            }
            self.scope.bind(&prefix, &uri);
        }
        Ok(())
    }

    fn close_synthetic(&mut self) -> Result<()> {
        self.sink.end_element()?;
        self.scope.exit_scope();
        Ok(())
    }

    fn replay_synthetic(&mut self, events: &[XmlEvent], hint: Option<&QName>) -> Result<()> {
        for event in events {
            match event {
                XmlEvent::StartElement(name) => self.open_synthetic(name, hint)?,
                XmlEvent::EndElement => self.close_synthetic()?,
                other => other.replay(&mut self.sink)?,
            }
        }
        Ok(())
    }

    fn open_pending_wrapper(&mut self) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let Some(wrapper) = frame.pending_wrapper.take() else {
            return Ok(());
        };
        let hint = frame.emitted.clone();
        self.open_synthetic(&wrapper, hint.as_ref())?;
        if let Some(frame) = self.frames.last_mut() {
            frame.before_close.insert(0, XmlEvent::EndElement);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    #[inline]
    fn in_deep_drop(&self) -> bool {
        self.drop_depth > 0 && self.frames.len() >= self.drop_depth
    }

    fn resolve_prefix(&mut self, uri: &str) -> Option<Arc<str>> {
        self.scope.resolve_prefix(uri, self.sink.namespace_context())
    }

    fn resolve_uri(&mut self, prefix: &str) -> Option<Arc<str>> {
        self.scope.resolve_uri(prefix, self.sink.namespace_context())
    }

    fn allocate_prefix(&mut self, uri: &str) -> Arc<str> {
        self.scope
            .allocate_unique_prefix(uri, self.sink.namespace_context())
            .unwrap_or_else(|| Arc::from(""))
    }

    /// Declares a binding the rewritten output needs, bypassing the filters.
    fn declare_direct(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.sink.namespace_decl(prefix, uri)?;
        self.scope.bind(prefix, uri);
        self.mark_written(Arc::from(uri));
        Ok(())
    }

    fn is_written(&self, uri: &str) -> bool {
        self.frames.last().is_some_and(|frame| frame.written.contains(uri))
    }

    fn mark_written(&mut self, uri: Arc<str>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.written.insert(uri);
        }
    }
}

/// Schedules a child-position directive on a freshly opened element.
fn queue_inner(frame: &mut ElementFrame, directive: AppendDirective) {
    match directive.mode {
        AppendMode::PostWrap => frame.pending_wrapper = Some(directive.wrap),
        _ => {
            let text = directive.text().map(Arc::<str>::from);
            frame.before_close.push(XmlEvent::StartElement(directive.wrap));
            if let Some(text) = text {
                frame.before_close.push(XmlEvent::Characters(text));
            }
            frame.before_close.push(XmlEvent::EndElement);
        }
    }
}

impl<S: XmlSink> NamespaceContext for TransformWriter<S> {
    fn prefix(&self, uri: &str) -> Option<Arc<str>> {
        if uri.is_empty() {
            return None;
        }
        self.scope
            .lookup_prefix(uri)
            .or_else(|| self.sink.namespace_context().prefix(uri))
    }

    fn namespace_uri(&self, prefix: &str) -> Option<Arc<str>> {
        match self.scope.lookup_uri(prefix) {
            Some(uri) if uri.is_empty() => None,
            Some(uri) => Some(uri),
            None => self.sink.namespace_context().namespace_uri(prefix),
        }
    }
}

impl<S: XmlSink> XmlSink for TransformWriter<S> {
    fn start_element(&mut self, name: &QName) -> Result<()> {
        TransformWriter::start_element(self, name)
    }

    fn end_element(&mut self) -> Result<()> {
        TransformWriter::end_element(self)
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        TransformWriter::attribute(self, name, value)
    }

    fn namespace_decl(&mut self, prefix: &str, uri: &str) -> Result<()> {
        TransformWriter::namespace_decl(self, prefix, uri)
    }

    fn default_namespace_decl(&mut self, uri: &str) -> Result<()> {
        TransformWriter::default_namespace_decl(self, uri)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        TransformWriter::characters(self, text)
    }

    fn namespace_context(&self) -> &dyn NamespaceContext {
        self
    }

    fn flush(&mut self) -> Result<()> {
        TransformWriter::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::EventRecorder;

    fn writer(config: TransformConfig) -> TransformWriter<EventRecorder> {
        TransformWriter::new(EventRecorder::new(), &config).unwrap()
    }

    fn start(name: &str) -> XmlEvent {
        XmlEvent::StartElement(QName::local(name))
    }

    #[test]
    fn identity_passes_calls_through() {
        let mut w = writer(TransformConfig::default());
        w.start_element(&QName::local("a")).unwrap();
        w.attribute(&QName::local("id"), "1").unwrap();
        w.characters("x").unwrap();
        w.end_element().unwrap();
        assert_eq!(
            w.into_inner().into_events(),
            vec![
                start("a"),
                XmlEvent::Attribute(QName::local("id"), "1".into()),
                XmlEvent::text("x"),
                XmlEvent::EndElement,
            ]
        );
    }

    #[test]
    fn classify_actions() {
        let config = TransformConfig::default()
            .with_element_rename("b", "c")
            .with_element_rename("p", "{urn:p}p")
            .with_element_rename("{urn:d}d", "d")
            .with_element_rename("gone", "")
            .with_drop_element("wrap");
        let w = writer(config);
        assert_eq!(w.classify(&QName::local("a")), StartAction::Identity);
        assert_eq!(w.classify(&QName::local("b")), StartAction::Rename(QName::local("c")));
        assert_eq!(
            w.classify(&QName::local("p")),
            StartAction::Promote(QName::new("urn:p", "p"))
        );
        assert_eq!(
            w.classify(&QName::with_prefix("urn:d", "d", "x")),
            StartAction::Demote(QName::local("d"))
        );
        assert_eq!(w.classify(&QName::local("gone")), StartAction::DeepDrop);
        assert_eq!(w.classify(&QName::local("wrap")), StartAction::ShallowDrop);
    }

    #[test]
    fn rename_keeps_prefix() {
        let w = writer(TransformConfig::default().with_element_rename("{urn:a}x", "{urn:b}y"));
        match w.classify(&QName::with_prefix("urn:a", "x", "p")) {
            StartAction::Rename(target) => {
                assert_eq!(target, QName::new("urn:b", "y"));
                assert_eq!(target.prefix_str(), "p");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unbalanced_end_is_invalid_sequence() {
        let mut w = writer(TransformConfig::default());
        let err = w.end_element().unwrap_err();
        assert!(matches!(err, Error::InvalidSequence { .. }));
    }

    #[test]
    fn attribute_without_element_is_invalid_sequence() {
        let mut w = writer(TransformConfig::default());
        assert!(matches!(
            w.attribute(&QName::local("x"), "1"),
            Err(Error::InvalidSequence { .. })
        ));
        assert!(matches!(
            w.namespace_decl("p", "urn:p"),
            Err(Error::InvalidSequence { .. })
        ));
        assert!(matches!(
            w.default_namespace_decl("urn:p"),
            Err(Error::InvalidSequence { .. })
        ));
    }

    #[test]
    fn depth_counts_suppressed_frames() {
        let mut w = writer(TransformConfig::default().with_element_rename("b", ""));
        w.start_element(&QName::local("a")).unwrap();
        w.start_element(&QName::local("b")).unwrap();
        w.start_element(&QName::local("c")).unwrap();
        assert_eq!(w.depth(), 3);
        w.end_element().unwrap();
        w.end_element().unwrap();
        assert_eq!(w.depth(), 1);
        assert!(!w.in_deep_drop());
    }

    #[test]
    fn deep_drop_resumes_with_sibling() {
        let mut w = writer(TransformConfig::default().with_element_rename("b", ""));
        w.start_element(&QName::local("a")).unwrap();
        w.start_element(&QName::local("b")).unwrap();
        w.characters("hidden").unwrap();
        w.end_element().unwrap();
        w.start_element(&QName::local("c")).unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        assert_eq!(
            w.into_inner().into_events(),
            vec![start("a"), start("c"), XmlEvent::EndElement, XmlEvent::EndElement]
        );
    }

    #[test]
    fn replacement_covers_only_first_text() {
        let config = TransformConfig::default().with_append_element("a", "a=new");
        let mut w = writer(config);
        w.start_element(&QName::local("a")).unwrap();
        w.characters("old").unwrap();
        w.characters("er").unwrap();
        w.end_element().unwrap();
        assert_eq!(
            w.into_inner().into_events(),
            vec![
                start("a"),
                XmlEvent::text("new"),
                XmlEvent::text("er"),
                XmlEvent::EndElement
            ]
        );
    }

    #[test]
    fn rename_target_follows_namespace_substitution() {
        let config = TransformConfig::default()
            .with_element_rename("x", "{urn:a}y")
            .with_element_rename("{urn:q}z", "{urn:gone}z")
            .with_namespace_substitution("urn:a", "urn:b")
            .with_namespace_substitution("urn:gone", "");
        let w = writer(config);
        assert_eq!(
            w.classify(&QName::local("x")),
            StartAction::Promote(QName::new("urn:b", "y"))
        );
        assert_eq!(
            w.classify(&QName::with_prefix("urn:q", "z", "q")),
            StartAction::Demote(QName::local("z"))
        );
    }

    #[test]
    fn repeated_undeclaration_is_written_once() {
        let config = TransformConfig::default().with_element_rename("{urn:d}*", "*");
        let mut w = writer(config);
        w.start_element(&QName::new("urn:x", "r")).unwrap();
        w.default_namespace_decl("urn:x").unwrap();
        w.start_element(&QName::with_prefix("urn:d", "a", "d")).unwrap();
        w.namespace_decl("d", "urn:d").unwrap();
        w.default_namespace_decl("").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        let events = w.into_inner().into_events();
        let undeclarations = events
            .iter()
            .filter(|e| **e == XmlEvent::DefaultNamespace("".into()))
            .count();
        assert_eq!(undeclarations, 1, "{events:?}");
    }

    #[test]
    fn post_wrap_waits_for_own_attributes() {
        let config = TransformConfig::default().with_append_element("a/", "w");
        let mut w = writer(config);
        w.start_element(&QName::local("a")).unwrap();
        w.attribute(&QName::local("id"), "1").unwrap();
        w.characters("t").unwrap();
        w.end_element().unwrap();
        assert_eq!(
            w.into_inner().into_events(),
            vec![
                start("a"),
                XmlEvent::Attribute(QName::local("id"), "1".into()),
                start("w"),
                XmlEvent::text("t"),
                XmlEvent::EndElement,
                XmlEvent::EndElement,
            ]
        );
    }

    #[test]
    fn writer_context_sees_own_bindings() {
        let mut w = writer(TransformConfig::default());
        w.start_element(&QName::with_prefix("urn:a", "x", "a")).unwrap();
        assert_eq!(w.namespace_context().prefix("urn:a").as_deref(), Some("a"));
        assert_eq!(w.namespace_context().namespace_uri("a").as_deref(), Some("urn:a"));
    }

    #[test]
    fn writer_is_a_sink() {
        fn drive(sink: &mut dyn XmlSink) -> Result<()> {
            sink.start_element(&QName::local("b"))?;
            sink.end_element()
        }
        let mut w = writer(TransformConfig::default().with_element_rename("b", "c"));
        drive(&mut w).unwrap();
        assert_eq!(w.into_inner().events()[0], start("c"));
    }
}
