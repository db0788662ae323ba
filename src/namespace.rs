//! Nested prefix ↔ namespace URI bindings of the rewritten stream.
//!
//! Each open element owns one frame, a copy of its parent's frame plus the
//! bindings made on the element itself. Frames map URI → prefix, with at most
//! one prefix per URI and one URI per prefix. A base frame is always present,
//! so bindings made before the first element (or cached from the outer
//! context) survive until the writer is dropped.
//!
//! Lookups that miss the current frame are delegated to an outer
//! [`NamespaceContext`], normally the downstream sink's, and cached.

use std::sync::Arc;

use log::trace;

use crate::FastIndexMap;
use crate::rules::NamespaceMap;
use crate::sink::NamespaceContext;

/// Prefix stem for generated prefixes (`ps1`, `ps2`, ...).
pub const GENERATED_PREFIX: &str = "ps";

type Frame = FastIndexMap<Arc<str>, Arc<str>>;

/// Scoped namespace resolver with synthetic prefix allocation.
#[derive(Debug, Clone)]
pub struct NamespaceScope {
    frames: Vec<Frame>,
    substitutions: Arc<NamespaceMap>,
    next_generated: u32,
}

impl Default for NamespaceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceScope {
    /// An empty scope without namespace substitutions.
    pub fn new() -> Self {
        Self::with_substitutions(Arc::new(NamespaceMap::default()))
    }

    /// An empty scope that rewrites URIs through `substitutions` before
    /// resolving them to a prefix.
    pub fn with_substitutions(substitutions: Arc<NamespaceMap>) -> Self {
        Self {
            frames: vec![Frame::default()],
            substitutions,
            next_generated: 1,
        }
    }

    /// Number of frames above the base frame.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Pushes a copy of the current frame.
    pub fn enter_scope(&mut self) {
        let top = self.top().clone();
        self.frames.push(top);
    }

    /// Pops the current frame. The base frame is never removed.
    pub fn exit_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Binds `prefix` to `uri` in the current frame, replacing any earlier
    /// binding of either side.
    pub fn bind(&mut self, prefix: &str, uri: &str) {
        let top = self.top_mut();
        top.retain(|_, p| &**p != prefix);
        top.insert(Arc::from(uri), Arc::from(prefix));
    }

    /// The prefix for `uri` after namespace substitution.
    ///
    /// `None` for the empty URI and for URIs whose substitution target is
    /// empty. Misses fall back to `outer`; hits from there are cached in the
    /// current frame.
    pub fn resolve_prefix(&mut self, uri: &str, outer: &dyn NamespaceContext) -> Option<Arc<str>> {
        if uri.is_empty() {
            return None;
        }
        let target = match self.substitutions.get(uri) {
            Some(t) if t.is_empty() => return None,
            Some(t) => Arc::clone(t),
            None => Arc::from(uri),
        };
        self.find_prefix(&target, outer)
    }

    /// The URI bound to `prefix` (`""` = default namespace). Misses fall
    /// back to `outer`; non-empty hits from there are cached.
    pub fn resolve_uri(&mut self, prefix: &str, outer: &dyn NamespaceContext) -> Option<Arc<str>> {
        if let Some(uri) = self.lookup_uri(prefix) {
            return Some(uri);
        }
        let uri = outer.namespace_uri(prefix)?;
        if !uri.is_empty() {
            self.bind(prefix, &uri);
        }
        Some(uri)
    }

    /// Returns a non-empty prefix for `uri`, binding a fresh `ps<N>` prefix
    /// when none is known yet. `None` for the empty URI.
    ///
    /// Candidates are only checked against the current frame.
    pub fn allocate_unique_prefix(
        &mut self,
        uri: &str,
        outer: &dyn NamespaceContext,
    ) -> Option<Arc<str>> {
        if uri.is_empty() {
            return None;
        }
        if let Some(prefix) = self.find_prefix(uri, outer)
            && !prefix.is_empty()
        {
            return Some(prefix);
        }

        let prefix = loop {
            let candidate = format!("{GENERATED_PREFIX}{}", self.next_generated);
            self.next_generated += 1;
            if !self.top().values().any(|p| **p == *candidate) {
                break candidate;
            }
        };
        trace!("allocated prefix {prefix} for {uri}");
        self.bind(&prefix, uri);
        Some(Arc::from(prefix))
    }

    /// The prefix bound to `uri` in the current frame, without delegation.
    pub fn lookup_prefix(&self, uri: &str) -> Option<Arc<str>> {
        self.top().get(uri).cloned()
    }

    /// The URI bound to `prefix` in the current frame, without delegation.
    pub fn lookup_uri(&self, prefix: &str) -> Option<Arc<str>> {
        self.top()
            .iter()
            .find(|(_, p)| &***p == prefix)
            .map(|(uri, _)| Arc::clone(uri))
    }

    fn find_prefix(&mut self, uri: &str, outer: &dyn NamespaceContext) -> Option<Arc<str>> {
        if let Some(prefix) = self.lookup_prefix(uri) {
            return Some(prefix);
        }
        let prefix = outer.prefix(uri)?;
        trace!("cached outer binding {prefix:?} -> {uri}");
        self.bind(&prefix, uri);
        Some(prefix)
    }

    #[inline]
    fn top(&self) -> &Frame {
        // Basis-Frame existiert immer
        &self.frames[self.frames.len() - 1]
    }

    #[inline]
    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}
