//! Compiled, immutable rewrite rules.
//!
//! [`TransformRules`] is built once by [`TransformConfig::compile`] and
//! shared through `Arc` by every writer using the same configuration.
//!
//! [`TransformConfig::compile`]: crate::config::TransformConfig::compile

use std::sync::Arc;

use crate::append::AppendDirective;
use crate::qname::QName;
use crate::{Error, FastHashMap, FastHashSet, Result};

// ============================================================================
// QualifiedNameMap
// ============================================================================

/// Name → name lookup with exact and namespace-wide entries.
///
/// An exact entry maps one qualified name. A wildcard entry (`{ns1}*` →
/// `{ns2}*`) moves every name of `ns1` into `ns2` and keeps the local-name;
/// the key `*` stands for names without namespace, the target `*` for "no
/// namespace". Exact entries win over wildcard entries.
#[derive(Debug, Clone, Default)]
pub struct QualifiedNameMap {
    exact: FastHashMap<QName, QName>,
    namespaces: FastHashMap<Arc<str>, Arc<str>>,
}

impl QualifiedNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping. The drop sentinel is a valid target for exact keys.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` when only one side is a wildcard or the key is
    /// the drop sentinel.
    pub fn insert(&mut self, from: QName, to: QName) -> Result<()> {
        if from.is_drop_sentinel() {
            return Err(Error::configuration("empty source name in rename rule"));
        }
        match (from.is_wildcard(), to.is_wildcard()) {
            (true, true) => {
                self.namespaces.insert(from.uri, to.uri);
            }
            (false, false) => {
                self.exact.insert(from, to);
            }
            (true, false) => {
                return Err(Error::configuration(format!(
                    "wildcard {} must map to a wildcard, not {:?}",
                    from.to_clark(),
                    to.to_clark()
                )));
            }
            (false, true) => {
                return Err(Error::configuration(format!(
                    "{} cannot map to the wildcard {}",
                    from.to_clark(),
                    to.to_clark()
                )));
            }
        }
        Ok(())
    }

    /// Adds a namespace move unless the namespace already has one.
    pub fn insert_namespace_default(&mut self, from: &str, to: &str) {
        self.namespaces
            .entry(Arc::from(from))
            .or_insert_with(|| Arc::from(to));
    }

    /// The target for `name`, exact entries first.
    pub fn lookup(&self, name: &QName) -> Option<QName> {
        if let Some(target) = self.exact.get(name) {
            return Some(target.clone());
        }
        self.namespaces
            .get(&*name.uri)
            .map(|uri| QName::new(Arc::clone(uri), Arc::clone(&name.local_name)))
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.namespaces.is_empty()
    }
}

// ============================================================================
// NamespaceMap
// ============================================================================

/// Namespace URI substitutions. An empty target suppresses the namespace.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap {
    map: FastHashMap<Arc<str>, Arc<str>>,
}

impl NamespaceMap {
    /// Registers `from` → `to`, replacing an earlier entry.
    pub fn insert(&mut self, from: &str, to: &str) {
        self.map.insert(Arc::from(from), Arc::from(to));
    }

    /// The raw substitution target for `uri`.
    pub fn get(&self, uri: &str) -> Option<&Arc<str>> {
        self.map.get(uri)
    }

    /// True if declarations of `uri` are dropped.
    pub fn is_suppressed(&self, uri: &str) -> bool {
        self.map.get(uri).is_some_and(|t| t.is_empty())
    }

    /// The URI to emit for `uri`: substituted, unchanged, or `None` when
    /// suppressed.
    pub fn apply(&self, uri: &str) -> Option<Arc<str>> {
        match self.map.get(uri) {
            Some(t) if t.is_empty() => None,
            Some(t) => Some(Arc::clone(t)),
            None => Some(Arc::from(uri)),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================================================================
// TransformRules
// ============================================================================

/// Every lookup table a [`TransformWriter`] consults.
///
/// [`TransformWriter`]: crate::writer::TransformWriter
#[derive(Debug, Clone, Default)]
pub struct TransformRules {
    pub(crate) elements: QualifiedNameMap,
    pub(crate) attributes: QualifiedNameMap,
    pub(crate) namespaces: Arc<NamespaceMap>,
    pub(crate) dropped: FastHashSet<QName>,
    pub(crate) appends: Vec<AppendDirective>,
    pub(crate) attributes_to_elements: bool,
    pub(crate) default_namespace: Option<Arc<str>>,
}

impl TransformRules {
    /// Rules that leave every document unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Rename target for an element, the drop sentinel for a deep drop.
    pub fn element_target(&self, name: &QName) -> Option<QName> {
        self.elements.lookup(name)
    }

    /// Rename target for an attribute, the drop sentinel for removal.
    pub fn attribute_target(&self, name: &QName) -> Option<QName> {
        self.attributes.lookup(name)
    }

    /// True if `name` is unwrapped (shallow drop).
    pub fn is_dropped(&self, name: &QName) -> bool {
        self.dropped.contains(name)
    }

    pub fn namespace_map(&self) -> &Arc<NamespaceMap> {
        &self.namespaces
    }

    /// Directives each new writer starts with.
    pub fn append_directives(&self) -> &[AppendDirective] {
        &self.appends
    }

    pub fn attributes_to_elements(&self) -> bool {
        self.attributes_to_elements
    }

    /// Namespace forced to render unprefixed. `Some("")` forces a prefix on
    /// every namespaced element.
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// True if nothing would be rewritten.
    pub fn is_identity(&self) -> bool {
        self.elements.is_empty()
            && self.attributes.is_empty()
            && self.namespaces.is_empty()
            && self.dropped.is_empty()
            && self.appends.is_empty()
            && !self.attributes_to_elements
            && self.default_namespace.is_none()
    }
}
