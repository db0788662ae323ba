//! Construction-time configuration.
//!
//! The flat, string-keyed shape used by the surrounding system: names in
//! Clark notation, `""` as the drop sentinel, `*` as local-name wildcard.
//! [`TransformConfig::compile`] validates everything once and produces the
//! shared [`TransformRules`].
//!
//! # Beispiel
//!
//! ```
//! use xrewrite::TransformConfig;
//!
//! let config = TransformConfig::default()
//!     .with_element_rename("{urn:old}order", "{urn:new}purchase")
//!     .with_drop_element("envelope")
//!     .with_append_element("{urn:old}order/", "{urn:new}note=checked");
//!
//! let rules = config.compile().unwrap();
//! assert!(rules.is_dropped(&xrewrite::QName::local("envelope")));
//! ```
//!
//! # Append syntax
//!
//! | key | value | mode |
//! |---|---|---|
//! | `trigger` | `wrap` | [`AppendMode::PreWrap`] |
//! | `trigger` | `wrap=text` | [`AppendMode::Pre`] |
//! | `trigger/` | `wrap` | [`AppendMode::PostWrap`] |
//! | `trigger/` | `wrap=text` | [`AppendMode::Post`] |
//! | `trigger` | `trigger=text` | [`AppendMode::Replace`] |
//!
//! The `=` is searched after the closing `}` of the value, so namespace URIs
//! may contain `=`.
//!
//! [`AppendMode::PreWrap`]: crate::append::AppendMode::PreWrap
//! [`AppendMode::Pre`]: crate::append::AppendMode::Pre
//! [`AppendMode::PostWrap`]: crate::append::AppendMode::PostWrap
//! [`AppendMode::Post`]: crate::append::AppendMode::Post
//! [`AppendMode::Replace`]: crate::append::AppendMode::Replace

use std::sync::Arc;

use log::{debug, warn};

use crate::append::AppendDirective;
use crate::qname::QName;
use crate::rules::{NamespaceMap, TransformRules};
use crate::{Error, FastHashSet, FastIndexMap, Result};

/// All options controlling a rewrite.
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    pub(crate) element_renames: FastIndexMap<String, String>,
    pub(crate) attribute_renames: FastIndexMap<String, String>,
    pub(crate) namespace_substitutions: FastIndexMap<String, String>,
    pub(crate) append_elements: FastIndexMap<String, String>,
    pub(crate) append_directives: Vec<AppendDirective>,
    pub(crate) drop_elements: Vec<String>,
    pub(crate) attributes_to_elements: bool,
    pub(crate) default_namespace: Option<String>,
}

impl TransformConfig {
    // --- Getter ---

    /// Element renames, `"{ns}local"` → `"{ns}local"`.
    pub fn element_renames(&self) -> &FastIndexMap<String, String> { &self.element_renames }
    /// Attribute renames, same shape as element renames.
    pub fn attribute_renames(&self) -> &FastIndexMap<String, String> { &self.attribute_renames }
    /// Namespace URI substitutions.
    pub fn namespace_substitutions(&self) -> &FastIndexMap<String, String> { &self.namespace_substitutions }
    /// Append directives in string form.
    pub fn append_elements(&self) -> &FastIndexMap<String, String> { &self.append_elements }
    /// Typed append directives.
    pub fn append_directives(&self) -> &[AppendDirective] { &self.append_directives }
    /// Elements unwrapped on output.
    pub fn drop_elements(&self) -> &[String] { &self.drop_elements }
    /// Attributes are written as child elements.
    pub fn attributes_to_elements(&self) -> bool { self.attributes_to_elements }
    /// Namespace forced to render unprefixed.
    pub fn default_namespace(&self) -> Option<&str> { self.default_namespace.as_deref() }

    // --- Builder-Setter (Fluent API) ---

    /// Fuegt ein Element-Rename hinzu (`""` als Ziel = Deep-Drop).
    pub fn with_element_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.element_renames.insert(from.into(), to.into());
        self
    }
    /// Fuegt ein Attribut-Rename hinzu (`""` als Ziel = Attribut entfernen).
    pub fn with_attribute_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.attribute_renames.insert(from.into(), to.into());
        self
    }
    /// Fuegt eine Namespace-Ersetzung hinzu (`""` als Ziel = unterdruecken).
    pub fn with_namespace_substitution(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.namespace_substitutions.insert(from.into(), to.into());
        self
    }
    /// Fuegt eine Append-Direktive in String-Form hinzu.
    pub fn with_append_element(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append_elements.insert(key.into(), value.into());
        self
    }
    /// Fuegt eine typisierte Append-Direktive hinzu.
    pub fn with_append_directive(mut self, directive: AppendDirective) -> Self {
        self.append_directives.push(directive);
        self
    }
    /// Fuegt ein Shallow-Drop-Element hinzu.
    pub fn with_drop_element(mut self, name: impl Into<String>) -> Self {
        self.drop_elements.push(name.into());
        self
    }
    /// Setzt attributes-to-elements.
    pub fn with_attributes_to_elements(mut self, val: bool) -> Self {
        self.attributes_to_elements = val;
        self
    }
    /// Setzt den Override-Default-Namespace.
    pub fn with_default_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_namespace = Some(uri.into());
        self
    }

    // --- Mutable Setter ---

    /// Ersetzt alle Element-Renames.
    pub fn set_element_renames<K: Into<String>, V: Into<String>>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) {
        self.element_renames = collect_pairs(pairs);
    }
    /// Ersetzt alle Attribut-Renames.
    pub fn set_attribute_renames<K: Into<String>, V: Into<String>>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) {
        self.attribute_renames = collect_pairs(pairs);
    }
    /// Ersetzt alle Namespace-Ersetzungen.
    pub fn set_namespace_substitutions<K: Into<String>, V: Into<String>>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) {
        self.namespace_substitutions = collect_pairs(pairs);
    }
    /// Ersetzt alle Append-Direktiven in String-Form.
    pub fn set_append_elements<K: Into<String>, V: Into<String>>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) {
        self.append_elements = collect_pairs(pairs);
    }
    /// Ersetzt alle typisierten Append-Direktiven.
    pub fn set_append_directives(&mut self, directives: Vec<AppendDirective>) { self.append_directives = directives; }
    /// Ersetzt alle Shallow-Drop-Elemente.
    pub fn set_drop_elements<T: Into<String>>(&mut self, names: impl IntoIterator<Item = T>) {
        self.drop_elements = names.into_iter().map(Into::into).collect();
    }
    /// Setzt attributes-to-elements.
    pub fn set_attributes_to_elements(&mut self, val: bool) { self.attributes_to_elements = val; }
    /// Setzt den Override-Default-Namespace.
    pub fn set_default_namespace(&mut self, uri: Option<String>) { self.default_namespace = uri; }

    /// Validates the configuration and builds the shared rules.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if
    /// - a name is not valid Clark notation,
    /// - a wildcard maps to a non-wildcard (this includes the drop sentinel),
    /// - a drop element or append name is a wildcard,
    /// - a namespace substitution has an empty source.
    pub fn compile(&self) -> Result<Arc<TransformRules>> {
        let mut rules = TransformRules::default();
        let mut namespaces = NamespaceMap::default();

        for (from, to) in &self.namespace_substitutions {
            if from.is_empty() {
                return Err(Error::configuration("namespace substitution with empty source URI"));
            }
            namespaces.insert(from, to);
        }

        for (from, to) in &self.element_renames {
            let (from, to) = parse_pair(from, to)?;
            rules.elements.insert(from.clone(), to.clone())?;
            // Namespace-Wildcards verschieben auch die Deklarationen
            if from.is_wildcard() && from.has_namespace() && from.uri != to.uri
                && namespaces.get(&from.uri).is_none()
            {
                namespaces.insert(&from.uri, &to.uri);
            }
        }

        for (from, to) in &self.attribute_renames {
            let (from, to) = parse_pair(from, to)?;
            rules.attributes.insert(from, to)?;
        }

        for (from, to) in &self.namespace_substitutions {
            rules.elements.insert_namespace_default(from, to);
            rules.attributes.insert_namespace_default(from, to);
        }

        for name in &self.drop_elements {
            let qname = QName::parse_clark(name)?;
            if qname.is_drop_sentinel() {
                warn!("ignoring empty drop element entry");
                continue;
            }
            if qname.is_wildcard() {
                return Err(Error::configuration(format!(
                    "drop element {name:?} cannot be a wildcard"
                )));
            }
            rules.dropped.insert(qname);
        }

        for (key, value) in &self.append_elements {
            if let Some(directive) = parse_append(key, value)? {
                rules.appends.push(directive);
            }
        }
        for directive in &self.append_directives {
            directive.validate()?;
            rules.appends.push(directive.clone());
        }
        let mut triggers: FastHashSet<QName> = FastHashSet::default();
        for directive in &rules.appends {
            if !triggers.insert(directive.trigger.clone()) {
                warn!(
                    "append directive for {} replaced by a later one",
                    directive.trigger.to_clark()
                );
            }
        }

        rules.namespaces = Arc::new(namespaces);
        rules.attributes_to_elements = self.attributes_to_elements;
        rules.default_namespace = self.default_namespace.as_deref().map(Arc::from);

        debug!(
            "compiled transform rules: {} element, {} attribute, {} namespace, {} drop, {} append",
            rules.elements.len(),
            rules.attributes.len(),
            rules.namespaces.len(),
            rules.dropped.len(),
            rules.appends.len()
        );
        Ok(Arc::new(rules))
    }
}

fn collect_pairs<K: Into<String>, V: Into<String>>(
    pairs: impl IntoIterator<Item = (K, V)>,
) -> FastIndexMap<String, String> {
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

fn parse_pair(from: &str, to: &str) -> Result<(QName, QName)> {
    let from_q = QName::parse_clark(from)?;
    let to_q = QName::parse_clark(to)?;
    if from_q.is_wildcard() && to_q.is_drop_sentinel() {
        return Err(Error::configuration(format!(
            "wildcard {from:?} cannot be dropped; map it to another wildcard"
        )));
    }
    Ok((from_q, to_q))
}

/// Parses one string-form append entry. `Ok(None)` for entries that are
/// accepted but have no effect.
fn parse_append(key: &str, value: &str) -> Result<Option<AppendDirective>> {
    let (trigger, child) = match key.strip_suffix('/') {
        Some(k) => (k, true),
        None => (key, false),
    };
    let search_from = value.find('}').unwrap_or(0);
    let (wrap, text) = match value[search_from..].find('=') {
        Some(pos) => {
            let pos = search_from + pos;
            (&value[..pos], Some(&value[pos + 1..]))
        }
        None => (value, None),
    };

    let trigger = QName::parse_clark(trigger)?;
    let wrap = QName::parse_clark(wrap)?;

    let directive = match (trigger == wrap, child, text) {
        (true, false, Some(text)) => AppendDirective::replace(trigger, text),
        (true, _, _) => {
            warn!("ignoring append entry {key:?} -> {value:?}: element would wrap itself");
            return Ok(None);
        }
        (false, false, Some(text)) => AppendDirective::pre(trigger, wrap, Some(text)),
        (false, false, None) => AppendDirective::pre_wrap(trigger, wrap),
        (false, true, Some(text)) => AppendDirective::post(trigger, wrap, Some(text)),
        (false, true, None) => AppendDirective::post_wrap(trigger, wrap),
    };
    directive.validate()?;
    Ok(Some(directive))
}
