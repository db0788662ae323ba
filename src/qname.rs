//! Qualified names.
//!
//! A QName is a namespace URI, a local-name and an optional prefix. Only the
//! URI and the local-name make up its identity; the prefix is a
//! serialization detail that the writer is free to change.
//!
//! Configuration refers to names in Clark notation: `{uri}local` for a
//! namespaced name, `local` for a name without namespace, `*` as local part
//! for "every name in this namespace", and the empty string for the drop
//! sentinel.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;

use crate::{Error, Result};

/// Local part that matches every local-name of a namespace.
pub const WILDCARD: &str = "*";

/// A QName value with URI, local-name, and optional prefix.
///
/// `PartialEq`, `Eq`, `Hash` and `Ord` only consider `uri` and `local_name`.
///
/// `identity` ist ein vorberechneter 64-Bit-Hash von (uri, local_name).
/// Vermeidet wiederholtes String-Hashing bei HashMap-Operationen.
#[derive(Clone)]
pub struct QName {
    /// The namespace URI. Empty string means no namespace.
    pub uri: Arc<str>,
    /// The local name.
    pub local_name: Arc<str>,
    /// The prefix used when serializing. `None` and `Some("")` both mean
    /// "unprefixed".
    pub prefix: Option<Arc<str>>,
    identity: u64,
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QName")
            .field("uri", &self.uri)
            .field("local_name", &self.local_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Berechnet den Identity-Hash für ein QName (uri + local_name).
pub(crate) fn compute_identity(uri: &str, local_name: &str) -> u64 {
    let mut hasher = AHasher::default();
    uri.hash(&mut hasher);
    local_name.hash(&mut hasher);
    hasher.finish()
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.uri == other.uri
            && self.local_name == other.local_name
    }
}

impl Eq for QName {}

/// Ordering konsistent mit PartialEq: nur uri und local_name, prefix ignoriert.
impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri
            .cmp(&other.uri)
            .then_with(|| self.local_name.cmp(&other.local_name))
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Display: Zeigt `prefix:local_name` wenn Prefix vorhanden, sonst nur `local_name`.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(pfx) if !pfx.is_empty() => write!(f, "{pfx}:{}", self.local_name),
            _ => f.write_str(&self.local_name),
        }
    }
}

/// The default QName is the drop sentinel.
impl Default for QName {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl QName {
    /// Creates a new QName with the given URI and local-name, without prefix.
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        let uri = uri.into();
        let local_name = local_name.into();
        let identity = compute_identity(&uri, &local_name);
        Self {
            uri,
            local_name,
            prefix: None,
            identity,
        }
    }

    /// Creates a new QName with URI, local-name, and prefix.
    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        let mut qname = Self::new(uri, local_name);
        qname.prefix = Some(prefix.into());
        qname
    }

    /// A name without namespace.
    pub fn local(local_name: impl Into<Arc<str>>) -> Self {
        Self::new("", local_name)
    }

    /// The drop sentinel: empty URI and empty local-name.
    pub fn drop_sentinel() -> Self {
        Self::default()
    }

    /// Check ob dies der Drop-Sentinel ist.
    #[inline]
    pub fn is_drop_sentinel(&self) -> bool {
        self.uri.is_empty() && self.local_name.is_empty()
    }

    /// True if the local part is the `*` wildcard.
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        &*self.local_name == WILDCARD
    }

    /// True if the name belongs to a namespace.
    #[inline]
    pub fn has_namespace(&self) -> bool {
        !self.uri.is_empty()
    }

    /// The prefix, `""` when absent.
    #[inline]
    pub fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// Same identity, different prefix. Shares the URI and local-name.
    pub fn reprefixed(&self, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            uri: Arc::clone(&self.uri),
            local_name: Arc::clone(&self.local_name),
            prefix: Some(prefix.into()),
            identity: self.identity,
        }
    }

    /// Same identity without prefix.
    pub fn unprefixed(&self) -> Self {
        Self {
            uri: Arc::clone(&self.uri),
            local_name: Arc::clone(&self.local_name),
            prefix: None,
            identity: self.identity,
        }
    }

    /// Vorberechneter Identity-Hash von (uri, local_name).
    pub fn identity_hash(&self) -> u64 {
        self.identity
    }

    /// Clark notation `{uri}local`, or `local` without namespace.
    pub fn to_clark(&self) -> String {
        if self.uri.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local_name)
        }
    }

    /// Parses Clark notation.
    ///
    /// - `""` → drop sentinel
    /// - `local` → name without namespace
    /// - `{uri}local` → namespaced name
    /// - `{}local` → name without namespace
    ///
    /// A `prefix:local` form cannot be resolved without a namespace context
    /// and is rejected, as are an unterminated `{`, an empty local part after
    /// a namespace, and whitespace inside the name.
    pub fn parse_clark(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Ok(Self::drop_sentinel());
        }

        let (uri, local) = match s.strip_prefix('{') {
            Some(rest) => {
                let Some(close) = rest.find('}') else {
                    return Err(Error::configuration(format!(
                        "unterminated '{{' in qualified name {input:?}"
                    )));
                };
                (&rest[..close], &rest[close + 1..])
            }
            None => ("", s),
        };

        if local.is_empty() {
            return Err(Error::configuration(format!(
                "qualified name {input:?} has an empty local part"
            )));
        }
        if local.contains(':') {
            return Err(Error::configuration(format!(
                "qualified name {input:?} uses a prefix; write it as {{namespace-uri}}local"
            )));
        }
        if local.contains(['{', '}']) || local.chars().any(char::is_whitespace) {
            return Err(Error::configuration(format!(
                "qualified name {input:?} has an invalid local part"
            )));
        }

        Ok(Self::new(uri, local))
    }
}
