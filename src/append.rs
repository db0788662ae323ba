//! Content injection around trigger elements.
//!
//! A directive fires on the first element whose original name equals its
//! trigger and is then used up. Each writer owns its own
//! [`AppendDirectiveTable`] filled from the shared rules.

use std::sync::Arc;

use crate::qname::QName;
use crate::{Error, FastHashMap, Result};

/// Where and how the injected element is placed relative to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppendMode {
    /// `<wrap>text</wrap>` right before the trigger.
    Pre,
    /// `<wrap>` opened before the trigger and closed after it.
    PreWrap,
    /// `<wrap>text</wrap>` as the trigger's last child.
    Post,
    /// `<wrap>` opened as the trigger's first child and closed just before
    /// the trigger closes.
    PostWrap,
    /// The text replaces the trigger's next character data.
    Replace,
}

/// A single injection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendDirective {
    /// Original (pre-rename) name of the element that fires the directive.
    pub trigger: QName,
    pub mode: AppendMode,
    /// The injected element. Equal to `trigger` for [`AppendMode::Replace`].
    pub wrap: QName,
    /// Character data for the include and replace modes. `None` and an empty
    /// string both produce an empty element.
    pub text: Option<Arc<str>>,
}

impl AppendDirective {
    /// `<wrap>text</wrap>` before `trigger`.
    pub fn pre(trigger: QName, wrap: QName, text: Option<&str>) -> Self {
        Self::build(trigger, AppendMode::Pre, wrap, text)
    }

    /// `<wrap>` around `trigger`.
    pub fn pre_wrap(trigger: QName, wrap: QName) -> Self {
        Self::build(trigger, AppendMode::PreWrap, wrap, None)
    }

    /// `<wrap>text</wrap>` as the last child of `trigger`.
    pub fn post(trigger: QName, wrap: QName, text: Option<&str>) -> Self {
        Self::build(trigger, AppendMode::Post, wrap, text)
    }

    /// `<wrap>` around the content of `trigger`.
    pub fn post_wrap(trigger: QName, wrap: QName) -> Self {
        Self::build(trigger, AppendMode::PostWrap, wrap, None)
    }

    /// Replaces the text content of `trigger`.
    pub fn replace(trigger: QName, text: &str) -> Self {
        let wrap = trigger.clone();
        Self::build(trigger, AppendMode::Replace, wrap, Some(text))
    }

    fn build(trigger: QName, mode: AppendMode, wrap: QName, text: Option<&str>) -> Self {
        Self {
            trigger,
            mode,
            wrap,
            text: text.map(Arc::from),
        }
    }

    /// The text to emit, `None` when there is nothing to write.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    /// Rejects directives that cannot be applied.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` for a wildcard or empty trigger or wrapper.
    pub fn validate(&self) -> Result<()> {
        for (role, name) in [("trigger", &self.trigger), ("wrapper", &self.wrap)] {
            if name.is_drop_sentinel() {
                return Err(Error::configuration(format!("append {role} name is empty")));
            }
            if name.is_wildcard() {
                return Err(Error::configuration(format!(
                    "append {role} {} cannot be a wildcard",
                    name.to_clark()
                )));
            }
        }
        Ok(())
    }
}

/// Per-writer, consume-on-use table of directives keyed by trigger.
#[derive(Debug, Clone, Default)]
pub struct AppendDirectiveTable {
    entries: FastHashMap<QName, AppendDirective>,
}

impl AppendDirectiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table. A later directive for the same trigger replaces an
    /// earlier one.
    pub fn from_directives<'a>(directives: impl IntoIterator<Item = &'a AppendDirective>) -> Self {
        let mut table = Self::new();
        for directive in directives {
            table.insert(directive.clone());
        }
        table
    }

    /// Adds `directive` and returns the directive it replaced, if any.
    pub fn insert(&mut self, directive: AppendDirective) -> Option<AppendDirective> {
        self.entries.insert(directive.trigger.clone(), directive)
    }

    /// Removes and returns the directive for `trigger`.
    pub fn take(&mut self, trigger: &QName) -> Option<AppendDirective> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.remove(trigger)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes_entry() {
        let mut table = AppendDirectiveTable::new();
        table.insert(AppendDirective::pre(QName::local("a"), QName::local("w"), Some("t")));
        assert!(table.take(&QName::local("a")).is_some());
        assert!(table.take(&QName::local("a")).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn take_matches_by_identity_not_prefix() {
        let mut table = AppendDirectiveTable::new();
        table.insert(AppendDirective::post_wrap(
            QName::new("urn:a", "x"),
            QName::new("urn:a", "w"),
        ));
        assert!(table.take(&QName::with_prefix("urn:a", "x", "p")).is_some());
    }

    #[test]
    fn later_directive_wins() {
        let first = AppendDirective::pre(QName::local("a"), QName::local("w1"), None);
        let second = AppendDirective::pre(QName::local("a"), QName::local("w2"), None);
        let mut table = AppendDirectiveTable::from_directives([&first, &second]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.take(&QName::local("a")).unwrap().wrap, QName::local("w2"));
    }

    #[test]
    fn empty_text_is_no_text() {
        let d = AppendDirective::post(QName::local("a"), QName::local("w"), Some(""));
        assert_eq!(d.text(), None);
        let d = AppendDirective::post(QName::local("a"), QName::local("w"), Some("x"));
        assert_eq!(d.text(), Some("x"));
    }

    #[test]
    fn replace_wraps_trigger() {
        let d = AppendDirective::replace(QName::local("a"), "1 2 3");
        assert_eq!(d.mode, AppendMode::Replace);
        assert_eq!(d.wrap, d.trigger);
    }

    #[test]
    fn validate_rejects_wildcards_and_sentinel() {
        let d = AppendDirective::pre(QName::new("urn:a", "*"), QName::local("w"), None);
        assert!(matches!(d.validate(), Err(Error::Configuration(_))));
        let d = AppendDirective::pre(QName::local("a"), QName::drop_sentinel(), None);
        assert!(matches!(d.validate(), Err(Error::Configuration(_))));
        let d = AppendDirective::pre_wrap(QName::local("a"), QName::local("w"));
        assert!(d.validate().is_ok());
    }
}
