//! Candidate locators and strategy chains.
//!
//! A [`CandidateLocator`] is one way to find an element: a [`Selector`], an
//! optional scoping parent and a rank. A [`StrategyChain`] is the ordered set
//! of candidates describing the *same* semantic target ("the success toast",
//! "the items-per-page selector"). Candidates in one chain must never point at
//! targets with different meaning; "Submit" and "Cancel" never share a chain.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::driver::{ElementHandle, Scope};
use crate::result::{HoldfastError, HoldfastResult};

/// JS string literal for `value`
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// CSS attribute selector `[name="value"]` with the value escaped
fn css_attribute(name: &str, value: &str) -> String {
    format!("[{name}=\"{}\"]", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., "mat-select[aria-label='Items per page']")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Innermost elements whose text contains the string
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// Attribute equality
    Attribute {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// ARIA role with accessible name containing `name`
    Role {
        /// ARIA role
        role: String,
        /// Accessible name fragment
        name: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a CSS selector filtered by text
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Create an attribute selector
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a role selector
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    /// JavaScript expression evaluating to an array of matching elements
    /// below `root` (a JS expression for a `Document` or `Element`).
    #[must_use]
    pub fn to_query_all(&self, root: &str) -> String {
        match self {
            Self::Css(s) => format!("Array.from({root}.querySelectorAll({}))", js_string(s)),
            Self::XPath(s) => format!(
                "(() => {{ const r = document.evaluate({}, {root}, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                 return out; }})()",
                js_string(s)
            ),
            Self::Text(t) => {
                let t = js_string(t);
                format!(
                    "Array.from({root}.querySelectorAll('*')).filter(el => \
                     el.textContent.includes({t}) && \
                     !Array.from(el.children).some(c => c.textContent.includes({t})))"
                )
            }
            Self::TestId(id) => format!(
                "Array.from({root}.querySelectorAll({}))",
                js_string(&css_attribute("data-testid", id))
            ),
            Self::CssWithText { css, text } => format!(
                "Array.from({root}.querySelectorAll({})).filter(el => el.textContent.includes({}))",
                js_string(css),
                js_string(text)
            ),
            Self::Attribute { name, value } => format!(
                "Array.from({root}.querySelectorAll({}))",
                js_string(&css_attribute(name, value))
            ),
            Self::Role { role, name } => format!(
                "Array.from({root}.querySelectorAll({})).filter(el => \
                 ((el.getAttribute('aria-label') || '') + ' ' + el.textContent).includes({}))",
                js_string(&css_attribute("role", role)),
                js_string(name)
            ),
        }
    }

    /// JavaScript expression counting matches below `root`
    #[must_use]
    pub fn to_count_query(&self, root: &str) -> String {
        format!("{}.length", self.to_query_all(root))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::Text(t) => write!(f, "text={t:?}"),
            Self::TestId(id) => write!(f, "testid={id}"),
            Self::CssWithText { css, text } => write!(f, "css={css} >> text={text:?}"),
            Self::Attribute { name, value } => write!(f, "[{name}={value:?}]"),
            Self::Role { role, name } => write!(f, "role={role}[name*={name:?}]"),
        }
    }
}

/// One way of finding the element for a semantic target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLocator {
    selector: Selector,
    scope: Scope,
    rank: u32,
}

impl CandidateLocator {
    /// Create a document-scoped candidate
    #[must_use]
    pub fn new(selector: Selector, rank: u32) -> Self {
        Self {
            selector,
            scope: Scope::Document,
            rank,
        }
    }

    /// Restrict the candidate to descendants of `parent`
    #[must_use]
    pub fn within(mut self, parent: ElementHandle) -> Self {
        self.scope = Scope::Within(parent);
        self
    }

    /// The selector expression
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The query scope
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Priority within its chain (lower is tried first)
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.rank
    }
}

/// Ordered candidates for one semantic target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyChain {
    target: String,
    candidates: Vec<CandidateLocator>,
}

impl StrategyChain {
    /// Start an empty chain for `target`
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            candidates: Vec::new(),
        }
    }

    /// Build a chain from selectors, ranked in the given order
    #[must_use]
    pub fn of(target: impl Into<String>, selectors: impl IntoIterator<Item = Selector>) -> Self {
        selectors
            .into_iter()
            .fold(Self::new(target), |chain, selector| chain.or(selector))
    }

    /// Append a document-scoped candidate ranked after the existing ones
    #[must_use]
    pub fn or(self, selector: Selector) -> Self {
        let rank = self.next_rank();
        self.candidate(CandidateLocator::new(selector, rank))
    }

    /// Append a candidate scoped to `parent`, ranked after the existing ones
    #[must_use]
    pub fn or_within(self, selector: Selector, parent: ElementHandle) -> Self {
        let rank = self.next_rank();
        self.candidate(CandidateLocator::new(selector, rank).within(parent))
    }

    /// Append an explicitly ranked candidate
    #[must_use]
    pub fn candidate(mut self, candidate: CandidateLocator) -> Self {
        self.candidates.push(candidate);
        self
    }

    fn next_rank(&self) -> u32 {
        self.candidates
            .iter()
            .map(|c| c.rank + 1)
            .max()
            .unwrap_or(0)
    }

    /// Semantic target name
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the chain has no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates by ascending rank; equal ranks keep insertion order
    #[must_use]
    pub fn ordered(&self) -> Vec<&CandidateLocator> {
        let mut ordered: Vec<&CandidateLocator> = self.candidates.iter().collect();
        ordered.sort_by_key(|c| c.rank);
        ordered
    }

    /// Reject chains that cannot possibly resolve
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::EmptyChain`] when there are no candidates
    pub fn validate(&self) -> HoldfastResult<()> {
        if self.candidates.is_empty() {
            return Err(HoldfastError::EmptyChain {
                target: self.target.clone(),
            });
        }
        Ok(())
    }
}
