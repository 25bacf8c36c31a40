//! Page Object support.
//!
//! Page objects declare each semantic target once, as a named
//! [`StrategyChain`], instead of scattering fallback selectors through
//! methods. A page object also names the chain that proves the page is ready.
//!
//! # Example
//!
//! ```ignore
//! struct CustomersPage {
//!     targets: PageTargets,
//! }
//!
//! impl PageObject for CustomersPage {
//!     fn url_pattern(&self) -> &str {
//!         "/customers/:id"
//!     }
//!
//!     fn ready_chain(&self) -> Option<&StrategyChain> {
//!         self.targets.get("grid")
//!     }
//! }
//! ```

use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::locator::{Selector, StrategyChain};
use crate::result::{HoldfastError, HoldfastResult};

/// A page or component under test
pub trait PageObject {
    /// URL pattern for this page (`/customers`, `/customers/*`, `/customers/:id`)
    fn url_pattern(&self) -> &str;

    /// Chain whose resolution means the page is ready for interaction
    fn ready_chain(&self) -> Option<&StrategyChain> {
        None
    }

    /// Deadline for the ready chain, in milliseconds
    fn load_timeout_ms(&self) -> u64 {
        30000
    }

    /// Name for logs
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether `url` belongs to this page; malformed patterns never match
    fn matches_url(&self, url: &str) -> bool {
        UrlPattern::new(self.url_pattern()).is_ok_and(|pattern| pattern.matches(url))
    }
}

/// Named strategy chains belonging to one page
#[derive(Debug, Clone)]
pub struct PageTargets {
    url_pattern: String,
    chains: BTreeMap<String, StrategyChain>,
    ready: Option<String>,
    load_timeout_ms: u64,
}

impl Default for PageTargets {
    fn default() -> Self {
        Self::new("")
    }
}

impl PageTargets {
    /// Empty target set for `url_pattern`
    #[must_use]
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            chains: BTreeMap::new(),
            ready: None,
            load_timeout_ms: 30000,
        }
    }

    /// Chain registered under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StrategyChain> {
        self.chains.get(name)
    }

    /// Chain registered under `name`, or an error naming the page
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::Config`] for an unknown target
    pub fn chain(&self, name: &str) -> HoldfastResult<&StrategyChain> {
        self.chains.get(name).ok_or_else(|| HoldfastError::Config {
            message: format!("page {} has no target named {name:?}", self.url_pattern),
        })
    }

    /// Register or replace a chain
    pub fn insert(&mut self, name: impl Into<String>, chain: StrategyChain) {
        let _ = self.chains.insert(name.into(), chain);
    }

    /// Target names in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.chains.keys().map(String::as_str).collect()
    }

    /// Number of targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no target is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl PageObject for PageTargets {
    fn url_pattern(&self) -> &str {
        &self.url_pattern
    }

    fn ready_chain(&self) -> Option<&StrategyChain> {
        self.ready.as_deref().and_then(|name| self.chains.get(name))
    }

    fn load_timeout_ms(&self) -> u64 {
        self.load_timeout_ms
    }
}

/// Builder for [`PageTargets`]
#[derive(Debug, Clone, Default)]
pub struct PageObjectBuilder {
    targets: PageTargets,
}

impl PageObjectBuilder {
    /// Start a builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL pattern
    #[must_use]
    pub fn with_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.targets.url_pattern = pattern.into();
        self
    }

    /// Register a prepared chain
    #[must_use]
    pub fn with_chain(mut self, name: impl Into<String>, chain: StrategyChain) -> Self {
        self.targets.insert(name, chain);
        self
    }

    /// Register a chain built from selectors; the name doubles as the
    /// semantic target
    #[must_use]
    pub fn with_target(self, name: &str, selectors: impl IntoIterator<Item = Selector>) -> Self {
        self.with_chain(name, StrategyChain::of(name, selectors))
    }

    /// Name the target that signals readiness
    #[must_use]
    pub fn ready_when(mut self, name: impl Into<String>) -> Self {
        self.targets.ready = Some(name.into());
        self
    }

    /// Set the load timeout
    #[must_use]
    pub const fn with_load_timeout(mut self, timeout_ms: u64) -> Self {
        self.targets.load_timeout_ms = timeout_ms;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns error if a chain is empty or the ready target is unknown
    pub fn build(self) -> HoldfastResult<PageTargets> {
        for chain in self.targets.chains.values() {
            chain.validate()?;
        }
        if let Some(ready) = &self.targets.ready {
            let _ = self.targets.chain(ready)?;
        }
        Ok(self.targets)
    }
}

/// URL pattern with `*` wildcards and `:name` parameters, one path segment each
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pattern: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::InvalidPattern`] if a parameter name is not a
    /// valid capture name
    pub fn new(pattern: &str) -> HoldfastResult<Self> {
        let mut source = String::from("^");
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            source.push('/');
            if segment == "*" {
                source.push_str("[^/]+");
            } else if let Some(name) = segment.strip_prefix(':') {
                source.push_str(&format!("(?P<{name}>[^/]+)"));
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        source.push_str("/?(?:[?#].*)?$");
        let regex = Regex::new(&source).map_err(|e| HoldfastError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether the path of `url` matches (scheme and host are ignored)
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(Self::path(url))
    }

    /// Named parameters captured from `url`
    #[must_use]
    pub fn params(&self, url: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(caps) = self.regex.captures(Self::path(url)) {
            for name in self.regex.capture_names().flatten() {
                if let Some(value) = caps.name(name) {
                    let _ = params.insert(name.to_string(), value.as_str().to_string());
                }
            }
        }
        params
    }

    /// Source pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn path(url: &str) -> &str {
        url.split_once("://")
            .map_or(url, |(_, rest)| rest.find('/').map_or("/", |i| &rest[i..]))
    }
}
