//! PageDriver - the page/document boundary
//!
//! The engine never owns a browser. A host (chromiumoxide page, WebDriver
//! session, in-memory [`MockPage`](crate::mock::MockPage)) implements
//! [`PageDriver`] and the resolver, executor and waiter query and mutate the
//! document only through it.
//!
//! ```text
//! ┌──────────────┐   resolve/perform/wait   ┌──────────────────────┐
//! │ Page object  │ ───────────────────────► │ Engine               │
//! └──────────────┘                          │  Resolver            │
//!                                           │  ActionExecutor      │
//!                                           │  Waiter              │
//!                                           └──────────┬───────────┘
//!                                                      │ PageDriver
//!                              ┌───────────────────────┼──────────────────┐
//!                              ▼                       ▼                  ▼
//!                         CdpPage (browser)       MockPage (tests)    custom host
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::locator::Selector;

/// Opaque reference to a live element.
///
/// Valid only for the document generation it was resolved in; a full reload
/// bumps the generation and every older handle becomes detached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
    generation: u64,
}

impl ElementHandle {
    /// Create a handle (drivers only)
    #[must_use]
    pub fn new(id: impl Into<String>, generation: u64) -> Self {
        Self {
            id: id.into(),
            generation,
        }
    }

    /// Driver-specific element id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Document generation the handle belongs to
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.generation)
    }
}

/// Where a query is evaluated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// The whole document
    #[default]
    Document,
    /// Descendants of a previously resolved element
    Within(ElementHandle),
}

/// How forcefully an interaction is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionMode {
    /// Real pointer/keyboard input with occlusion checks
    Direct,
    /// Real input, skipping overlap/occlusion checks
    Forced,
    /// Native event or property mutation dispatched from page script
    Script,
}

impl InteractionMode {
    /// Short name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Forced => "forced",
            Self::Script => "script",
        }
    }
}

/// Errors reported by a page driver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// Handle belongs to an older document generation or was removed
    #[error("element {id} is detached from the document")]
    Detached {
        /// Element id
        id: String,
    },

    /// Another element would receive the pointer event
    #[error("click on {id} intercepted by {by}")]
    Intercepted {
        /// Element id
        id: String,
        /// Description of the intercepting element
        by: String,
    },

    /// Element cannot take this interaction (disabled, hidden, wrong type)
    #[error("element {id} is not interactable: {reason}")]
    NotInteractable {
        /// Element id
        id: String,
        /// Reason reported by the driver
        reason: String,
    },

    /// Events were dispatched before the failure was raised
    #[error("interaction with {id} partially dispatched: {message}")]
    PartiallyDispatched {
        /// Element id
        id: String,
        /// Error message
        message: String,
    },

    /// Operation not implemented by this driver
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Operation name
        operation: String,
    },

    /// Transport or protocol failure
    #[error("protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },
}

impl DriverError {
    /// Whether the page may have been mutated before the error was raised
    #[must_use]
    pub const fn may_have_mutated(&self) -> bool {
        matches!(self, Self::PartiallyDispatched { .. })
    }
}

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Abstract page handle supplied by the automation host.
///
/// Implementations must be read-only for the query methods; only the
/// interaction methods may mutate the page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// All elements matching `selector` within `scope`, in document order
    async fn query(&self, scope: &Scope, selector: &Selector) -> DriverResult<Vec<ElementHandle>>;

    /// Attached, non-zero box, not `display:none` / `visibility:hidden`
    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool>;

    /// Rendered text content
    async fn text(&self, handle: &ElementHandle) -> DriverResult<String>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, handle: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Class membership
    async fn has_class(&self, handle: &ElementHandle, class: &str) -> DriverResult<bool> {
        Ok(self
            .attribute(handle, "class")
            .await?
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)))
    }

    /// Computed CSS property value
    async fn computed_style(&self, handle: &ElementHandle, property: &str) -> DriverResult<String> {
        let _ = (handle, property);
        Err(DriverError::Unsupported {
            operation: "computed_style".to_string(),
        })
    }

    /// Click the element
    async fn click(&self, handle: &ElementHandle, mode: InteractionMode) -> DriverResult<()>;

    /// Scroll the element into the viewport
    async fn scroll_into_view(&self, handle: &ElementHandle) -> DriverResult<()>;

    /// Replace the element's value with `text`
    async fn fill(&self, handle: &ElementHandle, text: &str, mode: InteractionMode)
        -> DriverResult<()>;

    /// Attach files to a file input
    async fn set_files(
        &self,
        handle: &ElementHandle,
        files: &[PathBuf],
        mode: InteractionMode,
    ) -> DriverResult<()>;

    /// Select an option by value or visible label
    async fn select_option(
        &self,
        handle: &ElementHandle,
        value: &str,
        mode: InteractionMode,
    ) -> DriverResult<()>;

    /// Run a script with the element bound as `this`
    async fn evaluate(&self, handle: &ElementHandle, script: &str)
        -> DriverResult<serde_json::Value>;

    /// Current document generation
    async fn generation(&self) -> DriverResult<u64>;
}
