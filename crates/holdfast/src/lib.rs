//! Holdfast: resilient element resolution for browser E2E page objects
//!
//! Front-end releases keep moving the DOM under long-lived test suites:
//! selectors drift, overlays intercept clicks, tables gain columns, and
//! counts render with thousands separators. Holdfast puts one layer
//! between page objects and the browser that absorbs this churn.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     HOLDFAST Engine                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Page Object ──► StrategyChain ──► Resolver ──► ElementHandle │
//! │                                                  │            │
//! │       Verification ◄── Extractor ◄── Waiter ◄── ActionExecutor│
//! │                                                  │            │
//! │                          PageDriver (mock / chromiumoxide)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`Resolver`] tries each candidate of a [`StrategyChain`] in rank order
//!   and reports which one won
//! - [`ActionExecutor`] escalates through direct, scrolled, forced and
//!   scripted delivery until an action lands
//! - [`Waiter`] polls conditions against explicit deadlines
//! - [`extract`](mod@extract) parses counts and page ranges out of
//!   rendered text
//! - [`Verification`] aggregates named checks into one report
//!
//! # Example
//!
//! ```ignore
//! use holdfast::prelude::*;
//!
//! let engine = Engine::with_defaults(Arc::new(CdpPage::new(page)));
//! let save = StrategyChain::of("save button", [
//!     Selector::test_id("save"),
//!     Selector::css_with_text("button", "Save"),
//! ]);
//! engine.click(&save).await?;
//! ```

#![warn(missing_docs)]

mod action;
#[cfg(feature = "browser")]
mod cdp;
mod config;
mod driver;
mod engine;
pub mod extract;
mod locator;
pub mod logging;
pub mod mock;
mod page_object;
mod resolver;
mod result;
mod table;
pub mod verify;
pub mod wait;

pub use action::{Action, ActionExecutor, ActionOutcome, ActionTier};
#[cfg(feature = "browser")]
pub use cdp::CdpPage;
pub use config::{
    EngineConfig, DEFAULT_COLOR_TOLERANCE, DEFAULT_PER_CANDIDATE_TIMEOUT_MS,
    DEFAULT_POLL_DEADLINE_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESOLVE_POLL_MS,
    DEFAULT_RESOLVE_TIMEOUT_MS, DEFAULT_SETTLE_DELAY_MS, DEFAULT_TIER_TIMEOUT_MS,
};
pub use driver::{DriverError, DriverResult, ElementHandle, InteractionMode, PageDriver, Scope};
pub use engine::Engine;
pub use extract::{ExtractionPattern, Extracted, PageRange, PatternSet, Rgb};
pub use locator::{CandidateLocator, Selector, StrategyChain};
pub use page_object::{PageObject, PageObjectBuilder, PageTargets, UrlPattern};
pub use resolver::{Resolution, ResolutionStatus, ResolveOptions, Resolver};
pub use result::{HoldfastError, HoldfastResult};
pub use table::TableLocator;
pub use verify::{StepResult, Verification, VerificationReport, VerifyMode};
pub use wait::{Condition, PollOptions, PollOutcome, Waiter};

/// Prelude for page-object code
pub mod prelude {
    pub use super::{
        Action, ActionOutcome, ActionTier, Condition, ElementHandle, Engine, EngineConfig,
        HoldfastError, HoldfastResult, PageDriver, PageObject, PageObjectBuilder, PageRange,
        PageTargets, PatternSet, PollOptions, Resolution, ResolveOptions, Selector,
        StrategyChain, TableLocator, Verification, VerifyMode,
    };
    #[cfg(feature = "browser")]
    pub use super::CdpPage;
    pub use std::sync::Arc;
}
