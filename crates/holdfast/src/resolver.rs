//! Strategy Chain Resolver
//!
//! Turns a [`StrategyChain`] into a live [`ElementHandle`]. Candidates are
//! tried in rank order, each within a short window; the first candidate that
//! yields a (visible) match wins and later candidates are never queried.
//!
//! Multiplicity is not an error by default: pages routinely render several
//! structurally similar matches, so the first one is taken and the total is
//! logged. Only `strict` resolutions report [`ResolutionStatus::Ambiguous`].
//!
//! Failures are typed, not thrown. An element that exists but is hidden
//! counts as absent, and a driver error during a query counts as "not yet",
//! so callers can poll on the result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::{DriverResult, ElementHandle, PageDriver};
use crate::locator::{CandidateLocator, StrategyChain};
use crate::result::{HoldfastError, HoldfastResult};

/// Constraints for one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Ignore elements that are not rendered
    pub require_visible: bool,
    /// Take the first of several matches (logging the total)
    pub require_unique: bool,
    /// Report `Ambiguous` instead of taking the first of several matches
    pub strict: bool,
    /// Chain-level deadline
    pub timeout: Duration,
    /// Window granted to each candidate
    pub per_candidate_timeout: Duration,
    /// Re-query interval inside a window
    pub poll_interval: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ResolveOptions {
    /// Options from engine config
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            require_visible: true,
            require_unique: true,
            strict: false,
            timeout: config.resolve_timeout(),
            per_candidate_timeout: config.per_candidate_timeout(),
            poll_interval: config.resolve_poll(),
        }
    }

    /// Set the chain deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-candidate window
    #[must_use]
    pub const fn with_per_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.per_candidate_timeout = timeout;
        self
    }

    /// Set the visibility requirement
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.require_visible = visible;
        self
    }

    /// Enable strict uniqueness
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Outcome category of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionStatus {
    /// A candidate produced a match
    Resolved,
    /// Every candidate was tried and none matched
    NotFound,
    /// Several matches where exactly one was required
    Ambiguous,
    /// The deadline passed before a definitive answer
    Timeout,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resolved => "resolved",
            Self::NotFound => "not-found",
            Self::Ambiguous => "ambiguous",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Result of resolving a chain. Never cache across navigations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    target: String,
    status: ResolutionStatus,
    handle: Option<ElementHandle>,
    strategy_index: Option<usize>,
    candidates_tried: usize,
    match_count: usize,
    elapsed: Duration,
}

impl Resolution {
    /// Semantic target name
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Outcome category
    #[must_use]
    pub const fn status(&self) -> ResolutionStatus {
        self.status
    }

    /// Whether a handle was produced
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self.status, ResolutionStatus::Resolved)
    }

    /// Handle, present only when resolved
    #[must_use]
    pub const fn handle(&self) -> Option<&ElementHandle> {
        self.handle.as_ref()
    }

    /// Index (in rank order) of the candidate that matched
    #[must_use]
    pub const fn strategy_index(&self) -> Option<usize> {
        self.strategy_index
    }

    /// Number of candidates queried
    #[must_use]
    pub const fn candidates_tried(&self) -> usize {
        self.candidates_tried
    }

    /// Matches produced by the winning candidate
    #[must_use]
    pub const fn match_count(&self) -> usize {
        self.match_count
    }

    /// Time spent resolving
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// One-line summary for assertion messages
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let strategy = self
            .strategy_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        format!(
            "{}: {} (candidates tried: {}, strategy index: {}, matches: {}, elapsed: {}ms)",
            self.target,
            self.status,
            self.candidates_tried,
            strategy,
            self.match_count,
            self.elapsed.as_millis()
        )
    }

    /// The handle, or the matching error for any other status
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Timeout` or `Ambiguous` naming the target
    pub fn into_result(self) -> HoldfastResult<ElementHandle> {
        let elapsed_ms = self.elapsed.as_millis() as u64;
        match (self.status, self.handle) {
            (ResolutionStatus::Resolved, Some(handle)) => Ok(handle),
            (ResolutionStatus::Ambiguous, _) => Err(HoldfastError::Ambiguous {
                target: self.target,
                matches: self.match_count,
            }),
            (ResolutionStatus::Timeout, _) => Err(HoldfastError::Timeout {
                target: self.target,
                elapsed_ms,
            }),
            (ResolutionStatus::NotFound | ResolutionStatus::Resolved, _) => {
                Err(HoldfastError::NotFound {
                    target: self.target,
                    candidates_tried: self.candidates_tried,
                    elapsed_ms,
                })
            }
        }
    }
}

enum Probe {
    Found(Vec<ElementHandle>),
    Exhausted,
    Pending,
}

/// Resolves strategy chains against a page
#[derive(Clone)]
pub struct Resolver {
    driver: Arc<dyn PageDriver>,
    defaults: ResolveOptions,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>, defaults: ResolveOptions) -> Self {
        Self { driver, defaults }
    }

    /// Default options
    #[must_use]
    pub const fn defaults(&self) -> &ResolveOptions {
        &self.defaults
    }

    /// Resolve `chain` to its first matching element.
    ///
    /// # Errors
    ///
    /// Only for programmer errors (an empty chain); every runtime failure is
    /// reported through [`Resolution::status`].
    pub async fn resolve(
        &self,
        chain: &StrategyChain,
        options: &ResolveOptions,
    ) -> HoldfastResult<Resolution> {
        Ok(self.resolve_matches(chain, options).await?.0)
    }

    /// Resolve with the default options
    ///
    /// # Errors
    ///
    /// Returns error if the chain is empty
    pub async fn resolve_default(&self, chain: &StrategyChain) -> HoldfastResult<Resolution> {
        let options = self.defaults;
        self.resolve(chain, &options).await
    }

    /// "Must resolve" mode: any outcome but `Resolved` is an error naming the
    /// target and the number of candidates tried.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Timeout`, `Ambiguous` or `EmptyChain`
    pub async fn resolve_required(
        &self,
        chain: &StrategyChain,
        options: &ResolveOptions,
    ) -> HoldfastResult<ElementHandle> {
        let resolution = self.resolve(chain, options).await?;
        if !resolution.is_resolved() {
            warn!(diagnostics = %resolution.diagnostics(), "required element did not resolve");
        }
        resolution.into_result()
    }

    /// Every visible match of the first resolving candidate (table rows, cells)
    ///
    /// # Errors
    ///
    /// Returns error if the chain is empty
    pub async fn resolve_all(
        &self,
        chain: &StrategyChain,
        options: &ResolveOptions,
    ) -> HoldfastResult<(Resolution, Vec<ElementHandle>)> {
        self.resolve_matches(chain, options).await
    }

    /// Boolean presence probe bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the chain is empty
    pub async fn is_present(&self, chain: &StrategyChain, timeout: Duration) -> HoldfastResult<bool> {
        let options = self
            .defaults
            .with_timeout(timeout)
            .with_per_candidate_timeout(self.defaults.per_candidate_timeout.min(timeout));
        Ok(self.resolve(chain, &options).await?.is_resolved())
    }

    async fn resolve_matches(
        &self,
        chain: &StrategyChain,
        options: &ResolveOptions,
    ) -> HoldfastResult<(Resolution, Vec<ElementHandle>)> {
        chain.validate()?;

        let start = Instant::now();
        let deadline = start + options.timeout;
        let mut tried = 0;
        let mut last_pending = false;

        debug!(target_name = chain.target(), candidates = chain.len(), "resolving");

        for (index, candidate) in chain.ordered().into_iter().enumerate() {
            // past the chain deadline a candidate still gets one immediate query
            let now = Instant::now();
            tried += 1;
            let window_end = (now + options.per_candidate_timeout).min(deadline).max(now);

            match self.probe_candidate(candidate, options, window_end).await {
                Probe::Found(matches) => {
                    let count = matches.len();
                    let elapsed = start.elapsed();
                    if options.strict && count > 1 {
                        warn!(
                            target_name = chain.target(),
                            strategy_index = index,
                            matches = count,
                            "ambiguous match"
                        );
                        let resolution = Resolution {
                            target: chain.target().to_string(),
                            status: ResolutionStatus::Ambiguous,
                            handle: None,
                            strategy_index: Some(index),
                            candidates_tried: tried,
                            match_count: count,
                            elapsed,
                        };
                        return Ok((resolution, matches));
                    }
                    if count > 1 && options.require_unique {
                        debug!(
                            target_name = chain.target(),
                            matches = count,
                            "multiple matches, taking the first"
                        );
                    }
                    info!(
                        target_name = chain.target(),
                        strategy_index = index,
                        selector = %candidate.selector(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "resolved"
                    );
                    let resolution = Resolution {
                        target: chain.target().to_string(),
                        status: ResolutionStatus::Resolved,
                        handle: matches.first().cloned(),
                        strategy_index: Some(index),
                        candidates_tried: tried,
                        match_count: count,
                        elapsed,
                    };
                    return Ok((resolution, matches));
                }
                Probe::Exhausted => {
                    debug!(
                        target_name = chain.target(),
                        strategy_index = index,
                        selector = %candidate.selector(),
                        "candidate produced no match"
                    );
                    last_pending = false;
                }
                Probe::Pending => {
                    debug!(
                        target_name = chain.target(),
                        strategy_index = index,
                        selector = %candidate.selector(),
                        "candidate query still pending at window end"
                    );
                    last_pending = true;
                }
            }
        }

        let status = if last_pending {
            ResolutionStatus::Timeout
        } else {
            ResolutionStatus::NotFound
        };
        let resolution = Resolution {
            target: chain.target().to_string(),
            status,
            handle: None,
            strategy_index: None,
            candidates_tried: tried,
            match_count: 0,
            elapsed: start.elapsed(),
        };
        debug!(diagnostics = %resolution.diagnostics(), "resolution failed");
        Ok((resolution, Vec::new()))
    }

    async fn probe_candidate(
        &self,
        candidate: &CandidateLocator,
        options: &ResolveOptions,
        window_end: Instant,
    ) -> Probe {
        loop {
            let remaining = window_end.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.matches(candidate, options)).await {
                Err(_) => return Probe::Pending,
                Ok(Err(e)) => {
                    debug!(selector = %candidate.selector(), error = %e, "query failed, retrying");
                }
                Ok(Ok(matches)) if !matches.is_empty() => return Probe::Found(matches),
                Ok(Ok(_)) => {}
            }

            let now = Instant::now();
            if now >= window_end {
                return Probe::Exhausted;
            }
            tokio::time::sleep(options.poll_interval.min(window_end - now)).await;
        }
    }

    async fn matches(
        &self,
        candidate: &CandidateLocator,
        options: &ResolveOptions,
    ) -> DriverResult<Vec<ElementHandle>> {
        let found = self
            .driver
            .query(candidate.scope(), candidate.selector())
            .await?;
        if !options.require_visible {
            return Ok(found);
        }
        let mut visible = Vec::with_capacity(found.len());
        for handle in found {
            if self.driver.is_visible(&handle).await.unwrap_or(false) {
                visible.push(handle);
            }
        }
        Ok(visible)
    }
}
