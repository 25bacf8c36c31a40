//! State Poller / Condition Waiter
//!
//! Predicate-based polling replaces fixed sleeps: "wait until the dropdown
//! panel closes", "wait until the spinner is gone", "wait until the row count
//! stops changing". Predicates are read-only; only the action executor
//! mutates the page.
//!
//! A probe is evaluated immediately, then every `interval` until `deadline`.
//! A probe that is still pending when the deadline passes is cancelled and
//! the wait reports [`PollOutcome::TimedOut`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::EngineConfig;
use crate::driver::{ElementHandle, PageDriver, Scope};
use crate::locator::Selector;
use crate::result::{HoldfastError, HoldfastResult};

// =============================================================================
// OPTIONS AND OUTCOME
// =============================================================================

/// Timing for a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Pause between evaluations
    pub interval: Duration,
    /// Total time budget
    pub deadline: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl PollOptions {
    /// Create poll options
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Poll options from engine config
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            deadline: config.poll_deadline(),
        }
    }

    /// Override the deadline
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Override the interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Result of a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The predicate produced a value
    Satisfied {
        /// Value produced by the predicate
        value: T,
        /// Time until satisfaction
        elapsed: Duration,
        /// Number of evaluations
        attempts: usize,
    },
    /// The deadline passed first
    TimedOut {
        /// Time spent polling
        elapsed: Duration,
        /// Number of evaluations
        attempts: usize,
    },
}

impl<T> PollOutcome<T> {
    /// Whether the predicate was satisfied
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Borrow the value if satisfied
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Take the value if satisfied
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Time spent
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Satisfied { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// Number of evaluations
    #[must_use]
    pub const fn attempts(&self) -> usize {
        match self {
            Self::Satisfied { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// Convert a timeout into [`HoldfastError::Timeout`] naming `what`
    ///
    /// # Errors
    ///
    /// Returns error if the poll timed out
    pub fn into_result(self, what: &str) -> HoldfastResult<T> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::TimedOut { elapsed, .. } => Err(HoldfastError::Timeout {
                target: what.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            }),
        }
    }
}

/// Poll `probe` until it yields `Some` or the deadline passes.
///
/// The first evaluation happens immediately, so an already-satisfied probe
/// returns without sleeping.
pub async fn wait_until<T, F, Fut>(mut probe: F, options: &PollOptions) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let remaining = options.deadline.saturating_sub(start.elapsed());

        match tokio::time::timeout(remaining, probe()).await {
            Ok(Some(value)) => {
                return PollOutcome::Satisfied {
                    value,
                    elapsed: start.elapsed(),
                    attempts,
                };
            }
            Ok(None) => {}
            Err(_) => {
                return PollOutcome::TimedOut {
                    elapsed: start.elapsed(),
                    attempts,
                };
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= options.deadline {
            return PollOutcome::TimedOut { elapsed, attempts };
        }
        tokio::time::sleep(options.interval.min(options.deadline - elapsed)).await;
    }
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// A read-only predicate over the page
#[async_trait]
pub trait Condition: Send + Sync {
    /// Value produced when the condition holds
    type Output: Send;

    /// Evaluate once; `None` means "not yet"
    async fn check(&self, driver: &dyn PageDriver) -> Option<Self::Output>;

    /// Description for logs and error messages
    fn description(&self) -> String;
}

/// Element carries a class (e.g. "expanded", "mat-select-panel-open")
#[derive(Debug, Clone)]
pub struct ClassPresent {
    /// Element to inspect
    pub handle: ElementHandle,
    /// Class name
    pub class: String,
}

impl ClassPresent {
    /// Create the condition
    #[must_use]
    pub fn new(handle: ElementHandle, class: impl Into<String>) -> Self {
        Self {
            handle,
            class: class.into(),
        }
    }
}

#[async_trait]
impl Condition for ClassPresent {
    type Output = ();

    async fn check(&self, driver: &dyn PageDriver) -> Option<()> {
        driver
            .has_class(&self.handle, &self.class)
            .await
            .ok()
            .filter(|present| *present)
            .map(|_| ())
    }

    fn description(&self) -> String {
        format!("{} has class {:?}", self.handle, self.class)
    }
}

/// Element no longer carries a class
#[derive(Debug, Clone)]
pub struct ClassAbsent {
    /// Element to inspect
    pub handle: ElementHandle,
    /// Class name
    pub class: String,
}

impl ClassAbsent {
    /// Create the condition
    #[must_use]
    pub fn new(handle: ElementHandle, class: impl Into<String>) -> Self {
        Self {
            handle,
            class: class.into(),
        }
    }
}

#[async_trait]
impl Condition for ClassAbsent {
    type Output = ();

    async fn check(&self, driver: &dyn PageDriver) -> Option<()> {
        driver
            .has_class(&self.handle, &self.class)
            .await
            .ok()
            .filter(|present| !*present)
            .map(|_| ())
    }

    fn description(&self) -> String {
        format!("{} lacks class {:?}", self.handle, self.class)
    }
}

/// Attribute has an exact value (e.g. `aria-expanded="true"`)
#[derive(Debug, Clone)]
pub struct AttributeEquals {
    /// Element to inspect
    pub handle: ElementHandle,
    /// Attribute name
    pub name: String,
    /// Expected value
    pub value: String,
}

impl AttributeEquals {
    /// Create the condition
    #[must_use]
    pub fn new(handle: ElementHandle, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Condition for AttributeEquals {
    type Output = ();

    async fn check(&self, driver: &dyn PageDriver) -> Option<()> {
        match driver.attribute(&self.handle, &self.name).await {
            Ok(Some(actual)) if actual == self.value => Some(()),
            _ => None,
        }
    }

    fn description(&self) -> String {
        format!("{}[{}={:?}]", self.handle, self.name, self.value)
    }
}

/// Element text contains a fragment; yields the full text
#[derive(Debug, Clone)]
pub struct TextContains {
    /// Element to inspect
    pub handle: ElementHandle,
    /// Expected fragment
    pub fragment: String,
}

impl TextContains {
    /// Create the condition
    #[must_use]
    pub fn new(handle: ElementHandle, fragment: impl Into<String>) -> Self {
        Self {
            handle,
            fragment: fragment.into(),
        }
    }
}

#[async_trait]
impl Condition for TextContains {
    type Output = String;

    async fn check(&self, driver: &dyn PageDriver) -> Option<String> {
        driver
            .text(&self.handle)
            .await
            .ok()
            .filter(|text| text.contains(&self.fragment))
    }

    fn description(&self) -> String {
        format!("{} text contains {:?}", self.handle, self.fragment)
    }
}

/// Number of matches equals a value
#[derive(Debug, Clone)]
pub struct CountEquals {
    /// Query scope
    pub scope: Scope,
    /// Selector to count
    pub selector: Selector,
    /// Expected count
    pub expected: usize,
}

impl CountEquals {
    /// Create a document-scoped count condition
    #[must_use]
    pub fn new(selector: Selector, expected: usize) -> Self {
        Self {
            scope: Scope::Document,
            selector,
            expected,
        }
    }
}

#[async_trait]
impl Condition for CountEquals {
    type Output = usize;

    async fn check(&self, driver: &dyn PageDriver) -> Option<usize> {
        driver
            .query(&self.scope, &self.selector)
            .await
            .ok()
            .map(|found| found.len())
            .filter(|count| *count == self.expected)
    }

    fn description(&self) -> String {
        format!("count({}) == {}", self.selector, self.expected)
    }
}

/// Some match is visible; yields the first visible handle
#[derive(Debug, Clone)]
pub struct Visible {
    /// Query scope
    pub scope: Scope,
    /// Selector to look for
    pub selector: Selector,
}

impl Visible {
    /// Create a document-scoped visibility condition
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            scope: Scope::Document,
            selector,
        }
    }
}

#[async_trait]
impl Condition for Visible {
    type Output = ElementHandle;

    async fn check(&self, driver: &dyn PageDriver) -> Option<ElementHandle> {
        let found = driver.query(&self.scope, &self.selector).await.ok()?;
        for handle in found {
            if driver.is_visible(&handle).await.unwrap_or(false) {
                return Some(handle);
            }
        }
        None
    }

    fn description(&self) -> String {
        format!("{} visible", self.selector)
    }
}

/// No match is visible (removed or hidden): spinners, overlay backdrops
#[derive(Debug, Clone)]
pub struct Hidden {
    /// Query scope
    pub scope: Scope,
    /// Selector to look for
    pub selector: Selector,
}

impl Hidden {
    /// Create a document-scoped hidden condition
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            scope: Scope::Document,
            selector,
        }
    }
}

#[async_trait]
impl Condition for Hidden {
    type Output = ();

    async fn check(&self, driver: &dyn PageDriver) -> Option<()> {
        let found = driver.query(&self.scope, &self.selector).await.ok()?;
        for handle in &found {
            match driver.is_visible(handle).await {
                Ok(false) | Err(crate::driver::DriverError::Detached { .. }) => {}
                Ok(true) | Err(_) => return None,
            }
        }
        Some(())
    }

    fn description(&self) -> String {
        format!("{} hidden", self.selector)
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Condition waiter bound to a page
#[derive(Clone)]
pub struct Waiter {
    driver: Arc<dyn PageDriver>,
    defaults: PollOptions,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Waiter {
    /// Create a waiter
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>, defaults: PollOptions) -> Self {
        Self { driver, defaults }
    }

    /// Default poll options
    #[must_use]
    pub const fn defaults(&self) -> &PollOptions {
        &self.defaults
    }

    /// Poll a [`Condition`]
    pub async fn wait_for<C: Condition>(
        &self,
        condition: &C,
        options: &PollOptions,
    ) -> PollOutcome<C::Output> {
        let driver: &dyn PageDriver = self.driver.as_ref();
        let outcome = wait_until(move || condition.check(driver), options).await;
        debug!(
            condition = %condition.description(),
            satisfied = outcome.is_satisfied(),
            attempts = outcome.attempts(),
            elapsed_ms = outcome.elapsed().as_millis() as u64,
            "wait finished"
        );
        outcome
    }

    /// Poll a [`Condition`] with the default options
    pub async fn wait_for_default<C: Condition>(&self, condition: &C) -> PollOutcome<C::Output> {
        let options = self.defaults;
        self.wait_for(condition, &options).await
    }

    /// Wait until the match count stops changing for `stable_for`.
    ///
    /// Used after a page-size change while a virtualized table re-renders.
    /// The previous count is tracked here, not in a predicate.
    pub async fn wait_for_stable_count(
        &self,
        scope: &Scope,
        selector: &Selector,
        stable_for: Duration,
        options: &PollOptions,
    ) -> PollOutcome<usize> {
        let start = Instant::now();
        let mut attempts = 0;
        let mut last: Option<(usize, Instant)> = None;

        loop {
            attempts += 1;
            let remaining = options.deadline.saturating_sub(start.elapsed());
            let count = match tokio::time::timeout(remaining, self.driver.query(scope, selector)).await {
                Ok(Ok(found)) => Some(found.len()),
                Ok(Err(_)) => None,
                Err(_) => {
                    return PollOutcome::TimedOut {
                        elapsed: start.elapsed(),
                        attempts,
                    };
                }
            };

            let now = Instant::now();
            if let Some(count) = count {
                match last {
                    Some((previous, since)) if previous == count => {
                        if now.duration_since(since) >= stable_for {
                            debug!(selector = %selector, count, attempts, "row count stable");
                            return PollOutcome::Satisfied {
                                value: count,
                                elapsed: start.elapsed(),
                                attempts,
                            };
                        }
                    }
                    _ => last = Some((count, now)),
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= options.deadline {
                return PollOutcome::TimedOut { elapsed, attempts };
            }
            tokio::time::sleep(options.interval.min(options.deadline - elapsed)).await;
        }
    }

    /// Wait until none of the overlay selectors is visible
    pub async fn wait_for_overlays_hidden(
        &self,
        overlays: &[Selector],
        options: &PollOptions,
    ) -> PollOutcome<()> {
        let driver: &dyn PageDriver = self.driver.as_ref();
        let conditions: Vec<Hidden> = overlays.iter().cloned().map(Hidden::new).collect();
        let conditions = &conditions;
        let outcome = wait_until(
            move || async move {
                for condition in conditions {
                    condition.check(driver).await?;
                }
                Some(())
            },
            options,
        )
        .await;
        debug!(
            overlays = overlays.len(),
            cleared = outcome.is_satisfied(),
            elapsed_ms = outcome.elapsed().as_millis() as u64,
            "overlay wait finished"
        );
        outcome
    }

    /// Fixed pause, only for animations with no observable end signal
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockPage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> PollOptions {
        PollOptions::new(Duration::from_millis(200), Duration::from_secs(3))
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_already_satisfied_returns_immediately() {
            let start = Instant::now();
            let outcome = wait_until(|| async { Some(7) }, &fast()).await;
            assert_eq!(outcome.value(), Some(&7));
            assert_eq!(outcome.attempts(), 1);
            assert!(start.elapsed() < Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_repeated_satisfied_waits_stay_immediate() {
            let start = Instant::now();
            for _ in 0..5 {
                let outcome = wait_until(|| async { Some(()) }, &fast()).await;
                assert!(outcome.is_satisfied());
            }
            assert!(start.elapsed() < Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_satisfied_after_some_attempts() {
            let calls = AtomicUsize::new(0);
            let outcome = wait_until(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { (n >= 3).then_some(n) }
                },
                &fast(),
            )
            .await;
            assert_eq!(outcome.into_value(), Some(3));
            assert_eq!(calls.load(Ordering::SeqCst), 4);
        }

        #[tokio::test(start_paused = true)]
        async fn test_times_out_at_deadline() {
            let outcome = wait_until(|| async { None::<()> }, &fast()).await;
            assert!(!outcome.is_satisfied());
            assert!(outcome.elapsed() >= Duration::from_secs(3));
            assert!(outcome.elapsed() < Duration::from_millis(3200));
            // immediate + one per 200ms up to and including the deadline
            assert_eq!(outcome.attempts(), 16);
        }

        #[tokio::test(start_paused = true)]
        async fn test_pending_probe_cancelled_at_deadline() {
            let outcome = wait_until(
                || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Some(())
                },
                &fast(),
            )
            .await;
            assert!(!outcome.is_satisfied());
            assert_eq!(outcome.elapsed(), Duration::from_secs(3));
        }

        #[test]
        fn test_into_result_names_condition() {
            let outcome: PollOutcome<()> = PollOutcome::TimedOut {
                elapsed: Duration::from_millis(5000),
                attempts: 26,
            };
            let err = outcome.into_result("dropdown panel closed").unwrap_err();
            assert!(err.to_string().contains("dropdown panel closed"));
        }
    }

    mod condition_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_class_present_after_click() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("menu", "div").class("menu").toggles_class("open"));
            let waiter = Waiter::new(page.clone(), fast());
            let handle = page.handle("menu");

            let cond = ClassPresent::new(handle.clone(), "open");
            assert!(!waiter.wait_for(&cond, &fast().with_deadline(Duration::from_millis(400))).await.is_satisfied());

            page.click(&handle, crate::driver::InteractionMode::Direct).await.unwrap();
            assert!(waiter.wait_for(&cond, &fast()).await.is_satisfied());
            assert!(!waiter
                .wait_for(&ClassAbsent::new(handle, "open"), &fast().with_deadline(Duration::from_millis(400)))
                .await
                .is_satisfied());
        }

        #[tokio::test(start_paused = true)]
        async fn test_attribute_equals() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("toggle", "button").attr("aria-expanded", "true"));
            let waiter = Waiter::new(page.clone(), fast());
            let cond = AttributeEquals::new(page.handle("toggle"), "aria-expanded", "true");
            assert!(waiter.wait_for_default(&cond).await.is_satisfied());
        }

        #[tokio::test(start_paused = true)]
        async fn test_text_contains_yields_text() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("banner", "div").text("Showing 1 to 20 of 41 records"));
            let waiter = Waiter::new(page.clone(), fast());
            let outcome = waiter
                .wait_for(&TextContains::new(page.handle("banner"), "of 41"), &fast())
                .await;
            assert_eq!(outcome.into_value().unwrap(), "Showing 1 to 20 of 41 records");
        }

        #[tokio::test(start_paused = true)]
        async fn test_count_equals_waits_for_rows() {
            let page = Arc::new(MockPage::new());
            for i in 0..3 {
                page.add(
                    MockElement::new(format!("row-{i}"), "tr")
                        .answers(Selector::css("tbody tr"))
                        .present_after(Duration::from_millis(300 * i)),
                );
            }
            let waiter = Waiter::new(page.clone(), fast());
            let outcome = waiter
                .wait_for(&CountEquals::new(Selector::css("tbody tr"), 3), &fast())
                .await;
            assert_eq!(outcome.value(), Some(&3));
            assert!(outcome.elapsed() >= Duration::from_millis(600));
        }

        #[tokio::test(start_paused = true)]
        async fn test_visible_skips_hidden_matches() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("a", "li").answers(Selector::css("li")).hidden())
                .add(MockElement::new("b", "li").answers(Selector::css("li")));
            let waiter = Waiter::new(page.clone(), fast());
            let outcome = waiter.wait_for(&Visible::new(Selector::css("li")), &fast()).await;
            assert_eq!(outcome.into_value(), Some(page.handle("b")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_conditions_do_not_mutate() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("menu", "div").class("menu"));
            let waiter = Waiter::new(page.clone(), fast());
            let _ = waiter
                .wait_for(&ClassPresent::new(page.handle("menu"), "open"), &fast())
                .await;
            assert!(page
                .calls()
                .iter()
                .all(|c| matches!(c, crate::mock::MockCall::Query(_))));
        }
    }

    mod waiter_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_overlays_hidden() {
            let page = Arc::new(MockPage::new());
            page.add(
                MockElement::new("spinner", "ngx-spinner")
                    .answers(Selector::css("ngx-spinner"))
                    .hidden_after(Duration::from_millis(700)),
            )
            .add(
                MockElement::new("backdrop", "div")
                    .answers(Selector::css(".cdk-overlay-backdrop"))
                    .hidden_after(Duration::from_millis(1100)),
            );
            let waiter = Waiter::new(page.clone(), fast());
            let outcome = waiter
                .wait_for_overlays_hidden(
                    &[Selector::css("ngx-spinner"), Selector::css(".cdk-overlay-backdrop")],
                    &fast(),
                )
                .await;
            assert!(outcome.is_satisfied());
            assert!(outcome.elapsed() >= Duration::from_millis(1100));
        }

        #[tokio::test(start_paused = true)]
        async fn test_absent_overlay_counts_as_hidden() {
            let page = Arc::new(MockPage::new());
            let waiter = Waiter::new(page, fast());
            let outcome = waiter
                .wait_for_overlays_hidden(&[Selector::css("ngx-spinner")], &fast())
                .await;
            assert_eq!(outcome.attempts(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_stable_count_after_rerender() {
            let page = Arc::new(MockPage::new());
            for i in 0..5u64 {
                page.add(
                    MockElement::new(format!("row-{i}"), "tr")
                        .answers(Selector::css("tr.row"))
                        .present_after(Duration::from_millis(250 * i)),
                );
            }
            let waiter = Waiter::new(page.clone(), fast());
            let outcome = waiter
                .wait_for_stable_count(
                    &Scope::Document,
                    &Selector::css("tr.row"),
                    Duration::from_millis(600),
                    &fast(),
                )
                .await;
            assert_eq!(outcome.value(), Some(&5));
            assert!(outcome.elapsed() >= Duration::from_millis(1600));
        }

        #[tokio::test(start_paused = true)]
        async fn test_settle_sleeps() {
            let page = Arc::new(MockPage::new());
            let waiter = Waiter::new(page, fast());
            let start = Instant::now();
            waiter.settle(Duration::from_millis(300)).await;
            assert_eq!(start.elapsed(), Duration::from_millis(300));
        }
    }
}
