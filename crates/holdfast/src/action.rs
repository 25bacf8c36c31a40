//! Tiered Action Executor
//!
//! Performs an interaction by walking an ordered ladder of increasingly
//! forceful delivery tiers:
//!
//! 1. `Direct`: a normal trusted interaction
//! 2. `ScrollIntoView`: scroll, settle, then a normal interaction
//! 3. `Forced`: bypass actionability checks
//! 4. `Script`: dispatch through in-page script
//!
//! The first tier that succeeds ends the ladder. A failure reported as
//! [`DriverError::PartiallyDispatched`] halts the ladder instead of
//! escalating, since some events already reached the page and a second
//! delivery could double-submit a form. Callers that can tell whether the
//! action took effect use [`ActionExecutor::perform_confirmed`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::{DriverError, DriverResult, ElementHandle, InteractionMode, PageDriver};
use crate::result::{HoldfastError, HoldfastResult};
use crate::wait::Condition;

/// One delivery tier of the fallback ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTier {
    /// Trusted interaction with actionability checks
    Direct,
    /// Scroll into view, settle, then interact directly
    ScrollIntoView,
    /// Interaction with actionability checks disabled
    Forced,
    /// In-page script dispatch
    Script,
}

impl ActionTier {
    /// `[Direct, ScrollIntoView, Forced, Script]`
    #[must_use]
    pub fn default_ladder() -> Vec<Self> {
        vec![Self::Direct, Self::ScrollIntoView, Self::Forced, Self::Script]
    }

    /// Interaction mode used to deliver this tier
    #[must_use]
    pub const fn mode(self) -> InteractionMode {
        match self {
            Self::Direct | Self::ScrollIntoView => InteractionMode::Direct,
            Self::Forced => InteractionMode::Forced,
            Self::Script => InteractionMode::Script,
        }
    }

    /// Snake-case name, as used in config files
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::ScrollIntoView => "scroll_into_view",
            Self::Forced => "forced",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for ActionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interaction to perform on a resolved element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Click
    Click,
    /// Replace the value
    Fill(String),
    /// Attach files to a file input
    SetFiles(Vec<PathBuf>),
    /// Select an option by value or label
    SelectOption(String),
    /// Run a script with the element as `this`
    Evaluate(String),
}

impl Action {
    /// Short name for logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill(_) => "fill",
            Self::SetFiles(_) => "set_files",
            Self::SelectOption(_) => "select_option",
            Self::Evaluate(_) => "evaluate",
        }
    }
}

impl Action {
    /// Whether a failed attempt may be retried at a later tier; a script
    /// that failed may already have changed the page
    const fn is_repeatable(&self) -> bool {
        !matches!(self, Self::Evaluate(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened while walking the ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Action name
    pub action: String,
    /// Tiers attempted, in order
    pub attempted: Vec<ActionTier>,
    /// Ladder index of the tier that succeeded
    pub succeeded_at_tier: Option<usize>,
    /// Last failure reason
    pub error: Option<String>,
    /// The ladder stopped early because the page may have been mutated
    pub halted: bool,
}

impl ActionOutcome {
    fn new(action: &Action) -> Self {
        Self {
            action: action.name().to_string(),
            attempted: Vec::new(),
            succeeded_at_tier: None,
            error: None,
            halted: false,
        }
    }

    /// Whether some tier succeeded
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded_at_tier.is_some()
    }

    /// The tier that succeeded
    #[must_use]
    pub fn winning_tier(&self) -> Option<ActionTier> {
        self.succeeded_at_tier
            .and_then(|index| self.attempted.get(index).copied())
    }

    /// Convert a failed outcome into an error
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::ActionExhausted`] listing the attempted tiers
    pub fn into_result(self) -> HoldfastResult<Self> {
        if self.succeeded() {
            return Ok(self);
        }
        let tiers = self
            .attempted
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ");
        let mut reason = self.error.unwrap_or_else(|| "no tier attempted".to_string());
        if self.halted {
            reason.push_str(" (ladder halted)");
        }
        Err(HoldfastError::ActionExhausted {
            action: self.action,
            tiers,
            reason,
        })
    }
}

/// Executes actions through the fallback ladder
#[derive(Clone)]
pub struct ActionExecutor {
    driver: Arc<dyn PageDriver>,
    ladder: Vec<ActionTier>,
    tier_timeout: Duration,
    settle_delay: Duration,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("ladder", &self.ladder)
            .field("tier_timeout", &self.tier_timeout)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    /// Create an executor using the configured ladder and timings
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>, config: &EngineConfig) -> Self {
        Self {
            driver,
            ladder: config.ladder.clone(),
            tier_timeout: config.tier_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Replace the ladder
    #[must_use]
    pub fn with_ladder(mut self, ladder: Vec<ActionTier>) -> Self {
        self.ladder = ladder;
        self
    }

    /// The ladder in use
    #[must_use]
    pub fn ladder(&self) -> &[ActionTier] {
        &self.ladder
    }

    /// Walk the ladder until a tier succeeds, the ladder is exhausted, or a
    /// partial dispatch halts it.
    pub async fn perform(&self, handle: &ElementHandle, action: &Action) -> ActionOutcome {
        self.walk(handle, action, None::<&NeverConfirmed>).await
    }

    /// Like [`perform`](Self::perform), but after a partial dispatch checks
    /// `confirmation` once; if it holds, the halting tier counts as success.
    pub async fn perform_confirmed<C>(
        &self,
        handle: &ElementHandle,
        action: &Action,
        confirmation: &C,
    ) -> ActionOutcome
    where
        C: Condition + ?Sized,
    {
        self.walk(handle, action, Some(confirmation)).await
    }

    async fn walk<C>(
        &self,
        handle: &ElementHandle,
        action: &Action,
        confirmation: Option<&C>,
    ) -> ActionOutcome
    where
        C: Condition + ?Sized,
    {
        let mut outcome = ActionOutcome::new(action);

        for (index, tier) in self.ladder.iter().copied().enumerate() {
            outcome.attempted.push(tier);
            let result = tokio::time::timeout(self.tier_timeout, self.deliver(handle, action, tier))
                .await
                .unwrap_or_else(|_| {
                    Err(DriverError::Protocol {
                        message: format!("tier timed out after {}ms", self.tier_timeout.as_millis()),
                    })
                });

            match result {
                Ok(()) => {
                    info!(action = action.name(), element = %handle, %tier, "action succeeded");
                    outcome.succeeded_at_tier = Some(index);
                    outcome.error = None;
                    return outcome;
                }
                Err(e) if e.may_have_mutated() || !action.is_repeatable() => {
                    outcome.error = Some(e.to_string());
                    if let Some(condition) = confirmation {
                        if condition.check(self.driver.as_ref()).await.is_some() {
                            info!(
                                action = action.name(),
                                element = %handle,
                                %tier,
                                confirmed = %condition.description(),
                                "partial dispatch confirmed"
                            );
                            outcome.succeeded_at_tier = Some(index);
                            outcome.error = None;
                            return outcome;
                        }
                    }
                    warn!(
                        action = action.name(),
                        element = %handle,
                        %tier,
                        error = %e,
                        "action may have reached the page, halting ladder"
                    );
                    outcome.halted = true;
                    return outcome;
                }
                Err(e) => {
                    debug!(action = action.name(), element = %handle, %tier, error = %e, "tier failed");
                    outcome.error = Some(e.to_string());
                }
            }
        }

        warn!(
            action = action.name(),
            element = %handle,
            tiers = outcome.attempted.len(),
            "action ladder exhausted"
        );
        outcome
    }

    async fn deliver(&self, handle: &ElementHandle, action: &Action, tier: ActionTier) -> DriverResult<()> {
        if tier == ActionTier::ScrollIntoView {
            self.driver.scroll_into_view(handle).await?;
            tokio::time::sleep(self.settle_delay).await;
        }
        let mode = tier.mode();
        match action {
            Action::Click => self.driver.click(handle, mode).await,
            Action::Fill(text) => self.driver.fill(handle, text, mode).await,
            Action::SetFiles(files) => self.driver.set_files(handle, files, mode).await,
            Action::SelectOption(value) => self.driver.select_option(handle, value, mode).await,
            Action::Evaluate(script) => self.driver.evaluate(handle, script).await.map(|_| ()),
        }
    }
}

/// Placeholder condition for the unconfirmed path
struct NeverConfirmed;

#[async_trait::async_trait]
impl Condition for NeverConfirmed {
    type Output = ();

    async fn check(&self, _driver: &dyn PageDriver) -> Option<()> {
        None
    }

    fn description(&self) -> String {
        "never".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Selector;
    use crate::mock::{MockCall, MockElement, MockPage};
    use crate::wait::Visible;

    fn intercepted() -> DriverError {
        DriverError::Intercepted {
            id: "save".into(),
            by: "div.cdk-overlay-backdrop".into(),
        }
    }

    fn partial() -> DriverError {
        DriverError::PartiallyDispatched {
            id: "save".into(),
            message: "submit handler threw".into(),
        }
    }

    fn executor(page: &Arc<MockPage>) -> ActionExecutor {
        ActionExecutor::new(page.clone(), &EngineConfig::default())
    }

    mod tier_tests {
        use super::*;

        #[test]
        fn test_default_ladder_order() {
            assert_eq!(
                ActionTier::default_ladder(),
                vec![
                    ActionTier::Direct,
                    ActionTier::ScrollIntoView,
                    ActionTier::Forced,
                    ActionTier::Script
                ]
            );
        }

        #[test]
        fn test_tier_modes() {
            assert_eq!(ActionTier::ScrollIntoView.mode(), InteractionMode::Direct);
            assert_eq!(ActionTier::Forced.mode(), InteractionMode::Forced);
            assert_eq!(ActionTier::Script.to_string(), "script");
        }
    }

    mod ladder_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_direct_success_stops_immediately() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button"));
            let outcome = executor(&page).perform(&page.handle("save"), &Action::Click).await;
            assert_eq!(outcome.succeeded_at_tier, Some(0));
            assert_eq!(outcome.attempted, vec![ActionTier::Direct]);
            assert_eq!(page.calls().len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_escalates_to_forced() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button").fail_on(InteractionMode::Direct, intercepted()));
            let outcome = executor(&page).perform(&page.handle("save"), &Action::Click).await;

            assert_eq!(outcome.succeeded_at_tier, Some(2));
            assert_eq!(outcome.winning_tier(), Some(ActionTier::Forced));
            assert!(outcome.error.is_none());
            let calls = page.calls();
            assert!(calls.contains(&MockCall::Scroll("save".into())));
            assert!(!calls.contains(&MockCall::Click("save".into(), InteractionMode::Script)));
        }

        #[tokio::test(start_paused = true)]
        async fn test_scroll_tier_settles() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button").fail_on(InteractionMode::Direct, intercepted()));
            let exec = executor(&page).with_ladder(vec![ActionTier::ScrollIntoView]);
            let start = tokio::time::Instant::now();
            let _ = exec.perform(&page.handle("save"), &Action::Click).await;
            assert_eq!(start.elapsed(), Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_exhaustion_lists_tiers() {
            let page = Arc::new(MockPage::new());
            let mut element = MockElement::new("save", "button");
            for mode in [InteractionMode::Direct, InteractionMode::Forced, InteractionMode::Script] {
                element = element.fail_on(mode, intercepted());
            }
            page.add(element);
            let outcome = executor(&page).perform(&page.handle("save"), &Action::Click).await;
            assert!(!outcome.succeeded());
            assert_eq!(outcome.attempted.len(), 4);

            let err = outcome.into_result().unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("click"));
            assert!(msg.contains("direct, scroll_into_view, forced, script"));
            assert!(msg.contains("intercepted"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_detached_handle_exhausts() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button"));
            let stale = page.handle("save");
            page.reload();
            let outcome = executor(&page).perform(&stale, &Action::Click).await;
            assert!(!outcome.succeeded());
            assert!(outcome.error.unwrap().contains("detached"));
        }
    }

    mod partial_dispatch_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_partial_dispatch_halts() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button").fail_on(InteractionMode::Direct, partial()));
            let outcome = executor(&page).perform(&page.handle("save"), &Action::Click).await;

            assert!(outcome.halted);
            assert_eq!(outcome.attempted, vec![ActionTier::Direct]);
            assert_eq!(page.calls().len(), 1);
            assert!(outcome.into_result().unwrap_err().to_string().contains("halted"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_confirmed_partial_dispatch_succeeds() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button").fail_on(InteractionMode::Direct, partial()))
                .add(MockElement::new("toast", "div").answers(Selector::css(".toast-success")));
            let confirmation = Visible::new(Selector::css(".toast-success"));
            let outcome = executor(&page)
                .perform_confirmed(&page.handle("save"), &Action::Click, &confirmation)
                .await;
            assert_eq!(outcome.succeeded_at_tier, Some(0));
            assert!(!outcome.halted);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unconfirmed_partial_dispatch_still_halts() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("save", "button").fail_on(InteractionMode::Direct, partial()));
            let confirmation = Visible::new(Selector::css(".toast-success"));
            let outcome = executor(&page)
                .perform_confirmed(&page.handle("save"), &Action::Click, &confirmation)
                .await;
            assert!(outcome.halted);
            assert!(!outcome.succeeded());
        }
    }

    mod action_kind_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_fill_records_value() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("name", "input"));
            let outcome = executor(&page)
                .perform(&page.handle("name"), &Action::Fill("Acme Ltd".into()))
                .await;
            assert!(outcome.succeeded());
            assert_eq!(page.value_of("name").as_deref(), Some("Acme Ltd"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_set_files_on_file_input() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("upload", "input").attr("type", "file"));
            let files = vec![PathBuf::from("fixtures/invoice.pdf")];
            let outcome = executor(&page)
                .perform(&page.handle("upload"), &Action::SetFiles(files.clone()))
                .await;
            assert!(outcome.succeeded());
            assert_eq!(page.files_of("upload"), files);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_evaluate_runs_once() {
            let page = Arc::new(MockPage::new());
            page.add(
                MockElement::new("grid", "div").fail_on(
                    InteractionMode::Script,
                    DriverError::Protocol {
                        message: "script error".into(),
                    },
                ),
            );
            let outcome = executor(&page)
                .with_ladder(vec![ActionTier::Direct, ActionTier::Script])
                .perform(&page.handle("grid"), &Action::Evaluate("this.scrollTop = 0".into()))
                .await;
            assert!(!outcome.succeeded());
            assert!(outcome.halted);
            assert_eq!(outcome.attempted, vec![ActionTier::Direct]);
            assert_eq!(page.calls(), vec![MockCall::Evaluate("grid".into())]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_evaluate_succeeds_once() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("grid", "div").script_result(serde_json::json!(0)));
            let outcome = executor(&page)
                .perform(&page.handle("grid"), &Action::Evaluate("this.scrollTop = 0".into()))
                .await;
            assert_eq!(outcome.winning_tier(), Some(ActionTier::Direct));
            assert_eq!(page.calls().len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_select_option_escalates_past_overlay() {
            let page = Arc::new(MockPage::new());
            page.add(MockElement::new("page-size", "select").fail_on(InteractionMode::Direct, intercepted()));
            let outcome = executor(&page)
                .perform(&page.handle("page-size"), &Action::SelectOption("50".into()))
                .await;
            assert_eq!(outcome.winning_tier(), Some(ActionTier::Forced));
            assert_eq!(page.value_of("page-size").as_deref(), Some("50"));
            assert!(page
                .calls()
                .contains(&MockCall::Select("page-size".into(), InteractionMode::Direct)));
        }
    }
}
