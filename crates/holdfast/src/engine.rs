//! Engine façade.
//!
//! [`Engine`] bundles a page driver with the resolver, action executor and
//! waiter built from one [`EngineConfig`], and adds the composed operations
//! page objects use most: resolve-then-act, read text, read a pagination
//! range, read a table column.
//!
//! Operations are sequential per page. Nothing here spawns tasks or runs two
//! driver calls at once.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::action::{Action, ActionExecutor, ActionOutcome};
use crate::config::EngineConfig;
use crate::driver::{ElementHandle, PageDriver};
use crate::extract::{self, Extracted, PageRange, PatternSet};
use crate::locator::StrategyChain;
use crate::page_object::PageObject;
use crate::resolver::{Resolution, ResolveOptions, Resolver};
use crate::result::{HoldfastError, HoldfastResult};
use crate::table::TableLocator;
use crate::verify::{Verification, VerifyMode};
use crate::wait::{self, Condition, PollOptions, PollOutcome, Waiter};

/// Resolver, executor and waiter bound to one page
#[derive(Debug)]
pub struct Engine<D: PageDriver + 'static> {
    driver: Arc<D>,
    config: EngineConfig,
    resolver: Resolver,
    executor: ActionExecutor,
    waiter: Waiter,
}

impl<D: PageDriver + 'static> Engine<D> {
    /// Create an engine with validated config
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::Config`] if the config is inconsistent
    pub fn new(driver: Arc<D>, config: EngineConfig) -> HoldfastResult<Self> {
        config.validate()?;
        Ok(Self::assemble(driver, config))
    }

    /// Create an engine with default config
    pub fn with_defaults(driver: Arc<D>) -> Self {
        Self::assemble(driver, EngineConfig::default())
    }

    fn assemble(driver: Arc<D>, config: EngineConfig) -> Self {
        let shared: Arc<dyn PageDriver> = driver.clone();
        Self {
            resolver: Resolver::new(shared.clone(), ResolveOptions::from_config(&config)),
            executor: ActionExecutor::new(shared.clone(), &config),
            waiter: Waiter::new(shared, PollOptions::from_config(&config)),
            driver,
            config,
        }
    }

    /// The page driver
    #[must_use]
    pub const fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The resolver
    #[must_use]
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The action executor
    #[must_use]
    pub const fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// The waiter
    #[must_use]
    pub const fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    // =========================================================================
    // Pass-throughs
    // =========================================================================

    /// Resolve with the configured defaults
    ///
    /// # Errors
    ///
    /// Returns error only for an empty chain
    pub async fn resolve(&self, chain: &StrategyChain) -> HoldfastResult<Resolution> {
        self.resolver.resolve_default(chain).await
    }

    /// Resolve with explicit options
    ///
    /// # Errors
    ///
    /// Returns error only for an empty chain
    pub async fn resolve_with(&self, chain: &StrategyChain, options: &ResolveOptions) -> HoldfastResult<Resolution> {
        self.resolver.resolve(chain, options).await
    }

    /// "Must resolve" mode
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Timeout`, `Ambiguous` or `EmptyChain`
    pub async fn resolve_required(&self, chain: &StrategyChain) -> HoldfastResult<ElementHandle> {
        let options = *self.resolver.defaults();
        self.resolver.resolve_required(chain, &options).await
    }

    /// Every visible match of the first resolving candidate
    ///
    /// # Errors
    ///
    /// Returns error only for an empty chain
    pub async fn resolve_all(&self, chain: &StrategyChain) -> HoldfastResult<(Resolution, Vec<ElementHandle>)> {
        let options = *self.resolver.defaults();
        self.resolver.resolve_all(chain, &options).await
    }

    /// Presence probe bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns error only for an empty chain
    pub async fn is_present(&self, chain: &StrategyChain, timeout: Duration) -> HoldfastResult<bool> {
        self.resolver.is_present(chain, timeout).await
    }

    /// Run the action ladder on a resolved element
    pub async fn perform(&self, handle: &ElementHandle, action: &Action) -> ActionOutcome {
        self.executor.perform(handle, action).await
    }

    /// Poll an ad hoc probe
    pub async fn wait_until<T, F, Fut>(&self, probe: F, options: &PollOptions) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        wait::wait_until(probe, options).await
    }

    /// Poll a condition
    pub async fn wait_for<C: Condition>(&self, condition: &C, options: &PollOptions) -> PollOutcome<C::Output> {
        self.waiter.wait_for(condition, options).await
    }

    /// Apply a pattern set to text
    #[must_use]
    pub fn extract(&self, text: &str, patterns: &PatternSet) -> Option<Extracted> {
        extract::extract(text, patterns)
    }

    /// Start a verification about `target`
    #[must_use]
    pub fn verify<'a>(&self, target: impl Into<String>, mode: VerifyMode) -> Verification<'a> {
        Verification::new(target, mode)
    }

    // =========================================================================
    // Composed operations
    // =========================================================================

    /// Resolve `chain` (must resolve), then run the ladder
    ///
    /// # Errors
    ///
    /// Returns a resolution error, or `ActionExhausted` if no tier succeeded
    pub async fn act(&self, chain: &StrategyChain, action: &Action) -> HoldfastResult<ActionOutcome> {
        let handle = self.resolve_required(chain).await?;
        debug!(target_name = chain.target(), action = action.name(), element = %handle, "acting");
        self.executor.perform(&handle, action).await.into_result()
    }

    /// Like [`act`](Self::act), confirming a partial dispatch with `confirmation`
    ///
    /// # Errors
    ///
    /// Returns a resolution error, or `ActionExhausted`
    pub async fn act_confirmed<C>(
        &self,
        chain: &StrategyChain,
        action: &Action,
        confirmation: &C,
    ) -> HoldfastResult<ActionOutcome>
    where
        C: Condition + ?Sized,
    {
        let handle = self.resolve_required(chain).await?;
        self.executor
            .perform_confirmed(&handle, action, confirmation)
            .await
            .into_result()
    }

    /// Click the element behind `chain`
    ///
    /// # Errors
    ///
    /// See [`act`](Self::act)
    pub async fn click(&self, chain: &StrategyChain) -> HoldfastResult<ActionOutcome> {
        self.act(chain, &Action::Click).await
    }

    /// Fill the element behind `chain`
    ///
    /// # Errors
    ///
    /// See [`act`](Self::act)
    pub async fn fill(&self, chain: &StrategyChain, text: impl Into<String>) -> HoldfastResult<ActionOutcome> {
        self.act(chain, &Action::Fill(text.into())).await
    }

    /// Attach files to the input behind `chain`
    ///
    /// # Errors
    ///
    /// See [`act`](Self::act)
    pub async fn upload(&self, chain: &StrategyChain, files: Vec<PathBuf>) -> HoldfastResult<ActionOutcome> {
        self.act(chain, &Action::SetFiles(files)).await
    }

    /// Trimmed text of the element behind `chain`
    ///
    /// # Errors
    ///
    /// Returns a resolution or driver error
    pub async fn read_text(&self, chain: &StrategyChain) -> HoldfastResult<String> {
        let handle = self.resolve_required(chain).await?;
        Ok(self.driver.text(&handle).await?.trim().to_string())
    }

    /// Computed style property of the element behind `chain`
    ///
    /// # Errors
    ///
    /// Returns a resolution or driver error
    pub async fn read_style(&self, chain: &StrategyChain, property: &str) -> HoldfastResult<String> {
        let handle = self.resolve_required(chain).await?;
        Ok(self.driver.computed_style(&handle, property).await?)
    }

    /// Pagination range shown by the element behind `chain`
    ///
    /// # Errors
    ///
    /// Returns `ExtractionFailed` if the text is not a range label
    pub async fn read_page_range(&self, chain: &StrategyChain) -> HoldfastResult<PageRange> {
        let text = self.read_text(chain).await?;
        let range = PageRange::parse(&text).ok_or(HoldfastError::ExtractionFailed { text })?;
        info!(target_name = chain.target(), %range, "page range");
        Ok(range)
    }

    /// First integer shown by the element behind `chain`
    ///
    /// # Errors
    ///
    /// Returns `ExtractionFailed` if the text holds no integer
    pub async fn read_count(&self, chain: &StrategyChain) -> HoldfastResult<u64> {
        let text = self.read_text(chain).await?;
        extract::extract_count(&text).ok_or(HoldfastError::ExtractionFailed { text })
    }

    /// Cell text of the `header` column in every row
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no header matches
    pub async fn column_values(&self, table: &TableLocator, header: &str) -> HoldfastResult<Vec<String>> {
        table.column_values(self.driver.as_ref(), header).await
    }

    /// Re-resolve the page's ready chain until it resolves or the page's
    /// load timeout passes; `None` when the page declares no ready chain
    ///
    /// # Errors
    ///
    /// Returns `EmptyChain`, or `Timeout` naming the page
    pub async fn wait_ready<P: PageObject + ?Sized>(&self, page: &P) -> HoldfastResult<Option<ElementHandle>> {
        let Some(chain) = page.ready_chain() else {
            return Ok(None);
        };
        chain.validate()?;
        let options = PollOptions::from_config(&self.config)
            .with_deadline(Duration::from_millis(page.load_timeout_ms()));
        let resolver = &self.resolver;
        let handle = wait::wait_until(
            || async move {
                resolver
                    .resolve_default(chain)
                    .await
                    .ok()
                    .and_then(|resolution| resolution.into_result().ok())
            },
            &options,
        )
        .await
        .into_result(&format!("{} ready ({})", page.page_name(), chain.target()))?;
        info!(page = page.page_name(), element = %handle, "page ready");
        Ok(Some(handle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, InteractionMode};
    use crate::locator::Selector;
    use crate::mock::{MockCall, MockElement, MockPage};
    use crate::page_object::PageObjectBuilder;
    use crate::verify::checks;
    use crate::wait::Visible;

    fn engine() -> (Arc<MockPage>, Engine<MockPage>) {
        let page = Arc::new(MockPage::new());
        let config = EngineConfig::default().with_per_candidate_timeout(500);
        let engine = Engine::new(page.clone(), config).unwrap();
        (page, engine)
    }

    fn paginator() -> StrategyChain {
        StrategyChain::of(
            "paginator range",
            [
                Selector::css(".mat-mdc-paginator-range-label"),
                Selector::css(".dataTables_info"),
            ],
        )
    }

    #[test]
    fn test_invalid_config_rejected() {
        let page = Arc::new(MockPage::new());
        let err = Engine::new(page, EngineConfig::default().with_ladder(Vec::new())).unwrap_err();
        assert!(matches!(err, HoldfastError::Config { .. }));
    }

    mod pagination_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_showing_records_range() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("info", "div")
                    .answers(Selector::css(".dataTables_info"))
                    .text("Showing 1 to 20 of 5519 records"),
            );
            for i in 0..20 {
                page.add(MockElement::new(format!("row-{i}"), "tr").answers(Selector::css("tbody tr")));
            }

            let range = engine.read_page_range(&paginator()).await.unwrap();
            assert_eq!(
                range,
                PageRange {
                    start: 1,
                    end: 20,
                    total: 5519
                }
            );

            let rows = StrategyChain::of("rows", [Selector::css("tbody tr")]);
            let (_, handles) = engine.resolve_all(&rows).await.unwrap();
            let report = engine
                .verify("customer grid", VerifyMode::AllMustHold)
                .check("row count", checks::row_count_matches(handles.len(), 20, range.total))
                .run()
                .await;
            assert!(report.passed);
        }

        #[tokio::test(start_paused = true)]
        async fn test_dashed_range_label() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("label", "div")
                    .answers(Selector::css(".mat-mdc-paginator-range-label"))
                    .text(" 21 – 40 of 41 "),
            );
            let range = engine.read_page_range(&paginator()).await.unwrap();
            assert_eq!((range.start, range.end, range.total), (21, 40, 41));
        }

        #[tokio::test(start_paused = true)]
        async fn test_non_range_text_is_extraction_failure() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("label", "div")
                    .answers(Selector::css(".dataTables_info"))
                    .text("Loading"),
            );
            let err = engine.read_page_range(&paginator()).await.unwrap_err();
            assert!(matches!(err, HoldfastError::ExtractionFailed { .. }));
        }
    }

    mod action_flow_tests {
        use super::*;

        fn items_per_page() -> StrategyChain {
            StrategyChain::of(
                "items-per-page selector",
                [
                    Selector::css("mat-select[aria-label='Items per page:']"),
                    Selector::css(".mat-mdc-paginator-page-size-select"),
                    Selector::role("combobox", "Items per page"),
                ],
            )
        }

        #[tokio::test(start_paused = true)]
        async fn test_third_candidate_opens_panel() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("size", "div")
                    .attr("role", "combobox")
                    .attr("aria-label", "Items per page")
                    .toggles_class("mat-select-panel-open"),
            );
            let resolution = engine.resolve(&items_per_page()).await.unwrap();
            assert_eq!(resolution.strategy_index(), Some(2));

            engine.click(&items_per_page()).await.unwrap();
            assert!(page.has_class(&page.handle("size"), "mat-select-panel-open").await.unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn test_act_on_missing_target_fails_resolution() {
            let (_page, engine) = engine();
            let err = engine.click(&items_per_page()).await.unwrap_err();
            assert!(matches!(err, HoldfastError::NotFound { candidates_tried: 3, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_save_then_toast() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("save", "button")
                    .attr("data-testid", "save-customer")
                    .fail_on(
                        InteractionMode::Direct,
                        DriverError::Intercepted {
                            id: "save".into(),
                            by: "div.cdk-overlay-backdrop".into(),
                        },
                    ),
            )
            .add(
                MockElement::new("toast", "div")
                    .answers(Selector::css(".toast-success"))
                    .text("Customer saved successfully")
                    .present_after(Duration::from_millis(700)),
            );

            let save = StrategyChain::of("save button", [Selector::test_id("save-customer")]);
            let outcome = engine.click(&save).await.unwrap();
            assert_eq!(outcome.succeeded_at_tier, Some(2));

            let toast = engine
                .wait_for(&Visible::new(Selector::css(".toast-success")), &PollOptions::default())
                .await;
            assert!(toast.is_satisfied());

            let toast_chain = StrategyChain::of("success toast", [Selector::css(".toast-success")]);
            let text = engine.read_text(&toast_chain).await.unwrap();
            assert!(text.contains("successfully"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_upload() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("upload", "input")
                    .attr("type", "file")
                    .answers(Selector::css("input[type=file]")),
            );
            let dir = tempfile::tempdir().unwrap();
            let file = dir.path().join("labels.csv");
            std::fs::write(&file, "name,color\nApproved,#28a745\n").unwrap();

            let chain = StrategyChain::of("label import", [Selector::css("input[type=file]")]);
            engine.upload(&chain, vec![file.clone()]).await.unwrap();
            assert_eq!(page.files_of("upload"), vec![file]);
            assert!(page
                .calls()
                .contains(&MockCall::SetFiles("upload".into(), InteractionMode::Direct)));
        }
    }

    mod verification_tests {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};

        #[tokio::test(start_paused = true)]
        async fn test_any_may_hold_stops_after_second_step() {
            let (_page, engine) = engine();
            let third_ran = AtomicBool::new(false);
            let report = engine
                .verify("customer saved", VerifyMode::AnyMayHold)
                .check("toast shown", false)
                .check("row in grid", true)
                .step("audit entry", async {
                    third_ran.store(true, Ordering::SeqCst);
                    true
                })
                .run()
                .await;
            assert!(report.passed);
            assert!(!third_ran.load(Ordering::SeqCst));
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_verification_names_resolution() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("label", "span")
                    .answers(Selector::css(".label-chip"))
                    .text("Approved")
                    .style("background-color", "rgb(220, 53, 69)"),
            );
            let chip = StrategyChain::of("approved label", [Selector::css(".label-chip")]);
            let resolution = engine.resolve(&chip).await.unwrap();
            let name = engine.read_text(&chip).await.unwrap();
            let color = engine.read_style(&chip, "background-color").await.unwrap();

            let err = engine
                .verify("approved label", VerifyMode::AllMustHold)
                .check("label", checks::label_matches(&name, &color, "Approved", "#28a745"))
                .with_diagnostics(&resolution)
                .run()
                .await
                .into_result()
                .unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("approved label"));
            assert!(msg.contains("strategy index: 0"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_column_values_all_equal() {
            let (page, engine) = engine();
            let table = TableLocator::new("service requests", "table.requests");
            page.add(MockElement::new("h", "th").answers(table.header_selector()).text("Status"));
            for i in 0..3 {
                page.add(
                    MockElement::new(format!("c{i}"), "td")
                        .answers(table.cell_selector(1))
                        .text("Open"),
                );
            }
            let values = engine.column_values(&table, "status").await.unwrap();
            assert!(checks::all_equal(&values, "Open"));
        }
    }

    mod page_object_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_wait_ready() {
            let (page, engine) = engine();
            page.add(
                MockElement::new("grid", "mat-table")
                    .answers(Selector::css("mat-table.customers"))
                    .present_after(Duration::from_secs(3)),
            );
            let customers = PageObjectBuilder::new()
                .with_url_pattern("/customers")
                .with_target("grid", [Selector::css("mat-table.customers")])
                .ready_when("grid")
                .with_load_timeout(5000)
                .build()
                .unwrap();
            let handle = engine.wait_ready(&customers).await.unwrap();
            assert_eq!(handle, Some(page.handle("grid")));
        }

        #[tokio::test]
        async fn test_wait_ready_without_chain() {
            let (_page, engine) = engine();
            let bare = PageObjectBuilder::new().with_url_pattern("/").build().unwrap();
            assert_eq!(engine.wait_ready(&bare).await.unwrap(), None);
        }
    }
}
