//! In-memory page for testing page objects without a browser.
//!
//! [`MockPage`] implements [`PageDriver`] over a flat list of
//! [`MockElement`]s. Elements declare which selectors they answer to, so no CSS
//! engine is involved; text, test-id, attribute and role selectors are matched
//! from the element's own data. Timing behavior (late appearance, overlays that
//! hide, slow queries) is measured on tokio's clock so tests can run with
//! paused time.
//!
//! ## Example
//!
//! ```rust,ignore
//! let page = MockPage::new();
//! page.add(
//!     MockElement::new("toast", "div")
//!         .answers(Selector::css(".toast-success"))
//!         .text("Customer saved")
//!         .present_after(Duration::from_millis(400)),
//! );
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::driver::{DriverError, DriverResult, ElementHandle, InteractionMode, PageDriver, Scope};
use crate::locator::Selector;

/// A scripted element
#[derive(Debug, Clone)]
pub struct MockElement {
    id: String,
    tag: String,
    answers: Vec<Selector>,
    text: String,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    parent: Option<String>,
    visible: bool,
    present_after: Duration,
    hidden_after: Option<Duration>,
    failures: HashMap<InteractionMode, DriverError>,
    toggle_on_click: Option<String>,
    script_result: Option<serde_json::Value>,
}

impl MockElement {
    /// Create a visible element
    #[must_use]
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            answers: Vec::new(),
            text: String::new(),
            attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            parent: None,
            visible: true,
            present_after: Duration::ZERO,
            hidden_after: None,
            failures: HashMap::new(),
            toggle_on_click: None,
            script_result: None,
        }
    }

    /// Answer to a CSS or XPath selector
    #[must_use]
    pub fn answers(mut self, selector: Selector) -> Self {
        self.answers.push(selector);
        self
    }

    /// Set text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the class attribute
    #[must_use]
    pub fn class(self, classes: impl Into<String>) -> Self {
        self.attr("class", classes)
    }

    /// Set a computed style
    #[must_use]
    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(property.into(), value.into());
        self
    }

    /// Nest under another element
    #[must_use]
    pub fn child_of(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Present in the DOM but not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Attach to the DOM only after `delay`
    #[must_use]
    pub const fn present_after(mut self, delay: Duration) -> Self {
        self.present_after = delay;
        self
    }

    /// Stop rendering after `delay` (spinners, backdrops)
    #[must_use]
    pub const fn hidden_after(mut self, delay: Duration) -> Self {
        self.hidden_after = Some(delay);
        self
    }

    /// Fail every interaction delivered in `mode`
    #[must_use]
    pub fn fail_on(mut self, mode: InteractionMode, error: DriverError) -> Self {
        self.failures.insert(mode, error);
        self
    }

    /// Toggle a class on each successful click
    #[must_use]
    pub fn toggles_class(mut self, class: impl Into<String>) -> Self {
        self.toggle_on_click = Some(class.into());
        self
    }

    /// Value returned by `evaluate`
    #[must_use]
    pub fn script_result(mut self, value: serde_json::Value) -> Self {
        self.script_result = Some(value);
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        if self.answers.contains(selector) {
            return true;
        }
        match selector {
            Selector::Text(t) => self.text.contains(t.as_str()),
            Selector::TestId(id) => self.attributes.get("data-testid") == Some(id),
            Selector::Attribute { name, value } => self.attributes.get(name) == Some(value),
            Selector::CssWithText { css, text } => {
                self.answers.contains(&Selector::Css(css.clone())) && self.text.contains(text.as_str())
            }
            Selector::Role { role, name } => {
                self.attributes.get("role") == Some(role)
                    && (self.text.contains(name.as_str())
                        || self
                            .attributes
                            .get("aria-label")
                            .is_some_and(|label| label.contains(name.as_str())))
            }
            Selector::Css(_) | Selector::XPath(_) => false,
        }
    }

    fn is_attached(&self, elapsed: Duration) -> bool {
        elapsed >= self.present_after
    }

    fn is_rendered(&self, elapsed: Duration) -> bool {
        self.visible && self.hidden_after.map_or(true, |after| elapsed < after)
    }
}

/// A driver call recorded by [`MockPage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `query` with the selector
    Query(Selector),
    /// `click` on an element id
    Click(String, InteractionMode),
    /// `scroll_into_view` on an element id
    Scroll(String),
    /// `fill` on an element id
    Fill(String, InteractionMode),
    /// `set_files` on an element id
    SetFiles(String, InteractionMode),
    /// `select_option` on an element id
    Select(String, InteractionMode),
    /// `evaluate` on an element id
    Evaluate(String),
}

#[derive(Debug, Default)]
struct MockState {
    elements: Vec<MockElement>,
    generation: u64,
    calls: Vec<MockCall>,
    values: HashMap<String, String>,
    files: HashMap<String, Vec<PathBuf>>,
    query_delay: Duration,
}

/// In-memory [`PageDriver`]
#[derive(Debug)]
pub struct MockPage {
    created: Instant,
    state: Mutex<MockState>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    /// Create an empty page at generation 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            state: Mutex::new(MockState {
                generation: 1,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Add an element
    pub fn add(&self, element: MockElement) -> &Self {
        self.state().elements.push(element);
        self
    }

    /// Remove an element by id
    pub fn remove(&self, id: &str) {
        self.state().elements.retain(|e| e.id != id);
    }

    /// Make every query take `delay` before answering
    pub fn set_query_delay(&self, delay: Duration) {
        self.state().query_delay = delay;
    }

    /// Simulate a full document reload; existing handles become detached
    pub fn reload(&self) {
        self.state().generation += 1;
    }

    /// Handle for an element id in the current generation
    #[must_use]
    pub fn handle(&self, id: &str) -> ElementHandle {
        ElementHandle::new(id, self.state().generation)
    }

    /// Every recorded driver call
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of `query` calls for `selector`
    #[must_use]
    pub fn query_count(&self, selector: &Selector) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Query(s) if s == selector))
            .count()
    }

    /// Current value of a filled or selected element
    #[must_use]
    pub fn value_of(&self, id: &str) -> Option<String> {
        self.state().values.get(id).cloned()
    }

    /// Files attached to an input
    #[must_use]
    pub fn files_of(&self, id: &str) -> Vec<PathBuf> {
        self.state().files.get(id).cloned().unwrap_or_default()
    }

    fn live(&self, handle: &ElementHandle) -> DriverResult<MockElement> {
        let elapsed = self.elapsed();
        let state = self.state();
        if handle.generation() != state.generation {
            return Err(DriverError::Detached {
                id: handle.id().to_string(),
            });
        }
        state
            .elements
            .iter()
            .find(|e| e.id == handle.id() && e.is_attached(elapsed))
            .cloned()
            .ok_or_else(|| DriverError::Detached {
                id: handle.id().to_string(),
            })
    }

    fn interact(&self, handle: &ElementHandle, mode: InteractionMode) -> DriverResult<MockElement> {
        let element = self.live(handle)?;
        if let Some(error) = element.failures.get(&mode) {
            return Err(error.clone());
        }
        Ok(element)
    }

    fn record(&self, call: MockCall) {
        self.state().calls.push(call);
    }

    fn is_descendant(elements: &[MockElement], element: &MockElement, ancestor: &str) -> bool {
        let mut parent = element.parent.as_deref();
        while let Some(id) = parent {
            if id == ancestor {
                return true;
            }
            parent = elements
                .iter()
                .find(|e| e.id == id)
                .and_then(|e| e.parent.as_deref());
        }
        false
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn query(&self, scope: &Scope, selector: &Selector) -> DriverResult<Vec<ElementHandle>> {
        self.record(MockCall::Query(selector.clone()));
        let delay = self.state().query_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let elapsed = self.elapsed();
        let state = self.state();
        if let Scope::Within(parent) = scope {
            if parent.generation() != state.generation {
                return Err(DriverError::Detached {
                    id: parent.id().to_string(),
                });
            }
        }
        Ok(state
            .elements
            .iter()
            .filter(|e| e.is_attached(elapsed) && e.matches(selector))
            .filter(|e| match scope {
                Scope::Document => true,
                Scope::Within(parent) => Self::is_descendant(&state.elements, e, parent.id()),
            })
            .map(|e| ElementHandle::new(e.id.clone(), state.generation))
            .collect())
    }

    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool> {
        let element = self.live(handle)?;
        Ok(element.is_rendered(self.elapsed()))
    }

    async fn text(&self, handle: &ElementHandle) -> DriverResult<String> {
        Ok(self.live(handle)?.text)
    }

    async fn attribute(&self, handle: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        Ok(self.live(handle)?.attributes.get(name).cloned())
    }

    async fn computed_style(&self, handle: &ElementHandle, property: &str) -> DriverResult<String> {
        self.live(handle)?
            .styles
            .get(property)
            .cloned()
            .ok_or_else(|| DriverError::Unsupported {
                operation: format!("computed_style({property})"),
            })
    }

    async fn click(&self, handle: &ElementHandle, mode: InteractionMode) -> DriverResult<()> {
        self.record(MockCall::Click(handle.id().to_string(), mode));
        let element = self.interact(handle, mode)?;
        if let Some(class) = element.toggle_on_click {
            let mut state = self.state();
            if let Some(target) = state.elements.iter_mut().find(|e| e.id == element.id) {
                let current = target.attributes.get("class").cloned().unwrap_or_default();
                let mut classes: Vec<&str> = current.split_whitespace().collect();
                if let Some(pos) = classes.iter().position(|c| *c == class) {
                    classes.remove(pos);
                } else {
                    classes.push(&class);
                }
                let joined = classes.join(" ");
                target.attributes.insert("class".to_string(), joined);
            }
        }
        Ok(())
    }

    async fn scroll_into_view(&self, handle: &ElementHandle) -> DriverResult<()> {
        self.record(MockCall::Scroll(handle.id().to_string()));
        self.live(handle).map(|_| ())
    }

    async fn fill(&self, handle: &ElementHandle, text: &str, mode: InteractionMode) -> DriverResult<()> {
        self.record(MockCall::Fill(handle.id().to_string(), mode));
        self.interact(handle, mode)?;
        self.state()
            .values
            .insert(handle.id().to_string(), text.to_string());
        Ok(())
    }

    async fn set_files(
        &self,
        handle: &ElementHandle,
        files: &[PathBuf],
        mode: InteractionMode,
    ) -> DriverResult<()> {
        self.record(MockCall::SetFiles(handle.id().to_string(), mode));
        let element = self.interact(handle, mode)?;
        if element.attributes.get("type").map(String::as_str) != Some("file") {
            return Err(DriverError::NotInteractable {
                id: element.id,
                reason: "not a file input".to_string(),
            });
        }
        self.state()
            .files
            .insert(handle.id().to_string(), files.to_vec());
        Ok(())
    }

    async fn select_option(
        &self,
        handle: &ElementHandle,
        value: &str,
        mode: InteractionMode,
    ) -> DriverResult<()> {
        self.record(MockCall::Select(handle.id().to_string(), mode));
        self.interact(handle, mode)?;
        self.state()
            .values
            .insert(handle.id().to_string(), value.to_string());
        Ok(())
    }

    async fn evaluate(&self, handle: &ElementHandle, script: &str) -> DriverResult<serde_json::Value> {
        let _ = script;
        self.record(MockCall::Evaluate(handle.id().to_string()));
        let element = self.interact(handle, InteractionMode::Script)?;
        Ok(element.script_result.unwrap_or(serde_json::Value::Null))
    }

    async fn generation(&self) -> DriverResult<u64> {
        Ok(self.state().generation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_query_respects_presence_delay() {
        let page = MockPage::new();
        page.add(
            MockElement::new("toast", "div")
                .answers(Selector::css(".toast"))
                .present_after(Duration::from_millis(300)),
        );
        let css = Selector::css(".toast");
        assert!(page.query(&Scope::Document, &css).await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(page.query(&Scope::Document, &css).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scoped_query_matches_descendants_only() {
        let page = MockPage::new();
        page.add(MockElement::new("dialog", "div").answers(Selector::css(".dialog")))
            .add(MockElement::new("inner", "span").text("Save").child_of("dialog"))
            .add(MockElement::new("outer", "span").text("Save"));
        let scope = Scope::Within(page.handle("dialog"));
        let found = page.query(&scope, &Selector::text("Save")).await.unwrap();
        assert_eq!(found, vec![page.handle("inner")]);
    }

    #[tokio::test]
    async fn test_reload_detaches_handles() {
        let page = MockPage::new();
        page.add(MockElement::new("a", "a"));
        let stale = page.handle("a");
        page.reload();
        let err = page.is_visible(&stale).await.unwrap_err();
        assert!(matches!(err, DriverError::Detached { .. }));
        assert!(page.is_visible(&page.handle("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_click_toggles_class() {
        let page = MockPage::new();
        page.add(MockElement::new("panel", "div").class("panel").toggles_class("expanded"));
        let handle = page.handle("panel");
        page.click(&handle, InteractionMode::Direct).await.unwrap();
        assert!(page.has_class(&handle, "expanded").await.unwrap());
        page.click(&handle, InteractionMode::Direct).await.unwrap();
        assert!(!page.has_class(&handle, "expanded").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_files_requires_file_input() {
        let page = MockPage::new();
        page.add(MockElement::new("name", "input").attr("type", "text"));
        let err = page
            .set_files(&page.handle("name"), &[PathBuf::from("a.pdf")], InteractionMode::Direct)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotInteractable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_after() {
        let page = MockPage::new();
        page.add(MockElement::new("spinner", "ngx-spinner").hidden_after(Duration::from_secs(1)));
        let handle = page.handle("spinner");
        assert!(page.is_visible(&handle).await.unwrap());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!page.is_visible(&handle).await.unwrap());
    }
}
