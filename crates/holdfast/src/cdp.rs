//! Chrome DevTools Protocol driver (feature `browser`).
//!
//! [`CdpPage`] implements [`PageDriver`] on top of a `chromiumoxide` page
//! owned by the host. Selectors run in page script; every match is tagged
//! with a `data-holdfast-id` attribute so later calls can find it again. The
//! document generation is stamped on `window.__holdfast_gen` the first time
//! the engine touches a document, so handles taken before a navigation or
//! reload report [`DriverError::Detached`].
//!
//! Delivery per interaction mode:
//!
//! - `Direct`: actionability checks (box, `disabled`, occlusion via
//!   `elementFromPoint`), then `HTMLElement.click()`
//! - `Forced`: a CDP mouse click at the element's centre, no checks
//! - `Script`: a synthetic `MouseEvent` dispatched in page script

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt::Display;
use std::path::PathBuf;
use tracing::debug;

use crate::driver::{DriverError, DriverResult, ElementHandle, InteractionMode, PageDriver, Scope};
use crate::locator::{js_string, Selector};

const ID_ATTR: &str = "data-holdfast-id";

const STAMP: &str = "if (!window.__holdfast_gen) { window.__holdfast_gen = Date.now(); window.__holdfast_seq = 0; }";

fn protocol(e: impl Display) -> DriverError {
    DriverError::Protocol {
        message: e.to_string(),
    }
}

/// Reply envelope produced by the element scripts
#[derive(Debug, Default, Deserialize)]
struct Reply {
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    value: serde_json::Value,
    error: Option<String>,
    intercepted: Option<String>,
    partial: Option<String>,
}

impl Reply {
    fn into_value(self, id: &str) -> DriverResult<serde_json::Value> {
        if self.detached {
            return Err(DriverError::Detached { id: id.to_string() });
        }
        if let Some(by) = self.intercepted {
            return Err(DriverError::Intercepted {
                id: id.to_string(),
                by,
            });
        }
        if let Some(message) = self.partial {
            return Err(DriverError::PartiallyDispatched {
                id: id.to_string(),
                message,
            });
        }
        if let Some(reason) = self.error {
            return Err(DriverError::NotInteractable {
                id: id.to_string(),
                reason,
            });
        }
        Ok(self.value)
    }
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    detached: bool,
    generation: u64,
    #[serde(default)]
    ids: Vec<String>,
}

/// Wrap `body` so it runs with `el` bound to the tagged element, or replies
/// `{detached: true}` when the handle is stale
fn element_script(handle: &ElementHandle, body: &str) -> String {
    format!(
        "(() => {{ if (window.__holdfast_gen !== {generation}) return {{ detached: true }}; \
         const el = document.querySelector('[{ID_ATTR}=' + JSON.stringify({id}) + ']'); \
         if (!el || !el.isConnected) return {{ detached: true }}; {body} }})()",
        generation = handle.generation(),
        id = js_string(handle.id()),
    )
}

fn query_script(scope: &Scope, selector: &Selector) -> String {
    let (guard, root) = match scope {
        Scope::Document => (String::new(), "document".to_string()),
        Scope::Within(parent) => (
            format!(
                "if (window.__holdfast_gen !== {}) return {{ detached: true, generation: window.__holdfast_gen }}; \
                 const root = document.querySelector('[{ID_ATTR}=' + JSON.stringify({}) + ']'); \
                 if (!root) return {{ detached: true, generation: window.__holdfast_gen }};",
                parent.generation(),
                js_string(parent.id())
            ),
            "root".to_string(),
        ),
    };
    format!(
        "(() => {{ {STAMP} {guard} \
         const found = {query}; \
         const ids = found.map(el => {{ \
           if (!el.hasAttribute('{ID_ATTR}')) el.setAttribute('{ID_ATTR}', 'hf-' + (++window.__holdfast_seq)); \
           return el.getAttribute('{ID_ATTR}'); }}); \
         return {{ generation: window.__holdfast_gen, ids }}; }})()",
        query = selector.to_query_all(&root),
    )
}

const ACTIONABLE: &str = "const r = el.getBoundingClientRect(); \
    if (r.width === 0 || r.height === 0) return { error: 'element has an empty box' }; \
    if (el.disabled) return { error: 'element is disabled' }; \
    const top = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2); \
    if (top && top !== el && !el.contains(top)) \
      return { intercepted: top.tagName.toLowerCase() + (top.className ? '.' + String(top.className).trim().split(/\\s+/).join('.') : '') };";

const SET_VALUE: &str = "const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype \
    : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype : HTMLInputElement.prototype; \
    const setter = Object.getOwnPropertyDescriptor(proto, 'value'); \
    try { \
      if (el.isContentEditable) { el.textContent = VALUE; } \
      else if (setter && setter.set) { setter.set.call(el, VALUE); } \
      else { el.value = VALUE; } \
      el.dispatchEvent(new Event('input', { bubbles: true })); \
      el.dispatchEvent(new Event('change', { bubbles: true })); \
    } catch (e) { return { partial: String(e) }; } \
    return { value: true };";

/// [`PageDriver`] over a live `chromiumoxide` page
#[derive(Debug, Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    /// Wrap a page; navigation and closing stay with the caller
    #[must_use]
    pub const fn new(page: Page) -> Self {
        Self { page }
    }

    /// The wrapped page
    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)
    }

    async fn on_element(&self, handle: &ElementHandle, body: &str) -> DriverResult<serde_json::Value> {
        let reply: Reply = self.eval(element_script(handle, body)).await?;
        reply.into_value(handle.id())
    }

    fn selector_for(handle: &ElementHandle) -> String {
        format!("[{ID_ATTR}={}]", js_string(handle.id()))
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn query(&self, scope: &Scope, selector: &Selector) -> DriverResult<Vec<ElementHandle>> {
        let reply: QueryReply = self.eval(query_script(scope, selector)).await?;
        if reply.detached {
            let id = match scope {
                Scope::Within(parent) => parent.id().to_string(),
                Scope::Document => "document".to_string(),
            };
            return Err(DriverError::Detached { id });
        }
        debug!(%selector, matches = reply.ids.len(), "cdp query");
        Ok(reply
            .ids
            .into_iter()
            .map(|id| ElementHandle::new(id, reply.generation))
            .collect())
    }

    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool> {
        let value = self
            .on_element(
                handle,
                "const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
                 return { value: s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0 };",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&self, handle: &ElementHandle) -> DriverResult<String> {
        let value = self
            .on_element(handle, "return { value: el.innerText ?? el.textContent ?? '' };")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, handle: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let body = format!("return {{ value: el.getAttribute({}) }};", js_string(name));
        let value = self.on_element(handle, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn computed_style(&self, handle: &ElementHandle, property: &str) -> DriverResult<String> {
        let body = format!(
            "return {{ value: getComputedStyle(el).getPropertyValue({}) }};",
            js_string(property)
        );
        let value = self.on_element(handle, &body).await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn click(&self, handle: &ElementHandle, mode: InteractionMode) -> DriverResult<()> {
        match mode {
            InteractionMode::Direct => {
                let body = format!(
                    "{ACTIONABLE} try {{ el.click(); }} catch (e) {{ return {{ partial: String(e) }}; }} return {{ value: true }};"
                );
                self.on_element(handle, &body).await.map(|_| ())
            }
            InteractionMode::Forced => {
                self.on_element(handle, "return { value: true };").await?;
                let element = self
                    .page
                    .find_element(Self::selector_for(handle))
                    .await
                    .map_err(protocol)?;
                element.click().await.map_err(protocol)?;
                Ok(())
            }
            InteractionMode::Script => self
                .on_element(
                    handle,
                    "try { el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window })); } \
                     catch (e) { return { partial: String(e) }; } return { value: true };",
                )
                .await
                .map(|_| ()),
        }
    }

    async fn scroll_into_view(&self, handle: &ElementHandle) -> DriverResult<()> {
        self.on_element(
            handle,
            "el.scrollIntoView({ block: 'center', inline: 'center' }); return { value: true };",
        )
        .await
        .map(|_| ())
    }

    async fn fill(&self, handle: &ElementHandle, text: &str, mode: InteractionMode) -> DriverResult<()> {
        let checks = match mode {
            InteractionMode::Direct => {
                "if (el.disabled || el.readOnly) return { error: 'element is not editable' }; el.focus();"
            }
            InteractionMode::Forced => "el.focus();",
            InteractionMode::Script => "",
        };
        let body = format!("{checks} {}", SET_VALUE.replace("VALUE", &js_string(text)));
        self.on_element(handle, &body).await.map(|_| ())
    }

    async fn set_files(
        &self,
        handle: &ElementHandle,
        files: &[PathBuf],
        mode: InteractionMode,
    ) -> DriverResult<()> {
        if mode == InteractionMode::Direct {
            self.on_element(
                handle,
                "if (el.type !== 'file') return { error: 'not a file input' }; \
                 if (el.disabled) return { error: 'element is disabled' }; return { value: true };",
            )
            .await?;
        } else {
            self.on_element(handle, "return { value: true };").await?;
        }
        let element = self
            .page
            .find_element(Self::selector_for(handle))
            .await
            .map_err(protocol)?;
        let params = SetFileInputFilesParams::builder()
            .files(files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>())
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(protocol)?;
        self.page.execute(params).await.map_err(protocol)?;
        if mode == InteractionMode::Script {
            self.on_element(
                handle,
                "el.dispatchEvent(new Event('change', { bubbles: true })); return { value: true };",
            )
            .await?;
        }
        Ok(())
    }

    async fn select_option(
        &self,
        handle: &ElementHandle,
        value: &str,
        mode: InteractionMode,
    ) -> DriverResult<()> {
        let checks = if mode == InteractionMode::Direct {
            "if (el.disabled) return { error: 'element is disabled' };"
        } else {
            ""
        };
        let body = format!(
            "{checks} if (!(el instanceof HTMLSelectElement)) return {{ error: 'not a <select>' }}; \
             const wanted = {wanted}; \
             const option = Array.from(el.options).find(o => o.value === wanted || o.label.trim() === wanted); \
             if (!option) return {{ error: 'no option ' + wanted }}; {set}",
            wanted = js_string(value),
            set = SET_VALUE.replace("VALUE", "option.value"),
        );
        self.on_element(handle, &body).await.map(|_| ())
    }

    async fn evaluate(&self, handle: &ElementHandle, script: &str) -> DriverResult<serde_json::Value> {
        let body = format!(
            "try {{ return {{ value: (function() {{ {script} }}).call(el) ?? null }}; }} \
             catch (e) {{ return {{ partial: String(e) }}; }}"
        );
        self.on_element(handle, &body).await
    }

    async fn generation(&self) -> DriverResult<u64> {
        self.eval(format!("(() => {{ {STAMP} return window.__holdfast_gen; }})()"))
            .await
    }
}
