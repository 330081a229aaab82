//! The capability set the core consumes from the shared automation
//! session, and its Chromium-backed implementation.

pub mod chrome;
pub mod page;

#[cfg(test)]
pub(crate) mod mock;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::SearchHit;

/// DOM property filter: every `(property, value)` pair must match the
/// element's property by string equality ("href", "innerText", "alt", ...).
pub type PropFilter<'a> = [(&'a str, &'a str)];

/// The single logical browser page the agent operates against.
///
/// All methods take `&self`; exclusivity is enforced above this layer by
/// the action queue, not by the session itself.
#[async_trait]
pub trait Session: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Click the first element matching selector + property filter.
    /// Returns whether anything was clicked.
    async fn click_first(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool>;

    /// Click every element matching selector + property filter.
    /// Returns whether anything was clicked.
    async fn click_all(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool>;

    async fn element_exists(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool>;

    /// Type text into the element matching the selector, with key events.
    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;

    /// Poll until the selector matches something; `SelectorTimeout` on
    /// expiry.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Scroll the anchor region (or the document if absent) by `delta`
    /// pixels.
    async fn scroll_by(&self, anchor: Option<&str>, delta: i64) -> Result<()>;

    /// Current scroll offset of the anchor region (or the document).
    async fn scroll_top(&self, anchor: Option<&str>) -> Result<f64>;

    /// Run an extraction script against live rendered content and return
    /// its structured result.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn cookies(&self) -> Result<Value>;

    async fn set_cookies(&self, cookies: &Value) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// The home-surface search capability.
#[async_trait]
pub trait Search: Send + Sync {
    /// Run the search box flow and return the rendered result tiles in
    /// display order.
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>>;
}

/// On-disk session blob: a single JSON object `{ "cookies": [...] }`,
/// written and read verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlob {
    pub cookies: Value,
}
