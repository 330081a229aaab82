//! Chromium-backed session: one browser, one page, driven over CDP.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::{AutomationError, Result};
use crate::session::{PropFilter, Search, Session, page};
use crate::types::SearchHit;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The shared automation session: a single page in a single Chromium
/// instance. Exclusivity is enforced by the action queue above this layer.
pub struct ChromeSession {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    config: BotConfig,
}

impl ChromeSession {
    /// Launch Chromium, open the automation page with the configured UI
    /// language, and land on the site root.
    pub async fn launch(config: BotConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
                "--no-first-run",
            ]);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(AutomationError::Driver)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(driver)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser event error: {e}");
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver)?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::json!({ "Accept-Language": config.language }),
        )))
        .await
        .map_err(driver)?;

        let home = format!("{}/", config.base_url.trim_end_matches('/'));
        page.goto(home).await.map_err(driver)?;
        page.wait_for_navigation().await.map_err(driver)?;
        debug!(base_url = %config.base_url, headless = config.headless, "browser session ready");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
            config,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }
}

/// Script matching elements by selector and property equality, finishing
/// with `action` over the matched set. Adapted from the original click
/// helpers: properties are compared loosely, the way rendered attributes
/// behave.
fn filter_script(selector: &str, props: &PropFilter<'_>, action: &str) -> String {
    let selector = Value::from(selector).to_string();
    let props: serde_json::Map<String, Value> = props
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect();
    let props = Value::Object(props).to_string();
    format!(
        "(() => {{ const props = {props}; const keys = Object.keys(props); \
         const matches = [...document.querySelectorAll({selector})]\
         .filter((element) => keys.every((key) => element[key] == props[key])); \
         {action} return matches.length > 0; }})()"
    )
}

fn anchor_expr(anchor: Option<&str>) -> String {
    match anchor {
        Some(selector) => format!("document.querySelector({})", Value::from(selector)),
        None => "document.scrollingElement".to_owned(),
    }
}

fn driver(e: impl std::fmt::Display) -> AutomationError {
    AutomationError::Driver(e.to_string())
}

#[async_trait]
impl Session for ChromeSession {
    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(driver)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_owned()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(driver)?;
        self.page.wait_for_navigation().await.map_err(driver)?;
        Ok(())
    }

    async fn click_first(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        let script = filter_script(
            selector,
            props,
            "if (matches.length > 0) matches[0].click();",
        );
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click_all(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        let script = filter_script(selector, props, "matches.forEach((element) => element.click());");
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn element_exists(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        let script = filter_script(selector, props, "");
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element =
            self.page
                .find_element(selector)
                .await
                .map_err(|_| AutomationError::MissingElement {
                    selector: selector.to_owned(),
                })?;
        element.click().await.map_err(driver)?;
        element.type_str(text).await.map_err(driver)?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::SelectorTimeout {
                    selector: selector.to_owned(),
                }
                .into());
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn scroll_by(&self, anchor: Option<&str>, delta: i64) -> Result<()> {
        let target = anchor_expr(anchor);
        let script = format!(
            "(() => {{ const box = {target}; if (box) box.scrollBy(0, {delta}); return true; }})()"
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    async fn scroll_top(&self, anchor: Option<&str>) -> Result<f64> {
        let target = anchor_expr(anchor);
        let script = format!("(() => {{ const box = {target}; return box ? box.scrollTop : 0; }})()");
        let value = self.evaluate(&script).await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| AutomationError::Evaluate(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn cookies(&self) -> Result<Value> {
        let cookies = self.page.get_cookies().await.map_err(driver)?;
        Ok(serde_json::to_value(cookies)?)
    }

    async fn set_cookies(&self, cookies: &Value) -> Result<()> {
        let params: Vec<CookieParam> = serde_json::from_value(cookies.clone())
            .map_err(|e| AutomationError::Malformed(format!("cookie blob: {e}")))?;
        self.page.set_cookies(params).await.map_err(driver)?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder().full_page(true).build(),
                path,
            )
            .await
            .map_err(driver)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.browser.lock().await.close().await.map_err(driver)?;
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait]
impl Search for ChromeSession {
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        page::search(self, &self.config, term).await
    }
}
