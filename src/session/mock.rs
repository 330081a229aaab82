//! Scripted session for unit tests: records every call and replays canned
//! page state.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AutomationError, Result};
use crate::session::{PropFilter, Search, Session};
use crate::types::SearchHit;

pub(crate) struct MockSession {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    current_url: String,
    navigations: Vec<String>,
    clickable: Vec<(String, Vec<(String, String)>)>,
    existing: Vec<(String, Vec<(String, String)>)>,
    missing_selectors: Vec<String>,
    typed: Vec<(String, String)>,
    scroll_offsets: VecDeque<f64>,
    last_offset: f64,
    offset_step: Option<f64>,
    offset_cursor: f64,
    eval_responses: Vec<(String, VecDeque<Value>)>,
    destination_missing: bool,
    search_results: Vec<SearchHit>,
    cookies: Value,
}

fn normalize(props: &PropFilter<'_>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = props
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.sort();
    pairs
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                cookies: Value::Array(Vec::new()),
                ..State::default()
            }),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    // -- scripting ----------------------------------------------------------

    pub(crate) fn set_current_url(&self, url: &str) {
        self.state.lock().unwrap().current_url = url.to_owned();
    }

    pub(crate) fn add_clickable(&self, selector: &str, props: &PropFilter<'_>) {
        self.state
            .lock()
            .unwrap()
            .clickable
            .push((selector.to_owned(), normalize(props)));
    }

    pub(crate) fn add_existing(&self, selector: &str, props: &PropFilter<'_>) {
        self.state
            .lock()
            .unwrap()
            .existing
            .push((selector.to_owned(), normalize(props)));
    }

    pub(crate) fn set_missing_selector(&self, selector: &str) {
        self.state
            .lock()
            .unwrap()
            .missing_selectors
            .push(selector.to_owned());
    }

    pub(crate) fn set_scroll_offsets(&self, offsets: Vec<f64>) {
        self.state.lock().unwrap().scroll_offsets = offsets.into();
    }

    /// Strictly increasing offsets: the list never stalls.
    pub(crate) fn set_scroll_offset_step(&self, step: f64) {
        self.state.lock().unwrap().offset_step = Some(step);
    }

    /// Queue a canned response for any script containing `key`. With a
    /// single queued value, it repeats on every later call.
    pub(crate) fn push_eval_response(&self, key: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        match state.eval_responses.iter_mut().find(|(k, _)| k == key) {
            Some((_, queue)) => queue.push_back(value),
            None => {
                state
                    .eval_responses
                    .push((key.to_owned(), VecDeque::from([value])));
            }
        }
    }

    pub(crate) fn set_destination_missing(&self, missing: bool) {
        self.state.lock().unwrap().destination_missing = missing;
    }

    pub(crate) fn set_search_results(&self, results: Vec<SearchHit>) {
        self.state.lock().unwrap().search_results = results;
    }

    pub(crate) fn set_cookie_value(&self, cookies: Value) {
        self.state.lock().unwrap().cookies = cookies;
    }

    // -- assertions ---------------------------------------------------------

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn calls_named(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub(crate) fn current_url_now(&self) -> String {
        self.state.lock().unwrap().current_url.clone()
    }

    pub(crate) fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub(crate) fn cookie_value(&self) -> Value {
        self.state.lock().unwrap().cookies.clone()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn current_url(&self) -> Result<String> {
        self.record("current_url");
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {url}"));
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_owned());
        state.current_url = url.to_owned();
        Ok(())
    }

    async fn click_first(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        self.record(format!("click_first {selector}"));
        let wanted = normalize(props);
        let mut state = self.state.lock().unwrap();
        let matched = state
            .clickable
            .iter()
            .any(|(sel, stored)| sel == selector && *stored == wanted);
        if matched {
            // Clicking a link lands the session on its destination.
            if let Some((_, href)) = wanted.iter().find(|(k, _)| k == "href") {
                state.current_url = href.clone();
            }
        }
        Ok(matched)
    }

    async fn click_all(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        self.record(format!("click_all {selector}"));
        let wanted = normalize(props);
        let state = self.state.lock().unwrap();
        Ok(state
            .clickable
            .iter()
            .any(|(sel, stored)| sel == selector && *stored == wanted))
    }

    async fn element_exists(&self, selector: &str, props: &PropFilter<'_>) -> Result<bool> {
        self.record(format!("element_exists {selector}"));
        let wanted = normalize(props);
        let state = self.state.lock().unwrap();
        Ok(state
            .existing
            .iter()
            .any(|(sel, stored)| sel == selector && *stored == wanted))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("type_into {selector}"));
        self.state
            .lock()
            .unwrap()
            .typed
            .push((selector.to_owned(), text.to_owned()));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("wait_for_selector {selector}"));
        let state = self.state.lock().unwrap();
        if state.missing_selectors.iter().any(|s| s == selector) {
            return Err(AutomationError::SelectorTimeout {
                selector: selector.to_owned(),
            }
            .into());
        }
        Ok(())
    }

    async fn scroll_by(&self, _anchor: Option<&str>, _delta: i64) -> Result<()> {
        self.record("scroll_by");
        Ok(())
    }

    async fn scroll_top(&self, _anchor: Option<&str>) -> Result<f64> {
        self.record("scroll_top");
        let mut state = self.state.lock().unwrap();
        if let Some(step) = state.offset_step {
            state.offset_cursor += step;
            return Ok(state.offset_cursor);
        }
        if let Some(offset) = state.scroll_offsets.pop_front() {
            state.last_offset = offset;
        }
        Ok(state.last_offset)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.record("evaluate");
        let mut state = self.state.lock().unwrap();
        if script.contains("Sorry, this page isn't available.") {
            return Ok(Value::Bool(!state.destination_missing));
        }
        for (key, queue) in state.eval_responses.iter_mut() {
            if script.contains(key.as_str()) {
                let value = if queue.len() > 1 {
                    queue.pop_front().unwrap_or(Value::Null)
                } else {
                    queue.front().cloned().unwrap_or(Value::Null)
                };
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }

    async fn cookies(&self) -> Result<Value> {
        self.record("cookies");
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &Value) -> Result<()> {
        self.record("set_cookies");
        self.state.lock().unwrap().cookies = cookies.clone();
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.record(format!("screenshot {}", path.display()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        Ok(())
    }
}

#[async_trait]
impl Search for MockSession {
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.record(format!("search {term}"));
        Ok(self.state.lock().unwrap().search_results.clone())
    }
}
