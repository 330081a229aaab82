//! Incremental-scroll list loading: harvest a duplicate-free, target-length
//! result set from a virtualized list of unknown true length.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::Result;
use crate::session::Session;

/// Tuning for the scroll-and-extract loop.
#[derive(Debug, Clone, Copy)]
pub struct LoaderSettings {
    /// Pause before each pass, letting rendering catch up.
    pub settle_delay: Duration,
    /// Scroll increment per pass, in pixels.
    pub scroll_step: i64,
    /// Hard bound on passes, against lists that never stabilize.
    pub max_iterations: u32,
}

impl From<&BotConfig> for LoaderSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            scroll_step: config.scroll_step,
            max_iterations: config.max_scroll_iterations,
        }
    }
}

/// Load at least `min_count` unique items from an infinite-scroll list.
///
/// Each pass: settle, scroll the anchor (or the document) by a fixed
/// increment, run `extract` against the rendered content, and merge the
/// batch into the accumulated sequence in first-seen order, dropping every
/// candidate `is_same` reports as already present. The load ends when the
/// scroll offset stops moving (list exhausted — the result may be shorter
/// than `min_count`), when `min_count` is reached, or at the iteration cap.
///
/// `min_count == 0` returns after a single extraction pass without
/// scrolling. An `extract` failure aborts the load and propagates.
pub async fn load<S, T, E, Fut, C>(
    session: &S,
    anchor: Option<&str>,
    mut extract: E,
    is_same: C,
    min_count: usize,
    settings: LoaderSettings,
) -> Result<Vec<T>>
where
    S: Session + ?Sized,
    E: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    C: Fn(&[T], &T) -> bool,
{
    let mut items: Vec<T> = Vec::new();

    if min_count == 0 {
        tokio::time::sleep(settings.settle_delay).await;
        merge(&mut items, extract().await?, &is_same);
        return Ok(items);
    }

    let mut last_offset: Option<f64> = None;

    for iteration in 0..settings.max_iterations {
        tokio::time::sleep(settings.settle_delay).await;
        session.scroll_by(anchor, settings.scroll_step).await?;

        merge(&mut items, extract().await?, &is_same);

        let offset = session.scroll_top(anchor).await?;
        if last_offset == Some(offset) {
            debug!(iteration, count = items.len(), "scroll offset stalled, list exhausted");
            return Ok(items);
        }
        last_offset = Some(offset);

        if items.len() >= min_count {
            return Ok(items);
        }
    }

    warn!(
        count = items.len(),
        min_count, "list loading hit the iteration cap"
    );
    Ok(items)
}

/// Append every candidate not already present, preserving first-seen order.
fn merge<T, C>(items: &mut Vec<T>, batch: Vec<T>, is_same: &C)
where
    C: Fn(&[T], &T) -> bool,
{
    for candidate in batch {
        if !is_same(items, &candidate) {
            items.push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{AutomationError, Error};
    use crate::session::mock::MockSession;

    fn fast_settings() -> LoaderSettings {
        LoaderSettings {
            settle_delay: Duration::ZERO,
            scroll_step: 500,
            max_iterations: 150,
        }
    }

    fn same_str(items: &[String], candidate: &String) -> bool {
        items.contains(candidate)
    }

    fn frames(frames: &[&[&str]]) -> Vec<Vec<String>> {
        frames
            .iter()
            .map(|frame| frame.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    /// Extraction closure replaying canned frames; the last frame repeats.
    fn replay(
        frames: Vec<Vec<String>>,
    ) -> impl FnMut() -> futures::future::Ready<Result<Vec<String>>> {
        let calls = AtomicUsize::new(0);
        move || {
            let i = calls.fetch_add(1, Ordering::SeqCst).min(frames.len() - 1);
            futures::future::ready(Ok(frames[i].clone()))
        }
    }

    #[tokio::test]
    async fn test_returns_once_min_count_unique_items_are_loaded() {
        let session = MockSession::new();
        session.set_scroll_offsets(vec![100.0, 200.0, 300.0, 400.0]);

        let extract = replay(frames(&[&["a", "b"], &["b", "c"], &["c", "d"]]));
        let items = load(&session, Some(".list"), extract, same_str, 4, fast_settings())
            .await
            .unwrap();

        assert_eq!(items, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_result_has_no_duplicates_and_keeps_first_seen_order() {
        let session = MockSession::new();
        session.set_scroll_offsets(vec![100.0, 200.0, 300.0]);

        let extract = replay(frames(&[&["a", "b", "a"], &["b", "a", "c"]]));
        let items = load(&session, None, extract, same_str, 3, fast_settings())
            .await
            .unwrap();

        assert_eq!(items, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stalled_offset_returns_short_result() {
        let session = MockSession::new();
        // Offset advances once, then stalls on the third pass.
        session.set_scroll_offsets(vec![100.0, 200.0, 200.0]);

        let extract = replay(frames(&[&["a", "b", "c"], &["a", "d"], &[]]));
        let items = load(&session, Some(".list"), extract, same_str, 10, fast_settings())
            .await
            .unwrap();

        assert_eq!(items, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_min_count_zero_extracts_once_without_scrolling() {
        let session = MockSession::new();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let extract = move || {
            counted.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(vec!["a".to_string()]))
        };

        let items = load(&session, Some(".list"), extract, same_str, 0, fast_settings())
            .await
            .unwrap();

        assert_eq!(items, vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.calls_named("scroll_by"), 0);
    }

    #[tokio::test]
    async fn test_extract_failure_aborts_and_propagates() {
        let session = MockSession::new();
        session.set_scroll_offsets(vec![100.0, 200.0, 300.0]);

        let extract = || {
            futures::future::ready(Err::<Vec<String>, _>(Error::Automation(
                AutomationError::Evaluate("boom".into()),
            )))
        };

        let result = load(&session, None, extract, same_str, 5, fast_settings()).await;
        assert!(matches!(
            result,
            Err(Error::Automation(AutomationError::Evaluate(_)))
        ));
    }

    #[tokio::test]
    async fn test_iteration_cap_bounds_a_list_that_never_stabilizes() {
        let session = MockSession::new();
        // Offsets strictly increase forever.
        session.set_scroll_offset_step(50.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let extract = move || {
            let i = counted.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(vec![format!("item-{i}"), format!("item-{i}")]))
        };

        let settings = LoaderSettings {
            max_iterations: 10,
            ..fast_settings()
        };
        // Every pass yields one new unique item, so min_count 100 is never
        // reached and the offset never stalls.
        let items = load(&session, Some(".list"), extract, same_str, 100, settings)
            .await
            .unwrap();

        assert_eq!(items.len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
