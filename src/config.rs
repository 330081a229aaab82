use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Site root, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Accept-Language header value for the automation page.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Pause between two queued operations.
    #[serde(default = "default_queue_tick_ms")]
    pub queue_tick_ms: u64,
    /// Pause before each scroll-and-extract pass, letting rendering catch up.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after a navigation or click that swaps page content.
    #[serde(default = "default_nav_delay_ms")]
    pub nav_delay_ms: u64,
    /// Scroll increment per list-loading pass, in pixels.
    #[serde(default = "default_scroll_step")]
    pub scroll_step: i64,
    /// Safety bound on list-loading passes.
    #[serde(default = "default_max_scroll_iterations")]
    pub max_scroll_iterations: u32,
    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://www.instagram.com".to_owned()
}

fn default_language() -> String {
    "en".to_owned()
}

fn default_headless() -> bool {
    true
}

fn default_queue_tick_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_nav_delay_ms() -> u64 {
    3_000
}

fn default_scroll_step() -> i64 {
    500
}

fn default_max_scroll_iterations() -> u32 {
    150
}

fn default_selector_timeout_ms() -> u64 {
    10_000
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            headless: default_headless(),
            queue_tick_ms: default_queue_tick_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            nav_delay_ms: default_nav_delay_ms(),
            scroll_step: default_scroll_step(),
            max_scroll_iterations: default_max_scroll_iterations(),
            selector_timeout_ms: default_selector_timeout_ms(),
        }
    }
}

impl BotConfig {
    pub fn queue_tick(&self) -> Duration {
        Duration::from_millis(self.queue_tick_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn nav_delay(&self) -> Duration {
        Duration::from_millis(self.nav_delay_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/grambot/config.toml"))
}

pub fn load_config() -> BotConfig {
    let Some(path) = config_path() else {
        return BotConfig::default();
    };

    let Ok(contents) = fs::read_to_string(&path) else {
        return BotConfig::default();
    };

    toml::from_str(&contents).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.base_url, "https://www.instagram.com");
        assert_eq!(config.queue_tick(), Duration::from_secs(1));
        assert!(config.headless);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: BotConfig = toml::from_str("base_url = \"https://example.test\"").unwrap();
        assert_eq!(config.base_url, "https://example.test");
        assert_eq!(config.scroll_step, 500);
        assert_eq!(config.max_scroll_iterations, 150);
    }
}
