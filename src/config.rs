//! Client configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file) is a working configuration. CLI flags are applied on top by the
//! binary before [`ClientConfig::validate`] runs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

/// Element ids of the page's fixed containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub content: String,
    pub banner: String,
    pub detail_banner: String,
    pub dialog: String,
    pub gray_screen: String,
    pub filter: String,
    pub teaser: String,
    /// The scrolling message feed; created inside `content` on first load.
    pub feed: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            content: "content_container".into(),
            banner: "banner_container".into(),
            detail_banner: "detail_banner_container".into(),
            dialog: "dialog_container".into(),
            gray_screen: "gray_screen".into(),
            filter: "filter_container".into(),
            teaser: "teaser_container".into(),
            feed: "messages".into(),
        }
    }
}

impl Layout {
    /// Containers that exist for the whole life of the page.
    pub fn root_containers(&self) -> [&str; 7] {
        [
            self.content.as_str(),
            self.banner.as_str(),
            self.detail_banner.as_str(),
            self.dialog.as_str(),
            self.gray_screen.as_str(),
            self.filter.as_str(),
            self.teaser.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub server_url: String,
    pub heartbeat_interval_ms: u64,
    pub autosave_interval_ms: u64,
    /// Delay between showing the stash notice and removing the element.
    pub stash_removal_delay_ms: u64,
    /// Length of the stash notice fade-out; the removal must land before it ends.
    pub stash_fade_duration_ms: u64,
    /// Pause before reconnecting after a reload.
    pub reload_delay_ms: u64,
    /// Distance from a feed edge that counts as touching the boundary.
    pub boundary_threshold_px: f64,
    pub viewport_height_px: f64,
    pub row_height_px: f64,
    pub initial_filter: Option<String>,
    pub log_level: String,
    pub stash_notice: String,
    pub layout: Layout,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".into(),
            heartbeat_interval_ms: 10_000,
            autosave_interval_ms: 2_000,
            stash_removal_delay_ms: 1_500,
            stash_fade_duration_ms: 2_000,
            reload_delay_ms: 1_000,
            boundary_threshold_px: 4.0,
            viewport_height_px: 600.0,
            row_height_px: 48.0,
            initial_filter: None,
            log_level: "info".into(),
            stash_notice: "<span class=\"stashed_notice\">stashed</span>".into(),
            layout: Layout::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FeedError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(FeedError::Config("heartbeat_interval_ms must be > 0".into()));
        }
        if self.autosave_interval_ms == 0 {
            return Err(FeedError::Config("autosave_interval_ms must be > 0".into()));
        }
        if self.stash_removal_delay_ms >= self.stash_fade_duration_ms {
            return Err(FeedError::Config(format!(
                "stash_removal_delay_ms ({}) must be shorter than stash_fade_duration_ms ({})",
                self.stash_removal_delay_ms, self.stash_fade_duration_ms
            )));
        }
        if self.row_height_px <= 0.0 || self.viewport_height_px <= 0.0 {
            return Err(FeedError::Config("row and viewport heights must be positive".into()));
        }
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(FeedError::Config(format!(
                "server_url must be a ws:// or wss:// url, got '{}'",
                self.server_url
            )));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    pub fn stash_removal_delay(&self) -> Duration {
        Duration::from_millis(self.stash_removal_delay_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }
}
