use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

const ENV_API_BASE: &str = "DONTLAUGH_API_BASE";
const ENV_CLASSIFIER_URL: &str = "DONTLAUGH_CLASSIFIER_URL";
const ENV_DEBUG: &str = "DONTLAUGH_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChallengeConfig {
    pub initial_lives: u32,
    pub countdown_secs: u32,
    pub capture_limit: usize,
    pub sample_interval_ms: u64,
    pub cooldown_ms: u64,
    pub frame_size: u32,
    pub video_cue_delay_ms: u64,
    pub video_cue_url: String,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            initial_lives: 4,
            countdown_secs: 180,
            capture_limit: 4,
            sample_interval_ms: 200,
            cooldown_ms: 600,
            frame_size: 640,
            video_cue_delay_ms: 200,
            video_cue_url:
                "https://www.youtube.com/embed/kRGYSo4fV2M?autoplay=1&controls=0&modestbranding=1&rel=0"
                    .into(),
        }
    }
}

impl ChallengeConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn video_cue_delay(&self) -> Duration {
        Duration::from_millis(self.video_cue_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub event_timeout_ms: u64,
    pub tag_timeout_ms: u64,
    pub first_event_index: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            event_timeout_ms: 20_000,
            tag_timeout_ms: 40_000,
            first_event_index: 1,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn tag_timeout(&self) -> Duration {
        Duration::from_millis(self.tag_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Gateway serving laugh events, photos and recommendations.
    pub api_base: String,
    pub classifier_url: String,
    pub request_timeout_ms: u64,
    /// Emit a log line on every countdown tick.
    pub debug: bool,
    pub challenge: ChallengeConfig,
    pub poller: PollerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5001".into(),
            classifier_url: "http://localhost:8000".into(),
            request_timeout_ms: 10_000,
            debug: false,
            challenge: ChallengeConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config at {}", path.display()))?
            }
            _ => AppConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api_base = base;
        }
        if let Some(url) = lookup(ENV_CLASSIFIER_URL).filter(|v| !v.trim().is_empty()) {
            self.classifier_url = url;
        }
        if let Some(flag) = lookup(ENV_DEBUG) {
            self.debug = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
