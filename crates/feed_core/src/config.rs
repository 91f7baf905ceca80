use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "feed.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub confirmation_delay_ms: u64,
    pub publish_delay_ms: u64,
    pub share_base_url: String,
    pub share_title: String,
    pub session_timeout_secs: u64,
    pub exit_delay_ms: u64,
    pub backend_url: Option<String>,
    pub caption_max_chars: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            confirmation_delay_ms: 1000,
            publish_delay_ms: 2000,
            share_base_url: "https://yourapp.com/post/".into(),
            share_title: "Matrix Media Post".into(),
            session_timeout_secs: 2 * 60 * 60,
            exit_delay_ms: 1000,
            backend_url: None,
            caption_max_chars: 500,
        }
    }
}

impl FeedSettings {
    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn exit_delay(&self) -> Duration {
        Duration::from_millis(self.exit_delay_ms)
    }

    /// Base URL for post links, normalized to end with a slash so ids join as a path segment.
    pub fn share_base(&self) -> anyhow::Result<Url> {
        let mut raw = self.share_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("invalid share base url '{raw}'"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    confirmation_delay_ms: Option<u64>,
    publish_delay_ms: Option<u64>,
    share_base_url: Option<String>,
    share_title: Option<String>,
    session_timeout_secs: Option<u64>,
    exit_delay_ms: Option<u64>,
    backend_url: Option<String>,
    caption_max_chars: Option<usize>,
}

pub fn load_settings() -> FeedSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> FeedSettings {
    let mut settings = FeedSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring malformed settings file"),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut FeedSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.confirmation_delay_ms {
        settings.confirmation_delay_ms = v;
    }
    if let Some(v) = file_cfg.publish_delay_ms {
        settings.publish_delay_ms = v;
    }
    if let Some(v) = file_cfg.share_base_url {
        settings.share_base_url = v;
    }
    if let Some(v) = file_cfg.share_title {
        settings.share_title = v;
    }
    if let Some(v) = file_cfg.session_timeout_secs {
        settings.session_timeout_secs = v;
    }
    if let Some(v) = file_cfg.exit_delay_ms {
        settings.exit_delay_ms = v;
    }
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = Some(v);
    }
    if let Some(v) = file_cfg.caption_max_chars {
        settings.caption_max_chars = v;
    }
}

/// `FEED_*` first, then `APP__*`, so the `APP__` form wins when both are set.
fn apply_env_overrides(settings: &mut FeedSettings, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| {
        lookup(&format!("APP__{name}")).or_else(|| lookup(&format!("FEED_{name}")))
    };

    if let Some(v) = get("CONFIRMATION_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.confirmation_delay_ms = v;
    }
    if let Some(v) = get("PUBLISH_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.publish_delay_ms = v;
    }
    if let Some(v) = get("SHARE_BASE_URL") {
        settings.share_base_url = v;
    }
    if let Some(v) = get("SHARE_TITLE") {
        settings.share_title = v;
    }
    if let Some(v) = get("SESSION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.session_timeout_secs = v;
    }
    if let Some(v) = get("EXIT_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.exit_delay_ms = v;
    }
    if let Some(v) = get("BACKEND_URL") {
        settings.backend_url = Some(v).filter(|v| !v.trim().is_empty());
    }
    if let Some(v) = get("CAPTION_MAX_CHARS").and_then(|v| v.parse().ok()) {
        settings.caption_max_chars = v;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn defaults_match_demo_timings() {
        let settings = FeedSettings::default();
        assert_eq!(settings.confirmation_delay(), Duration::from_secs(1));
        assert_eq!(settings.publish_delay(), Duration::from_secs(2));
        assert_eq!(settings.session_timeout(), Duration::from_secs(7200));
        assert_eq!(settings.caption_max_chars, 500);
    }

    #[test]
    fn share_base_gets_trailing_slash() {
        let settings = FeedSettings {
            share_base_url: "https://example.com/p".into(),
            ..FeedSettings::default()
        };
        let base = settings.share_base().expect("base");
        assert_eq!(base.as_str(), "https://example.com/p/");
    }

    #[test]
    fn reads_partial_settings_file() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let temp_root = env::temp_dir().join(format!("feed_core_config_test_{suffix}"));
        fs::create_dir_all(&temp_root).expect("temp root");
        let path = temp_root.join("feed.toml");
        fs::write(
            &path,
            "confirmation_delay_ms = 250\nshare_title = \"Shared post\"\n",
        )
        .expect("write settings");

        let settings = load_settings_from(&path);
        assert_eq!(settings.confirmation_delay_ms, 250);
        assert_eq!(settings.share_title, "Shared post");
        assert_eq!(settings.publish_delay_ms, 2000);

        fs::remove_dir_all(temp_root).expect("cleanup");
    }

    #[test]
    fn app_prefixed_env_wins_over_feed_prefix() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FEED_CONFIRMATION_DELAY_MS", "10"),
            ("APP__CONFIRMATION_DELAY_MS", "20"),
            ("FEED_BACKEND_URL", "http://127.0.0.1:9000"),
            ("FEED_EXIT_DELAY_MS", "not-a-number"),
        ]);
        let mut settings = FeedSettings::default();
        apply_env_overrides(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.confirmation_delay_ms, 20);
        assert_eq!(
            settings.backend_url.as_deref(),
            Some("http://127.0.0.1:9000")
        );
        assert_eq!(settings.exit_delay_ms, 1000);
    }
}
