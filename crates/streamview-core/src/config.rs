//! Player tuning.
//!
//! Defaults match what works for RTSP/HTTP camera streams. Values can come from
//! a TOML file and be overridden per process with `STREAMVIEW_*` variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::options::OptionsNormalizer;
use crate::watchdog::WatchdogTiming;

const ENV_INIT_OPTIONS: &str = "STREAMVIEW_INIT_OPTIONS";
const ENV_MEDIA_OPTIONS: &str = "STREAMVIEW_MEDIA_OPTIONS";
const ENV_RESUME_CHECK_DELAY_MS: &str = "STREAMVIEW_RESUME_CHECK_DELAY_MS";
const ENV_RESUME_CHECK_DELAY_LONG_MS: &str = "STREAMVIEW_RESUME_CHECK_DELAY_LONG_MS";
const ENV_RELOAD_THRESHOLD_MS: &str = "STREAMVIEW_RELOAD_THRESHOLD_MS";
const ENV_STALE_BACKGROUND_THRESHOLD_MS: &str = "STREAMVIEW_STALE_BACKGROUND_THRESHOLD_MS";
const ENV_POST_ATTACH_PLAY_DELAY_MS: &str = "STREAMVIEW_POST_ATTACH_PLAY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Init options every session starts with
    pub default_init_options: Vec<String>,
    /// Media options every load starts with
    pub default_media_options: Vec<String>,
    pub resume_check_delay_ms: u64,
    pub resume_check_delay_long_ms: u64,
    /// Background time after which the long check delay is used
    pub reload_threshold_ms: u64,
    /// Background time after which foregrounding forces a full reload
    pub stale_background_threshold_ms: u64,
    /// Settle time between re-attaching and playing on foreground
    pub post_attach_play_delay_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_init_options: Vec::new(),
            default_media_options: vec![
                ":network-caching=200".to_string(),
                ":rtsp-caching=200".to_string(),
            ],
            resume_check_delay_ms: 400,
            resume_check_delay_long_ms: 1000,
            reload_threshold_ms: 2000,
            stale_background_threshold_ms: 3000,
            post_attach_play_delay_ms: 100,
        }
    }
}

impl PlayerConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `STREAMVIEW_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Option lists are comma separated.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_INIT_OPTIONS) {
            self.default_init_options = split_list(&v);
        }
        if let Some(v) = lookup(ENV_MEDIA_OPTIONS) {
            self.default_media_options = split_list(&v);
        }

        let millis = [
            (ENV_RESUME_CHECK_DELAY_MS, &mut self.resume_check_delay_ms),
            (ENV_RESUME_CHECK_DELAY_LONG_MS, &mut self.resume_check_delay_long_ms),
            (ENV_RELOAD_THRESHOLD_MS, &mut self.reload_threshold_ms),
            (
                ENV_STALE_BACKGROUND_THRESHOLD_MS,
                &mut self.stale_background_threshold_ms,
            ),
            (ENV_POST_ATTACH_PLAY_DELAY_MS, &mut self.post_attach_play_delay_ms),
        ];
        for (var, slot) in millis {
            if let Some(value) = lookup(var) {
                *slot = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { var, value })?;
            }
        }
        Ok(())
    }

    pub fn normalizer(&self) -> OptionsNormalizer {
        OptionsNormalizer::new(
            self.default_init_options.clone(),
            self.default_media_options.clone(),
        )
    }

    pub fn watchdog_timing(&self) -> WatchdogTiming {
        WatchdogTiming {
            check_delay: Duration::from_millis(self.resume_check_delay_ms),
            check_delay_long: Duration::from_millis(self.resume_check_delay_long_ms),
            reload_threshold: Duration::from_millis(self.reload_threshold_ms),
        }
    }

    pub fn stale_background_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_background_threshold_ms)
    }

    pub fn post_attach_play_delay(&self) -> Duration {
        Duration::from_millis(self.post_attach_play_delay_ms)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PlayerConfig::from_toml_str(
            r#"
            reload_threshold_ms = 5000
            default_init_options = ["--rtsp-tcp"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.reload_threshold_ms, 5000);
        assert_eq!(config.default_init_options, vec!["--rtsp-tcp".to_string()]);
        assert_eq!(config.resume_check_delay_ms, 400);
        assert_eq!(config.default_media_options.len(), 2);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(matches!(
            PlayerConfig::from_toml_str("reload_threshold_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STREAMVIEW_MEDIA_OPTIONS", ":network-caching=1000, :no-audio"),
            ("STREAMVIEW_POST_ATTACH_PLAY_DELAY_MS", " 250 "),
        ]);
        let mut config = PlayerConfig::default();
        config
            .apply_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(
            config.default_media_options,
            vec![":network-caching=1000".to_string(), ":no-audio".to_string()]
        );
        assert_eq!(config.post_attach_play_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = PlayerConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == ENV_RELOAD_THRESHOLD_MS).then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_RELOAD_THRESHOLD_MS, .. }
        ));
    }
}
