use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration, stored as TOML under `~/.confab/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Confab home directory.
    pub confab_home: PathBuf,

    /// UI preferences.
    pub ui: UiConfig,
}

/// UI timing knobs, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Event-loop poll timeout.
    pub tick_ms: u64,
    /// How long a popup notification stays up.
    pub toast_ms: u64,
    /// Delay before redirecting home after a missing conversation.
    pub redirect_ms: u64,
    /// Layout-settle delay before the panel-open scroll.
    pub panel_scroll_ms: u64,
    /// Beat between generation completion and the title refresh.
    pub title_refresh_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            toast_ms: 5_000,
            redirect_ms: 2_000,
            panel_scroll_ms: 250,
            title_refresh_ms: 1_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Config {
            confab_home: home.join(".confab"),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.confab/config.toml`, creating the home
    /// directory and falling back to defaults when the file is absent.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let confab_home = home.join(".confab");
        fs::create_dir_all(&confab_home).context("Failed to create .confab directory")?;

        let config_path = confab_home.join("config.toml");
        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };
        config.confab_home = confab_home;
        Ok(config)
    }

    /// Save configuration to its home directory.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.confab_home).context("Failed to create .confab directory")?;
        let config_path = self.confab_home.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.confab_home.join("confab.log")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ui.tick_ms)
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.ui.toast_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.ui.redirect_ms)
    }

    pub fn panel_scroll_delay(&self) -> Duration {
        Duration::from_millis(self.ui.panel_scroll_ms)
    }

    pub fn title_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.ui.title_refresh_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_the_five_second_toast() {
        let config = Config::default();
        assert_eq!(config.toast_ttl(), Duration::from_secs(5));
        assert!(config.confab_home.ends_with(".confab"));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.confab_home = dir.path().to_path_buf();
        config.ui.toast_ms = 1_234;
        config.save().unwrap();

        let content = fs::read_to_string(dir.path().join("config.toml")).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.ui.toast_ms, 1_234);
        assert_eq!(parsed.ui.tick_ms, config.ui.tick_ms);
    }
}
