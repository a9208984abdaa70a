//! Configuration management for waylite.
//!
//! Uses figment to merge configuration from multiple sources:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. Command-line arguments

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use waylite_client::ClientConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Window and session parameters
    #[serde(default)]
    pub client: ClientConfig,

    /// Demo scene parameters
    #[serde(default)]
    pub scene: SceneConfig,
}

/// What the demo draws
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Number of bouncing rectangles
    #[serde(default = "default_entities")]
    pub entities: usize,

    /// Speed in pixels per second
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Background color as 0xAARRGGBB
    #[serde(default = "default_background")]
    pub background: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_entities() -> usize {
    5
}

fn default_speed() -> f64 {
    120.0
}

fn default_background() -> u32 {
    0xff1e_1e2e
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client: ClientConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            entities: default_entities(),
            speed: default_speed(),
            background: default_background(),
        }
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("waylite/config.toml")
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(config_file).extract()
    }

    fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Add config file if provided
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        } else {
            let path = default_config_path();
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // Environment variables (WAYLITE_ prefix, `__` between sections)
        figment.merge(Env::prefixed("WAYLITE_").split("__"))
    }

    /// Override log level from CLI
    pub fn with_log_level(mut self, log_level: Option<String>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        self
    }

    /// Override window parameters from CLI
    pub fn with_window(
        mut self,
        title: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        buffers: Option<usize>,
        bare: bool,
    ) -> Self {
        if let Some(title) = title {
            self.client.title = title;
        }
        if let Some(width) = width {
            self.client.width = width;
        }
        if let Some(height) = height {
            self.client.height = height;
        }
        if let Some(buffers) = buffers {
            self.client.buffer_count = buffers;
        }
        if bare {
            self.client.window_shell = false;
            self.client
                .required_globals
                .retain(|iface| *iface != waylite_client::Interface::XdgWmBase);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waylite_client::{Interface, ShmFormat};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.scene.entities, 5);
        assert_eq!(config.client.width, 640);
        assert!(config.client.window_shell);
    }

    #[test]
    fn test_config_override_log_level() {
        let config = Config::default().with_log_level(Some("debug".to_string()));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_config_override_window() {
        let config = Config::default().with_window(Some("t".into()), Some(100), None, Some(3), true);
        assert_eq!(config.client.title, "t");
        assert_eq!(config.client.width, 100);
        assert_eq!(config.client.height, 480);
        assert_eq!(config.client.buffer_count, 3);
        assert!(!config.client.window_shell);
        assert!(!config.client.required_globals.contains(&Interface::XdgWmBase));
    }

    #[test]
    fn test_load_from_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "waylite.toml",
                r#"
                log_level = "warn"

                [client]
                title = "from file"
                width = 800
                format = "xrgb8888"
                required_globals = ["wl_compositor", "wl_shm"]

                [scene]
                entities = 2
                "#,
            )?;
            jail.set_env("WAYLITE_CLIENT__HEIGHT", "300");
            jail.set_env("WAYLITE_SCENE__SPEED", "10.5");

            let config = Config::load(Some(Path::new("waylite.toml")))?;
            assert_eq!(config.log_level, "warn");
            assert_eq!(config.client.title, "from file");
            assert_eq!(config.client.width, 800);
            assert_eq!(config.client.height, 300);
            assert_eq!(config.client.format, ShmFormat::Xrgb8888);
            assert_eq!(
                config.client.required_globals,
                vec![Interface::Compositor, Interface::Shm]
            );
            assert_eq!(config.scene.entities, 2);
            assert_eq!(config.scene.speed, 10.5);
            assert_eq!(config.client.buffer_count, 2);
            Ok(())
        });
    }
}
