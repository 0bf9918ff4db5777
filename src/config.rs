//! Persistent application configuration model and defaults.

use std::path::PathBuf;

use crate::protocol::ImageKind;

pub const DEFAULT_FANART_BASE_URL: &str = "http://api.fanart.tv";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote fanart service access.
    pub fanart: FanArtConfig,
    #[serde(default)]
    /// Which artist images to download and how.
    pub images: ArtistImagesConfig,
    #[serde(default)]
    /// Local storage and refresh cadence.
    pub library: LibraryConfig,
}

/// Fanart service connection settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FanArtConfig {
    /// Empty means "look in the OS keyring".
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_fanart_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
    /// Minimum spacing between requests; 0 disables spacing.
    #[serde(default)]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Per-category download toggles and limits for music artists.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ArtistImagesConfig {
    #[serde(default = "default_true")]
    pub primary: bool,
    #[serde(default = "default_true")]
    pub backdrops: bool,
    #[serde(default = "default_true")]
    pub banner: bool,
    #[serde(default = "default_true")]
    pub logo: bool,
    #[serde(default = "default_true")]
    pub art: bool,
    #[serde(default = "default_true")]
    pub download_hd: bool,
    #[serde(default = "default_max_backdrops")]
    pub max_backdrops: u32,
    /// Save images into the artist folder instead of the metadata directory.
    #[serde(default)]
    pub save_local_meta: bool,
}

/// Local data layout and refresh cadence.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    /// Empty means the platform data directory.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default = "default_metadata_refresh_days")]
    pub metadata_refresh_days: u32,
}

impl Default for FanArtConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_fanart_base_url(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            min_request_interval_ms: 0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ArtistImagesConfig {
    fn default() -> Self {
        Self {
            primary: true,
            backdrops: true,
            banner: true,
            logo: true,
            art: true,
            download_hd: true,
            max_backdrops: default_max_backdrops(),
            save_local_meta: false,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            metadata_refresh_days: default_metadata_refresh_days(),
        }
    }
}

impl ArtistImagesConfig {
    pub fn is_enabled(&self, kind: ImageKind) -> bool {
        match kind {
            ImageKind::Primary => self.primary,
            ImageKind::Backdrop => self.backdrops,
            ImageKind::Banner => self.banner,
            ImageKind::Logo => self.logo,
            ImageKind::Art => self.art,
        }
    }

    pub fn any_enabled(&self) -> bool {
        ImageKind::ALL.into_iter().any(|kind| self.is_enabled(kind))
    }
}

impl LibraryConfig {
    /// Resolves the data root, falling back to the platform data directory.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        let configured = self.data_dir.trim();
        if !configured.is_empty() {
            return Some(PathBuf::from(configured));
        }
        dirs::data_dir().map(|path| path.join("fanart-sync"))
    }
}

/// Immutable view of the settings one refresh cycle runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct FanArtSettings {
    pub api_key: String,
    pub base_url: String,
    pub images: ArtistImagesConfig,
    pub data_root: PathBuf,
    pub metadata_refresh_days: u32,
}

impl FanArtSettings {
    /// Captures the refresh-relevant parts of `config`.
    pub fn from_config(config: &Config, api_key: String, data_root: PathBuf) -> Self {
        Self {
            api_key,
            base_url: config.fanart.base_url.trim_end_matches('/').to_string(),
            images: config.images.clone(),
            data_root,
            metadata_refresh_days: config.library.metadata_refresh_days,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Clamps configuration values to supported ranges.
pub fn sanitize_config(config: Config) -> Config {
    let base_url = {
        let trimmed = config.fanart.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            default_fanart_base_url()
        } else {
            trimmed.to_string()
        }
    };

    Config {
        fanart: FanArtConfig {
            api_key: config.fanart.api_key.trim().to_string(),
            base_url,
            max_concurrent_downloads: config.fanart.max_concurrent_downloads.clamp(1, 32),
            min_request_interval_ms: config.fanart.min_request_interval_ms.min(60_000),
            request_timeout_secs: config.fanart.request_timeout_secs.clamp(1, 600),
        },
        images: ArtistImagesConfig {
            max_backdrops: config.images.max_backdrops.min(100),
            ..config.images
        },
        library: LibraryConfig {
            data_dir: config.library.data_dir.trim().to_string(),
            metadata_refresh_days: config.library.metadata_refresh_days.max(1),
        },
    }
}

fn default_true() -> bool {
    true
}

fn default_fanart_base_url() -> String {
    DEFAULT_FANART_BASE_URL.to_string()
}

fn default_max_concurrent_downloads() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_backdrops() -> u32 {
    3
}

fn default_metadata_refresh_days() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, ArtistImagesConfig, Config, FanArtConfig, FanArtSettings};
    use crate::protocol::ImageKind;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert!(config.fanart.api_key.is_empty());
        assert_eq!(config.fanart.base_url, "http://api.fanart.tv");
        assert_eq!(config.fanart.max_concurrent_downloads, 5);
        assert_eq!(config.fanart.min_request_interval_ms, 0);
        assert_eq!(config.fanart.request_timeout_secs, 30);
        assert!(config.images.primary);
        assert!(config.images.backdrops);
        assert!(config.images.banner);
        assert!(config.images.logo);
        assert!(config.images.art);
        assert!(config.images.download_hd);
        assert_eq!(config.images.max_backdrops, 3);
        assert!(!config.images.save_local_meta);
        assert!(config.library.data_dir.is_empty());
        assert_eq!(config.library.metadata_refresh_days, 30);
    }

    #[test]
    fn test_partial_config_deserialization_fills_defaults() {
        let partial_toml = r#"
[images]
logo = false
max_backdrops = 5
"#;

        let parsed: Config = toml::from_str(partial_toml).expect("config should parse");
        assert!(!parsed.images.logo);
        assert!(parsed.images.art);
        assert!(parsed.images.download_hd);
        assert_eq!(parsed.images.max_backdrops, 5);
        assert_eq!(parsed.fanart, FanArtConfig::default());
        assert_eq!(parsed.library.metadata_refresh_days, 30);
    }

    #[test]
    fn test_system_config_template_matches_default_values() {
        let parsed: Config = toml::from_str(include_str!("../config/config.system.toml"))
            .expect("system config template should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_sanitize_config_clamps_limits_and_trims_base_url() {
        let input = Config {
            fanart: FanArtConfig {
                api_key: "  key  ".to_string(),
                base_url: "http://localhost:8080/".to_string(),
                max_concurrent_downloads: 0,
                min_request_interval_ms: 600_000,
                request_timeout_secs: 0,
            },
            images: ArtistImagesConfig {
                max_backdrops: 1_000,
                ..ArtistImagesConfig::default()
            },
            ..Config::default()
        };

        let sanitized = sanitize_config(input);
        assert_eq!(sanitized.fanart.api_key, "key");
        assert_eq!(sanitized.fanart.base_url, "http://localhost:8080");
        assert_eq!(sanitized.fanart.max_concurrent_downloads, 1);
        assert_eq!(sanitized.fanart.min_request_interval_ms, 60_000);
        assert_eq!(sanitized.fanart.request_timeout_secs, 1);
        assert_eq!(sanitized.images.max_backdrops, 100);
    }

    #[test]
    fn test_sanitize_config_restores_blank_base_url() {
        let mut input = Config::default();
        input.fanart.base_url = "   ".to_string();
        assert_eq!(
            sanitize_config(input).fanart.base_url,
            "http://api.fanart.tv"
        );
    }

    #[test]
    fn test_any_enabled_is_false_only_when_every_toggle_is_off() {
        let mut images = ArtistImagesConfig {
            primary: false,
            backdrops: false,
            banner: false,
            logo: false,
            art: false,
            ..ArtistImagesConfig::default()
        };
        assert!(!images.any_enabled());

        images.banner = true;
        assert!(images.any_enabled());
        assert!(images.is_enabled(ImageKind::Banner));
        assert!(!images.is_enabled(ImageKind::Logo));
    }

    #[test]
    fn test_settings_snapshot_is_detached_from_config() {
        let mut config = Config::default();
        let settings =
            FanArtSettings::from_config(&config, "key".to_string(), PathBuf::from("/data"));
        config.images.logo = false;

        assert!(settings.images.logo);
        assert!(settings.has_api_key());
        assert_eq!(settings.data_root, PathBuf::from("/data"));
    }
}
