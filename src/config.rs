use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Where match and scrobble caches live (overrides XDG default).
    pub cache_dir: Option<PathBuf>,
    /// Scratch directory for downloaded and trimmed clips.
    pub clips_dir: Option<PathBuf>,
    /// Where the finished compilation is written.
    pub output_dir: Option<PathBuf>,
    /// Prompt for a URL when search finds nothing.
    pub manual_fallback: bool,
    pub lastfm: LastfmConfig,
    pub youtube: YouTubeConfig,
    pub clip: ClipConfig,
}

/// Last.fm API settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LastfmConfig {
    pub api_key: Option<String>,
    /// Hours a fetched month of scrobbles is reused before re-fetching.
    pub cache_ttl_hours: i64,
    /// Pause between page requests in milliseconds.
    pub rate_limit_ms: u64,
    /// Scrobbles per page (API maximum is 1000).
    pub page_size: u32,
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cache_ttl_hours: 6,
            rate_limit_ms: 500,
            page_size: 1000,
        }
    }
}

/// YouTube Data API settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub max_results: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: crate::matcher::DEFAULT_MAX_RESULTS,
        }
    }
}

/// How each song's clip is cut.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Offset into the video where the clip starts (roughly the chorus).
    pub start_secs: u64,
    pub duration_secs: u64,
    /// ffmpeg video encoder passed to `-c:v`.
    pub codec: String,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            start_secs: 60,
            duration_secs: 15,
            codec: "libx264".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/videofm/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    /// API keys from the environment override the file.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Override API keys from `LASTFM_API_KEY` / `YOUTUBE_API_KEY`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("LASTFM_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.lastfm.api_key = Some(key);
        }
        if let Some(key) = var("YOUTUBE_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.youtube.api_key = Some(key);
        }
    }

    /// Cache directory: config > XDG cache dir > `./cache`.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        match ProjectDirs::from("", "", crate::APP_NAME) {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => PathBuf::from("cache"),
        }
    }

    /// Clips directory: config > `<cache_dir>/clips`.
    pub fn resolve_clips_dir(&self, cache_dir: &std::path::Path) -> PathBuf {
        self.clips_dir.clone().unwrap_or_else(|| cache_dir.join("clips"))
    }

    pub fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
