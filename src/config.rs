use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, JayeError};

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_catalog_timeout() -> u64 {
    30
}

fn default_max_concurrent_transforms() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub extractor: ExtractorConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP gateway to
    pub host: String,
    pub port: u16,
    /// Value of the Access-Control-Allow-Origin header
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog API (e.g. https://www.googleapis.com/youtube/v3)
    pub url: String,
    /// API key appended to every catalog request
    pub token: String,
    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding one sub-directory per video ID
    pub video_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp binary
    pub binary_path: String,
    /// Socket timeout passed to yt-dlp, in seconds
    pub socket_timeout: u32,
    /// Extra arguments appended before the URL (proxy, cookies, ...)
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Additional options for audio conversion, placed before the output
    /// Common options: ["-b:a", "192k"]
    #[serde(default)]
    pub convert_options: Vec<String>,
    /// Additional options for merging, placed before the output
    /// Common options: ["-c", "copy"]
    #[serde(default)]
    pub merge_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Use one lock for every video ID instead of one lock per ID
    #[serde(default)]
    pub serialize_all: bool,
    /// Upper bound on encoder processes running at the same time
    #[serde(default = "default_max_concurrent_transforms")]
    pub max_concurrent_transforms: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            serialize_all: false,
            max_concurrent_transforms: default_max_concurrent_transforms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log files
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                allow_origin: default_allow_origin(),
            },
            catalog: CatalogConfig {
                url: "https://www.googleapis.com/youtube/v3".to_string(),
                token: String::new(),
                timeout_seconds: default_catalog_timeout(),
            },
            cache: CacheConfig {
                video_path: PathBuf::from("videos"),
            },
            extractor: ExtractorConfig {
                binary_path: "yt-dlp".to_string(),
                socket_timeout: 30,
                extra_args: vec![],
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                convert_options: vec![],
                merge_options: vec![],
            },
            acquisition: AcquisitionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JayeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| JayeError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| JayeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| JayeError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(JayeError::Config("server.port must not be 0".to_string()));
        }
        if self.catalog.url.trim().is_empty() {
            return Err(JayeError::Config("catalog.url must be set".to_string()));
        }
        if self.extractor.binary_path.trim().is_empty() {
            return Err(JayeError::Config("extractor.binary_path must be set".to_string()));
        }
        if self.media.binary_path.trim().is_empty() {
            return Err(JayeError::Config("media.binary_path must be set".to_string()));
        }
        if self.acquisition.max_concurrent_transforms == 0 {
            return Err(JayeError::Config(
                "acquisition.max_concurrent_transforms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
