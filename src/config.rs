use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::wordpress::PostStatus;

/// Default location of the site list, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/wordpress_sites.yaml";

/// Assistant-client scoped image API key. Overrides the ambient `OPENAI_API_KEY`.
pub const CLIENT_API_KEY_VAR: &str = "WP_MCP_OPENAI_API_KEY";

/// Ambient image API key from the process environment
pub const AMBIENT_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Top-level configuration, validated once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path the configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One WordPress site record
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    pub username: String,
    /// Application Password
    pub password: SecretString,
}

/// Default publishing and HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_post_status")]
    pub default_post_status: PostStatus,
    #[serde(default = "default_post_format")]
    pub default_post_format: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Image generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default)]
    pub quality: ImageQuality,
    #[serde(default = "default_image_api_base")]
    pub api_base: String,
    /// Deployment-supplied key; takes precedence over every environment variable
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Image API timeout in seconds
    #[serde(default = "default_image_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }
}

/// Where the image API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    ConfigFile,
    ClientEnv,
    ProcessEnv,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::ConfigFile => write!(f, "config file (image.api_key)"),
            KeySource::ClientEnv => write!(f, "{}", CLIENT_API_KEY_VAR),
            KeySource::ProcessEnv => write!(f, "{}", AMBIENT_API_KEY_VAR),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for a daily-rotated log file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

fn default_post_status() -> PostStatus {
    PostStatus::Draft
}

fn default_post_format() -> String {
    "standard".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_image_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_post_status: default_post_status(),
            default_post_format: default_post_format(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout: default_timeout(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            size: default_image_size(),
            quality: ImageQuality::default(),
            api_base: default_image_api_base(),
            api_key: None,
            timeout: default_image_timeout(),
        }
    }
}

impl ImageConfig {
    /// Resolve the API key from the config file and the process environment
    pub fn resolve_api_key(&self) -> Option<(SecretString, KeySource)> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key with a custom environment lookup.
    ///
    /// Precedence: `image.api_key`, then the client-scoped variable, then the
    /// ambient `OPENAI_API_KEY`. Blank values are ignored.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<(SecretString, KeySource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = &self.api_key {
            if !key.expose_secret().trim().is_empty() {
                return Some((key.clone(), KeySource::ConfigFile));
            }
        }

        [
            (CLIENT_API_KEY_VAR, KeySource::ClientEnv),
            (AMBIENT_API_KEY_VAR, KeySource::ProcessEnv),
        ]
        .into_iter()
        .find_map(|(var, source)| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (SecretString::new(v.into_boxed_str()), source))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply `WP_MCP_*` overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let path_str = path.to_string_lossy();
        let settings = Config::builder()
            .add_source(File::new(&path_str, FileFormat::Yaml).required(true))
            .add_source(
                Environment::with_prefix("WP_MCP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        config.source = Some(path.to_path_buf());
        config.validate()?;

        info!(
            "Loaded {} WordPress site(s) from {}",
            config.sites.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse configuration from a YAML string without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let mut config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate once; normalizes site URLs (no trailing slash) and names
    pub fn validate(&mut self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(Error::Configuration(
                "at least one site must be configured under `sites`".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for (index, site) in self.sites.iter_mut().enumerate() {
            site.id = site.id.trim().to_string();
            if site.id.is_empty() {
                return Err(Error::Configuration(format!("sites[{}]: id is empty", index)));
            }
            if !seen.insert(site.id.clone()) {
                return Err(Error::Configuration(format!(
                    "sites[{}]: duplicate site id '{}'",
                    index, site.id
                )));
            }
            validate_site_url(&site.url)
                .map_err(|e| Error::Configuration(format!("site '{}': {}", site.id, e)))?;
            site.url = site.url.trim().trim_end_matches('/').to_string();
            if site.username.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "site '{}': username is empty",
                    site.id
                )));
            }
            if site.password.expose_secret().trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "site '{}': password is empty",
                    site.id
                )));
            }
            if site.name.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                site.name = Some(site.id.clone());
            }
            debug!("Validated site '{}' ({})", site.id, site.url);
        }

        if self.settings.timeout == 0 {
            return Err(Error::Configuration(
                "settings.timeout must be greater than zero".to_string(),
            ));
        }
        if self.settings.max_retries > 10 {
            return Err(Error::Configuration(format!(
                "settings.max_retries must be at most 10 (got {})",
                self.settings.max_retries
            )));
        }
        if self.settings.default_post_format.trim().is_empty() {
            return Err(Error::Configuration(
                "settings.default_post_format is empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Write an annotated sample configuration file
    pub fn generate_sample_config(path: &Path) -> Result<()> {
        let sample = serde_json::json!({
            "sites": [
                {
                    "id": "site1",
                    "name": "My Blog",
                    "url": "https://your-wordpress-site.com",
                    "username": "your_username",
                    "password": "xxxx xxxx xxxx xxxx xxxx xxxx"
                }
            ],
            "settings": Settings::default(),
            "image": {
                "model": default_image_model(),
                "size": default_image_size(),
                "quality": ImageQuality::default(),
                "api_base": default_image_api_base(),
                "timeout": default_image_timeout()
            },
            "logging": {
                "level": default_log_level(),
                "format": "plain"
            }
        });

        let yaml = serde_yaml_ng::to_string(&sample)
            .map_err(|e| Error::Configuration(format!("failed to render sample config: {}", e)))?;

        let content = format!(
            r#"# wordpress-mcp-rs configuration
#
# Environment overrides use the WP_MCP_ prefix and `__` as the separator,
# e.g. WP_MCP_SETTINGS__TIMEOUT=10
#
# Image API key precedence:
#   1. image.api_key in this file
#   2. {client} (set it in the assistant client's server entry)
#   3. {ambient}
#
# Application Password:
#   WordPress admin > Users > Profile > Application Passwords

{yaml}"#,
            client = CLIENT_API_KEY_VAR,
            ambient = AMBIENT_API_KEY_VAR,
            yaml = yaml
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        info!("Sample configuration written to {}", path.display());
        Ok(())
    }
}

/// Check that a site URL is absolute http(s) with a host
pub fn validate_site_url(raw: &str) -> std::result::Result<(), String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("invalid url '{}': {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported url scheme '{}'", other)),
    }
    if parsed.host_str().is_none() {
        return Err(format!("url '{}' has no host", raw));
    }
    Ok(())
}
