//! Read-only environment diagnostics.
//!
//! Every check is captured as a report entry; running diagnostics never
//! returns an error and never mutates a remote site.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{
    validate_site_url, AppConfig, ImageConfig, KeySource, AMBIENT_API_KEY_VAR, CLIENT_API_KEY_VAR,
};
use crate::image::{validate_api_key_syntax, ImageGenerator};
use crate::registry::SiteRegistry;
use crate::wordpress::{ClientConfig, WordPressClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckEntry {
    pub check: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<CheckEntry>,
}

impl Default for DiagnosticReport {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

impl DiagnosticReport {
    fn push(&mut self, check: impl Into<String>, status: CheckStatus, detail: impl Into<String>) {
        let entry = CheckEntry {
            check: check.into(),
            status,
            detail: detail.into(),
        };
        debug!(check = %entry.check, status = %entry.status, "{}", entry.detail);
        self.entries.push(entry);
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(CheckStatus::Fail) > 0
    }

    pub fn find(&self, check: &str) -> Option<&CheckEntry> {
        self.entries.iter().find(|e| e.check == check)
    }

    /// Human-readable report
    pub fn render_text(&self) -> String {
        let width = self.entries.iter().map(|e| e.check.chars().count()).max().unwrap_or(0);
        let mut out = format!(
            "WordPress MCP diagnostics ({})\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "[{:<4}] {:<width$}  {}",
                entry.status.to_string(),
                entry.check,
                entry.detail,
                width = width
            );
        }
        let _ = write!(
            out,
            "\n{} ok, {} warning(s), {} failure(s)",
            self.count(CheckStatus::Ok),
            self.count(CheckStatus::Warn),
            self.count(CheckStatus::Fail)
        );
        out
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Diagnostics runner for one configuration file
#[derive(Clone)]
pub struct Diagnostics {
    config_path: PathBuf,
    env: EnvLookup,
    check_network: bool,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("config_path", &self.config_path)
            .field("check_network", &self.check_network)
            .finish()
    }
}

impl Diagnostics {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            check_network: true,
        }
    }

    /// Replace the environment lookup
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Skip image API and WordPress reachability checks
    pub fn offline(mut self) -> Self {
        self.check_network = false;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub async fn run(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();
        info!(config = %self.config_path.display(), "Running diagnostics");

        report.push(
            "runtime",
            CheckStatus::Ok,
            format!(
                "wordpress-mcp-rs {} on {}/{}",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
        );

        let config = self.check_config(&mut report);
        let image_config = config.as_ref().map(|c| c.image.clone()).unwrap_or_default();
        let usable_key = self.check_api_key(&mut report, &image_config);

        if self.check_network {
            self.check_image_api(&mut report, &image_config, usable_key).await;
            if let Some(config) = &config {
                self.check_sites(&mut report, config).await;
            }
        }

        info!(
            ok = report.count(CheckStatus::Ok),
            warnings = report.count(CheckStatus::Warn),
            failures = report.count(CheckStatus::Fail),
            "Diagnostics finished"
        );
        report
    }

    fn check_config(&self, report: &mut DiagnosticReport) -> Option<AppConfig> {
        let path = self.config_path.display().to_string();
        let text = match std::fs::read_to_string(&self.config_path) {
            Ok(text) => {
                report.push("config file", CheckStatus::Ok, format!("found {}", path));
                text
            }
            Err(e) => {
                report.push(
                    "config file",
                    CheckStatus::Fail,
                    format!("cannot read {}: {} (run `generate-config` to create one)", path, e),
                );
                return None;
            }
        };

        let raw: serde_yaml_ng::Value = match serde_yaml_ng::from_str(&text) {
            Ok(raw) => {
                report.push("config parse", CheckStatus::Ok, "valid YAML");
                raw
            }
            Err(e) => {
                report.push("config parse", CheckStatus::Fail, format!("invalid YAML: {}", e));
                return None;
            }
        };

        let sites = raw
            .get("sites")
            .and_then(|s| s.as_sequence())
            .map(|s| s.as_slice())
            .unwrap_or_default();
        if sites.is_empty() {
            report.push("sites", CheckStatus::Fail, "no sites configured under `sites`");
        } else {
            report.push("sites", CheckStatus::Ok, format!("{} site(s) configured", sites.len()));
        }

        for (index, site) in sites.iter().enumerate() {
            let id = site
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index));
            let check = format!("site {} url", id);
            match site.get("url").and_then(|v| v.as_str()) {
                Some(url) => match validate_site_url(url) {
                    Ok(()) => report.push(check, CheckStatus::Ok, url),
                    Err(e) => report.push(check, CheckStatus::Fail, e),
                },
                None => report.push(check, CheckStatus::Fail, "url is missing"),
            }
        }

        match AppConfig::load(&self.config_path) {
            Ok(config) => {
                report.push("config validation", CheckStatus::Ok, "configuration is valid");
                Some(config)
            }
            Err(e) => {
                report.push("config validation", CheckStatus::Fail, e.to_string());
                None
            }
        }
    }

    /// Returns the key when it is present and well-formed
    fn check_api_key(
        &self,
        report: &mut DiagnosticReport,
        image: &ImageConfig,
    ) -> Option<(SecretString, KeySource)> {
        let env = self.env.clone();
        let resolved = image.resolve_api_key_with(|name| env(name));

        let client = (self.env)(CLIENT_API_KEY_VAR).filter(|v| !v.trim().is_empty());
        let ambient = (self.env)(AMBIENT_API_KEY_VAR).filter(|v| !v.trim().is_empty());
        if let (Some(client), Some(ambient)) = (&client, &ambient) {
            if client.trim() != ambient.trim() {
                report.push(
                    "image api key conflict",
                    CheckStatus::Warn,
                    format!(
                        "{} and {} differ; {} takes precedence",
                        CLIENT_API_KEY_VAR, AMBIENT_API_KEY_VAR, CLIENT_API_KEY_VAR
                    ),
                );
            }
        }

        let Some((key, source)) = resolved else {
            report.push(
                "image api key",
                CheckStatus::Warn,
                format!(
                    "not configured; image generation disabled (set image.api_key, {} or {})",
                    CLIENT_API_KEY_VAR, AMBIENT_API_KEY_VAR
                ),
            );
            return None;
        };

        match validate_api_key_syntax(key.expose_secret()) {
            Ok(()) => {
                report.push(
                    "image api key",
                    CheckStatus::Ok,
                    format!("{} from {}", mask_key(key.expose_secret()), source),
                );
                Some((key, source))
            }
            Err(e) => {
                report.push(
                    "image api key",
                    CheckStatus::Fail,
                    format!("{} from {} is malformed: {}", mask_key(key.expose_secret()), source, e),
                );
                None
            }
        }
    }

    async fn check_image_api(
        &self,
        report: &mut DiagnosticReport,
        image: &ImageConfig,
        key: Option<(SecretString, KeySource)>,
    ) {
        let Some((key, source)) = key else {
            report.push("image api", CheckStatus::Warn, "skipped: no usable API key");
            return;
        };
        let generator = match ImageGenerator::with_api_key(image, Some(key), Some(source)) {
            Ok(generator) => generator,
            Err(e) => {
                report.push("image api", CheckStatus::Fail, e.to_string());
                return;
            }
        };
        match generator.check_reachable().await {
            Ok(()) => report.push("image api", CheckStatus::Ok, format!("{} reachable", image.api_base)),
            Err(e) => report.push("image api", CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_sites(&self, report: &mut DiagnosticReport, config: &AppConfig) {
        let registry = match SiteRegistry::from_config(config) {
            Ok(registry) => registry,
            Err(e) => {
                report.push("wordpress", CheckStatus::Fail, e.to_string());
                return;
            }
        };
        let client = match WordPressClient::new(ClientConfig::from(&config.settings)) {
            Ok(client) => client,
            Err(e) => {
                report.push("wordpress", CheckStatus::Fail, e.to_string());
                return;
            }
        };

        for site in registry.iter() {
            let check = format!("site {} connection", site.id);
            match client.test_connection(site).await {
                Ok(info) => {
                    let mut detail = format!("connected as {}", info.user.as_deref().unwrap_or("?"));
                    if let Some(version) = &info.wp_version {
                        let _ = write!(detail, ", WordPress {}", version);
                    }
                    report.push(check, CheckStatus::Ok, detail);
                }
                Err(e) => {
                    let mut detail = e.to_string();
                    if let Some(hint) = e.diagnosis() {
                        let _ = write!(detail, " ({})", hint);
                    }
                    report.push(check, CheckStatus::Fail, detail);
                }
            }
        }
    }
}

/// `sk-a...wxyz`; short keys are fully hidden
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn config_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const VALID: &str = r#"
sites:
  - id: site1
    url: https://blog.example.com/
    username: editor
    password: "abcd efgh"
"#;

    #[tokio::test]
    async fn test_missing_config_is_reported_not_raised() {
        let report = Diagnostics::new("/nonexistent/wordpress_sites.yaml")
            .with_env(env(&[]))
            .offline()
            .run()
            .await;
        assert_eq!(report.find("runtime").unwrap().status, CheckStatus::Ok);
        assert_eq!(report.find("config file").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("image api key").unwrap().status, CheckStatus::Warn);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_valid_config_and_key() {
        let file = config_file(VALID);
        let report = Diagnostics::new(file.path())
            .with_env(env(&[(AMBIENT_API_KEY_VAR, "sk-abcdefghijklmnopqrstuvwxyz")]))
            .offline()
            .run()
            .await;
        assert_eq!(report.find("config validation").unwrap().status, CheckStatus::Ok);
        assert_eq!(report.find("site site1 url").unwrap().status, CheckStatus::Ok);
        let key = report.find("image api key").unwrap();
        assert_eq!(key.status, CheckStatus::Ok);
        assert!(!key.detail.contains("abcdefghijklmnop"));
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_bad_url_and_malformed_key() {
        let file = config_file(
            r#"
sites:
  - id: broken
    url: ftp://blog.example.com
    username: editor
    password: secret
"#,
        );
        let report = Diagnostics::new(file.path())
            .with_env(env(&[(AMBIENT_API_KEY_VAR, "not-a-key")]))
            .offline()
            .run()
            .await;
        assert_eq!(report.find("site broken url").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("config validation").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("image api key").unwrap().status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_conflicting_env_keys_warn() {
        let file = config_file(VALID);
        let report = Diagnostics::new(file.path())
            .with_env(env(&[
                (CLIENT_API_KEY_VAR, "sk-clientclientclientclient"),
                (AMBIENT_API_KEY_VAR, "sk-ambientambientambientamb"),
            ]))
            .offline()
            .run()
            .await;
        assert_eq!(
            report.find("image api key conflict").unwrap().status,
            CheckStatus::Warn
        );
        assert!(report
            .find("image api key")
            .unwrap()
            .detail
            .contains(&KeySource::ClientEnv.to_string()));
    }

    #[test]
    fn test_render_text() {
        let mut report = DiagnosticReport::default();
        report.push("runtime", CheckStatus::Ok, "fine");
        report.push("image api key", CheckStatus::Warn, "missing");
        let text = report.render_text();
        assert!(text.contains("[OK  ] runtime"));
        assert!(text.contains("1 ok, 1 warning(s), 0 failure(s)"));
    }

    #[test]
    fn test_render_text_pads_by_characters() {
        let mut report = DiagnosticReport::default();
        report.push("site café", CheckStatus::Ok, "reachable");
        report.push("site blog", CheckStatus::Ok, "reachable");
        let text = report.render_text();
        let columns: Vec<usize> = text
            .lines()
            .filter(|l| l.starts_with('['))
            .map(|l| l.chars().position(|c| c == 'r').unwrap())
            .collect();
        // "[OK  ] " + "site café" (9 chars) + two spaces
        assert_eq!(columns, vec![18, 18]);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijklmnop"), "sk-a...mnop");
        assert_eq!(mask_key("short"), "****");
    }
}
