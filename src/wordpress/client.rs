use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{
    ConnectionInfo, CreatedPost, MediaItem, MediaMetadata, NewPost, StoredPost, TaxonomyKind,
    Term, WpErrorBody,
};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::registry::Site;

/// HTTP behaviour injected into [`WordPressClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Retries after the first attempt, for idempotent reads only
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * n`
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ClientConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            timeout: settings.timeout(),
            connect_timeout: Duration::from_secs(10).min(settings.timeout()),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
        }
    }
}

/// Which write produced a failure, for error classification
#[derive(Debug, Clone, Copy)]
enum Operation {
    Read,
    Taxonomy,
    Upload,
    Publish,
}

/// Client for the `wp/v2` REST API, shared across sites
#[derive(Debug, Clone)]
pub struct WordPressClient {
    client: Client,
    config: ClientConfig,
}

impl WordPressClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("wordpress-mcp-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authed(&self, request: RequestBuilder, site: &Site) -> RequestBuilder {
        request.basic_auth(
            &site.username,
            Some(site.application_password.expose_secret()),
        )
    }

    /// GET with retry on timeouts, connection failures, 429 and 5xx
    async fn get_with_retry<T>(&self, site: &Site, url: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            let request = self.authed(self.client.get(url).query(query), site);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(text) => {
                                return serde_json::from_str::<T>(&text).map_err(|e| {
                                    Error::RemoteApi {
                                        status: status.as_u16(),
                                        message: format!("unexpected response body: {}", e),
                                    }
                                });
                            }
                            Err(e) if attempt < attempts => {
                                warn!(site = %site.id, attempt, "Reading body from {} failed: {}, retrying", url, e);
                            }
                            Err(e) => return Err(Error::from_transport(e)),
                        }
                        tokio::time::sleep(self.config.retry_delay * attempt).await;
                        continue;
                    }

                    let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if retryable && attempt < attempts {
                        warn!(site = %site.id, attempt, "HTTP {} from {}, retrying", status, url);
                    } else {
                        return Err(classify_failure(response, Operation::Read).await);
                    }
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if retryable && attempt < attempts {
                        warn!(site = %site.id, attempt, "Request to {} failed: {}, retrying", url, e);
                    } else {
                        return Err(Error::from_transport(e));
                    }
                }
            }

            tokio::time::sleep(self.config.retry_delay * attempt).await;
        }

        Err(Error::Network(format!("{} failed after {} attempts", url, attempts)))
    }

    /// Single attempt; writes are never retried to avoid duplicate posts and media
    async fn send_once(&self, request: RequestBuilder, operation: Operation) -> Result<Response> {
        let response = request.send().await.map_err(Error::from_transport)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_failure(response, operation).await)
        }
    }

    /// Verify credentials and reachability
    pub async fn test_connection(&self, site: &Site) -> Result<ConnectionInfo> {
        info!(site = %site.id, "Testing connection to {}", site.url);

        let me: serde_json::Value = self
            .get_with_retry(site, &format!("{}/users/me", site.api_base()), &[])
            .await?;
        let user = me.get("name").and_then(|v| v.as_str()).map(str::to_string);

        let site_name = match self.client.get(format!("{}/wp-json/", site.url)).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string)),
            _ => None,
        };

        let wp_version = self.detect_version(site).await;

        Ok(ConnectionInfo {
            reachable: true,
            wp_version,
            site_name,
            user,
        })
    }

    /// Best effort: the RSS feed's `<generator>` carries `?v=X.Y.Z`
    async fn detect_version(&self, site: &Site) -> Option<String> {
        let response = self.client.get(format!("{}/feed/", site.url)).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        parse_generator_version(&body)
    }

    pub async fn list_categories(&self, site: &Site) -> Result<Vec<Term>> {
        self.list_terms(site, TaxonomyKind::Category).await
    }

    pub async fn list_tags(&self, site: &Site) -> Result<Vec<Term>> {
        self.list_terms(site, TaxonomyKind::Tag).await
    }

    pub async fn list_terms(&self, site: &Site, kind: TaxonomyKind) -> Result<Vec<Term>> {
        let url = format!("{}/{}", site.api_base(), kind.endpoint());
        let query = [
            ("per_page", "100".to_string()),
            ("orderby", "name".to_string()),
            ("order", "asc".to_string()),
        ];
        let terms: Vec<Term> = self.get_with_retry(site, &url, &query).await?;
        debug!(site = %site.id, "Fetched {} {} terms", terms.len(), kind.label());
        Ok(terms)
    }

    /// Exact, case-insensitive lookup through the `search` filter
    pub async fn find_term(&self, site: &Site, kind: TaxonomyKind, name: &str) -> Result<Option<Term>> {
        let url = format!("{}/{}", site.api_base(), kind.endpoint());
        let query = [("search", name.to_string()), ("per_page", "100".to_string())];
        let candidates: Vec<Term> = self.get_with_retry(site, &url, &query).await?;
        Ok(exact_match(candidates, name))
    }

    pub async fn create_term(&self, site: &Site, kind: TaxonomyKind, name: &str) -> Result<Term> {
        let url = format!("{}/{}", site.api_base(), kind.endpoint());
        let request = self.authed(
            self.client.post(&url).json(&serde_json::json!({ "name": name })),
            site,
        );

        let response = request.send().await.map_err(Error::from_transport)?;
        let status = response.status();
        if status.is_success() {
            let term: Term = response.json().await.map_err(Error::from_transport)?;
            info!(site = %site.id, "Created {} '{}' (ID: {})", kind.label(), term.name, term.id);
            return Ok(term);
        }

        // A concurrent writer may have created it between lookup and create
        let body = response.text().await.unwrap_or_default();
        if let Some(term_id) = existing_term_id(&body) {
            info!(site = %site.id, "{} '{}' already exists (ID: {})", kind.label(), name, term_id);
            return Ok(Term {
                id: term_id,
                name: name.to_string(),
                slug: String::new(),
                count: 0,
            });
        }
        Err(failure_from_body(status, &body, Operation::Taxonomy))
    }

    /// Resolve names to term ids, creating missing terms.
    ///
    /// Lookup always precedes create, so repeated calls never duplicate terms.
    /// Names are de-duplicated case-insensitively; blank names are skipped.
    pub async fn ensure_taxonomy_terms(
        &self,
        site: &Site,
        names: &[String],
        kind: TaxonomyKind,
    ) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(names.len());
        let mut seen = std::collections::HashSet::new();

        for name in names {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                continue;
            }

            let term = match self.find_term(site, kind, name).await? {
                Some(existing) => {
                    debug!(site = %site.id, "Found existing {} '{}' (ID: {})", kind.label(), name, existing.id);
                    existing
                }
                None => self.create_term(site, kind, name).await?,
            };

            if !ids.contains(&term.id) {
                ids.push(term.id);
            }
        }

        Ok(ids)
    }

    /// Upload a file to the media library; returns the media id
    pub async fn upload_media(
        &self,
        site: &Site,
        data: &[u8],
        mime_type: &str,
        filename: &str,
        metadata: Option<&MediaMetadata>,
    ) -> Result<u64> {
        let url = format!("{}/media", site.api_base());

        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| Error::Upload {
                status: 0,
                message: format!("invalid MIME type '{}': {}", mime_type, e),
            })?;

        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(meta) = metadata {
            form = form
                .text("title", meta.title.clone())
                .text("alt_text", meta.alt_text.clone())
                .text("caption", meta.caption.clone());
        }

        info!(site = %site.id, "Uploading media file: {} ({}, {} bytes)", filename, mime_type, data.len());
        let request = self.authed(self.client.post(&url).multipart(form), site);
        let response = self.send_once(request, Operation::Upload).await?;

        let media: MediaItem = response.json().await.map_err(|e| Error::Upload {
            status: 0,
            message: format!("unexpected media response: {}", e),
        })?;
        info!(site = %site.id, media_id = media.id, "Media uploaded: {}", media.source_url.as_deref().unwrap_or("-"));
        Ok(media.id)
    }

    /// Fetch a media item; `None` when WordPress reports it missing
    pub async fn get_media(&self, site: &Site, media_id: u64) -> Result<Option<MediaItem>> {
        let url = format!("{}/media/{}", site.api_base(), media_id);
        match self.get_with_retry::<MediaItem>(site, &url, &[]).await {
            Ok(media) => Ok(Some(media)),
            Err(Error::RemoteApi { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a post. Not retried.
    pub async fn create_post(&self, site: &Site, post: &NewPost) -> Result<CreatedPost> {
        let url = format!("{}/posts", site.api_base());
        info!(
            site = %site.id,
            status = %post.status,
            featured_media = ?post.featured_media,
            "Creating post on {}", site.name
        );

        let request = self.authed(self.client.post(&url).json(post), site);
        let response = self.send_once(request, Operation::Publish).await?;
        let created: CreatedPost = response.json().await.map_err(|e| Error::Publish {
            status: 0,
            message: format!("unexpected post response: {}", e),
        })?;

        info!(site = %site.id, post_id = created.id, "Post created: {}", created.link);
        Ok(created)
    }

    /// Attach a featured image to an existing post; returns the stored `featured_media`
    pub async fn set_featured_image(&self, site: &Site, post_id: u64, media_id: u64) -> Result<u64> {
        let url = format!("{}/posts/{}", site.api_base(), post_id);
        info!(site = %site.id, post_id, media_id, "Setting featured image");

        let request = self.authed(
            self.client
                .post(&url)
                .json(&serde_json::json!({ "featured_media": media_id })),
            site,
        );
        let response = self.send_once(request, Operation::Publish).await?;
        let updated: CreatedPost = response.json().await.map_err(|e| Error::Publish {
            status: 0,
            message: format!("unexpected post response: {}", e),
        })?;
        Ok(updated.featured_media)
    }

    /// Read a post back with raw fields
    pub async fn get_post(&self, site: &Site, post_id: u64) -> Result<StoredPost> {
        let url = format!("{}/posts/{}", site.api_base(), post_id);
        self.get_with_retry(site, &url, &[("context", "edit".to_string())])
            .await
    }
}

/// Map a non-success response to the error kind for the operation
async fn classify_failure(response: Response, operation: Operation) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    failure_from_body(status, &body, operation)
}

fn failure_from_body(status: StatusCode, body: &str, operation: Operation) -> Error {
    let parsed = serde_json::from_str::<WpErrorBody>(body).ok();
    let message = error_message(status, body, parsed.as_ref());

    // 403 is only an auth problem when WordPress itself says so; hosting
    // firewalls answer 403 with an HTML page
    let is_auth = status == StatusCode::UNAUTHORIZED
        || (status == StatusCode::FORBIDDEN && parsed.as_ref().and_then(|p| p.code.as_ref()).is_some());
    if is_auth {
        return Error::Authentication(format!("HTTP {}: {}", status.as_u16(), message));
    }

    let status = status.as_u16();
    match operation {
        Operation::Upload => Error::Upload { status, message },
        Operation::Publish => Error::Publish { status, message },
        Operation::Read | Operation::Taxonomy => Error::RemoteApi { status, message },
    }
}

fn error_message(status: StatusCode, body: &str, parsed: Option<&WpErrorBody>) -> String {
    if let Some(message) = parsed.and_then(|p| p.message.as_deref()).filter(|m| !m.is_empty()) {
        return match parsed.and_then(|p| p.code.as_deref()) {
            Some(code) => format!("{} ({})", message, code),
            None => message.to_string(),
        };
    }

    let text = strip_tags(body);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string()
    } else {
        text.chars().take(300).collect()
    }
}

fn strip_tags(html: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let re = TAGS.get_or_init(|| Regex::new(r"(?s)<(script|style)[^>]*>.*?</(script|style)>|<[^>]+>").expect("static regex"));
    re.replace_all(html, " ").into_owned()
}

/// `term_exists` errors carry the existing id in `data.term_id`
fn existing_term_id(body: &str) -> Option<u64> {
    let parsed: WpErrorBody = serde_json::from_str(body).ok()?;
    if parsed.code.as_deref() != Some("term_exists") {
        return None;
    }
    parsed.data?.get("term_id")?.as_u64()
}

fn exact_match(candidates: Vec<Term>, name: &str) -> Option<Term> {
    let wanted = name.trim().to_lowercase();
    candidates
        .into_iter()
        .find(|t| decode_entities(&t.name).trim().to_lowercase() == wanted)
}

/// WordPress returns term names HTML-escaped (`&amp;`)
fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
}

fn parse_generator_version(feed: &str) -> Option<String> {
    static GENERATOR: OnceLock<Regex> = OnceLock::new();
    let re = GENERATOR.get_or_init(|| {
        Regex::new(r"<generator>\s*https?://wordpress\.org/\?v=([0-9][0-9A-Za-z.\-]*)\s*</generator>")
            .expect("static regex")
    });
    re.captures(feed).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(id: u64, name: &str) -> Term {
        Term {
            id,
            name: name.to_string(),
            slug: String::new(),
            count: 0,
        }
    }

    #[test]
    fn test_exact_match_is_case_insensitive_and_not_partial() {
        let candidates = vec![term(1, "AI Trends"), term(2, "AI")];
        assert_eq!(exact_match(candidates.clone(), "ai").map(|t| t.id), Some(2));
        assert_eq!(exact_match(candidates.clone(), "ai trends").map(|t| t.id), Some(1));
        assert!(exact_match(candidates, "AI Tr").is_none());
    }

    #[test]
    fn test_exact_match_decodes_entities() {
        let candidates = vec![term(9, "News &amp; Events")];
        assert_eq!(exact_match(candidates, "news & events").map(|t| t.id), Some(9));
    }

    #[test]
    fn test_failure_classification() {
        let wp_forbidden = r#"{"code":"rest_cannot_create","message":"Sorry, you are not allowed to create posts as this user.","data":{"status":403}}"#;
        let err = failure_from_body(StatusCode::FORBIDDEN, wp_forbidden, Operation::Publish);
        assert_eq!(err.kind(), "AuthenticationError");

        let firewall = "<html><head><title>403 Forbidden</title></head><body>Blocked</body></html>";
        let err = failure_from_body(StatusCode::FORBIDDEN, firewall, Operation::Upload);
        assert!(matches!(err, Error::Upload { status: 403, ref message } if message.contains("Blocked")));

        let err = failure_from_body(StatusCode::NOT_ACCEPTABLE, "", Operation::Upload);
        assert!(matches!(err, Error::Upload { status: 406, ref message } if message == "Not Acceptable"));

        let invalid = r#"{"code":"rest_invalid_param","message":"Invalid parameter(s): status"}"#;
        let err = failure_from_body(StatusCode::BAD_REQUEST, invalid, Operation::Publish);
        assert!(matches!(err, Error::Publish { status: 400, ref message } if message.contains("rest_invalid_param")));

        let err = failure_from_body(StatusCode::UNAUTHORIZED, "", Operation::Read);
        assert_eq!(err.kind(), "AuthenticationError");
    }

    #[test]
    fn test_existing_term_id() {
        let body = r#"{"code":"term_exists","message":"A term with the name provided already exists.","data":{"status":400,"term_id":42}}"#;
        assert_eq!(existing_term_id(body), Some(42));
        assert_eq!(existing_term_id(r#"{"code":"rest_forbidden"}"#), None);
        assert_eq!(existing_term_id("not json"), None);
    }

    #[test]
    fn test_generator_version() {
        let feed = "<channel><generator>https://wordpress.org/?v=6.4.2</generator></channel>";
        assert_eq!(parse_generator_version(feed).as_deref(), Some("6.4.2"));
        assert_eq!(parse_generator_version("<channel></channel>"), None);
    }
}
