//! Multi-site WordPress publishing tools exposed over MCP.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::image::ImageGenerator;
use crate::mcp::{InitializeParams, McpError, McpHandler, Tool, ToolCallParams, PROTOCOL_VERSION};
use crate::publish::{
    ImageOutcome, PostRequest, PublishDefaults, PublishFailure, PublishResult, Publisher,
};
use crate::registry::SiteRegistry;
use crate::wordpress::{ClientConfig, TaxonomyKind, WordPressClient};

pub const SERVER_NAME: &str = "wordpress-mcp-rs";

/// Upper bound on articles per `create_bulk_articles` call
const MAX_BULK_ARTICLES: usize = 50;

pub struct WordPressHandler {
    publisher: Publisher,
    diagnostics: Diagnostics,
}

#[derive(Debug, Deserialize)]
struct SiteArgs {
    site_id: String,
}

#[derive(Debug, Deserialize)]
struct BulkArgs {
    articles: Vec<PostRequest>,
}

impl WordPressHandler {
    pub fn new(publisher: Publisher, diagnostics: Diagnostics) -> Self {
        Self {
            publisher,
            diagnostics,
        }
    }

    /// Wire up registry, clients and diagnostics from a validated configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = Arc::new(SiteRegistry::from_config(config)?);
        let wordpress = WordPressClient::new(ClientConfig::from(&config.settings))?;
        let images = Arc::new(ImageGenerator::new(&config.image)?);
        let defaults = PublishDefaults {
            status: config.settings.default_post_status,
            format: config.settings.default_post_format.clone(),
            image_quality: config.image.quality,
        };
        let config_path = config
            .source
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        info!(
            sites = registry.len(),
            image_generation = images.is_available(),
            "WordPress handler ready"
        );
        Ok(Self::new(
            Publisher::new(registry, wordpress, images, defaults),
            Diagnostics::new(config_path),
        ))
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    fn list_sites(&self) -> Value {
        let sites = self.publisher.registry().list();
        let mut text = format!("Available WordPress sites ({}):\n", sites.len());
        for site in &sites {
            let _ = writeln!(text, "• {} - {} ({})", site.id, site.name, site.url);
        }
        tool_success(text, json!({ "sites": sites }))
    }

    async fn test_connection(&self, args: SiteArgs) -> Value {
        let registry = self.publisher.registry();
        let site = match registry.resolve(args.site_id.trim()) {
            Ok(site) => site,
            Err(e) => return tool_failure("Connection test failed", &e, None),
        };

        match self.publisher.wordpress().test_connection(site).await {
            Ok(info) => {
                let mut text = format!("✅ Connected to {} ({})\n", site.name, site.url);
                if let Some(name) = &info.site_name {
                    let _ = writeln!(text, "Site title: {}", name);
                }
                if let Some(user) = &info.user {
                    let _ = writeln!(text, "Authenticated as: {}", user);
                }
                let _ = writeln!(
                    text,
                    "WordPress version: {}",
                    info.wp_version.as_deref().unwrap_or("unknown")
                );
                tool_success(
                    text,
                    json!({
                        "site_id": site.id,
                        "reachable": info.reachable,
                        "wp_version": info.wp_version,
                        "site_name": info.site_name,
                        "user": info.user,
                    }),
                )
            }
            Err(e) => tool_failure(&format!("Connection to {} failed", site.name), &e, None),
        }
    }

    async fn list_terms(&self, args: SiteArgs, kind: TaxonomyKind) -> Value {
        let registry = self.publisher.registry();
        let plural = match kind {
            TaxonomyKind::Category => "Categories",
            TaxonomyKind::Tag => "Tags",
        };
        let site = match registry.resolve(args.site_id.trim()) {
            Ok(site) => site,
            Err(e) => return tool_failure(&format!("Listing {} failed", kind.endpoint()), &e, None),
        };

        match self.publisher.wordpress().list_terms(site, kind).await {
            Ok(terms) => {
                let mut text = format!("{} on {} ({}):\n", plural, site.name, terms.len());
                if terms.is_empty() {
                    let _ = writeln!(text, "(none)");
                }
                for term in &terms {
                    let _ = writeln!(text, "• {} (id: {}, posts: {})", term.name, term.id, term.count);
                }
                tool_success(text, json!({ "site_id": site.id, "taxonomy": kind.endpoint(), "terms": terms }))
            }
            Err(e) => tool_failure(&format!("Listing {} on {} failed", kind.endpoint(), site.name), &e, None),
        }
    }

    async fn create_article(&self, request: PostRequest) -> Value {
        match self.publisher.publish(&request).await {
            Ok(result) => tool_success(render_published(&result), to_structured(&result)),
            Err(failure) => publish_failure(&failure),
        }
    }

    async fn create_bulk(&self, requests: Vec<PostRequest>) -> Value {
        let results = self.publisher.publish_bulk(&requests).await;
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - succeeded;

        let mut text = format!(
            "Bulk publish finished: {} succeeded, {} failed\n",
            succeeded, failed
        );
        let mut entries = Vec::with_capacity(results.len());
        for (index, (request, result)) in requests.iter().zip(&results).enumerate() {
            match result {
                Ok(published) => {
                    let _ = writeln!(
                        text,
                        "{}. ✅ [{}] {} → {}{}",
                        index + 1,
                        request.site_id,
                        request.title,
                        published.post_url,
                        if published.warnings.is_empty() {
                            String::new()
                        } else {
                            format!(" ({} warning(s))", published.warnings.len())
                        }
                    );
                    let mut entry = to_structured(published);
                    if let Value::Object(map) = &mut entry {
                        map.insert("index".to_string(), json!(index));
                        map.insert("ok".to_string(), json!(true));
                    }
                    entries.push(entry);
                }
                Err(failure) => {
                    let _ = writeln!(
                        text,
                        "{}. ❌ [{}] {}: {}",
                        index + 1,
                        request.site_id,
                        request.title,
                        failure
                    );
                    entries.push(json!({
                        "index": index,
                        "ok": false,
                        "error": failure_report(failure),
                    }));
                }
            }
        }

        let structured = json!({
            "succeeded": succeeded,
            "failed": failed,
            "results": entries,
        });
        if succeeded == 0 {
            tool_result(text, structured, true)
        } else {
            tool_success(text, structured)
        }
    }

    async fn run_diagnostics(&self) -> Value {
        let report = self.diagnostics.run().await;
        tool_success(report.render_text(), to_structured(&report))
    }
}

#[async_trait]
impl McpHandler for WordPressHandler {
    async fn initialize(&self, params: InitializeParams) -> std::result::Result<Value, McpError> {
        info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "Client initialized"
        );
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        }))
    }

    async fn list_tools(&self) -> std::result::Result<Vec<Tool>, McpError> {
        let site_only = json!({
            "type": "object",
            "properties": {
                "site_id": { "type": "string", "description": "Site id from list_wordpress_sites" }
            },
            "required": ["site_id"]
        });

        Ok(vec![
            Tool {
                name: "list_wordpress_sites".to_string(),
                description: "List all configured WordPress sites".to_string(),
                input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            },
            Tool {
                name: "test_site_connection".to_string(),
                description: "Test connectivity and credentials for a WordPress site".to_string(),
                input_schema: site_only.clone(),
            },
            Tool {
                name: "get_site_categories".to_string(),
                description: "List existing categories on a WordPress site".to_string(),
                input_schema: site_only.clone(),
            },
            Tool {
                name: "get_site_tags".to_string(),
                description: "List existing tags on a WordPress site".to_string(),
                input_schema: site_only,
            },
            Tool {
                name: "create_wordpress_article".to_string(),
                description: "Create an article on a WordPress site. Missing categories and tags are created. \
                              Set generate_image to attach a generated featured image."
                    .to_string(),
                input_schema: article_schema(true),
            },
            Tool {
                name: "create_wordpress_article_with_image".to_string(),
                description: "Create an article with a featured image generated from its title and content. \
                              If imaging fails the article is still created and a warning is returned."
                    .to_string(),
                input_schema: article_schema(false),
            },
            Tool {
                name: "create_bulk_articles".to_string(),
                description: "Create several articles, possibly across sites. Each entry succeeds or fails on its own."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "articles": {
                            "type": "array",
                            "maxItems": MAX_BULK_ARTICLES,
                            "items": article_schema(true)
                        }
                    },
                    "required": ["articles"]
                }),
            },
            Tool {
                name: "run_diagnostics".to_string(),
                description: "Check configuration, image API credentials and site reachability".to_string(),
                input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            },
        ])
    }

    async fn call_tool(&self, params: ToolCallParams) -> std::result::Result<Value, McpError> {
        info!(tool = %params.name, "Tool call");
        let args = params.arguments;
        let result = match params.name.as_str() {
            "list_wordpress_sites" => self.list_sites(),
            "test_site_connection" => self.test_connection(parse_args(args)?).await,
            "get_site_categories" => self.list_terms(parse_args(args)?, TaxonomyKind::Category).await,
            "get_site_tags" => self.list_terms(parse_args(args)?, TaxonomyKind::Tag).await,
            "create_wordpress_article" => {
                let request = parse_post_request(args)?;
                self.create_article(request).await
            }
            "create_wordpress_article_with_image" => {
                let mut request = parse_post_request(args)?;
                request.generate_image = true;
                self.create_article(request).await
            }
            "create_bulk_articles" => {
                let bulk: BulkArgs = parse_args(args)?;
                if bulk.articles.is_empty() {
                    return Err(McpError::InvalidParams("articles must not be empty".to_string()));
                }
                if bulk.articles.len() > MAX_BULK_ARTICLES {
                    return Err(McpError::InvalidParams(format!(
                        "at most {} articles per call",
                        MAX_BULK_ARTICLES
                    )));
                }
                for (index, request) in bulk.articles.iter().enumerate() {
                    validate_post_request(request)
                        .map_err(|e| McpError::InvalidParams(format!("articles[{}]: {}", index, e)))?;
                }
                self.create_bulk(bulk.articles).await
            }
            "run_diagnostics" => self.run_diagnostics().await,
            other => return Err(Error::ToolNotFound(other.to_string()).into()),
        };
        Ok(result)
    }
}

fn article_schema(with_image_flag: bool) -> Value {
    let mut properties = json!({
        "site_id": { "type": "string", "description": "Site id from list_wordpress_sites" },
        "title": { "type": "string", "description": "Article title" },
        "content": { "type": "string", "description": "Article body (HTML allowed)" },
        "excerpt": { "type": "string", "description": "Optional summary" },
        "status": {
            "type": "string",
            "enum": ["draft", "publish", "private"],
            "description": "Defaults to the configured default_post_status"
        },
        "categories": { "type": "array", "items": { "type": "string" }, "description": "Category names" },
        "tags": { "type": "array", "items": { "type": "string" }, "description": "Tag names" },
        "image_prompt": { "type": "string", "description": "Custom prompt for the featured image" },
        "image_quality": { "type": "string", "enum": ["standard", "hd"] }
    });
    if with_image_flag {
        if let Value::Object(map) = &mut properties {
            map.insert(
                "generate_image".to_string(),
                json!({ "type": "boolean", "description": "Generate and attach a featured image", "default": false }),
            );
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["site_id", "title", "content"]
    })
}

fn parse_args<T: DeserializeOwned>(
    args: Option<HashMap<String, Value>>,
) -> std::result::Result<T, McpError> {
    let map: Map<String, Value> = args.unwrap_or_default().into_iter().collect();
    serde_json::from_value(Value::Object(map)).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn parse_post_request(
    args: Option<HashMap<String, Value>>,
) -> std::result::Result<PostRequest, McpError> {
    let request: PostRequest = parse_args(args)?;
    validate_post_request(&request).map_err(McpError::InvalidParams)?;
    Ok(request)
}

fn validate_post_request(request: &PostRequest) -> std::result::Result<(), String> {
    if request.site_id.trim().is_empty() {
        return Err("site_id is required".to_string());
    }
    if request.title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    if request.content.trim().is_empty() {
        return Err("content must not be empty".to_string());
    }
    Ok(())
}

fn tool_result(text: String, structured: Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": is_error
    })
}

fn tool_success(text: String, structured: Value) -> Value {
    tool_result(text, structured, false)
}

fn tool_failure(context: &str, err: &Error, extra: Option<(&str, Value)>) -> Value {
    warn!(kind = err.kind(), "{}: {}", context, err);
    let mut text = format!("❌ {}: {}", context, err);
    if let Some(hint) = err.diagnosis() {
        let _ = write!(text, "\n💡 {}", hint);
    }
    let mut structured = to_structured(&err.to_report());
    if let (Some((key, value)), Value::Object(map)) = (extra, &mut structured) {
        map.insert(key.to_string(), value);
    }
    tool_result(text, structured, true)
}

fn failure_report(failure: &PublishFailure) -> Value {
    let mut report = to_structured(&failure.error.to_report());
    if let Value::Object(map) = &mut report {
        map.insert("stage".to_string(), json!(failure.stage));
    }
    report
}

fn publish_failure(failure: &PublishFailure) -> Value {
    tool_failure(
        &format!("Article was not created ({} step)", failure.stage),
        &failure.error,
        Some(("stage", json!(failure.stage))),
    )
}

fn to_structured<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "serialization_error": e.to_string() }))
}

fn render_published(result: &PublishResult) -> String {
    let mut text = format!("✅ Article created on {}\n", result.site_id);
    let _ = writeln!(text, "Post ID: {}", result.post_id);
    let _ = writeln!(text, "URL: {}", result.post_url);
    let _ = writeln!(text, "Status: {}", result.status);
    match (result.featured_image_id, result.image) {
        (Some(id), _) => {
            let _ = writeln!(text, "Featured image: media {}", id);
        }
        (None, ImageOutcome::NotRequested) => {}
        (None, _) => {
            let _ = writeln!(text, "Featured image: none");
        }
    }
    if !result.warnings.is_empty() {
        let _ = writeln!(text, "\n⚠️ Warnings:");
        for warning in &result.warnings {
            let _ = writeln!(text, "  • {}", warning);
        }
    }
    text
}
