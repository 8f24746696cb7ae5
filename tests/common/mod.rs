#![allow(dead_code)]

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

use wordpress_mcp_rs::config::{ImageConfig, KeySource};
use wordpress_mcp_rs::image::ImageGenerator;
use wordpress_mcp_rs::publish::{PublishDefaults, Publisher};
use wordpress_mcp_rs::registry::{Site, SiteRegistry};
use wordpress_mcp_rs::wordpress::{ClientConfig, WordPressClient};

pub const VALID_KEY: &str = "sk-test-abcdefghijklmnopqrstuvwxyz";

/// 1x1 transparent PNG
pub const PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub fn site(id: &str, server: &MockServer) -> Site {
    Site {
        id: id.to_string(),
        name: format!("Blog {}", id),
        url: server.uri(),
        username: "editor".to_string(),
        application_password: SecretString::new("abcd efgh ijkl mnop".into()),
    }
}

pub fn fast_client() -> WordPressClient {
    WordPressClient::new(ClientConfig {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        max_retries: 2,
        retry_delay: Duration::from_millis(5),
    })
    .unwrap()
}

/// Image generator pointed at `image_server`, or with no key at all
pub fn images(image_server: Option<&MockServer>, key: Option<&str>) -> ImageGenerator {
    let config = ImageConfig {
        api_base: image_server
            .map(|s| format!("{}/v1", s.uri()))
            .unwrap_or_else(|| "http://127.0.0.1:9/v1".to_string()),
        timeout: 5,
        ..ImageConfig::default()
    };
    ImageGenerator::with_api_key(
        &config,
        key.map(|k| SecretString::new(k.into())),
        key.map(|_| KeySource::ProcessEnv),
    )
    .unwrap()
}

pub fn publisher(sites: Vec<Site>, images: ImageGenerator) -> Publisher {
    Publisher::new(
        Arc::new(SiteRegistry::from_sites(sites).unwrap()),
        fast_client(),
        Arc::new(images),
        PublishDefaults::default(),
    )
}

pub fn post_json(server: &MockServer, id: u64, featured_media: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "link": format!("{}/?p={}", server.uri(), id),
        "status": "publish",
        "featured_media": featured_media
    })
}
