//! End-to-end publish workflow against mock WordPress and image servers.

mod common;

use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use wordpress_mcp_rs::publish::{ImageOutcome, PostRequest, PublishStage};
use wordpress_mcp_rs::wordpress::PostStatus;

async fn mount_image_api(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "created": 1,
            "data": [{ "b64_json": PNG_BASE64, "revised_prompt": "a chart" }]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_only_article_is_published() {
    let wp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(basic_auth("editor", "abcd efgh ijkl mnop"))
        .and(body_partial_json(json!({ "title": "AI Trends 2024", "status": "publish" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 101, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let mut request = PostRequest::new("site1", "AI Trends 2024", "<p>Models everywhere.</p>");
    request.status = Some(PostStatus::Publish);

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.post_id, 101);
    assert!(result.post_url.starts_with(&wp.uri()));
    assert!(result.warnings.is_empty());
    assert_eq!(result.image, ImageOutcome::NotRequested);
    assert_eq!(result.featured_image_id, None);
}

#[tokio::test]
async fn test_default_status_and_format_apply() {
    let wp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({ "status": "draft", "format": "standard", "excerpt": "Short" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 5, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let mut request = PostRequest::new("site1", "Draft", "Body");
    request.excerpt = Some("Short".to_string());

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.status, PostStatus::Draft);
}

#[tokio::test]
async fn test_missing_category_is_created_exactly_once() {
    let wp = MockServer::start().await;

    // First lookup misses; afterwards the created term is found
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("search", "NewCat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("search", "NewCat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 12, "name": "NewCat", "slug": "newcat", "count": 1 }
        ])))
        .with_priority(2)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(body_partial_json(json!({ "name": "NewCat" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(
            { "id": 12, "name": "NewCat", "slug": "newcat", "count": 0 }
        )))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({ "categories": [12] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 7, 0)))
        .expect(2)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let mut request = PostRequest::new("site1", "First", "Body");
    request.categories = vec!["NewCat".to_string(), "newcat".to_string()];

    publisher.publish(&request).await.unwrap();
    request.title = "Second".to_string();
    publisher.publish(&request).await.unwrap();
}

#[tokio::test]
async fn test_existing_tag_is_reused_and_term_exists_race_is_tolerated() {
    let wp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/tags"))
        .and(query_param("search", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 3, "name": "Rust", "slug": "rust", "count": 4 },
            { "id": 4, "name": "Rust Lang", "slug": "rust-lang", "count": 1 }
        ])))
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/tags"))
        .and(query_param("search", "async"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/tags"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "term_exists",
            "message": "A term with the name provided already exists.",
            "data": { "status": 400, "term_id": 9 }
        })))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({ "tags": [3, 9] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 8, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let mut request = PostRequest::new("site1", "Tags", "Body");
    request.tags = vec!["rust".to_string(), "async".to_string()];
    publisher.publish(&request).await.unwrap();
}

#[tokio::test]
async fn test_misconfigured_image_key_degrades_to_text_only() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&image_api)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 21, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(
        vec![site("site1", &wp)],
        images(Some(&image_api), Some("not-an-api-key")),
    );
    let mut request = PostRequest::new("site1", "With image", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.image, ImageOutcome::Unavailable);
    assert_eq!(result.featured_image_id, None);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("Image generation skipped"));
}

#[tokio::test]
async fn test_generated_image_is_uploaded_and_attached() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    mount_image_api(&image_api).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 77,
            "source_url": format!("{}/wp-content/uploads/ai-trends-2024.png", wp.uri()),
            "mime_type": "image/png"
        })))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/media/77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 77 })))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({ "featured_media": 77 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 30, 77)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(Some(&image_api), Some(VALID_KEY)));
    let mut request = PostRequest::new("site1", "AI Trends 2024", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.image, ImageOutcome::Attached);
    assert_eq!(result.featured_image_id, Some(77));
    assert!(result.warnings.is_empty());

    let uploads: Vec<_> = wp
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/wp-json/wp/v2/media")
        .collect();
    let body = String::from_utf8_lossy(&uploads[0].body);
    assert!(body.contains("filename=\"ai-trends-2024-"));
    assert!(body.contains("name=\"alt_text\""));
}

#[tokio::test]
async fn test_upload_rejected_by_host_firewall_still_publishes() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    mount_image_api(&image_api).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .respond_with(ResponseTemplate::new(406).set_body_string("<html><body>Not Acceptable</body></html>"))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 31, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(Some(&image_api), Some(VALID_KEY)));
    let mut request = PostRequest::new("site1", "Blocked upload", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.post_id, 31);
    assert_eq!(result.image, ImageOutcome::UploadFailed);
    assert_eq!(result.featured_image_id, None);
    assert!(result.warnings[0].contains("406"));
    assert!(result.warnings[0].contains("ModSecurity"));
}

#[tokio::test]
async fn test_image_api_failure_is_a_warning() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "You exceeded your current quota", "code": "insufficient_quota" }
        })))
        .expect(1)
        .mount(&image_api)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 40, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(Some(&image_api), Some(VALID_KEY)));
    let mut request = PostRequest::new("site1", "Quota", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.image, ImageOutcome::GenerationFailed);
    assert!(result.warnings[0].contains("no remaining credits"));
}

#[tokio::test]
async fn test_missing_media_is_not_referenced() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    mount_image_api(&image_api).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 55 })))
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/media/55"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "rest_post_invalid_id", "message": "Invalid post ID."
        })))
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 50, 0)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(Some(&image_api), Some(VALID_KEY)));
    let mut request = PostRequest::new("site1", "Ghost media", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.image, ImageOutcome::NotVerified);
    assert_eq!(result.featured_image_id, None);

    let posts: Vec<_> = wp
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/wp-json/wp/v2/posts")
        .collect();
    let body: serde_json::Value = serde_json::from_slice(&posts[0].body).unwrap();
    assert!(body.get("featured_media").is_none());
}

#[tokio::test]
async fn test_featured_image_reattached_once_when_dropped() {
    let wp = MockServer::start().await;
    let image_api = MockServer::start().await;
    mount_image_api(&image_api).await;

    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 88 })))
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/media/88"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 88 })))
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 60, 0)))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts/60"))
        .and(body_partial_json(json!({ "featured_media": 88 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(post_json(&wp, 60, 88)))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(Some(&image_api), Some(VALID_KEY)));
    let mut request = PostRequest::new("site1", "Reattach", "Body");
    request.generate_image = true;

    let result = publisher.publish(&request).await.unwrap();
    assert_eq!(result.featured_image_id, Some(88));
    assert_eq!(result.image, ImageOutcome::Attached);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_invalid_credentials_create_no_post() {
    let wp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "rest_not_logged_in",
            "message": "You are not currently logged in.",
            "data": { "status": 401 }
        })))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 1, 0)))
        .expect(0)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let mut request = PostRequest::new("site1", "Nope", "Body");
    request.categories = vec!["News".to_string()];

    let failure = publisher.publish(&request).await.unwrap_err();
    assert_eq!(failure.stage, PublishStage::PrepareTaxonomies);
    assert_eq!(failure.error.kind(), "AuthenticationError");
}

#[tokio::test]
async fn test_post_rejection_is_publish_error() {
    let wp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "rest_invalid_param",
            "message": "Invalid parameter(s): format"
        })))
        .expect(1)
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let failure = publisher
        .publish(&PostRequest::new("site1", "Bad", "Body"))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, PublishStage::CreatePost);
    assert_eq!(failure.error.kind(), "PublishError");
    assert_eq!(failure.error.status(), Some(400));
}

#[tokio::test]
async fn test_unicode_rtl_content_round_trips() {
    let wp = MockServer::start().await;
    let title = "מדריך לבינה מלאכותית 2024";
    let content = "<p>שלום עולם! مرحبا بالعالم 👋</p>";

    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({ "title": title, "content": content })))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp, 70, 0)))
        .expect(1)
        .mount(&wp)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/70"))
        .and(query_param("context", "edit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 70,
            "link": format!("{}/?p=70", wp.uri()),
            "status": "draft",
            "title": { "raw": title, "rendered": title },
            "content": { "raw": content, "rendered": content },
            "featured_media": 0
        })))
        .mount(&wp)
        .await;

    let publisher = publisher(vec![site("site1", &wp)], images(None, None));
    let result = publisher
        .publish(&PostRequest::new("site1", title, content))
        .await
        .unwrap();

    let stored = publisher
        .wordpress()
        .get_post(publisher.registry().resolve("site1").unwrap(), result.post_id)
        .await
        .unwrap();
    assert_eq!(stored.title.text(), title);
    assert_eq!(stored.content.text(), content);
}

#[tokio::test]
async fn test_bulk_continues_after_failure() {
    let wp_one = MockServer::start().await;
    let wp_two = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp_one, 1, 0)))
        .expect(1)
        .mount(&wp_one)
        .await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(post_json(&wp_two, 2, 0)))
        .expect(1)
        .mount(&wp_two)
        .await;

    let publisher = publisher(
        vec![site("one", &wp_one), site("two", &wp_two)],
        images(None, None),
    );
    let results = publisher
        .publish_bulk(&[
            PostRequest::new("one", "A", "Body"),
            PostRequest::new("missing", "B", "Body"),
            PostRequest::new("two", "C", "Body"),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().post_id, 1);
    assert_eq!(results[1].as_ref().unwrap_err().error.kind(), "SiteNotFound");
    assert_eq!(results[2].as_ref().unwrap().post_id, 2);
}
