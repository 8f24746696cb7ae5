use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication status accepted by `wp/v2/posts`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Publish,
    Private,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
            PostStatus::Private => "private",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "publish" => Ok(PostStatus::Publish),
            "private" => Ok(PostStatus::Private),
            other => Err(format!(
                "invalid status '{}': expected draft, publish or private",
                other
            )),
        }
    }
}

/// Which taxonomy a term belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    Category,
    Tag,
}

impl TaxonomyKind {
    /// REST collection name
    pub fn endpoint(&self) -> &'static str {
        match self {
            TaxonomyKind::Category => "categories",
            TaxonomyKind::Tag => "tags",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyKind::Category => "category",
            TaxonomyKind::Tag => "tag",
        }
    }
}

/// A category or tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub count: u64,
}

/// Request body for `POST wp/v2/posts`
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub format: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
}

/// Subset of the post object returned after create/update
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPost {
    pub id: u64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub featured_media: u64,
}

/// Post read back with `context=edit`, exposing raw (unrendered) fields
#[derive(Debug, Clone, Deserialize)]
pub struct StoredPost {
    pub id: u64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: String,
    pub title: RawField,
    pub content: RawField,
    #[serde(default)]
    pub featured_media: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub rendered: String,
}

impl RawField {
    /// Raw text when available, rendered HTML otherwise
    pub fn text(&self) -> &str {
        self.raw.as_deref().unwrap_or(&self.rendered)
    }
}

/// Subset of the media object
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: u64,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Descriptive fields sent with a media upload
#[derive(Debug, Clone, Default)]
pub struct MediaMetadata {
    pub title: String,
    pub alt_text: String,
    pub caption: String,
}

/// Result of `test_connection`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub reachable: bool,
    pub wp_version: Option<String>,
    pub site_name: Option<String>,
    pub user: Option<String>,
}

/// WordPress REST error body: `{"code": "...", "message": "...", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WpErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}
