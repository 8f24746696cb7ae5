//! Publish workflow: resolve the site, prepare taxonomies, optionally
//! generate and upload a featured image, then create the post.
//!
//! Imaging is an enhancement. Any failure while generating or uploading the
//! image is downgraded to a warning on the result and the post is still
//! created without a featured image. Every other failure aborts the publish.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ImageQuality;
use crate::error::Error;
use crate::image::{short_title, GeneratedImage, ImageGenerator};
use crate::registry::{Site, SiteRegistry};
use crate::wordpress::{MediaMetadata, NewPost, PostStatus, TaxonomyKind, WordPressClient};

/// Max characters for media title / alt text
const MEDIA_TITLE_MAX: usize = 50;

/// One article to publish
#[derive(Debug, Clone, Deserialize)]
pub struct PostRequest {
    pub site_id: String,
    pub title: String,
    pub content: String,
    /// Falls back to `settings.default_post_status`
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub generate_image: bool,
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub image_quality: Option<ImageQuality>,
}

impl PostRequest {
    pub fn new(site_id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            title: title.into(),
            content: content.into(),
            status: None,
            excerpt: None,
            categories: Vec::new(),
            tags: Vec::new(),
            generate_image: false,
            image_prompt: None,
            image_quality: None,
        }
    }
}

/// Workflow step, reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStage {
    ResolveSite,
    PrepareTaxonomies,
    MaybeGenerateImage,
    UploadImage,
    CreatePost,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStage::ResolveSite => "resolve site",
            PublishStage::PrepareTaxonomies => "prepare taxonomies",
            PublishStage::MaybeGenerateImage => "generate image",
            PublishStage::UploadImage => "upload image",
            PublishStage::CreatePost => "create post",
        };
        f.write_str(name)
    }
}

/// What happened to the featured image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOutcome {
    /// `generate_image` was false
    NotRequested,
    /// Uploaded and set as the featured image
    Attached,
    /// Skipped: no usable credential
    Unavailable,
    /// The image API call failed
    GenerationFailed,
    /// WordPress rejected the upload
    UploadFailed,
    /// Uploaded but not found in the media library afterwards
    NotVerified,
    /// Post created but WordPress did not keep the featured image
    NotAttached,
}

/// Terminal `Published` state
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub site_id: String,
    pub post_id: u64,
    pub post_url: String,
    pub status: PostStatus,
    pub featured_image_id: Option<u64>,
    pub image: ImageOutcome,
    pub warnings: Vec<String>,
}

/// Terminal `Failed` state
#[derive(Debug)]
pub struct PublishFailure {
    pub stage: PublishStage,
    pub error: Error,
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish failed at {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for PublishFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

trait AtStage<T> {
    fn at(self, stage: PublishStage) -> Result<T, PublishFailure>;
}

impl<T> AtStage<T> for crate::error::Result<T> {
    fn at(self, stage: PublishStage) -> Result<T, PublishFailure> {
        self.map_err(|error| PublishFailure { stage, error })
    }
}

/// Defaults applied to requests that leave fields unset
#[derive(Debug, Clone)]
pub struct PublishDefaults {
    pub status: PostStatus,
    pub format: String,
    pub image_quality: ImageQuality,
}

impl Default for PublishDefaults {
    fn default() -> Self {
        Self {
            status: PostStatus::Draft,
            format: "standard".to_string(),
            image_quality: ImageQuality::Standard,
        }
    }
}

/// Orchestrates the publish workflow. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct Publisher {
    registry: Arc<SiteRegistry>,
    wordpress: WordPressClient,
    images: Arc<ImageGenerator>,
    defaults: PublishDefaults,
}

impl Publisher {
    pub fn new(
        registry: Arc<SiteRegistry>,
        wordpress: WordPressClient,
        images: Arc<ImageGenerator>,
        defaults: PublishDefaults,
    ) -> Self {
        Self {
            registry,
            wordpress,
            images,
            defaults,
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn wordpress(&self) -> &WordPressClient {
        &self.wordpress
    }

    pub fn images(&self) -> &ImageGenerator {
        &self.images
    }

    pub async fn publish(&self, request: &PostRequest) -> Result<PublishResult, PublishFailure> {
        let site = self.registry.resolve(request.site_id.trim()).at(PublishStage::ResolveSite)?;
        info!(site = %site.id, title = %request.title, generate_image = request.generate_image, "Publishing article");

        let categories = self
            .wordpress
            .ensure_taxonomy_terms(site, &request.categories, TaxonomyKind::Category)
            .await
            .at(PublishStage::PrepareTaxonomies)?;
        let tags = self
            .wordpress
            .ensure_taxonomy_terms(site, &request.tags, TaxonomyKind::Tag)
            .await
            .at(PublishStage::PrepareTaxonomies)?;

        let mut warnings = Vec::new();
        let (mut featured, mut image_outcome) = if request.generate_image {
            self.prepare_featured_image(site, request, &mut warnings).await
        } else {
            (None, ImageOutcome::NotRequested)
        };

        let status = request.status.unwrap_or(self.defaults.status);
        let post = NewPost {
            title: request.title.clone(),
            content: request.content.clone(),
            status,
            excerpt: request.excerpt.clone().filter(|e| !e.trim().is_empty()),
            format: self.defaults.format.clone(),
            categories,
            tags,
            featured_media: featured,
        };

        let created = self
            .wordpress
            .create_post(site, &post)
            .await
            .at(PublishStage::CreatePost)?;

        if let Some(media_id) = featured {
            if created.featured_media != media_id {
                warn!(site = %site.id, post_id = created.id, media_id, "Featured image not set on create, retrying once");
                match self.wordpress.set_featured_image(site, created.id, media_id).await {
                    Ok(stored) if stored == media_id => {}
                    Ok(stored) => {
                        warnings.push(format!(
                            "WordPress did not keep featured image {} on post {} (reports {}); the post has no featured image.",
                            media_id, created.id, stored
                        ));
                        featured = None;
                        image_outcome = ImageOutcome::NotAttached;
                    }
                    Err(e) => {
                        warnings.push(format!(
                            "Setting featured image {} on post {} failed: {}. Media {} is in the library but not attached.",
                            media_id, created.id, e, media_id
                        ));
                        featured = None;
                        image_outcome = ImageOutcome::NotAttached;
                    }
                }
            }
        }

        for warning in &warnings {
            warn!(site = %site.id, post_id = created.id, "{}", warning);
        }
        info!(site = %site.id, post_id = created.id, featured_media = ?featured, "Article published");

        Ok(PublishResult {
            site_id: site.id.clone(),
            post_id: created.id,
            post_url: created.link,
            status,
            featured_image_id: featured,
            image: image_outcome,
            warnings,
        })
    }

    /// `MaybeGenerateImage` and `UploadImage`; never fails the publish
    async fn prepare_featured_image(
        &self,
        site: &Site,
        request: &PostRequest,
        warnings: &mut Vec<String>,
    ) -> (Option<u64>, ImageOutcome) {
        let quality = request.image_quality.unwrap_or(self.defaults.image_quality);
        let image = match self
            .images
            .generate_for_article(
                &request.title,
                &request.content,
                request.image_prompt.as_deref(),
                quality,
            )
            .await
        {
            Ok(image) => image,
            Err(Error::ImageGenerationUnavailable(reason)) => {
                warnings.push(format!(
                    "Image generation skipped: {}. The post was created without a featured image.",
                    reason
                ));
                return (None, ImageOutcome::Unavailable);
            }
            Err(e) => {
                warnings.push(format!(
                    "{}. The post was created without a featured image.",
                    e
                ));
                return (None, ImageOutcome::GenerationFailed);
            }
        };

        match self.upload_image(site, &request.title, &image).await {
            Ok(Some(media_id)) => (Some(media_id), ImageOutcome::Attached),
            Ok(None) => {
                warnings.push(
                    "Uploaded image was not found in the media library; the post was created without a featured image."
                        .to_string(),
                );
                (None, ImageOutcome::NotVerified)
            }
            Err(e) => {
                let hint = e.diagnosis().map(|h| format!(" {}", h)).unwrap_or_default();
                warnings.push(format!(
                    "Featured image upload failed: {}. The post was created without a featured image.{}",
                    e, hint
                ));
                (None, ImageOutcome::UploadFailed)
            }
        }
    }

    /// Upload, then confirm the media exists. `Ok(None)` when it is missing.
    async fn upload_image(
        &self,
        site: &Site,
        title: &str,
        image: &GeneratedImage,
    ) -> crate::error::Result<Option<u64>> {
        let label = short_title(title, MEDIA_TITLE_MAX);
        let label = if label.is_empty() { "Article image".to_string() } else { label };
        let metadata = MediaMetadata {
            title: label.clone(),
            alt_text: label.clone(),
            caption: label,
        };

        let media_id = self
            .wordpress
            .upload_media(
                site,
                &image.data,
                &image.mime_type,
                &image.suggested_filename,
                Some(&metadata),
            )
            .await?;

        match self.wordpress.get_media(site, media_id).await {
            Ok(Some(_)) => Ok(Some(media_id)),
            Ok(None) => Ok(None),
            Err(e) => {
                // Upload itself succeeded; keep the id
                warn!(site = %site.id, media_id, "Could not verify uploaded media: {}", e);
                Ok(Some(media_id))
            }
        }
    }

    /// Publish each request in order; one failure does not stop the rest
    pub async fn publish_bulk(
        &self,
        requests: &[PostRequest],
    ) -> Vec<Result<PublishResult, PublishFailure>> {
        let mut results = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let result = self.publish(request).await;
            if let Err(failure) = &result {
                warn!(index, site = %request.site_id, "Bulk entry failed: {}", failure);
            }
            results.push(result);
        }
        results
    }
}
