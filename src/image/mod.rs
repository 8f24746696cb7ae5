//! AI image generation for featured images.

pub mod filename;
pub mod generator;

pub use filename::{image_filename, short_title, slugify};
pub use generator::{validate_api_key_syntax, GeneratedImage, ImageGenerator};
