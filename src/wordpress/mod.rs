//! WordPress REST (`wp/v2`) client.
//!
//! Every call authenticates with HTTP Basic auth using the site's username
//! and Application Password. Reads are retried on network failures; writes
//! (posts, media, terms) are sent exactly once.

pub mod client;
pub mod types;

pub use client::{ClientConfig, WordPressClient};
pub use types::*;
