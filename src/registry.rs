//! Site registry: the read-only set of configured WordPress sites.
//!
//! Built once from [`AppConfig`] and shared behind an `Arc`; there is no
//! mutation API, so concurrent lookups need no locking.

use secrecy::SecretString;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::error::{Error, Result};

/// A configured WordPress site
#[derive(Debug, Clone)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// Base URL without trailing slash
    pub url: String,
    pub username: String,
    pub application_password: SecretString,
}

impl Site {
    /// `wp/v2` REST base for this site
    pub fn api_base(&self) -> String {
        format!("{}/wp-json/wp/v2", self.url)
    }
}

/// Public view of a site (no credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
    index: HashMap<String, usize>,
}

impl SiteRegistry {
    /// Build from a validated configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let sites = config
            .sites
            .iter()
            .map(|s| Site {
                id: s.id.clone(),
                name: s.name.clone().unwrap_or_else(|| s.id.clone()),
                url: s.url.trim_end_matches('/').to_string(),
                username: s.username.clone(),
                application_password: s.password.clone(),
            })
            .collect();
        Self::from_sites(sites)
    }

    pub fn from_sites(sites: Vec<Site>) -> Result<Self> {
        let mut index = HashMap::with_capacity(sites.len());
        for (i, site) in sites.iter().enumerate() {
            if index.insert(site.id.clone(), i).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate site id '{}'",
                    site.id
                )));
            }
        }
        Ok(Self { sites, index })
    }

    /// Look up a site by id
    pub fn resolve(&self, site_id: &str) -> Result<&Site> {
        self.index
            .get(site_id)
            .map(|&i| &self.sites[i])
            .ok_or_else(|| Error::SiteNotFound(site_id.to_string()))
    }

    /// Sites in configuration order
    pub fn list(&self) -> Vec<SiteSummary> {
        self.sites
            .iter()
            .map(|s| SiteSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                url: s.url.clone(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
