//! Backend service descriptors

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable description of a backend service
///
/// Descriptors are registered once at startup and replaced wholesale on
/// re-registration. Liveness is tracked next to the descriptor by the
/// registry, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique service id
    pub id: String,

    /// Human readable name
    pub name: String,

    /// Base URL requests are forwarded to (e.g. `http://hotels.internal:8080`)
    pub base_url: String,

    /// Path of the health endpoint, appended to `base_url`
    pub health_path: String,

    /// Provenance tag (hosting platform), informational only
    #[serde(default)]
    pub platform: String,

    /// Route globs in declaration order; `*` matches any run of characters
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Static headers attached when forwarding
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Create a new descriptor builder
    pub fn builder(id: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder::new(id)
    }

    /// Full URL of the health endpoint
    pub fn health_url(&self) -> String {
        self.join(&self.health_path)
    }

    /// Full upstream URL for a request path
    pub fn upstream_url(&self, path: &str) -> String {
        self.join(path)
    }

    fn join(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Builder for constructing service descriptors
#[derive(Debug, Default)]
pub struct ServiceDescriptorBuilder {
    id: String,
    name: Option<String>,
    base_url: Option<String>,
    health_path: Option<String>,
    platform: Option<String>,
    patterns: Vec<String>,
    headers: BTreeMap<String, String>,
}

impl ServiceDescriptorBuilder {
    /// Create a new builder for the given service id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the display name (defaults to the id)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the health endpoint path (defaults to `/health`)
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Set the provenance tag
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Append a route pattern
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Append several route patterns
    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add a static forward header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Build the descriptor
    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.id.is_empty() {
            return Err(Error::Config("service id is required".to_string()));
        }

        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config(format!("service '{}': base_url is required", self.id)))?;

        Ok(ServiceDescriptor {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            base_url,
            health_path: self.health_path.unwrap_or_else(|| "/health".to_string()),
            platform: self.platform.unwrap_or_default(),
            patterns: self.patterns,
            headers: self.headers,
        })
    }
}
