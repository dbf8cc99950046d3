// Application configuration

use crate::Error;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Application-wide settings read by the router and the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix for every route, e.g. `/api`.
    pub base_url: String,
    /// Headers set on every routed response.
    pub default_headers: BTreeMap<String, String>,
    pub cors: CorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "/api".to_string(),
            default_headers: BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            cors: CorsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }

    /// Default headers as a header map.
    pub fn default_header_map(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            headers.insert(header_name(name)?, header_value(name, value)?);
        }
        Ok(headers)
    }

    /// Check that every configured header is well formed.
    pub fn validate(&self) -> Result<(), Error> {
        self.default_header_map()?;
        self.cors.header_map()?;
        Ok(())
    }
}

/// CORS settings, sent as `Access-Control-*` headers on routed responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["OPTIONS".to_string(), "HEAD".to_string()],
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// The CORS headers. Empty lists are left out; credentials are always sent.
    pub fn header_map(&self) -> Result<HeaderMap, Error> {
        let lists = [
            ("access-control-allow-origin", &self.allowed_origins),
            ("access-control-allow-methods", &self.allowed_methods),
            ("access-control-allow-headers", &self.allowed_headers),
            ("access-control-expose-headers", &self.exposed_headers),
        ];

        let mut headers = HeaderMap::new();
        for (name, values) in lists {
            if values.is_empty() {
                continue;
            }
            headers.insert(HeaderName::from_static(name), header_value(name, &values.join(","))?);
        }
        headers.insert(
            HeaderName::from_static("access-control-allow-credentials"),
            HeaderValue::from_static(if self.allow_credentials { "true" } else { "false" }),
        );
        Ok(headers)
    }
}

fn header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader {
        name: name.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader {
        name: name.to_string(),
    })
}
