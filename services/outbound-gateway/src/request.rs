// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request types: the inbound proxy call and the resolved outbound descriptor.
//!
//! Inbound `method` and `authStyle` arrive as free-form strings and are parsed
//! here, so that unknown values surface as a 400 envelope rather than a
//! framework-level JSON rejection.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Outbound HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// `GET`, `HEAD` and `OPTIONS` may be retried; everything else is sent once.
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("unsupported method: {s}")),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Where the server-held secret is placed on the outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// `Authorization: Bearer <secret>`
    Bearer,
    /// `X-API-Key: <secret>`
    #[serde(alias = "header")]
    HeaderApiKey,
    /// `?<query_key_name>=<secret>`
    #[serde(alias = "query")]
    QueryKey,
    None,
}

impl AuthStyle {
    pub fn requires_secret(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::HeaderApiKey => "header_api_key",
            Self::QueryKey => "query_key",
            Self::None => "none",
        }
    }
}

impl Default for AuthStyle {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for AuthStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "bearer" => Ok(Self::Bearer),
            "header" | "headerapikey" | "apikey" | "xapikey" => Ok(Self::HeaderApiKey),
            "query" | "querykey" => Ok(Self::QueryKey),
            "none" => Ok(Self::None),
            _ => Err(format!("unsupported auth style: {s}")),
        }
    }
}

/// Inbound proxy call as posted by the caller.
///
/// Everything except `base_url` is optional; the gateway fills gaps from the
/// provider registry and the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// Kept in insertion order (`serde_json` is built with `preserve_order`).
    #[serde(default)]
    pub query: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_style: Option<String>,
    #[serde(default)]
    pub query_key_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Fully resolved outbound call, owned by a single in-flight request.
#[derive(Debug)]
pub struct RequestDescriptor {
    pub target_base_url: String,
    pub path: String,
    pub method: HttpMethod,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub auth_style: AuthStyle,
    pub query_key_name: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// The single secret slot for this call. Never supplied by the caller.
    pub secret: Option<SecretString>,
}

/// Flatten a JSON query object into ordered string pairs.
///
/// Strings are taken verbatim, `null` entries are dropped, and other scalars
/// use their JSON rendering.
pub fn query_pairs(query: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    query
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), value))
        })
        .collect()
}
