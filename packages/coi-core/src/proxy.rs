//! Interception policy for the header injection service worker.

use serde::{Deserialize, Serialize};

use crate::headers::HeaderSet;

/// Statuses whose responses carry no body and cannot be reconstructed with a
/// new header list.
pub const NULL_BODY_STATUSES: [u16; 4] = [0, 204, 205, 304];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    SameOrigin,
    NoCors,
    #[default]
    Cors,
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    #[serde(default)]
    pub cache: CacheMode,
    #[serde(default)]
    pub mode: RequestMode,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache: CacheMode::default(),
            mode: RequestMode::default(),
        }
    }

    /// `only-if-cached` requests outside `same-origin` mode cannot be served
    /// from a worker and are left to the browser.
    pub fn should_intercept(&self) -> bool {
        !(self.cache == CacheMode::OnlyIfCached && self.mode != RequestMode::SameOrigin)
    }
}

pub fn is_null_body_status(status: u16) -> bool {
    NULL_BODY_STATUSES.contains(&status)
}

/// Status line and headers of an upstream response. The body stream is never
/// inspected and is carried over by the binding layer as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderSet,
}

impl ResponseHead {
    pub fn new(status: u16, status_text: impl Into<String>, headers: HeaderSet) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
        }
    }
}

/// Returns `None` when the upstream response must be passed through untouched.
pub fn rewrite_head(upstream: &ResponseHead) -> Option<ResponseHead> {
    if is_null_body_status(upstream.status) {
        return None;
    }
    Some(ResponseHead {
        status: upstream.status,
        status_text: upstream.status_text.clone(),
        headers: upstream.headers.with_isolation_headers(),
    })
}
