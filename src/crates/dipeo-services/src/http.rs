//! HTTP client trait used by API_JOB and INTEGRATED_API handlers (§6).

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Default)]
pub struct HttpAuth {
    pub bearer_token: Option<String>,
    pub basic: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        auth: Option<&HttpAuth>,
        timeout: Duration,
    ) -> Result<HttpResponse>;
}
