//! Client for the reference-library service.
//!
//! Covers the collaborator boundary of the recommendation dashboard: session
//! auth (`/api/auth/*`), the saved-paper listing (`/api/zotero/papers`),
//! library-cache maintenance, and the server-push recommendation stream
//! ([`stream`]). Authentication is cookie-based; one [`LibraryClient`] holds
//! the cookie jar for all requests, including the stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use paperscout_core::Paper;

pub mod stream;

pub use stream::SseTransport;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered 401; credentials are missing or expired.
    #[error("not logged in")]
    NotLoggedIn,
    /// The service answered with `success: false` and an error string.
    #[error("{0}")]
    Server(String),
}

/// Response of `GET /api/auth/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatus {
    pub logged_in: bool,
    #[serde(default)]
    pub zotero_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    zotero_id: &'a str,
    zotero_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    zotero_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PapersResponse {
    success: bool,
    #[serde(default)]
    papers: Vec<Paper>,
    #[serde(default, rename = "papersByCollection")]
    papers_by_collection: HashMap<String, Vec<Paper>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    success: bool,
    #[serde(default)]
    collections: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// The user's saved-paper library, flat and grouped by collection.
#[derive(Debug, Clone)]
pub struct Library {
    pub papers: Vec<Paper>,
    pub papers_by_collection: HashMap<String, Vec<Paper>>,
}

/// HTTP client for the reference-library service.
#[derive(Debug, Clone)]
pub struct LibraryClient {
    http: reqwest::Client,
    base_url: String,
}

impl LibraryClient {
    /// Build a client for `base_url` (e.g. `http://localhost:5000`) with a
    /// shared cookie jar for the login session.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A transport for [`paperscout_core::SessionController`] sharing this
    /// client's cookie jar.
    pub fn sse_transport(&self) -> SseTransport {
        SseTransport::new(self.http.clone(), self.base_url.clone())
    }

    pub async fn auth_status(&self) -> Result<AuthStatus, ApiError> {
        let resp = self.http.get(self.url("/api/auth/status")).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// Log in with Zotero credentials; the session cookie lands in the jar.
    /// Returns the confirmed Zotero id.
    pub async fn login(&self, zotero_id: &str, zotero_key: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest {
                zotero_id,
                zotero_key,
            })
            .send()
            .await?;
        // Login failures come back as 4xx with a JSON error body.
        let body: LoginResponse = resp.json().await?;
        if body.success {
            tracing::info!(zotero_id = %zotero_id, "logged in");
            Ok(body.zotero_id.unwrap_or_else(|| zotero_id.to_string()))
        } else {
            Err(ApiError::Server(
                body.error.unwrap_or_else(|| "登录失败".to_string()),
            ))
        }
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.http
            .post(self.url("/api/auth/logout"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch the saved-paper library.
    pub async fn papers(&self) -> Result<Library, ApiError> {
        let resp = self.http.get(self.url("/api/zotero/papers")).send().await?;
        let body: PapersResponse = Self::check_auth(resp)?.json().await?;
        if body.success {
            Ok(Library {
                papers: body.papers,
                papers_by_collection: body.papers_by_collection,
            })
        } else {
            Err(ApiError::Server(
                body.error.unwrap_or_else(|| "加载失败".to_string()),
            ))
        }
    }

    /// Fetch the sorted collection names of the library.
    pub async fn collections(&self) -> Result<Vec<String>, ApiError> {
        let resp = self
            .http
            .get(self.url("/api/zotero/collections"))
            .send()
            .await?;
        let body: CollectionsResponse = Self::check_auth(resp)?.json().await?;
        if body.success {
            Ok(body.collections)
        } else {
            Err(ApiError::Server(
                body.error.unwrap_or_else(|| "加载失败".to_string()),
            ))
        }
    }

    /// Force the server to re-fetch the library from Zotero.
    pub async fn refresh_library_cache(&self) -> Result<String, ApiError> {
        self.post_for_message("/api/zotero/refresh").await
    }

    /// Drop the server-side library cache.
    pub async fn clear_library_cache(&self) -> Result<String, ApiError> {
        self.post_for_message("/api/zotero/clear-cache").await
    }

    async fn post_for_message(&self, path: &str) -> Result<String, ApiError> {
        let resp = self.http.post(self.url(path)).send().await?;
        let body: MessageResponse = Self::check_auth(resp)?.json().await?;
        if body.success {
            Ok(body.message.unwrap_or_default())
        } else {
            Err(ApiError::Server(
                body.error.unwrap_or_else(|| "操作失败".to_string()),
            ))
        }
    }

    fn check_auth(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::NotLoggedIn);
        }
        Ok(resp.error_for_status()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn papers_response_decodes_service_shape() {
        let json = r#"{
            "success": true,
            "papers": [{
                "key": "ABCD1234",
                "title": "Attention Is All You Need",
                "authors": ["Vaswani", "Shazeer"],
                "abstract": "The dominant sequence transduction models...",
                "date": "2017-06-12",
                "dateAdded": "2024-01-02T03:04:05Z",
                "url": "https://arxiv.org/abs/1706.03762",
                "collections": ["NLP"]
            }],
            "papersByCollection": {
                "NLP": [{
                    "key": "ABCD1234",
                    "title": "Attention Is All You Need",
                    "authors": ["Vaswani"],
                    "date": "2017-06-12",
                    "collections": ["NLP"]
                }]
            },
            "total": 1
        }"#;
        let body: PapersResponse = serde_json::from_str(json).unwrap();
        assert!(body.success);
        assert_eq!(body.papers.len(), 1);
        assert_eq!(body.papers[0].key, "ABCD1234");
        assert_eq!(
            body.papers[0].abstract_text.as_deref(),
            Some("The dominant sequence transduction models...")
        );
        assert_eq!(body.papers_by_collection["NLP"].len(), 1);
    }

    #[test]
    fn papers_response_tolerates_missing_fields() {
        let json = r#"{"success": false, "error": "加载失败"}"#;
        let body: PapersResponse = serde_json::from_str(json).unwrap();
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("加载失败"));
        assert!(body.papers.is_empty());
    }

    #[test]
    fn login_response_decodes_both_shapes() {
        let ok: LoginResponse =
            serde_json::from_str(r#"{"success": true, "zotero_id": "12345", "user_id": "u1"}"#)
                .unwrap();
        assert!(ok.success);
        assert_eq!(ok.zotero_id.as_deref(), Some("12345"));

        let err: LoginResponse =
            serde_json::from_str(r#"{"success": false, "error": "Zotero API Key 无效"}"#).unwrap();
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("Zotero API Key 无效"));
    }

    #[test]
    fn auth_status_decodes_logged_out() {
        let status: AuthStatus =
            serde_json::from_str(r#"{"success": true, "logged_in": false}"#).unwrap();
        assert!(!status.logged_in);
        assert!(status.zotero_id.is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = LibraryClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("/api/auth/status"), "http://localhost:5000/api/auth/status");
    }
}
