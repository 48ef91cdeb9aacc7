// ABOUTME: Protocol facade for the Atrium REST API
// ABOUTME: One typed method per endpoint; pure marshaling, no retry or caching

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    BuildInfo, CreateWorkspaceBuildRequest, Template, User, Workspace, WorkspaceBuild,
    WorkspaceResource,
};

/// Reason used when the server supplied no message with a failing status.
pub(crate) const REASON_FALLBACK: &str = "no reason given by the server";

const API_PREFIX: &str = "/api/v2";

/// A single failed protocol call.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The server answered with an unexpected status.
    #[error("{url} returned {status}: {reason}")]
    Status {
        url: String,
        status: StatusCode,
        reason: String,
    },

    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not decode into the expected type.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Error body shape used by the server for failing calls.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WorkspacesResponse {
    workspaces: Vec<Workspace>,
}

/// Typed request/response bindings over the shared transport. Stateless and
/// cheap to share; all policy lives in the callers.
#[derive(Debug, Clone)]
pub(crate) struct Protocol {
    http: reqwest::Client,
    /// Base URL without a trailing slash.
    base_url: String,
}

impl Protocol {
    pub(crate) fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) async fn me(&self) -> Result<User, ProtocolError> {
        self.get("/users/me").await
    }

    pub(crate) async fn build_info(&self) -> Result<BuildInfo, ProtocolError> {
        self.get("/buildinfo").await
    }

    /// Workspaces matching a search filter such as `owner:me`.
    pub(crate) async fn workspaces(&self, filter: &str) -> Result<Vec<Workspace>, ProtocolError> {
        let path = format!(
            "/workspaces?q={}",
            utf8_percent_encode(filter, NON_ALPHANUMERIC)
        );
        let response: WorkspacesResponse = self.get(&path).await?;
        Ok(response.workspaces)
    }

    pub(crate) async fn template(&self, template_id: Uuid) -> Result<Template, ProtocolError> {
        self.get(&format!("/templates/{}", template_id)).await
    }

    pub(crate) async fn template_version_resources(
        &self,
        template_version_id: Uuid,
    ) -> Result<Vec<WorkspaceResource>, ProtocolError> {
        self.get(&format!(
            "/templateversions/{}/resources",
            template_version_id
        ))
        .await
    }

    /// Create a workspace build. The server signals acceptance with 201
    /// Created exactly; any other status, 2xx included, is a failure.
    pub(crate) async fn create_workspace_build(
        &self,
        workspace_id: Uuid,
        request: &CreateWorkspaceBuildRequest,
    ) -> Result<WorkspaceBuild, ProtocolError> {
        self.send(
            Method::POST,
            &format!("/workspaces/{}/builds", workspace_id),
            Some(request),
            Some(StatusCode::CREATED),
        )
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProtocolError> {
        self.send::<(), T>(Method::GET, path, None, None).await
    }

    /// Single request/response exchange. `expected` of None accepts any 2xx;
    /// Some(code) accepts that status alone. Logged after the request is
    /// fully built so the log line reflects the headers actually sent.
    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        expected: Option<StatusCode>,
    ) -> Result<T, ProtocolError> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ProtocolError::Transport {
            url: url.clone(),
            source: e,
        })?;

        let status = response.status();
        tracing::debug!(%method, %url, status = status.as_u16(), "api call");

        let accepted = match expected {
            Some(code) => status == code,
            None => status.is_success(),
        };
        if !accepted {
            let reason = failure_reason(response).await;
            return Err(ProtocolError::Status {
                url,
                status,
                reason,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProtocolError::Decode { url, source: e })
    }
}

/// Extract a human-readable reason from a failing response body.
async fn failure_reason(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    reason_from_body(&body)
}

fn reason_from_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return if parsed.message.is_empty() {
            REASON_FALLBACK.to_string()
        } else {
            parsed.message
        };
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        REASON_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_prefers_server_message() {
        let reason = reason_from_body(r#"{"message": "workspace is locked"}"#);
        assert_eq!(reason, "workspace is locked");
    }

    #[test]
    fn test_reason_uses_raw_body_when_not_json() {
        assert_eq!(reason_from_body("  plain text error  "), "plain text error");
    }

    #[test]
    fn test_reason_falls_back_when_body_empty() {
        assert_eq!(reason_from_body(""), REASON_FALLBACK);
        assert_eq!(reason_from_body(r#"{"message": ""}"#), REASON_FALLBACK);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let protocol = Protocol::new(reqwest::Client::new(), "https://atrium.example.com/");
        assert_eq!(protocol.base_url, "https://atrium.example.com");
    }
}
