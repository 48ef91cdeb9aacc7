// ABOUTME: Error types for atrium-client
// ABOUTME: One kind per failing surface, each carrying URL, HTTP status, and reason

use reqwest::StatusCode;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Reason shown when the server rejected the current-user call without a message.
pub const AUTH_REASON_FALLBACK: &str = "has your token expired?";

/// Errors that can occur in atrium-client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The current-user call failed. The session stays unauthenticated.
    #[error("authentication failed: {url} returned {status}: {reason}")]
    Authentication {
        url: String,
        status: StatusCode,
        reason: String,
    },

    /// A workspace listing, agent resolution, or build-transition call failed.
    #[error("workspace request for \"{name}\" failed: {url} returned {status}: {reason}")]
    Workspace {
        name: String,
        url: String,
        status: StatusCode,
        reason: String,
    },

    /// A template lookup failed (only reachable from an update transition).
    #[error("template lookup failed: {url} returned {status}: {reason}")]
    Template {
        url: String,
        status: StatusCode,
        reason: String,
    },

    /// The build-info call failed after authentication succeeded. Non-recoverable
    /// at this layer.
    #[error("could not fetch server build info: {url} returned {status}: {reason}")]
    BuildInfo {
        url: String,
        status: StatusCode,
        reason: String,
    },

    /// An operation was invoked before `authenticate` completed.
    #[error("client is not authenticated; call authenticate() first")]
    NotAuthenticated,

    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server responded but the body did not match the expected shape.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The base URL could not be parsed at construction time.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Trust-root or verifier construction failed. Construction is all-or-nothing.
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// The external header-source command failed or produced malformed output.
    #[error("header command failed: {0}")]
    HeaderCommand(String),

    /// A required header (session token, user-agent, or a custom pair) is not
    /// a valid HTTP header.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl ClientError {
    /// Map a protocol failure from the current-user call.
    pub(crate) fn authentication(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status {
                url,
                status,
                reason,
            } => Self::Authentication {
                url,
                status,
                reason: if reason == crate::protocol::REASON_FALLBACK {
                    AUTH_REASON_FALLBACK.to_string()
                } else {
                    reason
                },
            },
            other => Self::wire(other),
        }
    }

    /// Map a protocol failure from a workspace-scoped call. `name` is the
    /// workspace name, or the listing scope for bulk queries.
    pub(crate) fn workspace(name: &str, err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status {
                url,
                status,
                reason,
            } => Self::Workspace {
                name: name.to_string(),
                url,
                status,
                reason,
            },
            other => Self::wire(other),
        }
    }

    /// Map a protocol failure from a template lookup.
    pub(crate) fn template(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status {
                url,
                status,
                reason,
            } => Self::Template {
                url,
                status,
                reason,
            },
            other => Self::wire(other),
        }
    }

    /// Map a protocol failure from the build-info call.
    pub(crate) fn build_info(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status {
                url,
                status,
                reason,
            } => Self::BuildInfo {
                url,
                status,
                reason,
            },
            other => Self::wire(other),
        }
    }

    /// Failures below the HTTP layer keep their own kind regardless of which
    /// operation issued the call.
    fn wire(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Transport { url, source } => Self::Transport { url, source },
            ProtocolError::Decode { url, source } => Self::Decode { url, source },
            // Status is handled by the typed constructors above.
            ProtocolError::Status {
                url,
                status,
                reason,
            } => Self::Workspace {
                name: "unknown".to_string(),
                url,
                status,
                reason,
            },
        }
    }

    /// HTTP status carried by this error, if the server responded at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Authentication { status, .. }
            | Self::Workspace { status, .. }
            | Self::Template { status, .. }
            | Self::BuildInfo { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the error means the caller must re-authenticate.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::NotAuthenticated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REASON_FALLBACK;

    fn status_err(status: u16, reason: &str) -> ProtocolError {
        ProtocolError::Status {
            url: "https://atrium.example.com/api/v2/users/me".to_string(),
            status: StatusCode::from_u16(status).unwrap(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_authentication_keeps_server_reason() {
        let err = ClientError::authentication(status_err(401, "api key expired"));
        let display = format!("{}", err);
        assert!(display.contains("authentication failed"));
        assert!(display.contains("401"));
        assert!(display.contains("api key expired"));
    }

    #[test]
    fn test_authentication_falls_back_to_token_hint() {
        let err = ClientError::authentication(status_err(401, REASON_FALLBACK));
        let display = format!("{}", err);
        assert!(display.contains(AUTH_REASON_FALLBACK));
    }

    #[test]
    fn test_workspace_error_names_workspace() {
        let err = ClientError::workspace("dev", status_err(409, "busy"));
        let display = format!("{}", err);
        assert!(display.contains("\"dev\""));
        assert!(display.contains("409"));
        assert!(display.contains("busy"));
    }

    #[test]
    fn test_template_error_display() {
        let err = ClientError::template(status_err(404, "template gone"));
        assert!(matches!(err, ClientError::Template { .. }));
        assert!(format!("{}", err).contains("template lookup failed"));
    }

    #[test]
    fn test_build_info_error_display() {
        let err = ClientError::build_info(status_err(500, "boom"));
        assert!(matches!(err, ClientError::BuildInfo { .. }));
        assert!(format!("{}", err).contains("build info"));
    }

    #[test]
    fn test_status_accessor() {
        let err = ClientError::workspace("dev", status_err(200, "expected 201"));
        assert_eq!(err.status(), Some(StatusCode::OK));
        assert_eq!(ClientError::NotAuthenticated.status(), None);
    }

    #[test]
    fn test_is_auth_error() {
        assert!(ClientError::authentication(status_err(401, "nope")).is_auth_error());
        assert!(ClientError::NotAuthenticated.is_auth_error());
        assert!(!ClientError::template(status_err(404, "gone")).is_auth_error());
    }

    #[test]
    fn test_not_authenticated_display() {
        let display = format!("{}", ClientError::NotAuthenticated);
        assert!(display.contains("authenticate()"));
    }
}
