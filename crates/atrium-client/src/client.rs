// ABOUTME: WorkspaceClient for the Atrium control plane
// ABOUTME: One-time session handshake plus workspace lifecycle operations

use std::sync::OnceLock;

use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{
    CreateWorkspaceBuildRequest, User, Workspace, WorkspaceBuild, WorkspaceTransition,
};
use crate::protocol::Protocol;
use crate::transport::{build_transport, user_agent, TransportConfig};

/// Identity and server version cached by a successful handshake.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user: User,
    pub build_version: String,
}

/// Client for one Atrium deployment. Bound to exactly one base URL, one
/// session token, and one transport configuration for its lifetime;
/// reconfiguration means constructing a new instance.
///
/// `authenticate` must succeed once before any other operation; afterwards
/// the instance is safe to share across concurrent calls.
#[derive(Debug)]
pub struct WorkspaceClient {
    base_url: Url,
    pub(crate) protocol: Protocol,
    session: OnceLock<SessionInfo>,
}

impl WorkspaceClient {
    /// Construct the client and its hardened transport. Performs no network
    /// I/O; transport construction failures surface immediately.
    ///
    /// `identity` is the caller's product/version string, e.g.
    /// `"Atrium Toolbox/1.4.0"`; it becomes part of the user-agent.
    pub fn new(
        base_url: &str,
        token: &str,
        config: &TransportConfig,
        identity: &str,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = build_transport(token, &user_agent(identity), config)?;
        let protocol = Protocol::new(http, base_url.as_str());

        Ok(Self {
            base_url,
            protocol,
            session: OnceLock::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// One-time handshake: current user, then server build info. Readiness
    /// latches only when both succeed; a repeat call returns the cached
    /// identity without re-fetching. Retry policy belongs to the caller.
    pub async fn authenticate(&self) -> Result<User, ClientError> {
        if let Some(session) = self.session.get() {
            return Ok(session.user.clone());
        }

        let user = self
            .protocol
            .me()
            .await
            .map_err(ClientError::authentication)?;
        let build_info = self
            .protocol
            .build_info()
            .await
            .map_err(ClientError::build_info)?;

        info!(
            username = %user.username,
            server_version = %build_info.version,
            "session established"
        );

        // First writer wins if two handshakes race; both saw a success.
        let _ = self.session.set(SessionInfo {
            user: user.clone(),
            build_version: build_info.version,
        });

        Ok(user)
    }

    /// Whether the handshake has completed on this instance.
    pub fn ready(&self) -> bool {
        self.session.get().is_some()
    }

    /// Cached identity, or the guard error before authentication.
    pub fn me(&self) -> Result<&User, ClientError> {
        self.session().map(|s| &s.user)
    }

    /// Cached server version, or the guard error before authentication.
    pub fn build_version(&self) -> Result<&str, ClientError> {
        self.session().map(|s| s.build_version.as_str())
    }

    fn session(&self) -> Result<&SessionInfo, ClientError> {
        self.session.get().ok_or(ClientError::NotAuthenticated)
    }

    /// Workspaces owned by the authenticated user. Never queries the whole
    /// deployment.
    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, ClientError> {
        self.session()?;

        let filter = "owner:me";
        let workspaces = self
            .protocol
            .workspaces(filter)
            .await
            .map_err(|e| ClientError::workspace(filter, e))?;
        debug!(count = workspaces.len(), "listed workspaces");
        Ok(workspaces)
    }

    /// Request a start transition for the workspace.
    pub async fn start_workspace(
        &self,
        workspace: &Workspace,
    ) -> Result<WorkspaceBuild, ClientError> {
        self.session()?;
        self.transition(workspace, WorkspaceTransition::Start, None)
            .await
    }

    /// Request a stop transition for the workspace.
    pub async fn stop_workspace(
        &self,
        workspace: &Workspace,
    ) -> Result<WorkspaceBuild, ClientError> {
        self.session()?;
        self.transition(workspace, WorkspaceTransition::Stop, None)
            .await
    }

    /// Rebuild the workspace against its template's current active version.
    /// Looks the template up first, then issues the same build request as
    /// start/stop but keeps the workspace's last-known transition direction.
    pub async fn update_workspace(
        &self,
        workspace: &Workspace,
    ) -> Result<WorkspaceBuild, ClientError> {
        self.session()?;

        let template = self
            .protocol
            .template(workspace.template_id)
            .await
            .map_err(ClientError::template)?;

        self.transition(
            workspace,
            workspace.latest_build.transition,
            Some(template.active_version_id),
        )
        .await
    }

    async fn transition(
        &self,
        workspace: &Workspace,
        transition: WorkspaceTransition,
        template_version_id: Option<Uuid>,
    ) -> Result<WorkspaceBuild, ClientError> {
        info!(
            workspace = %workspace.name,
            ?transition,
            update = template_version_id.is_some(),
            "requesting workspace build"
        );

        let request = CreateWorkspaceBuildRequest {
            transition,
            template_version_id,
        };
        self.protocol
            .create_workspace_build(workspace.id, &request)
            .await
            .map_err(|e| ClientError::workspace(&workspace.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = WorkspaceClient::new(
            "not a url",
            "token",
            &TransportConfig::default(),
            "Atrium Toolbox/0.1.0",
        );
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_fresh_client_is_not_ready() {
        let client = WorkspaceClient::new(
            "https://atrium.example.com",
            "token",
            &TransportConfig::default(),
            "Atrium Toolbox/0.1.0",
        )
        .unwrap();

        assert!(!client.ready());
        assert!(matches!(client.me(), Err(ClientError::NotAuthenticated)));
        assert!(matches!(
            client.build_version(),
            Err(ClientError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_base_url_accessor() {
        let client = WorkspaceClient::new(
            "https://atrium.example.com/",
            "token",
            &TransportConfig::default(),
            "Atrium Toolbox/0.1.0",
        )
        .unwrap();
        assert_eq!(client.base_url().host_str(), Some("atrium.example.com"));
    }
}
