// ABOUTME: Control-plane client library for the Atrium workspace platform
// ABOUTME: Hardened transport, session handshake, workspace lifecycle, agent resolution

mod agents;
mod client;
mod error;
mod models;
mod protocol;
mod transport;

pub use client::{SessionInfo, WorkspaceClient};
pub use error::{ClientError, AUTH_REASON_FALLBACK};
pub use models::{
    AgentModel, AgentStatus, BuildInfo, BuildStatus, CreateWorkspaceBuildRequest, Role, Template,
    User, Workspace, WorkspaceAgent, WorkspaceBuild, WorkspaceResource, WorkspaceTransition,
};
pub use transport::{ProxyConfig, TlsConfig, TransportConfig, SESSION_TOKEN_HEADER};
