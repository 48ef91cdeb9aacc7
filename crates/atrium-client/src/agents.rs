// ABOUTME: Agent resolution for atrium-client
// ABOUTME: Per-workspace resource fan-out recovering agents omitted from bulk listings

use futures::future;
use tracing::debug;

use crate::client::WorkspaceClient;
use crate::error::ClientError;
use crate::models::{AgentModel, Workspace};

impl WorkspaceClient {
    /// Resolve the agents of every given workspace.
    ///
    /// The bulk workspace listing omits agent data when a workspace is
    /// powered off, so this issues one template-version resource lookup per
    /// workspace and derives agent models from the combination. Lookups run
    /// concurrently; any single failure aborts the whole call with a
    /// workspace error naming the failing workspace — no partial list is
    /// ever returned. Callers needing partial results must resolve per
    /// workspace and filter.
    pub async fn resolve_agents(
        &self,
        workspaces: &[Workspace],
    ) -> Result<Vec<AgentModel>, ClientError> {
        self.me()?;

        let lookups = workspaces.iter().map(|workspace| async move {
            let resources = self
                .protocol
                .template_version_resources(workspace.latest_build.template_version_id)
                .await
                .map_err(|e| ClientError::workspace(&workspace.name, e))?;
            Ok::<_, ClientError>(AgentModel::derive(workspace, &resources))
        });

        let per_workspace = future::try_join_all(lookups).await?;
        let agents: Vec<AgentModel> = per_workspace.into_iter().flatten().collect();
        debug!(
            workspaces = workspaces.len(),
            agents = agents.len(),
            "resolved agents"
        );
        Ok(agents)
    }
}
