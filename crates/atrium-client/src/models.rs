// ABOUTME: Data models for atrium-client
// ABOUTME: Wire types for the Atrium REST protocol plus the derived AgentModel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated user. Fetched once per session, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// A role granted to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub name: String,
}

/// Server build metadata. Fetched once per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildInfo {
    pub version: String,
}

/// A workspace snapshot. Created and mutated server-side; the client only
/// reads these, never reconciles successive reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_name: String,
    pub template_id: Uuid,
    pub latest_build: WorkspaceBuild,
}

/// The server-side record produced by a lifecycle transition request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceBuild {
    pub id: Uuid,
    pub transition: WorkspaceTransition,
    pub template_version_id: Uuid,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
}

/// Direction of a lifecycle transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceTransition {
    Start,
    Stop,
}

/// Job state of a workspace build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Canceling,
    Canceled,
    Failed,
}

/// A reusable workspace definition. Only looked up to resolve the active
/// version for an update transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub active_version_id: Uuid,
}

/// A compute resource provisioned by a template version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceResource {
    pub id: Uuid,
    #[serde(default)]
    pub agents: Vec<WorkspaceAgent>,
}

/// A connectable process inside a workspace resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceAgent {
    pub id: Uuid,
    pub name: String,
    pub operating_system: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

/// Connection state of an agent. Absent in resource listings for powered-off
/// workspaces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Connecting,
    Connected,
    Disconnected,
    Timeout,
}

/// Request body for a build-transition call. Only the transition varies; the
/// template version is set for updates and omitted otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateWorkspaceBuildRequest {
    pub transition: WorkspaceTransition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_version_id: Option<Uuid>,
}

/// An agent joined with its owning workspace. Derived per call, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentModel {
    pub agent_id: Uuid,
    /// Host name for connection lists: the bare workspace name when the
    /// workspace has exactly one agent, otherwise `workspace.agent`.
    pub name: String,
    pub workspace_name: String,
    pub owner_name: String,
    pub operating_system: String,
    pub architecture: String,
    pub status: Option<AgentStatus>,
}

impl AgentModel {
    /// Combine a workspace with its resolved template-version resources into
    /// zero or more agent models.
    pub fn derive(workspace: &Workspace, resources: &[WorkspaceResource]) -> Vec<AgentModel> {
        let agents: Vec<&WorkspaceAgent> =
            resources.iter().flat_map(|r| r.agents.iter()).collect();
        let single = agents.len() == 1;

        agents
            .into_iter()
            .map(|agent| AgentModel {
                agent_id: agent.id,
                name: if single {
                    workspace.name.clone()
                } else {
                    format!("{}.{}", workspace.name, agent.name)
                },
                workspace_name: workspace.name.clone(),
                owner_name: workspace.owner_name.clone(),
                operating_system: agent.operating_system.clone(),
                architecture: agent.architecture.clone(),
                status: agent.status,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workspace(name: &str) -> Workspace {
        Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_name: "alice".to_string(),
            template_id: Uuid::new_v4(),
            latest_build: WorkspaceBuild {
                id: Uuid::new_v4(),
                transition: WorkspaceTransition::Start,
                template_version_id: Uuid::new_v4(),
                status: BuildStatus::Running,
                created_at: "2024-03-09T14:05:11.123Z".parse().unwrap(),
            },
        }
    }

    fn agent(name: &str) -> WorkspaceAgent {
        WorkspaceAgent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            operating_system: "linux".to_string(),
            architecture: "amd64".to_string(),
            status: Some(AgentStatus::Connected),
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        // Canonical RFC 3339 instants must survive decode/encode unchanged,
        // including sub-second precision and the UTC designator.
        for raw in [
            "\"2024-01-01T00:00:00Z\"",
            "\"2024-03-09T14:05:11.500Z\"",
            "\"2024-03-09T14:05:11.123456Z\"",
            "\"2024-03-09T14:05:11.123456789Z\"",
        ] {
            let decoded: DateTime<Utc> = serde_json::from_str(raw).unwrap();
            let encoded = serde_json::to_string(&decoded).unwrap();
            assert_eq!(encoded, raw);
        }
    }

    #[test]
    fn test_workspace_build_serde_round_trip() {
        let build = WorkspaceBuild {
            id: Uuid::new_v4(),
            transition: WorkspaceTransition::Stop,
            template_version_id: Uuid::new_v4(),
            status: BuildStatus::Stopped,
            created_at: "2024-03-09T14:05:11.123Z".parse().unwrap(),
        };

        let encoded = serde_json::to_string(&build).unwrap();
        let decoded: WorkspaceBuild = serde_json::from_str(&encoded).unwrap();
        assert_eq!(build, decoded);
    }

    #[test]
    fn test_transition_wire_values() {
        assert_eq!(
            serde_json::to_value(WorkspaceTransition::Start).unwrap(),
            json!("start")
        );
        assert_eq!(
            serde_json::to_value(WorkspaceTransition::Stop).unwrap(),
            json!("stop")
        );
    }

    #[test]
    fn test_build_request_omits_absent_template_version() {
        let req = CreateWorkspaceBuildRequest {
            transition: WorkspaceTransition::Start,
            template_version_id: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"transition": "start"})
        );

        let version = Uuid::new_v4();
        let req = CreateWorkspaceBuildRequest {
            transition: WorkspaceTransition::Stop,
            template_version_id: Some(version),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"transition": "stop", "template_version_id": version})
        );
    }

    #[test]
    fn test_resource_agents_default_to_empty() {
        let resource: WorkspaceResource =
            serde_json::from_value(json!({"id": Uuid::new_v4()})).unwrap();
        assert!(resource.agents.is_empty());
    }

    #[test]
    fn test_derive_single_agent_uses_workspace_name() {
        let ws = workspace("dev");
        let resources = vec![WorkspaceResource {
            id: Uuid::new_v4(),
            agents: vec![agent("main")],
        }];

        let models = AgentModel::derive(&ws, &resources);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "dev");
        assert_eq!(models[0].workspace_name, "dev");
        assert_eq!(models[0].owner_name, "alice");
    }

    #[test]
    fn test_derive_multiple_agents_qualify_names() {
        let ws = workspace("dev");
        let resources = vec![
            WorkspaceResource {
                id: Uuid::new_v4(),
                agents: vec![agent("main")],
            },
            WorkspaceResource {
                id: Uuid::new_v4(),
                agents: vec![agent("gpu")],
            },
        ];

        let models = AgentModel::derive(&ws, &resources);
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["dev.main", "dev.gpu"]);
    }

    #[test]
    fn test_derive_no_agents_yields_empty() {
        let ws = workspace("dev");
        let resources = vec![WorkspaceResource {
            id: Uuid::new_v4(),
            agents: vec![],
        }];
        assert!(AgentModel::derive(&ws, &resources).is_empty());
    }

    #[test]
    fn test_agent_status_optional_on_decode() {
        let decoded: WorkspaceAgent = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "main",
            "operating_system": "linux",
            "architecture": "arm64",
        }))
        .unwrap();
        assert!(decoded.status.is_none());
    }
}
