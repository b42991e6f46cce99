//! Resource Manager v3 client and the combined hierarchy adapter.

use crate::support::CloudSupportClient;
use crate::transport::ApiTransport;
use async_trait::async_trait;
use casewatch_core::{
    FolderInfo, HierarchyError, ProjectInfo, ResourceHierarchy, SourceError, WatchConfig,
};
use serde::Deserialize;
use std::sync::Arc;

const SERVICE: &str = "cloudresourcemanager";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProject {
    name: String,
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    parent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFolder {
    name: String,
    #[serde(default)]
    parent: String,
}

fn lookup_error(resource: String, err: SourceError) -> HierarchyError {
    HierarchyError::Lookup {
        resource,
        reason: err.to_string(),
    }
}

pub struct ResourceManagerClient {
    transport: ApiTransport,
}

impl ResourceManagerClient {
    pub fn new(transport: ApiTransport) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self, SourceError> {
        Ok(Self::new(ApiTransport::new(
            SERVICE,
            config.resource_manager_url.clone(),
            config.access_token_source(),
            config.api_key.clone(),
            config.request_timeout(),
            config.retry_config(),
        )?))
    }

    pub async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, HierarchyError> {
        let resource = format!("projects/{}", project_id);
        let project: ApiProject = self
            .transport
            .get_json(&format!("v3/{}", resource), &[])
            .await
            .map_err(|e| lookup_error(resource, e))?;
        Ok(ProjectInfo {
            name: project.name,
            project_id: project.project_id,
            parent: project.parent,
        })
    }

    pub async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, HierarchyError> {
        let resource = format!("folders/{}", folder_id);
        let folder: ApiFolder = self
            .transport
            .get_json(&format!("v3/{}", resource), &[])
            .await
            .map_err(|e| lookup_error(resource, e))?;
        Ok(FolderInfo {
            name: folder.name,
            parent: folder.parent,
        })
    }
}

impl std::fmt::Debug for ResourceManagerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManagerClient")
            .field("transport", &self.transport)
            .finish()
    }
}

/// Case parents come from the support API; everything above the project
/// comes from the resource manager.
#[derive(Debug)]
pub struct CloudHierarchy {
    support: Arc<CloudSupportClient>,
    resource_manager: ResourceManagerClient,
}

impl CloudHierarchy {
    pub fn new(support: Arc<CloudSupportClient>, resource_manager: ResourceManagerClient) -> Self {
        Self {
            support,
            resource_manager,
        }
    }
}

#[async_trait]
impl ResourceHierarchy for CloudHierarchy {
    async fn get_parent(&self, case_number: &str) -> Result<String, HierarchyError> {
        self.support
            .case_parent(case_number)
            .await
            .map_err(|e| lookup_error(format!("cases/{}", case_number), e))
    }

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo, HierarchyError> {
        self.resource_manager.get_project(project_id).await
    }

    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, HierarchyError> {
        self.resource_manager.get_folder(folder_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_payload_decodes() {
        let json = r#"{"name": "projects/555", "projectId": "my-proj",
                       "parent": "folders/77", "state": "ACTIVE"}"#;
        let project: ApiProject = serde_json::from_str(json).unwrap();
        assert_eq!(project.project_id, "my-proj");
        assert_eq!(project.parent, "folders/77");
    }

    #[test]
    fn test_lookup_error_wraps_source() {
        let err = lookup_error(
            "projects/x".to_string(),
            SourceError::Rejected {
                service: SERVICE.to_string(),
                status: 403,
                message: "denied".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("projects/x"));
        assert!(msg.contains("403"));
    }
}
