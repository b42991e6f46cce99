//! Auto-subscription of tracked-asset watchers to newly tracked cases.
//!
//! A new case is resolved to its project, the project's folder chain and its
//! organization. Every tracked asset matching one of those nodes subscribes
//! its cc list; the addresses that were actually added are announced in a
//! single silent comment on the case.

use casewatch_core::{
    project_from_parent, Ancestry, CaseRecord, CommentRequest, HierarchyError, ParentRef,
    ResourceHierarchy, SupportActions, TrackedAsset, WatchResult,
};
use casewatch_storage::AssetRegistry;
use std::sync::Arc;

/// Author label signed under the subscription comment.
pub const AUTO_SUBSCRIBE_AUTHOR: &str = "Auto Asset Subscription";

/// Folder levels walked before giving up on an ancestry.
pub const MAX_FOLDER_DEPTH: usize = 10;

/// What auto-subscription did for one case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSubscribeOutcome {
    /// Newly subscribed addresses, first-seen order, no duplicates.
    pub added: Vec<String>,
    pub commented: bool,
    /// Per-asset subscription or comment failures that were skipped.
    pub failures: usize,
}

pub fn subscription_comment(emails: &[String]) -> String {
    format!(
        "The following emails have been added automatically through asset subscription: {}",
        emails.join(", ")
    )
}

#[derive(Clone)]
pub struct AutoSubscriber {
    hierarchy: Arc<dyn ResourceHierarchy>,
    registry: Arc<dyn AssetRegistry>,
    actions: Arc<dyn SupportActions>,
}

impl AutoSubscriber {
    pub fn new(
        hierarchy: Arc<dyn ResourceHierarchy>,
        registry: Arc<dyn AssetRegistry>,
        actions: Arc<dyn SupportActions>,
    ) -> Self {
        Self {
            hierarchy,
            registry,
            actions,
        }
    }

    /// Resolve where the case's project sits in the resource tree.
    pub async fn resolve_ancestry(&self, case: &CaseRecord) -> Result<Ancestry, HierarchyError> {
        let parent = if case.parent.is_empty() {
            self.hierarchy.get_parent(&case.case_number).await?
        } else {
            case.parent.clone()
        };

        let project_id =
            project_from_parent(&parent).ok_or_else(|| HierarchyError::NoProject {
                case_number: case.case_number.clone(),
                parent: parent.clone(),
            })?;
        let project = self.hierarchy.get_project(&project_id).await?;

        let mut ancestry = Ancestry::default();
        let number = project
            .name
            .strip_prefix("projects/")
            .unwrap_or(&project.name)
            .to_string();
        for id in [project_id, number, project.project_id.clone()] {
            if !id.is_empty() && !ancestry.project.contains(&id) {
                ancestry.project.push(id);
            }
        }

        let mut next = ParentRef::parse(&project.parent);
        while let Some(node) = next {
            match node {
                ParentRef::Organization(org) => {
                    ancestry.organization = Some(org);
                    break;
                }
                ParentRef::Folder(folder) => {
                    if ancestry.folders.len() >= MAX_FOLDER_DEPTH {
                        return Err(HierarchyError::TooDeep {
                            resource: project.name.clone(),
                            max_depth: MAX_FOLDER_DEPTH,
                        });
                    }
                    let info = self.hierarchy.get_folder(&folder).await?;
                    ancestry.folders.push(folder);
                    next = ParentRef::parse(&info.parent);
                }
            }
        }

        Ok(ancestry)
    }

    /// Subscribe every matching asset's watchers to `case`.
    ///
    /// Hierarchy and registry failures abort this case only. A failing asset
    /// is logged and skipped.
    pub async fn auto_subscribe(&self, case: &CaseRecord) -> WatchResult<AutoSubscribeOutcome> {
        let mut outcome = AutoSubscribeOutcome::default();

        let assets = self.registry.tracked_assets().await?;
        if assets.is_empty() {
            return Ok(outcome);
        }

        let ancestry = self.resolve_ancestry(case).await?;
        let matching: Vec<&TrackedAsset> = assets
            .iter()
            .filter(|asset| ancestry.matches(asset) && !asset.cc_list.is_empty())
            .collect();

        tracing::debug!(
            case_number = %case.case_number,
            organization = ?ancestry.organization,
            folders = ?ancestry.folders,
            matching = matching.len(),
            "Resolved case ancestry"
        );

        let mut author: Option<&TrackedAsset> = None;
        for asset in matching {
            let added = match self
                .actions
                .subscribe_emails(
                    &asset.channel_id,
                    &case.case_number,
                    &asset.cc_list,
                    &asset.user_id,
                )
                .await
            {
                Ok(added) => added,
                Err(e) => {
                    outcome.failures += 1;
                    tracing::warn!(
                        case_number = %case.case_number,
                        channel_id = %asset.channel_id,
                        asset_kind = %asset.asset_kind,
                        asset_id = %asset.asset_id,
                        error = %e,
                        "Asset subscription failed"
                    );
                    continue;
                }
            };

            for email in added {
                if !outcome
                    .added
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(&email))
                {
                    outcome.added.push(email);
                    author.get_or_insert(asset);
                }
            }
        }

        let Some(author) = author else {
            return Ok(outcome);
        };

        let request = CommentRequest {
            channel_id: author.channel_id.clone(),
            case_number: case.case_number.clone(),
            body: subscription_comment(&outcome.added),
            user_id: author.user_id.clone(),
            author_label: AUTO_SUBSCRIBE_AUTHOR.to_string(),
            notify: false,
        };
        match self.actions.add_comment(&request).await {
            Ok(()) => {
                outcome.commented = true;
                tracing::info!(
                    case_number = %case.case_number,
                    added = outcome.added.len(),
                    "Auto-subscribed watchers"
                );
            }
            Err(e) => {
                outcome.failures += 1;
                tracing::warn!(
                    case_number = %case.case_number,
                    error = %e,
                    "Failed to post subscription comment"
                );
            }
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for AutoSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSubscriber").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casewatch_core::{AssetKind, WatchError};
    use casewatch_test_utils::{
        tracked_asset, CaseBuilder, FakeHierarchy, FakeSupportActions, MockStore,
    };

    async fn registry(assets: &[TrackedAsset]) -> Arc<MockStore> {
        let store = Arc::new(MockStore::new());
        for asset in assets {
            store.upsert_asset(asset).await.unwrap();
        }
        store
    }

    fn nested_hierarchy() -> FakeHierarchy {
        FakeHierarchy::new()
            .with_project("555", "shop-prod", "folders/20")
            .with_folder("20", "folders/10")
            .with_folder("10", "organizations/1")
    }

    #[tokio::test]
    async fn test_resolve_walks_folder_chain() {
        let subscriber = AutoSubscriber::new(
            Arc::new(nested_hierarchy()),
            registry(&[]).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").parent("projects/555").build();
        let ancestry = subscriber.resolve_ancestry(&case).await.unwrap();
        assert_eq!(ancestry.organization.as_deref(), Some("1"));
        assert_eq!(ancestry.folders, vec!["20".to_string(), "10".to_string()]);
        assert_eq!(ancestry.project, vec!["555".to_string(), "shop-prod".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_case_lookup() {
        let hierarchy = FakeHierarchy::new()
            .with_case_parent("7", "projects/555")
            .with_project("555", "shop-prod", "organizations/1");
        let subscriber = AutoSubscriber::new(
            Arc::new(hierarchy),
            registry(&[]).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").parent("").build();
        let ancestry = subscriber.resolve_ancestry(&case).await.unwrap();
        assert_eq!(ancestry.organization.as_deref(), Some("1"));
        assert!(ancestry.folders.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rejects_cycles() {
        let hierarchy = FakeHierarchy::new()
            .with_project("555", "p", "folders/a")
            .with_folder("a", "folders/a");
        let subscriber = AutoSubscriber::new(
            Arc::new(hierarchy),
            registry(&[]).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").parent("projects/555").build();
        let err = subscriber.resolve_ancestry(&case).await.unwrap_err();
        assert!(matches!(err, HierarchyError::TooDeep { max_depth: 10, .. }));
    }

    #[tokio::test]
    async fn test_no_project_in_parent() {
        let subscriber = AutoSubscriber::new(
            Arc::new(FakeHierarchy::new()),
            registry(&[]).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").parent("organizations/1").build();
        let err = subscriber.resolve_ancestry(&case).await.unwrap_err();
        assert!(matches!(err, HierarchyError::NoProject { .. }));
    }

    #[tokio::test]
    async fn test_failing_asset_is_skipped() {
        let assets = [
            tracked_asset("C-bad", AssetKind::Organization, "1", &["ops@x.com"]),
            tracked_asset("C-good", AssetKind::Project, "shop-prod", &["dev@x.com"]),
        ];
        let actions = Arc::new(FakeSupportActions::new().failing_channel("C-bad"));
        let subscriber = AutoSubscriber::new(
            Arc::new(nested_hierarchy()),
            registry(&assets).await,
            actions.clone(),
        );
        let case = CaseBuilder::new("7").parent("projects/555").build();

        let outcome = subscriber.auto_subscribe(&case).await.unwrap();
        assert_eq!(outcome.added, vec!["dev@x.com".to_string()]);
        assert_eq!(outcome.failures, 1);
        assert!(outcome.commented);

        let comments = actions.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].channel_id, "C-good");
        assert!(!comments[0].notify);
    }

    #[tokio::test]
    async fn test_nothing_new_means_no_comment() {
        let assets = [tracked_asset("C1", AssetKind::Folder, "folders/10", &["a@x.com"])];
        let actions = Arc::new(FakeSupportActions::new().with_subscribers("7", &["a@x.com"]));
        let subscriber = AutoSubscriber::new(
            Arc::new(nested_hierarchy()),
            registry(&assets).await,
            actions.clone(),
        );
        let case = CaseBuilder::new("7").parent("projects/555").build();

        let outcome = subscriber.auto_subscribe(&case).await.unwrap();
        assert!(outcome.added.is_empty());
        assert!(!outcome.commented);
        assert!(actions.comments().is_empty());
    }

    #[tokio::test]
    async fn test_hierarchy_error_aborts_case() {
        let assets = [tracked_asset("C1", AssetKind::Organization, "1", &["a@x.com"])];
        let subscriber = AutoSubscriber::new(
            Arc::new(FakeHierarchy::new()),
            registry(&assets).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").parent("projects/555").build();
        let err = subscriber.auto_subscribe(&case).await.unwrap_err();
        assert!(matches!(err, WatchError::Hierarchy(_)));
    }

    #[tokio::test]
    async fn test_no_assets_skips_lookups() {
        let hierarchy = Arc::new(FakeHierarchy::new());
        let subscriber = AutoSubscriber::new(
            hierarchy.clone(),
            registry(&[]).await,
            Arc::new(FakeSupportActions::new()),
        );
        let case = CaseBuilder::new("7").build();
        let outcome = subscriber.auto_subscribe(&case).await.unwrap();
        assert_eq!(outcome, AutoSubscribeOutcome::default());
        assert!(hierarchy.lookups().is_empty());
    }

    #[test]
    fn test_comment_text() {
        assert_eq!(
            subscription_comment(&["a@x".to_string(), "b@y".to_string()]),
            "The following emails have been added automatically through asset subscription: a@x, b@y"
        );
    }
}
