//! Cloud resource hierarchy: resource paths, ancestry, tracked assets.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PROJECT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"projects/([^/]+)").expect("Invalid project regex"));
static FOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^folders/([^/]+)$").expect("Invalid folder regex"));
static ORGANIZATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^organizations/(\d+)$").expect("Invalid organization regex"));

/// Project id embedded in a case parent path such as `projects/123`.
pub fn project_from_parent(parent: &str) -> Option<String> {
    PROJECT_PATTERN
        .captures(parent)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The parent of a project or folder node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Organization(String),
    Folder(String),
}

impl ParentRef {
    /// Parse `organizations/{id}` or `folders/{id}`. Anything else is not a
    /// node the ancestry walk can follow.
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(caps) = ORGANIZATION_PATTERN.captures(path.trim()) {
            return caps.get(1).map(|m| Self::Organization(m.as_str().to_string()));
        }
        FOLDER_PATTERN
            .captures(path.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| Self::Folder(m.as_str().to_string()))
    }
}

/// Project metadata returned by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// `projects/{number}`
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// `folders/{id}`
    pub name: String,
    #[serde(default)]
    pub parent: String,
}

// ============================================================================
// TRACKED ASSETS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Organization,
    Folder,
    Project,
}

impl AssetKind {
    pub fn collection(&self) -> &'static str {
        match self {
            AssetKind::Organization => "organizations",
            AssetKind::Folder => "folders",
            AssetKind::Project => "projects",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Organization => f.write_str("organization"),
            AssetKind::Folder => f.write_str("folder"),
            AssetKind::Project => f.write_str("project"),
        }
    }
}

/// An organization, folder or project whose new cases should automatically
/// gain the listed watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackedAsset {
    pub channel_id: String,
    pub asset_kind: AssetKind,
    /// Bare id or the full `{collection}/{id}` form.
    pub asset_id: String,
    #[serde(default)]
    pub cc_list: Vec<String>,
    #[serde(default)]
    pub user_id: String,
}

impl TrackedAsset {
    /// The asset id with any `{collection}/` prefix removed.
    pub fn normalized_id(&self) -> &str {
        let prefix = self.asset_kind.collection();
        self.asset_id
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.asset_id)
    }

    /// Registry key; one entry per channel and asset.
    pub fn registry_key(&self) -> String {
        format!("{}:{}:{}", self.channel_id, self.asset_kind, self.normalized_id())
    }
}

// ============================================================================
// ANCESTRY
// ============================================================================

/// Where a case's project sits in the resource tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ancestry {
    pub organization: Option<String>,
    /// Nearest folder first.
    pub folders: Vec<String>,
    /// Every identifier the project is known by (number and id).
    pub project: Vec<String>,
}

impl Ancestry {
    pub fn matches(&self, asset: &TrackedAsset) -> bool {
        let id = asset.normalized_id();
        match asset.asset_kind {
            AssetKind::Organization => self.organization.as_deref() == Some(id),
            AssetKind::Folder => self.folders.iter().any(|f| f == id),
            AssetKind::Project => self.project.iter().any(|p| p == id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(kind: AssetKind, id: &str) -> TrackedAsset {
        TrackedAsset {
            channel_id: "C1".to_string(),
            asset_kind: kind,
            asset_id: id.to_string(),
            cc_list: vec![],
            user_id: "U1".to_string(),
        }
    }

    #[test]
    fn test_project_from_parent() {
        assert_eq!(project_from_parent("projects/my-proj"), Some("my-proj".to_string()));
        assert_eq!(
            project_from_parent("projects/123/cases/9"),
            Some("123".to_string())
        );
        assert_eq!(project_from_parent("organizations/1"), None);
    }

    #[test]
    fn test_parent_ref_parse() {
        assert_eq!(
            ParentRef::parse("organizations/42"),
            Some(ParentRef::Organization("42".to_string()))
        );
        assert_eq!(
            ParentRef::parse("folders/abc"),
            Some(ParentRef::Folder("abc".to_string()))
        );
        assert_eq!(ParentRef::parse("organizations/not-a-number"), None);
        assert_eq!(ParentRef::parse(""), None);
    }

    #[test]
    fn test_normalized_id_strips_collection() {
        assert_eq!(asset(AssetKind::Folder, "folders/77").normalized_id(), "77");
        assert_eq!(asset(AssetKind::Folder, "77").normalized_id(), "77");
        assert_eq!(
            asset(AssetKind::Project, "projects/p").normalized_id(),
            "p"
        );
    }

    #[test]
    fn test_ancestry_matches_each_scope() {
        let ancestry = Ancestry {
            organization: Some("1".to_string()),
            folders: vec!["10".to_string(), "20".to_string()],
            project: vec!["555".to_string(), "my-proj".to_string()],
        };
        assert!(ancestry.matches(&asset(AssetKind::Organization, "1")));
        assert!(ancestry.matches(&asset(AssetKind::Folder, "folders/20")));
        assert!(ancestry.matches(&asset(AssetKind::Project, "my-proj")));
        assert!(!ancestry.matches(&asset(AssetKind::Project, "other")));
        assert!(!ancestry.matches(&asset(AssetKind::Organization, "2")));
    }
}
