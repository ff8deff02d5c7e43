use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MigrError;

/// Identity fields that make up a [`TargetId`], in order.
///
/// Changing this list changes every TargetId ever logged, which breaks
/// deduplication against earlier runs. Add a new version instead.
pub const TARGET_ID_FIELDS_V1: &[&str] = &[
    "name",
    "appId",
    "functionId",
    "slugId",
    "owner",
    "projectKey",
    "repoSlug",
    "id",
    "branch",
];

/// One importable unit on a source host.
///
/// The variant is picked from the fields present in the input JSON, so
/// the order of the variants matters for deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// GitLab project addressed by numeric id. Sent as exactly `{id, branch}`;
    /// an input `name` only takes part in the TargetId.
    GitLab {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing)]
        name: Option<String>,
    },
    /// Bitbucket Server repository.
    #[serde(rename_all = "camelCase")]
    BitbucketServer {
        project_key: String,
        repo_slug: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// PaaS / serverless application.
    App(AppTarget),
    /// Repository on GitHub-like hosts (GitHub, Bitbucket Cloud, Azure Repos).
    Repo {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

/// PaaS / serverless target, identified by any non-empty combination of
/// `appId`, `functionId` and `slugId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAppTarget")]
pub struct AppTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppTarget {
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    function_id: Option<String>,
    #[serde(default)]
    slug_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<RawAppTarget> for AppTarget {
    type Error = String;

    fn try_from(raw: RawAppTarget) -> Result<Self, Self::Error> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.is_empty());
        if !(present(&raw.app_id) || present(&raw.function_id) || present(&raw.slug_id)) {
            return Err("app target needs appId, functionId or slugId".to_string());
        }
        Ok(Self {
            app_id: raw.app_id,
            function_id: raw.function_id,
            slug_id: raw.slug_id,
            name: raw.name,
        })
    }
}

impl Target {
    pub fn repo(owner: &str, name: &str, branch: Option<&str>) -> Self {
        Target::Repo {
            name: name.to_string(),
            owner: Some(owner.to_string()),
            branch: branch.map(str::to_string),
        }
    }

    /// The recognized identity fields this target carries, keyed by their
    /// wire names. Empty values are treated as absent.
    pub fn identity_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        let mut push = |key: &'static str, value: Option<&str>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                fields.push((key, v.to_string()));
            }
        };
        match self {
            Target::GitLab { id, branch, name } => {
                let id = id.to_string();
                push("id", Some(id.as_str()));
                push("branch", branch.as_deref());
                push("name", name.as_deref());
            }
            Target::BitbucketServer {
                project_key,
                repo_slug,
                name,
            } => {
                push("projectKey", Some(project_key.as_str()));
                push("repoSlug", Some(repo_slug.as_str()));
                push("name", name.as_deref());
            }
            Target::App(app) => {
                push("appId", app.app_id.as_deref());
                push("functionId", app.function_id.as_deref());
                push("slugId", app.slug_id.as_deref());
                push("name", app.name.as_deref());
            }
            Target::Repo {
                name,
                owner,
                branch,
            } => {
                push("name", Some(name.as_str()));
                push("owner", owner.as_deref());
                push("branch", branch.as_deref());
            }
        }
        fields
    }

    /// Human-readable label for progress output.
    pub fn display_name(&self) -> String {
        match self {
            Target::GitLab { id, .. } => format!("gitlab project {id}"),
            Target::BitbucketServer {
                project_key,
                repo_slug,
                ..
            } => format!("{project_key}/{repo_slug}"),
            Target::App(app) => {
                let id = [&app.app_id, &app.function_id, &app.slug_id]
                    .into_iter()
                    .flatten()
                    .find(|v| !v.is_empty())
                    .map(String::as_str)
                    .unwrap_or_default();
                format!("app {id}")
            }
            Target::Repo {
                name,
                owner: Some(owner),
                ..
            } => format!("{owner}/{name}"),
            Target::Repo { name, .. } => name.clone(),
        }
    }
}

/// Deterministic identity of a target within an org and integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(org_id: &str, integration_id: &str, target: &Target) -> Self {
        let fields = target.identity_fields();
        let mut parts = vec![org_id.to_string(), integration_id.to_string()];
        for key in TARGET_ID_FIELDS_V1 {
            if let Some((_, value)) = fields.iter().find(|(k, _)| k == key) {
                parts.push(value.clone());
            }
        }
        Self(parts.join(":"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A manifest path inside an import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFileRef {
    pub path: String,
}

/// One entry of an import input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTarget {
    pub org_id: String,
    pub integration_id: String,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ImportFileRef>>,
    /// Comma-separated globs excluded from the import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_globs: Option<String>,
}

impl ImportTarget {
    pub fn new(org_id: &str, integration_id: &str, target: Target) -> Self {
        Self {
            org_id: org_id.to_string(),
            integration_id: integration_id.to_string(),
            target,
            files: None,
            exclusion_globs: None,
        }
    }

    pub fn target_id(&self) -> TargetId {
        TargetId::new(&self.org_id, &self.integration_id, &self.target)
    }
}

/// Top-level import input file: `{"targets": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportFile {
    pub targets: Vec<ImportTarget>,
}

impl ImportFile {
    /// Load an import file. A missing or malformed file is a fatal error.
    pub fn load_from(path: &Path) -> Result<Self, MigrError> {
        if !path.exists() {
            return Err(MigrError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            MigrError::Serialization(format!("invalid import file {}: {e}", path.display()))
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), MigrError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
