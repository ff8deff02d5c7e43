use serde::{Deserialize, Deserializer, Serialize};

/// Project type the platform uses for code analysis; never manifest-anchored.
pub const SAST_PROJECT_TYPE: &str = "sast";

/// Whether the platform is actively monitoring a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// A project monitored by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnykProject {
    pub id: String,
    /// Composite name: `<owner>/<repo>:<manifest path>`.
    pub name: String,
    pub origin: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub branch: Option<String>,
    pub status: ProjectStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProject {
    id: String,
    name: String,
    #[serde(default)]
    origin: String,
    #[serde(rename = "type", default)]
    project_type: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    status: Option<ProjectStatus>,
    #[serde(default)]
    is_monitored: Option<bool>,
}

// Platform responses carry either `status` or `isMonitored`.
impl<'de> Deserialize<'de> for SnykProject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawProject::deserialize(deserializer)?;
        let status = match (raw.status, raw.is_monitored) {
            (Some(status), _) => status,
            (None, Some(false)) => ProjectStatus::Inactive,
            (None, _) => ProjectStatus::Active,
        };
        Ok(SnykProject {
            id: raw.id,
            name: raw.name,
            origin: raw.origin,
            project_type: raw.project_type,
            branch: raw.branch,
            status,
        })
    }
}

impl SnykProject {
    /// The manifest path encoded after the first `:` of the name.
    pub fn manifest_path(&self) -> Option<&str> {
        self.name
            .split_once(':')
            .map(|(_, path)| path)
            .filter(|path| !path.is_empty())
    }

    /// The `<owner>/<repo>` part of the name.
    pub fn repo_full_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((repo, _)) => repo,
            None => &self.name,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }

    pub fn is_sast(&self) -> bool {
        self.project_type == SAST_PROJECT_TYPE
    }
}
