pub mod github;
pub mod gitlab;

use async_trait::async_trait;
use migr_core::error::MigrError;
use migr_core::models::source::SourceType;
use migr_core::models::target::Target;

/// Entries per page requested from paginated host APIs.
pub(crate) const PER_PAGE: u32 = 100;

/// A repo as returned by a hosting API.
#[derive(Debug, Clone, Default)]
pub struct RemoteRepo {
    /// Numeric id, for hosts that address repos by id.
    pub id: Option<u64>,
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    /// Empty when the host did not report one.
    pub default_branch: String,
    pub is_fork: bool,
    pub is_private: bool,
    pub is_archived: bool,
}

impl RemoteRepo {
    /// The import target addressing this repo on its default branch.
    pub fn to_target(&self, kind: SourceType) -> Result<Target, MigrError> {
        let branch = Some(self.default_branch.as_str()).filter(|b| !b.is_empty());
        match kind {
            SourceType::GitLab => {
                let id = self.id.ok_or_else(|| MigrError::InvalidTarget {
                    message: format!("{} has no numeric project id", self.full_name),
                })?;
                Ok(Target::GitLab {
                    id,
                    branch: branch.map(str::to_string),
                    name: None,
                })
            }
            SourceType::BitbucketServer => Ok(Target::BitbucketServer {
                project_key: self.owner.clone(),
                repo_slug: self.name.clone(),
                name: None,
            }),
            _ => Ok(Target::repo(&self.owner, &self.name, branch)),
        }
    }
}

/// Trait for reading repositories from a source code host.
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// List all repos in an org / group / user namespace (handles pagination).
    async fn list_repos(&self, namespace: &str) -> Result<Vec<RemoteRepo>, MigrError>;

    /// Get a specific repo by owner/name. `None` when it does not exist.
    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RemoteRepo>, MigrError>;

    /// The repo's default branch; empty when it cannot be determined.
    async fn default_branch(&self, owner: &str, name: &str) -> Result<String, MigrError> {
        Ok(self
            .get_repo(owner, name)
            .await?
            .map(|r| r.default_branch)
            .unwrap_or_default())
    }

    /// Every file path in the repo at `branch`, relative to its root.
    async fn list_files(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
    ) -> Result<Vec<String>, MigrError>;

    /// The kind of host this provider handles.
    fn kind(&self) -> SourceType;
}

/// Create a HostProvider for the given source type. `api_url` overrides the
/// host's public API and is required for self-hosted kinds.
pub fn create_provider(
    kind: SourceType,
    api_url: Option<&url::Url>,
    token: &str,
) -> Result<Box<dyn HostProvider>, MigrError> {
    let api_url = match api_url.cloned().or_else(|| kind.default_api_url()) {
        Some(url) => url,
        None => {
            return Err(MigrError::Config {
                message: format!("no API URL configured for {kind}"),
            })
        }
    };
    match kind {
        SourceType::GitHub | SourceType::GitHubEnterprise => Ok(Box::new(
            github::GitHubProvider::new(api_url, token, kind)?,
        )),
        SourceType::GitLab => Ok(Box::new(gitlab::GitLabProvider::new(api_url, token)?)),
        other => Err(MigrError::ProviderNotImplemented {
            kind: other.to_string(),
        }),
    }
}

/// Map a failed host response to an error.
pub(crate) async fn response_error(resp: reqwest::Response) -> MigrError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    MigrError::Api {
        status,
        message: message.chars().take(200).collect(),
        request_id: None,
    }
}

pub(crate) fn network_error(e: reqwest::Error) -> MigrError {
    MigrError::Network {
        message: e.without_url().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RemoteRepo {
        RemoteRepo {
            id: Some(42),
            full_name: "snyk/cli".to_string(),
            owner: "snyk".to_string(),
            name: "cli".to_string(),
            default_branch: "main".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_to_target_per_source() {
        let target = repo().to_target(SourceType::GitHub).unwrap();
        assert_eq!(target, Target::repo("snyk", "cli", Some("main")));

        let target = repo().to_target(SourceType::GitLab).unwrap();
        assert_eq!(
            target,
            Target::GitLab {
                id: 42,
                branch: Some("main".to_string()),
                name: None,
            }
        );

        let mut no_branch = repo();
        no_branch.default_branch.clear();
        let target = no_branch.to_target(SourceType::AzureRepos).unwrap();
        assert_eq!(target, Target::repo("snyk", "cli", None));
    }

    #[test]
    fn test_unsupported_provider() {
        let url = url::Url::parse("https://bitbucket.example.com").unwrap();
        let err = create_provider(SourceType::BitbucketServer, Some(&url), "t")
            .err()
            .unwrap();
        assert!(matches!(err, MigrError::ProviderNotImplemented { .. }));
    }
}
