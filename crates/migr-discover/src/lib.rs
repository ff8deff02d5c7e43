pub mod clone;
pub mod manifests;
pub mod reconcile;
pub mod scanner;

use std::path::PathBuf;

use migr_core::error::MigrError;
use migr_core::models::source::SourceType;
use migr_host::{HostProvider, RemoteRepo};

/// Where to check repos out when listing files from a clone.
#[derive(Debug, Clone)]
pub struct CloneSettings {
    pub dir: PathBuf,
    pub token: String,
}

/// User name hosts expect alongside a token in https clone URLs.
pub fn clone_username(kind: SourceType) -> &'static str {
    match kind {
        SourceType::GitLab => "oauth2",
        SourceType::BitbucketCloud | SourceType::BitbucketServer => "x-token-auth",
        _ => "x-access-token",
    }
}

/// List a repo's files at `branch`, through a shallow clone when `clone` is
/// set and through the host's tree API otherwise.
pub async fn repo_files(
    provider: &dyn HostProvider,
    repo: &RemoteRepo,
    branch: &str,
    clone: Option<&CloneSettings>,
) -> Result<Vec<String>, MigrError> {
    let Some(settings) = clone else {
        return provider.list_files(&repo.owner, &repo.name, branch).await;
    };

    let url = clone::authenticated_url(
        &repo.clone_url,
        clone_username(provider.kind()),
        &settings.token,
    )?;
    let dest = settings
        .dir
        .join(format!("{}__{}", repo.owner.replace('/', "_"), repo.name));
    let branch = branch.to_string();

    tokio::task::spawn_blocking(move || -> Result<Vec<String>, MigrError> {
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        let cloned = clone::shallow_clone(&url, &branch, &dest);
        let files = cloned.map(|()| scanner::scan_manifest_files(&dest));
        if let Err(e) = std::fs::remove_dir_all(&dest) {
            tracing::debug!(dir = %dest.display(), "failed to remove checkout: {e}");
        }
        files
    })
    .await
    .map_err(|e| MigrError::Other(format!("clone task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedHost;

    #[async_trait]
    impl HostProvider for FixedHost {
        async fn list_repos(&self, _namespace: &str) -> Result<Vec<RemoteRepo>, MigrError> {
            Ok(Vec::new())
        }

        async fn get_repo(
            &self,
            _owner: &str,
            _name: &str,
        ) -> Result<Option<RemoteRepo>, MigrError> {
            Ok(None)
        }

        async fn list_files(
            &self,
            _owner: &str,
            _name: &str,
            branch: &str,
        ) -> Result<Vec<String>, MigrError> {
            Ok(vec![format!("{branch}/package.json")])
        }

        fn kind(&self) -> SourceType {
            SourceType::GitHub
        }
    }

    #[tokio::test]
    async fn test_repo_files_uses_host_api_without_clone_dir() {
        let repo = RemoteRepo {
            owner: "snyk".to_string(),
            name: "cli".to_string(),
            ..Default::default()
        };
        let files = repo_files(&FixedHost, &repo, "main", None).await.unwrap();
        assert_eq!(files, vec!["main/package.json"]);
    }

    #[test]
    fn test_clone_username() {
        assert_eq!(clone_username(SourceType::GitLab), "oauth2");
        assert_eq!(clone_username(SourceType::GitHubEnterprise), "x-access-token");
    }
}
