use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;

use migr_core::error::MigrError;
use migr_core::models::source::SourceType;

use crate::{network_error, response_error, HostProvider, RemoteRepo, PER_PAGE};

pub struct GitHubProvider {
    client: reqwest::Client,
    api_url: url::Url,
    kind: SourceType,
}

impl GitHubProvider {
    pub fn new(api_url: url::Url, token: &str, kind: SourceType) -> Result<Self, MigrError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Ok(mut val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            val.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, val);
        }
        headers.insert(header::USER_AGENT, HeaderValue::from_static("migr/0.1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MigrError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_url,
            kind,
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}{path}")
    }

    async fn paginated_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, MigrError> {
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!("{}?per_page={PER_PAGE}&page={page}", self.url(path));
            let resp = self.client.get(&url).send().await.map_err(network_error)?;
            if !resp.status().is_success() {
                return Err(response_error(resp).await);
            }

            let items: Vec<T> = resp
                .json()
                .await
                .map_err(|e| MigrError::Serialization(format!("GitHub response: {e}")))?;

            let count = items.len();
            all.extend(items);

            if count < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(all)
    }
}

#[derive(Deserialize)]
struct GhRepo {
    id: u64,
    full_name: String,
    name: String,
    owner: GhOwner,
    clone_url: String,
    default_branch: Option<String>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Deserialize)]
struct GhTree {
    tree: Vec<GhTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct GhTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<GhRepo> for RemoteRepo {
    fn from(r: GhRepo) -> Self {
        RemoteRepo {
            id: Some(r.id),
            full_name: r.full_name,
            owner: r.owner.login,
            name: r.name,
            clone_url: r.clone_url,
            default_branch: r.default_branch.unwrap_or_default(),
            is_fork: r.fork,
            is_private: r.private,
            is_archived: r.archived,
        }
    }
}

#[async_trait]
impl HostProvider for GitHubProvider {
    async fn list_repos(&self, namespace: &str) -> Result<Vec<RemoteRepo>, MigrError> {
        // Namespaces are orgs first, then plain users.
        let gh_repos: Vec<GhRepo> = match self
            .paginated_get(&format!("/orgs/{namespace}/repos"))
            .await
        {
            Err(e) if e.status() == Some(404) => {
                tracing::debug!(namespace, "not an org, listing user repos");
                self.paginated_get(&format!("/users/{namespace}/repos"))
                    .await?
            }
            other => other?,
        };
        Ok(gh_repos.into_iter().map(RemoteRepo::from).collect())
    }

    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RemoteRepo>, MigrError> {
        let url = self.url(&format!("/repos/{owner}/{name}"));
        let resp = self.client.get(&url).send().await.map_err(network_error)?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let gh_repo: GhRepo = resp
            .json()
            .await
            .map_err(|e| MigrError::Serialization(format!("GitHub response: {e}")))?;
        Ok(Some(RemoteRepo::from(gh_repo)))
    }

    async fn list_files(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
    ) -> Result<Vec<String>, MigrError> {
        let url = self.url(&format!(
            "/repos/{owner}/{name}/git/trees/{branch}?recursive=1"
        ));
        let resp = self.client.get(&url).send().await.map_err(network_error)?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let tree: GhTree = resp
            .json()
            .await
            .map_err(|e| MigrError::Serialization(format!("GitHub response: {e}")))?;
        if tree.truncated {
            tracing::warn!(
                repo = %format!("{owner}/{name}"),
                "tree listing truncated, use a clone directory for complete results"
            );
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    fn kind(&self) -> SourceType {
        self.kind
    }
}
