use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use migr_core::error::MigrError;
use migr_core::models::source::SourceType;

use crate::{network_error, response_error, HostProvider, RemoteRepo, PER_PAGE};

pub struct GitLabProvider {
    client: reqwest::Client,
    api_url: url::Url,
}

impl GitLabProvider {
    pub fn new(api_url: url::Url, token: &str) -> Result<Self, MigrError> {
        let mut headers = HeaderMap::new();
        if let Ok(mut val) = HeaderValue::from_str(token) {
            val.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", val);
        }
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static("migr/0.1.0"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MigrError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, api_url })
    }

    fn url(&self, path: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}{path}")
    }

    /// GET every page of `path`; `path` may already carry a query string.
    async fn paginated_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, MigrError> {
        let sep = if path.contains('?') { '&' } else { '?' };
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!("{}{sep}per_page={PER_PAGE}&page={page}", self.url(path));
            let resp = self.client.get(&url).send().await.map_err(network_error)?;
            if !resp.status().is_success() {
                return Err(response_error(resp).await);
            }

            let items: Vec<T> = resp
                .json()
                .await
                .map_err(|e| MigrError::Serialization(format!("GitLab response: {e}")))?;
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

/// Percent-encode a path segment, slashes included.
fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[derive(Deserialize)]
struct GlProject {
    id: u64,
    path: String,
    path_with_namespace: String,
    namespace: GlNamespace,
    #[serde(default)]
    http_url_to_repo: String,
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    forked_from_project: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GlNamespace {
    full_path: String,
}

#[derive(Deserialize)]
struct GlTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<GlProject> for RemoteRepo {
    fn from(p: GlProject) -> Self {
        RemoteRepo {
            id: Some(p.id),
            full_name: p.path_with_namespace,
            owner: p.namespace.full_path,
            name: p.path,
            clone_url: p.http_url_to_repo,
            default_branch: p.default_branch.unwrap_or_default(),
            is_fork: p.forked_from_project.is_some(),
            is_private: p.visibility.as_deref() != Some("public"),
            is_archived: p.archived,
        }
    }
}

#[async_trait]
impl HostProvider for GitLabProvider {
    async fn list_repos(&self, namespace: &str) -> Result<Vec<RemoteRepo>, MigrError> {
        let path = format!(
            "/groups/{}/projects?include_subgroups=true",
            encode(namespace)
        );
        let projects: Vec<GlProject> = self.paginated_get(&path).await?;
        Ok(projects.into_iter().map(RemoteRepo::from).collect())
    }

    async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<RemoteRepo>, MigrError> {
        let url = self.url(&format!("/projects/{}", encode(&format!("{owner}/{name}"))));
        let resp = self.client.get(&url).send().await.map_err(network_error)?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let project: GlProject = resp
            .json()
            .await
            .map_err(|e| MigrError::Serialization(format!("GitLab response: {e}")))?;
        Ok(Some(RemoteRepo::from(project)))
    }

    async fn list_files(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
    ) -> Result<Vec<String>, MigrError> {
        let path = format!(
            "/projects/{}/repository/tree?recursive=true&ref={}",
            encode(&format!("{owner}/{name}")),
            encode(branch)
        );
        let entries: Vec<GlTreeEntry> = self.paginated_get(&path).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    fn kind(&self) -> SourceType {
        SourceType::GitLab
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GitLabProvider {
        let url = url::Url::parse(&format!("{}/api/v4", server.uri())).unwrap();
        GitLabProvider::new(url, "glpat").unwrap()
    }

    #[test]
    fn test_encode_slashes() {
        assert_eq!(encode("group/sub/repo"), "group%2Fsub%2Frepo");
    }

    #[tokio::test]
    async fn test_list_repos_in_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/groups/acme/projects"))
            .and(query_param("include_subgroups", "true"))
            .and(header("PRIVATE-TOKEN", "glpat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 77,
                "path": "api",
                "path_with_namespace": "acme/api",
                "namespace": {"full_path": "acme"},
                "http_url_to_repo": "https://gitlab.com/acme/api.git",
                "default_branch": "develop",
                "archived": false,
                "visibility": "private"
            }])))
            .mount(&server)
            .await;

        let repos = provider(&server).list_repos("acme").await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id, Some(77));
        assert_eq!(repos[0].default_branch, "develop");
        assert!(repos[0].is_private);
    }

    #[tokio::test]
    async fn test_list_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fapi/repository/tree"))
            .and(query_param("ref", "develop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"path": "go.mod", "type": "blob"},
                {"path": "cmd", "type": "tree"}
            ])))
            .mount(&server)
            .await;

        let files = provider(&server)
            .list_files("acme", "api", "develop")
            .await
            .unwrap();
        assert_eq!(files, vec!["go.mod"]);
    }
}
