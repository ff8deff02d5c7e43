use serde::{Deserialize, Serialize};
use url::Url;

/// The kind of source code host a target is imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "github-enterprise")]
    GitHubEnterprise,
    #[serde(rename = "gitlab")]
    GitLab,
    BitbucketCloud,
    BitbucketServer,
    AzureRepos,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::GitHub => write!(f, "github"),
            SourceType::GitHubEnterprise => write!(f, "github-enterprise"),
            SourceType::GitLab => write!(f, "gitlab"),
            SourceType::BitbucketCloud => write!(f, "bitbucket-cloud"),
            SourceType::BitbucketServer => write!(f, "bitbucket-server"),
            SourceType::AzureRepos => write!(f, "azure-repos"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(SourceType::GitHub),
            "github-enterprise" | "ghe" => Ok(SourceType::GitHubEnterprise),
            "gitlab" => Ok(SourceType::GitLab),
            "bitbucket-cloud" => Ok(SourceType::BitbucketCloud),
            "bitbucket-server" => Ok(SourceType::BitbucketServer),
            "azure-repos" | "azure_devops" | "azure-devops" => Ok(SourceType::AzureRepos),
            _ => Err(format!("unknown source type: {s}")),
        }
    }
}

impl SourceType {
    /// Default API URL for this source type.
    pub fn default_api_url(&self) -> Option<Url> {
        let raw = match self {
            SourceType::GitHub => "https://api.github.com",
            SourceType::GitLab => "https://gitlab.com/api/v4",
            SourceType::BitbucketCloud => "https://api.bitbucket.org/2.0",
            SourceType::AzureRepos => "https://dev.azure.com",
            SourceType::GitHubEnterprise | SourceType::BitbucketServer => return None,
        };
        Url::parse(raw).ok()
    }

    /// Environment variable holding the host token for this source.
    pub fn token_env_var(&self) -> &'static str {
        match self {
            SourceType::GitHub | SourceType::GitHubEnterprise => "GITHUB_TOKEN",
            SourceType::GitLab => "GITLAB_TOKEN",
            SourceType::BitbucketCloud | SourceType::BitbucketServer => "BITBUCKET_TOKEN",
            SourceType::AzureRepos => "AZURE_DEVOPS_TOKEN",
        }
    }

    /// Keychain key for this source's token.
    pub fn credential_key(&self) -> String {
        format!("migr:{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_roundtrip() {
        for kind in [
            SourceType::GitHub,
            SourceType::GitHubEnterprise,
            SourceType::GitLab,
            SourceType::BitbucketCloud,
            SourceType::BitbucketServer,
            SourceType::AzureRepos,
        ] {
            let parsed: SourceType = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn test_enterprise_hosts_have_no_default_url() {
        assert!(SourceType::GitHubEnterprise.default_api_url().is_none());
        assert_eq!(
            SourceType::GitLab.default_api_url().unwrap().as_str(),
            "https://gitlab.com/api/v4"
        );
    }
}
