//! Repository provisioning through GitHub's "generate from template" endpoint.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::{RepositoryInfo, RepositorySpec};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a str>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
    include_all_branches: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedRepository {
    html_url: String,
    clone_url: String,
}

pub struct GitHubRepositories {
    headers: HeaderMap,
    api_url: String,
    template: String,
    owner: Option<String>,
    private: bool,
}

impl GitHubRepositories {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let template = config
            .template_repo
            .clone()
            .ok_or_else(|| {
                ProviderError::ConfigError(
                    "AIW_TEMPLATE_REPO (owner/name of the template repository) is not set"
                        .to_string(),
                )
            })?;
        if template.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(ProviderError::ConfigError(format!(
                "template repository must look like owner/name, got '{}'",
                template
            )));
        }

        let token = config.github_token.as_deref().ok_or_else(|| {
            ProviderError::ConfigError("GITHUB_TOKEN is required to create repositories".to_string())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ProviderError::ConfigError("GITHUB_TOKEN is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("aiw-api/", env!("CARGO_PKG_VERSION"))),
        );

        Ok(Self {
            headers,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            template,
            owner: config.github_owner.clone(),
            private: config.private_repos,
        })
    }

    // Built per call. A blocking client must not be created or dropped on an
    // async worker; provider calls run on the blocking pool.
    fn client(&self) -> Result<Client> {
        Ok(Client::builder()
            .default_headers(self.headers.clone())
            .timeout(Duration::from_secs(60))
            .build()?)
    }

    /// Create `spec.name` from the template. Not idempotent: a second call
    /// for the same name fails with 422 once the first succeeded.
    pub fn generate(&self, spec: &RepositorySpec) -> Result<RepositoryInfo> {
        let url = format!("{}/repos/{}/generate", self.api_url, self.template);
        let body = GenerateRequest {
            owner: self.owner.as_deref(),
            name: &spec.name,
            description: spec.description.as_deref(),
            private: self.private,
            include_all_branches: false,
        };

        debug!(template = %self.template, name = %spec.name, "Generating repository");
        let response = self.client()?.post(&url).json(&body).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: GeneratedRepository = response
            .json()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        info!(url = %created.html_url, "Repository created");

        Ok(RepositoryInfo {
            url: created.html_url,
            clone_url: created.clone_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            github_token: Some("ghp_test".to_string()),
            template_repo: Some("acme/ai-workspace-template".to_string()),
            ..ProviderConfig::mock()
        }
    }

    #[test]
    fn test_requires_template() {
        let cfg = ProviderConfig {
            template_repo: None,
            ..config()
        };
        assert!(matches!(
            GitHubRepositories::new(&cfg),
            Err(ProviderError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_template() {
        let cfg = ProviderConfig {
            template_repo: Some("just-a-name".to_string()),
            ..config()
        };
        assert!(matches!(
            GitHubRepositories::new(&cfg),
            Err(ProviderError::ConfigError(_))
        ));
    }

    #[test]
    fn test_requires_token() {
        let cfg = ProviderConfig {
            github_token: None,
            ..config()
        };
        assert!(matches!(
            GitHubRepositories::new(&cfg),
            Err(ProviderError::ConfigError(_))
        ));
    }

    #[test]
    fn test_request_body_omits_unset_fields() {
        let body = GenerateRequest {
            owner: None,
            name: "demo",
            description: None,
            private: true,
            include_all_branches: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name": "demo", "private": true, "include_all_branches": false})
        );
    }
}
