//! A [`bx_core::ForgeClient`] backed by the GitHub REST API.

use async_trait::async_trait;
use bx_core::{ChangeRequest, ForgeClient, ForgeError, MergeMethod, MergeResult};
use serde::Deserialize;

const API_BASE: &str = "https://api.github.com";

/// GitHub pull-request client for one `owner/repo`.
pub struct GithubForgeClient {
    client: reqwest::Client,
    owner: String,
    repo: String,
    token: String,
}

impl GithubForgeClient {
    /// Build a client for `owner/repo`, authenticating with `token` (a
    /// personal access token or installation token).
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::AuthFailed`] if the underlying HTTP client
    /// cannot be constructed (e.g. an invalid default header value).
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Result<Self, ForgeError> {
        let client = reqwest::Client::builder()
            .user_agent("batch-executor")
            .build()
            .map_err(|e| ForgeError::AuthFailed(e.to_string()))?;
        Ok(Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!("{API_BASE}/repos/{}/{}{suffix}", self.owner, self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    head: RefInfo,
    base: RefInfo,
}

#[derive(Debug, Deserialize)]
struct RefInfo {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    merged: bool,
    sha: Option<String>,
}

impl From<PullResponse> for ChangeRequest {
    fn from(p: PullResponse) -> Self {
        Self {
            number: p.number,
            url: p.html_url,
            head: p.head.ref_name,
            base: p.base.ref_name,
        }
    }
}

#[async_trait]
impl ForgeClient for GithubForgeClient {
    async fn list_open_change_requests(&self, head: &str) -> Result<Vec<ChangeRequest>, ForgeError> {
        let url = self.repo_path("/pulls");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("state", "open"), ("head", &format!("{}:{}", self.owner, head))])
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ForgeError::AuthFailed("github rejected the supplied token".to_string()));
        }
        if !response.status().is_success() {
            return Err(ForgeError::RequestFailed(format!("GET {url}: {}", response.status())));
        }

        let pulls: Vec<PullResponse> = response.json().await.map_err(|e| ForgeError::RequestFailed(e.to_string()))?;
        Ok(pulls.into_iter().map(ChangeRequest::from).collect())
    }

    async fn create_change_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<ChangeRequest, ForgeError> {
        let url = self.repo_path("/pulls");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ForgeError::AuthFailed("github rejected the supplied token".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::RequestFailed(format!("POST {url}: {status}: {text}")));
        }

        let pull: PullResponse = response.json().await.map_err(|e| ForgeError::RequestFailed(e.to_string()))?;
        Ok(pull.into())
    }

    async fn merge_change_request(&self, number: u64, method: MergeMethod) -> Result<MergeResult, ForgeError> {
        let url = self.repo_path(&format!("/pulls/{number}/merge"));
        let merge_method = match method {
            MergeMethod::Squash => "squash",
            MergeMethod::Merge => "merge",
        };

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "merge_method": merge_method }))
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::NotMergeable(text));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::RequestFailed(format!("PUT {url}: {status}: {text}")));
        }

        let merge: MergeResponse = response.json().await.map_err(|e| ForgeError::RequestFailed(e.to_string()))?;
        Ok(MergeResult {
            merged: merge.merged,
            sha: merge.sha,
        })
    }

    async fn delete_branch_ref(&self, name: &str) -> Result<(), ForgeError> {
        let url = format!("{API_BASE}/repos/{}/{}/git/refs/heads/{name}", self.owner, self.repo);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ForgeError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(ForgeError::RequestFailed(format!("DELETE {url}: {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_path_builds_the_expected_api_url() {
        let client = GithubForgeClient::new("acme", "widgets", "token").expect("client");
        assert_eq!(client.repo_path("/pulls"), "https://api.github.com/repos/acme/widgets/pulls");
    }
}
