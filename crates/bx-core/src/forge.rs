//! The hosting code-forge client contract (§4.6). Implementations live in
//! the `bx-forge` crate; this trait lives in `bx-core` so the task executor
//! doesn't need a dependency on any particular forge SDK.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An open or merged change request (pull/merge request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Forge-assigned number.
    pub number: u64,
    /// Web URL for humans.
    pub url: String,
    /// Head branch.
    pub head: String,
    /// Base branch.
    pub base: String,
}

/// How a change request was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    /// Combine all commits on the branch into one on the base branch.
    Squash,
    /// Merge with a merge commit.
    Merge,
}

/// Result of a merge operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    /// Whether the merge succeeded.
    pub merged: bool,
    /// Resulting commit SHA on the base branch, if merged.
    pub sha: Option<String>,
}

/// Errors from forge operations.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// The forge API call failed outright.
    #[error("forge request failed: {0}")]
    RequestFailed(String),

    /// The caller is not authenticated against the forge.
    #[error("forge authentication failed: {0}")]
    AuthFailed(String),

    /// The change request could not be merged (conflicts, checks pending).
    #[error("change request not mergeable: {0}")]
    NotMergeable(String),
}

/// The four operations the task executor needs from a hosting code forge.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// List open change requests whose head branch is `head`.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] on an API failure.
    async fn list_open_change_requests(&self, head: &str) -> Result<Vec<ChangeRequest>, ForgeError>;

    /// Open a new change request from `head` into `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] on an API failure.
    async fn create_change_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<ChangeRequest, ForgeError>;

    /// Merge a change request.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] if the merge is rejected or the API fails.
    async fn merge_change_request(&self, number: u64, method: MergeMethod) -> Result<MergeResult, ForgeError>;

    /// Delete a branch ref on the forge (post-merge cleanup).
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] on an API failure.
    async fn delete_branch_ref(&self, name: &str) -> Result<(), ForgeError>;
}
