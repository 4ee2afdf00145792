//! GitHub code-forge client for the batch executor.
//!
//! Implements [`bx_core::ForgeClient`] against the GitHub REST API so the
//! task executor can open, list, and merge pull requests without knowing
//! anything about HTTP.

pub mod github;

pub use github::GithubForgeClient;
