//! ForkGuard GitHub infrastructure adapter.
//!
//! Implements every port trait defined in the [`model`] crate
//! (`CodeRepository`, `IssueTracker`, `PullRequestManager`,
//! `SecurityFindings`, `WorkflowDispatcher`) on a single [`GithubClient`]
//! talking to the GitHub REST API with `reqwest`, plus a file-backed
//! [`FileBaselineStore`] for the tag baseline.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (pagination, rate-limit signalling, authentication)
//! are handled here; the routines never see them. Every failure surfaces as a
//! [`model::HostError`].

pub mod auth;
pub mod baseline;
pub mod client;
mod issues;
mod models;
mod pulls;
mod repository;
mod security;

pub use auth::{AuthError, Credentials};
pub use baseline::FileBaselineStore;
pub use client::{GithubClient, DEFAULT_API_BASE_URL};
