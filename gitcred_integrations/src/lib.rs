//! Connectors to external code hosts consumed by gitcred.

pub mod connectors;

pub use connectors::github::GithubTransport;
