//! Connectors implementing the core `PageTransport` trait.

pub mod github;
