//! HTTP handler modules.

/// Config document endpoints.
pub mod config;
