//! Deep Research web front end
//!
//! This crate provides:
//! - A client for a remote deep-research HTTP service
//! - A markdown rendering pipeline for the returned reports
//! - A PDF export path with remote-image inlining
//! - An axum web API plus an embedded single-page shell

pub mod api;
pub mod client;
pub mod export;
pub mod markdown;

pub use client::{ClientConfig, ResearchBackend, ResearchClient, ResearchResult};
pub use markdown::Renderer;

/// Configuration for the web service
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AppConfig {
    /// Base URL of the remote research service
    pub core_api_url: String,

    /// Timeout for a single research request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Port the web server listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Whether the shell offers the PDF export control
    #[serde(default = "default_enable_export")]
    pub enable_export: bool,

    /// Export tuning
    #[serde(default)]
    pub export: ExportConfig,
}

fn default_request_timeout_secs() -> u64 { 300 }
fn default_listen_port() -> u16 { 8080 }
fn default_enable_export() -> bool { true }

/// Configuration for the PDF export helper
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExportConfig {
    /// Timeout for fetching a single embedded image (seconds)
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Entries kept in the markdown render cache
    #[serde(default = "default_render_cache_size")]
    pub render_cache_size: usize,
}

fn default_image_timeout_secs() -> u64 { 30 }
fn default_render_cache_size() -> usize { 64 }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            image_timeout_secs: default_image_timeout_secs(),
            render_cache_size: default_render_cache_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: AppConfig = toml::from_str(r#"core_api_url = "http://localhost:8000""#).unwrap();
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.listen_port, 8080);
        assert!(config.enable_export);
        assert_eq!(config.export.render_cache_size, 64);
    }

    #[test]
    fn test_config_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            core_api_url = "http://research.internal"
            request_timeout_secs = 60
            enable_export = false

            [export]
            image_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.core_api_url, "http://research.internal");
        assert_eq!(config.request_timeout_secs, 60);
        assert!(!config.enable_export);
        assert_eq!(config.export.image_timeout_secs, 5);
        assert_eq!(config.export.render_cache_size, 64);
    }
}
