//! Configuration types for the downloader system

use crate::downloader::core::CachePolicy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one download batch
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Probe every item before transferring so progress has an aggregate size
    pub expects_precise_progress: bool,
    /// Policy applied to items without their own override
    pub cache_policy: CachePolicy,
    /// Headers sent with every probe and fetch
    pub request_headers: HashMap<String, String>,
    /// Idle timeout: the longest wait for a connection or for the next read.
    /// A transfer that keeps receiving data is never cut off.
    pub timeout: Duration,
    pub user_agent: String,
    /// Directory bodies are staged in before being moved into place.
    /// Defaults to the system temporary directory.
    pub staging_dir: Option<PathBuf>,
}

impl DownloadConfig {
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder::default()
    }

    /// Directory the transport stages response bodies in
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            expects_precise_progress: true,
            cache_policy: CachePolicy::default(),
            request_headers: HashMap::new(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("cachedl/", env!("CARGO_PKG_VERSION")).to_string(),
            staging_dir: None,
        }
    }
}

/// Fluent builder for [`DownloadConfig`]
#[derive(Debug, Clone, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn precise_progress(mut self, enabled: bool) -> Self {
        self.config.expects_precise_progress = enabled;
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.request_headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.request_headers.extend(headers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> DownloadConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloadConfig::default();
        assert!(config.expects_precise_progress);
        assert_eq!(config.cache_policy, CachePolicy::ReturnCacheIfUnmodifiedElseLoad);
        assert!(config.request_headers.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("cachedl/"));
        assert_eq!(config.staging_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_builder() {
        let config = DownloadConfig::builder()
            .precise_progress(false)
            .cache_policy(CachePolicy::ReloadIgnoringCache)
            .header("Authorization", "Bearer token")
            .timeout(Duration::from_secs(5))
            .staging_dir("/var/tmp/staging")
            .build();

        assert!(!config.expects_precise_progress);
        assert_eq!(config.cache_policy, CachePolicy::ReloadIgnoringCache);
        assert_eq!(config.request_headers.get("Authorization").map(String::as_str), Some("Bearer token"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.staging_dir(), PathBuf::from("/var/tmp/staging"));
    }
}
