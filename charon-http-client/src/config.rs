//! Connection-level settings for the default transport.
//!
//! Per-request values (url, method, headers, body, timeout) live in the node
//! tree. What is configured here is shared by every request a transport sends
//! and fixed once its `reqwest::Client` is built.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

/// How the transport treats 3xx responses.
///
/// Unfollowed redirects reach the middleware as-is and are classified as
/// runtime errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// Hand every 3xx back unchanged.
    Never,
    /// Follow up to this many hops.
    Limited(usize),
}

impl Default for Redirects {
    fn default() -> Self {
        Self::Limited(10)
    }
}

/// Settings for [`ReqwestTransport`](crate::ReqwestTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Sent with every request unless the request sets the same header.
    pub default_headers: Vec<(String, String)>,
    pub user_agent: String,
    /// Accept and transparently decode gzip and brotli bodies.
    pub decompress: bool,
    pub redirects: Redirects,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            default_headers: Vec::new(),
            user_agent: format!("charon/{}", env!("CARGO_PKG_VERSION")),
            decompress: true,
            redirects: Redirects::default(),
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_decompress(mut self, enable: bool) -> Self {
        self.decompress = enable;
        self
    }

    pub fn with_redirects(mut self, redirects: Redirects) -> Self {
        self.redirects = redirects;
        self
    }

    /// Defaults overlaid with `{PREFIX}_*` environment variables.
    ///
    /// Recognised: `CONNECT_TIMEOUT_MS`, `USER_AGENT`, `DECOMPRESS` and
    /// `MAX_REDIRECTS` (`0` disables following). Unparseable values are
    /// reported, never ignored.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let vars = EnvVars::new(prefix);
        let mut config = Self::default();

        if let Some(ms) = vars.parse::<u64>("CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(agent) = vars.get("USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(enable) = vars.parse("DECOMPRESS")? {
            config.decompress = enable;
        }
        match vars.parse::<usize>("MAX_REDIRECTS")? {
            Some(0) => config.redirects = Redirects::Never,
            Some(max) => config.redirects = Redirects::Limited(max),
            None => {}
        }

        debug!(prefix = %vars.prefix, "Loaded transport config from environment");
        Ok(config)
    }
}

struct EnvVars {
    prefix: String,
}

impl EnvVars {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_uppercase(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    fn get(&self, name: &str) -> Option<String> {
        env::var(self.key(name)).ok()
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        raw.trim().parse().map(Some).map_err(|e| {
            Error::runtime(format!("Invalid value for {}: {raw:?} ({e})", self.key(name)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert!(config.decompress);
        assert_eq!(config.redirects, Redirects::Limited(10));
        assert!(config.user_agent.starts_with("charon/"));
    }

    #[test]
    fn test_chained_setters() {
        let config = TransportConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_default_header("Accept", "application/json")
            .with_redirects(Redirects::Never);

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(
            config.default_headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
        assert_eq!(config.redirects, Redirects::Never);
    }

    #[test]
    fn test_from_env() {
        // SAFETY: the prefix is unique to this test.
        unsafe {
            env::set_var("CHARON_CFG_TEST_CONNECT_TIMEOUT_MS", "250");
            env::set_var("CHARON_CFG_TEST_MAX_REDIRECTS", "0");
            env::set_var("CHARON_CFG_TEST_USER_AGENT", "boatman/1");
        }
        let config = TransportConfig::from_env("charon_cfg_test").unwrap();

        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.redirects, Redirects::Never);
        assert_eq!(config.user_agent, "boatman/1");
        assert!(config.decompress);
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        // SAFETY: the prefix is unique to this test.
        unsafe { env::set_var("CHARON_CFG_BAD_DECOMPRESS", "sometimes") };
        let err = TransportConfig::from_env("charon_cfg_bad").unwrap_err();
        assert!(err.message().contains("CHARON_CFG_BAD_DECOMPRESS"));
    }
}
