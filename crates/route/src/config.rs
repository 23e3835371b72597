//! Application level settings shared by every route.
//!
//! [`AppConfig`] is read once while routes are compiled and then handed to every handler
//! (through [`RouteContext`](crate::RouteContext)) behind an `Arc`, so it never changes once
//! the application has started.

use serde::Deserialize;
use std::env;

/// Environment variable read by [`AppConfig::from_env`] to pick the active profile.
pub const PROFILE_ENV: &str = "MICRO_ROUTE_PROFILE";

/// Default cap for request bodies, in bytes.
pub const DEFAULT_MAX_LENGTH: usize = 1_000_000;

/// How often the overflow handler is told that a body exceeded its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowNotify {
    /// Every chunk received after the cap was reached is reported.
    #[default]
    EveryChunk,
    /// Only the first excess chunk is reported, the rest is dropped silently.
    Once,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Active environment, matched against the `in` list of each route mapping.
    pub profile: Option<String>,

    /// Allow body reading handlers on GET and HEAD routes.
    pub always_read_request_payload: bool,

    /// Body cap used by routes that don't set `maxLength`.
    pub max_length: usize,

    pub overflow_notify: OverflowNotify,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: None,
            always_read_request_payload: false,
            max_length: DEFAULT_MAX_LENGTH,
            overflow_notify: OverflowNotify::EveryChunk,
        }
    }
}

impl AppConfig {
    /// Default settings with the profile taken from [`PROFILE_ENV`].
    pub fn from_env() -> Self {
        let profile = env::var(PROFILE_ENV).ok().filter(|p| !p.is_empty());
        Self { profile, ..Self::default() }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn always_read_request_payload(mut self, enabled: bool) -> Self {
        self.always_read_request_payload = enabled;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn overflow_notify(mut self, overflow_notify: OverflowNotify) -> Self {
        self.overflow_notify = overflow_notify;
        self
    }

    /// Returns true when a route restricted to `environments` should be mapped.
    ///
    /// A route without an allow-list is always active, a route with one is only active when
    /// the current profile is listed.
    pub fn is_active_in(&self, environments: Option<&[String]>) -> bool {
        match environments {
            None => true,
            Some(list) => self.profile.as_ref().is_some_and(|profile| list.iter().any(|env| env == profile)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_length, 1_000_000);
        assert!(!config.always_read_request_payload);
        assert_eq!(config.overflow_notify, OverflowNotify::EveryChunk);
    }

    #[test]
    fn deserialize_partial() {
        let config: AppConfig =
            serde_json::from_str(r#"{"profile": "dev", "maxLength": 10, "overflowNotify": "once"}"#).unwrap();
        assert_eq!(config.profile.as_deref(), Some("dev"));
        assert_eq!(config.max_length, 10);
        assert_eq!(config.overflow_notify, OverflowNotify::Once);
        assert!(!config.always_read_request_payload);
    }

    #[test]
    fn environment_filter() {
        let envs = vec!["dev".to_string(), "test".to_string()];

        assert!(AppConfig::default().is_active_in(None));
        assert!(!AppConfig::default().is_active_in(Some(&envs)));
        assert!(AppConfig::default().profile("dev").is_active_in(Some(&envs)));
        assert!(!AppConfig::default().profile("prod").is_active_in(Some(&envs)));
    }
}
