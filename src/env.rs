//! Environment variable names used by this crate for convenient
//! configuration from Cloud Functions, Cloud Run and local runs.
//!
//! These are purely helpers; the core types remain decoupled from
//! environment access.

/// Project id variables, checked in this order.
pub const PROJECT_ID_ENVS: [&str; 4] = [
    "GOOGLE_CLOUD_PROJECT",
    "GCP_PROJECT",
    "GCLOUD_PROJECT",
    "GCLOUD_PROJECT_ID",
];

/// Override for the metadata server host, e.g. `127.0.0.1:8080` in tests.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Target log stream name.
pub const LOG_NAME_ENV: &str = "LOGV2_LOG_NAME";

/// Static `invoker` label.
pub const INVOKER_ENV: &str = "LOGV2_INVOKER";

/// Set to `1`/`true` to force the stdout sink.
pub const STDOUT_ONLY_ENV: &str = "LOGV2_STDOUT_ONLY";

/// Slack bot token (`xoxb-...`).
pub const SLACK_BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";

/// Destination for CRITICAL/ALERT/EMERGENCY/ERROR entries.
pub const SLACK_ERROR_CHANNEL_ENV: &str = "SLACK_ERROR_CHANNEL_ID";

/// Destination for WARNING/NOTICE entries.
pub const SLACK_WARNING_CHANNEL_ENV: &str = "SLACK_WARNING_CHANNEL_ID";

/// Fallback destination.
pub const SLACK_DEFAULT_CHANNEL_ENV: &str = "SLACK_DEFAULT_CHANNEL_ID";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating an empty value as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Interpret an environment variable as a boolean flag.
pub fn env_flag(key: &str) -> bool {
    matches!(
        env_non_empty(key).map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// First non-empty project id variable from [`PROJECT_ID_ENVS`].
pub fn project_id_from_env() -> Option<String> {
    PROJECT_ID_ENVS.iter().find_map(|key| env_non_empty(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_unset() {
        std::env::set_var("LOGV2_TEST_BLANK", "   ");
        std::env::set_var("LOGV2_TEST_PADDED", " value ");
        assert_eq!(env_non_empty("LOGV2_TEST_BLANK"), None);
        assert_eq!(env_non_empty("LOGV2_TEST_PADDED").as_deref(), Some("value"));
        assert_eq!(env_or("LOGV2_TEST_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn flags_accept_common_spellings() {
        for (value, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("no", false)] {
            std::env::set_var("LOGV2_TEST_FLAG", value);
            assert_eq!(env_flag("LOGV2_TEST_FLAG"), expected, "{}", value);
        }
        assert!(!env_flag("LOGV2_TEST_FLAG_MISSING"));
    }
}
