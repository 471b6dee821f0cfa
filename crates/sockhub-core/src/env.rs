//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `EngineConfig::from_env()`.
//!
//! # Usage
//!
//! ```ignore
//! use sockhub_core::env::{env_get, env_get_bool};
//!
//! let clients: usize = env_get("SOCKHUB_MAX_CLIENTS", 64);
//! let verbose: bool = env_get_bool("SOCKHUB_STATS", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset variables and values that fail to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Everything else returns false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__SOCKHUB_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__SOCKHUB_TEST_NUM__", " 123 ");
        let val: usize = env_get("__SOCKHUB_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__SOCKHUB_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__SOCKHUB_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__SOCKHUB_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__SOCKHUB_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        std::env::set_var("__SOCKHUB_TEST_BOOL__", "YES");
        assert!(env_get_bool("__SOCKHUB_TEST_BOOL__", false));
        std::env::set_var("__SOCKHUB_TEST_BOOL__", "0");
        assert!(!env_get_bool("__SOCKHUB_TEST_BOOL__", true));
        std::env::remove_var("__SOCKHUB_TEST_BOOL__");
        assert!(env_get_bool("__SOCKHUB_TEST_BOOL__", true));
    }
}
