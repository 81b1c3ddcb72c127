//! Environment variable utilities
//!
//! Typed lookups with defaults, used by the runtime configuration to layer
//! `DD_*` overrides on top of compile-time defaults.
//!
//! ```ignore
//! use ddserver_core::env::{env_get, env_get_bool};
//!
//! let wait_us: u64 = env_get("DD_POLL_WAIT_US", 100);
//! let color = env_get_bool("DD_COLOR", true);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Boolean lookup
///
/// "1", "true", "yes", "on" are true and "0", "false", "no", "off" are false
/// (case-insensitive). Anything else, including unset, yields the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// `Some(T)` only if the variable is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// String lookup without parsing
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_falls_back() {
        let val: u64 = env_get("__DD_TEST_UNSET_7781__", 100);
        assert_eq!(val, 100);
        assert!(env_get_bool("__DD_TEST_UNSET_7781__", true));
        assert_eq!(env_get_opt::<u16>("__DD_TEST_UNSET_7781__"), None);
        assert_eq!(env_get_str("__DD_TEST_UNSET_7781__", "local_machine"), "local_machine");
    }

    #[test]
    fn test_parse_with_whitespace() {
        std::env::set_var("__DD_TEST_PORT__", " 4321 ");
        let port: u16 = env_get("__DD_TEST_PORT__", 0);
        assert_eq!(port, 4321);
        std::env::remove_var("__DD_TEST_PORT__");
    }

    #[test]
    fn test_bool_variants() {
        std::env::set_var("__DD_TEST_BOOL__", "YES");
        assert!(env_get_bool("__DD_TEST_BOOL__", false));

        std::env::set_var("__DD_TEST_BOOL__", "off");
        assert!(!env_get_bool("__DD_TEST_BOOL__", true));

        // Unrecognized keeps the default either way
        std::env::set_var("__DD_TEST_BOOL__", "maybe");
        assert!(env_get_bool("__DD_TEST_BOOL__", true));
        assert!(!env_get_bool("__DD_TEST_BOOL__", false));

        std::env::remove_var("__DD_TEST_BOOL__");
    }

    #[test]
    fn test_invalid_parse_uses_default() {
        std::env::set_var("__DD_TEST_INVALID__", "lots");
        let val: usize = env_get("__DD_TEST_INVALID__", 50);
        assert_eq!(val, 50);
        std::env::remove_var("__DD_TEST_INVALID__");
    }
}
