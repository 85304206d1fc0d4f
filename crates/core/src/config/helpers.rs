use std::env;
use std::str::FromStr;

/// Read an env var, treating an empty value as unset.
pub(crate) fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read and parse an env var. Unparseable values are ignored with a warning.
pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Parse a boolean env var: `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`.
pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let raw = env_opt(key)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unparseable boolean override");
            None
        }
    }
}
