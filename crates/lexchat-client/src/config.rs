//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration.

use std::path::PathBuf;

use lexchat_shared::constants::DEFAULT_KEY_CACHE_CAPACITY;
use lexchat_store::MessageOrder;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Database file.
    /// Env: `LEXCHAT_DB_PATH`
    /// Default: the platform data directory (`lexchat/lexchat.db`).
    pub db_path: Option<PathBuf>,

    /// Upper bound of the legacy conversation key cache (0 disables it).
    /// Env: `LEXCHAT_KEY_CACHE_CAPACITY`
    /// Default: `256`
    pub key_cache_capacity: usize,

    /// Display order of message snapshots.
    /// Env: `LEXCHAT_MESSAGE_ORDER` (`oldest` / `newest`)
    /// Default: `oldest`
    pub message_order: MessageOrder,

    /// How many snapshots a live subscription buffers before the producer
    /// waits for the consumer.
    /// Env: `LEXCHAT_SUBSCRIPTION_BUFFER`
    /// Default: `16`
    pub subscription_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            key_cache_capacity: DEFAULT_KEY_CACHE_CAPACITY,
            message_order: MessageOrder::OldestFirst,
            subscription_buffer: 16,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("LEXCHAT_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("LEXCHAT_KEY_CACHE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) => config.key_cache_capacity = n,
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid LEXCHAT_KEY_CACHE_CAPACITY, using default"
                ),
            }
        }

        if let Some(val) = lookup("LEXCHAT_MESSAGE_ORDER") {
            match parse_message_order(&val) {
                Some(order) => config.message_order = order,
                None => tracing::warn!(
                    value = %val,
                    "Invalid LEXCHAT_MESSAGE_ORDER, using default"
                ),
            }
        }

        if let Some(val) = lookup("LEXCHAT_SUBSCRIPTION_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.subscription_buffer = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid LEXCHAT_SUBSCRIPTION_BUFFER, using default"
                ),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_message_order(value: &str) -> Option<MessageOrder> {
    match value.trim().to_ascii_lowercase().as_str() {
        "oldest" | "oldest-first" | "asc" => Some(MessageOrder::OldestFirst),
        "newest" | "newest-first" | "desc" => Some(MessageOrder::NewestFirst),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert!(config.db_path.is_none());
        assert_eq!(config.key_cache_capacity, 256);
        assert_eq!(config.message_order, MessageOrder::OldestFirst);
        assert_eq!(config.subscription_buffer, 16);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LEXCHAT_DB_PATH", "/tmp/chat.db"),
            ("LEXCHAT_KEY_CACHE_CAPACITY", "8"),
            ("LEXCHAT_MESSAGE_ORDER", "Newest"),
            ("LEXCHAT_SUBSCRIPTION_BUFFER", "4"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/chat.db")));
        assert_eq!(config.key_cache_capacity, 8);
        assert_eq!(config.message_order, MessageOrder::NewestFirst);
        assert_eq!(config.subscription_buffer, 4);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LEXCHAT_KEY_CACHE_CAPACITY", "lots"),
            ("LEXCHAT_MESSAGE_ORDER", "sideways"),
            ("LEXCHAT_SUBSCRIPTION_BUFFER", "0"),
        ]));
        assert_eq!(config.key_cache_capacity, 256);
        assert_eq!(config.message_order, MessageOrder::OldestFirst);
        assert_eq!(config.subscription_buffer, 16);
    }
}
