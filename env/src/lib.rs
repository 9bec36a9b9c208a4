mod config;

pub use config::{Config, ConfigError, ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_MS};

/// Expand a network shorthand to its public node, or return `url` as is.
pub fn parse_with_default_node(url: &str) -> &str {
    match url {
        "mainnet" | "m" => "wss://core.revolutionpopuli.com/ws",
        "testnet" | "t" => "wss://testnet.revolutionpopuli.com",
        "local" | "l" => "ws://127.0.0.1:8090",
        _ => url,
    }
}

/// Known fallback nodes for a network shorthand.
pub fn default_fallbacks(network: &str) -> Vec<String> {
    match network {
        "testnet" | "t" => vec![
            "wss://testnet.revolutionpopuli.com".into(),
            "ws://127.0.0.1:8090".into(),
        ],
        _ => vec![],
    }
}
