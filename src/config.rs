use std::env;
use std::path::PathBuf;

/// Default upstream endpoints, overridable via environment.
pub const DEFAULT_SEARCH_URL: &str = "https://ashlynn-repo.vercel.app/search";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://socialdown.itz-ashlynn.workers.dev/yt";

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Gateway endpoint returning track metadata for a text query.
    pub gateway_search_url: String,
    /// Gateway endpoint resolving a watch URL to a downloadable stream.
    pub gateway_download_url: String,
    /// Directory holding the JSON persistence files.
    pub data_dir: PathBuf,
    /// Capacity of the bounded search memo.
    pub search_cache_capacity: u64,
    /// Upper bound on a single stream resolution call, in seconds.
    pub resolve_timeout_secs: u64,
}

impl Config {
    /// Builds the configuration from environment variables, falling back
    /// to defaults suitable for local use.
    pub fn from_env() -> Self {
        Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 8000),
            gateway_search_url: env_string("GATEWAY_SEARCH_URL", DEFAULT_SEARCH_URL),
            gateway_download_url: env_string("GATEWAY_DOWNLOAD_URL", DEFAULT_DOWNLOAD_URL),
            data_dir: PathBuf::from(env_string("DATA_DIR", "data")),
            search_cache_capacity: env_parsed("SEARCH_CACHE_CAPACITY", 64),
            resolve_timeout_secs: env_parsed("RESOLVE_TIMEOUT_SECS", 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            gateway_search_url: DEFAULT_SEARCH_URL.to_string(),
            gateway_download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            data_dir: PathBuf::from("data"),
            search_cache_capacity: 64,
            resolve_timeout_secs: 60,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.resolve_timeout_secs, 60);
        assert!(config.search_cache_capacity > 0);
        assert!(config.gateway_search_url.starts_with("https://"));
    }

    #[test]
    fn env_overrides_take_precedence() {
        env::set_var("MUSICFLOW_TEST_CAPACITY", "16");
        let parsed: u64 = env_parsed("MUSICFLOW_TEST_CAPACITY", 64);
        assert_eq!(parsed, 16);
        env::remove_var("MUSICFLOW_TEST_CAPACITY");

        // Unset and garbage values fall back to the default.
        assert_eq!(env_parsed::<u16>("MUSICFLOW_TEST_MISSING", 8000), 8000);
        env::set_var("MUSICFLOW_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parsed::<u16>("MUSICFLOW_TEST_GARBAGE", 8000), 8000);
        env::remove_var("MUSICFLOW_TEST_GARBAGE");
    }
}
