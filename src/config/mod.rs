use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub api_server: ServerConfig,
    pub cors: CorsConfig,
    pub proxy: ProxyConfig,
    pub rate_limit: RateLimitSettings,
    /// Minutes east of UTC at which the counting day starts
    pub day_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub counter_mode: CounterMode,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Postgres,
}

/// How compound counter updates reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Separate read and write; concurrent updates can be lost
    Lossy,
    /// Single-statement upserts provided by the backend
    Atomic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// The only origin granted CORS access. `None` disables CORS headers.
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
    /// Trust `Forwarded` / `X-Forwarded-For`
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: TrustedProxyMode::Cloudflare,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("STORE_BACKEND", "sqlite").to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" | "postgresql" => StoreBackend::Postgres,
            "sqlite" => StoreBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown STORE_BACKEND '{other}', falling back to 'sqlite'. Supported values: memory, sqlite, postgres"
                );
                StoreBackend::Sqlite
            }
        };

        let url = env_or("DATABASE_URL", "sqlite://./beacon.db?mode=rwc");

        let counter_mode = match env_or("COUNTER_MODE", "atomic").to_lowercase().as_str() {
            "lossy" => CounterMode::Lossy,
            "atomic" => CounterMode::Atomic,
            other => {
                tracing::warn!(
                    "Unknown COUNTER_MODE '{other}', falling back to 'atomic'. Supported values: lossy, atomic"
                );
                CounterMode::Atomic
            }
        };

        let proxy_mode = match env_or("TRUSTED_PROXY_MODE", "cloudflare").to_lowercase().as_str() {
            "none" => TrustedProxyMode::None,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "standard" => TrustedProxyMode::Standard,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'cloudflare'. Supported values: none, cloudflare, standard"
                );
                TrustedProxyMode::Cloudflare
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .ok()
            .map(|list| parse_cidr_list(&list))
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Config {
            store: StoreConfig {
                backend,
                url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
                counter_mode,
                retry_attempts: parse_env("STORE_RETRY_ATTEMPTS", 2)?,
                retry_base_ms: parse_env("STORE_RETRY_BASE_MS", 25)?,
                sweep_interval_secs: parse_env("STORE_SWEEP_INTERVAL_SECS", 300)?,
            },
            api_server: ServerConfig {
                host: env_or("API_HOST", "127.0.0.1"),
                port: parse_env("API_PORT", 8787)?,
            },
            cors: CorsConfig { allowed_origin },
            proxy: ProxyConfig {
                mode: proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            rate_limit: RateLimitSettings {
                max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            },
            day_offset_minutes: parse_env("DAY_BOUNDARY_UTC_OFFSET_MINUTES", 0)?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Comma-separated CIDRs; bare addresses are treated as single-host networks
pub fn parse_cidr_list(list: &str) -> anyhow::Result<Vec<IpNet>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid entry '{s}' in TRUSTED_PROXIES"))
        })
        .collect()
}
