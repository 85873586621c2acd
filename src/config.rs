#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub cache_enabled: bool,
    pub http_cache_max_age_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Postgres,
            database_url: None,
            db_max_connections: 10,
            cache_enabled: true,
            http_cache_max_age_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let store_backend = match var("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };
        let database_url = var("DATABASE_URL").filter(|v| !v.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }
        Ok(Self {
            store_backend,
            database_url,
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.db_max_connections),
            cache_enabled: var("CACHE_ENABLED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.cache_enabled),
            http_cache_max_age_secs: var("HTTP_CACHE_MAX_AGE_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.http_cache_max_age_secs),
        })
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
