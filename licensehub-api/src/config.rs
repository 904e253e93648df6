/// Configuration management for the API server
///
/// Configuration comes from environment variables (a `.env` file is honored
/// in development) and is parsed into typed structs once at startup.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: *)
/// - `JWT_SECRET`: Secret the external auth service signs tokens with (required, 32+ chars)
/// - `LOG_FORMAT`: `pretty` or `json` (default: pretty)
/// - `LEMONSQUEEZY_VALIDATE_URL`, `LEMONSQUEEZY_STORE_ID`, `LEMONSQUEEZY_PRODUCT_IDS`,
///   `LEMONSQUEEZY_MAX_ACTIVATION_USAGE`
/// - `APPSUMO_API_URL`, `APPSUMO_API_KEY`
/// - `VENDOR_TIMEOUT_SECONDS`: Bound on every vendor call (default: 5)
/// - `TEAM_BASE_TIER`, `TEAM_TIER`, `TEAM_COMBINABLE_PRODUCT_ID`,
///   `TEAM_FALLBACK_VENDOR`, `TEAM_MIN_LICENSES`: consolidation policy overrides
///
/// # Example
///
/// ```no_run
/// use licensehub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use licensehub_shared::consolidation::ConsolidationPolicy;
use licensehub_shared::validation::{
    lemonsqueezy::{DEFAULT_MAX_ACTIVATION_USAGE, DEFAULT_VALIDATE_URL},
    appsumo::DEFAULT_API_URL,
    AppSumoConfig, LemonSqueezyConfig,
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub log_format: LogFormat,
    pub vendors: VendorConfig,
    pub team: ConsolidationPolicy,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret shared with the auth service
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Vendor API settings
#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub lemonsqueezy: LemonSqueezyConfig,
    pub appsumo: AppSumoConfig,

    /// Timeout for a single vendor call
    pub timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };

        let mut lemonsqueezy = LemonSqueezyConfig::new(
            var("LEMONSQUEEZY_STORE_ID").unwrap_or_default(),
            var("LEMONSQUEEZY_PRODUCT_IDS")
                .map(|ids| split_list(&ids))
                .unwrap_or_default(),
        );
        lemonsqueezy.validate_url =
            var("LEMONSQUEEZY_VALIDATE_URL").unwrap_or_else(|| DEFAULT_VALIDATE_URL.to_string());
        lemonsqueezy.max_activation_usage = parse_or(
            &var,
            "LEMONSQUEEZY_MAX_ACTIVATION_USAGE",
            DEFAULT_MAX_ACTIVATION_USAGE,
        )?;

        let mut appsumo = AppSumoConfig::new(var("APPSUMO_API_KEY").unwrap_or_default());
        appsumo.api_url = var("APPSUMO_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let defaults = ConsolidationPolicy::default();
        let combinable_product_id = match var("TEAM_COMBINABLE_PRODUCT_ID").as_deref() {
            None => defaults.combinable_product_id,
            Some("none") => None,
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|e| {
                anyhow::anyhow!("TEAM_COMBINABLE_PRODUCT_ID is not a valid integer: {e}")
            })?),
        };
        let team = ConsolidationPolicy {
            base_tier: parse_or(&var, "TEAM_BASE_TIER", defaults.base_tier)?,
            team_tier: parse_or(&var, "TEAM_TIER", defaults.team_tier)?,
            combinable_product_id,
            fallback_vendor: var("TEAM_FALLBACK_VENDOR").unwrap_or(defaults.fallback_vendor),
            min_licenses: parse_or(&var, "TEAM_MIN_LICENSES", defaults.min_licenses)?,
        };

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "API_PORT", 8080)?,
                cors_origins: var("CORS_ORIGINS")
                    .map(|origins| split_list(&origins))
                    .unwrap_or_else(|| vec!["*".to_string()]),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            log_format,
            vendors: VendorConfig {
                lemonsqueezy,
                appsumo,
                timeout: Duration::from_secs(parse_or(&var, "VENDOR_TIMEOUT_SECONDS", 5)?),
            },
            team,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_or<T, V>(var: &V, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{name} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
