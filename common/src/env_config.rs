use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Built once at process start from environment variables and shared
/// with every worker through `web::Data<Arc<Config>>`.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to. `memory://` selects the in-memory store.
    pub database_url: String,
    /// Configuration for session tokens issued by the auth collaborator.
    pub jwt_config: JwtConfig,
    /// Configuration for minted API credentials.
    pub credential_config: CredentialConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// Seconds between expiry sweeps. Zero disables the sweep.
    pub sweep_interval_secs: u64,
    /// Default rolling window of the dashboard summary.
    pub dashboard_window_days: u32,
    /// Requests per second accepted across the whole server.
    pub global_rps: u32,
    /// Requests per second accepted per API credential.
    pub credential_rps: u32,
    /// Reject metered calls once a subscription's api-call cap is reached.
    pub enforce_usage_caps: bool,
    /// Seconds between drops of idle per-credential rate buckets. Zero disables it.
    pub limiter_retain_interval_secs: u64,
    /// JSON plan catalog created at start-up when set. Existing names are skipped.
    pub plans_file: Option<String>,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) session authentication.
pub struct JwtConfig {
    /// The secret key used to verify session JWTs.
    pub secret: String,
}

#[derive(Clone, Debug)]
/// Configuration for API credentials minted against subscriptions.
pub struct CredentialConfig {
    /// The secret key used to sign credentials.
    pub secret: String,
    /// Maximum simultaneously active credentials per subscription.
    pub quota: u32,
}

impl JwtConfig {
    /// Reads `JWT_SECRET` (required).
    ///
    /// # Panics
    ///
    /// If `JWT_SECRET` is not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
        }
    }
}

impl CredentialConfig {
    /// Reads `CREDENTIAL_SECRET` (required) and `CREDENTIAL_QUOTA` (default 5).
    ///
    /// # Panics
    ///
    /// If `CREDENTIAL_SECRET` is not set or `CREDENTIAL_QUOTA` is not a number.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        CredentialConfig {
            secret: env::var("CREDENTIAL_SECRET").expect("CREDENTIAL_SECRET must be set"),
            quota: env::var("CREDENTIAL_QUOTA")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("CREDENTIAL_QUOTA must be a valid number"),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: `development` or `production`
    /// - `DATABASE_URL`: Connection string for the database
    /// - `JWT_SECRET`, `CREDENTIAL_SECRET`: signing keys
    ///
    /// Optional (with defaults):
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `STRIPE_WEBHOOK_SECRET`: (default: empty, webhook rejects everything)
    /// - `SWEEP_INTERVAL_SECS` (300), `DASHBOARD_WINDOW_DAYS` (30),
    ///   `GLOBAL_RPS` (10), `CREDENTIAL_RPS` (5), `ENFORCE_USAGE_CAPS` (false),
    ///   `LIMITER_RETAIN_INTERVAL_SECS` (60)
    /// - `PLANS_FILE`: plan catalog to seed (default: none)
    ///
    /// # Panics
    ///
    /// If required variables are missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_config: JwtConfig::from_env(),
            credential_config: CredentialConfig::from_env(),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_or("PORT", 8080),
            num_workers: parse_or("WORKERS", 4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: flag_or("ENABLE_CONSOLE_LOGGING", true),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 300),
            dashboard_window_days: parse_or("DASHBOARD_WINDOW_DAYS", 30),
            global_rps: parse_or("GLOBAL_RPS", 10),
            credential_rps: parse_or("CREDENTIAL_RPS", 5),
            enforce_usage_caps: flag_or("ENFORCE_USAGE_CAPS", false),
            limiter_retain_interval_secs: parse_or("LIMITER_RETAIN_INTERVAL_SECS", 60),
            plans_file: env::var("PLANS_FILE").ok().filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn flag_or(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(default)
}
