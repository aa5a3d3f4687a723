/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:3001)
/// - `JWT_SECRET`: HS256 signing key, at least 32 characters (required)
/// - `CORS_ORIGINS`: comma separated origins, `*` for any (default: *)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `UPLOAD_DIR` / `MAX_UPLOAD_BYTES`: file storage (default: ./uploads, 10 MiB)
/// - `ADMIN_EMAILS` / `INITIAL_WHITELIST_EMAILS`: comma separated
/// - `DASHSCOPE_API_KEY`, `DASHSCOPE_BASE_URL`, `DASHSCOPE_MODEL`, `DASHSCOPE_VISION_MODEL`
/// - `GOOGLE_API_KEY`
///
/// # Example
///
/// ```no_run
/// use famhealth_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_DASHSCOPE_MODEL: &str = "qwen-plus";
pub const DEFAULT_VISION_MODEL: &str = "qwen-vl-plus";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub ai: AiConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode adds HSTS
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 characters. Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
}

/// Uploaded file storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Account access lists, all lowercased
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    pub admin_emails: Vec<String>,
    pub initial_whitelist: Vec<String>,
}

/// Language model provider settings from the environment
///
/// Keys stored in `system_config` take precedence at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(skip_serializing)]
    pub dashscope_api_key: Option<String>,
    pub dashscope_base_url: String,
    pub dashscope_model: String,
    pub vision_model: String,
    #[serde(skip_serializing)]
    pub google_api_key: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            dashscope_api_key: None,
            dashscope_base_url: DEFAULT_DASHSCOPE_BASE_URL.to_string(),
            dashscope_model: DEFAULT_DASHSCOPE_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            google_api_key: None,
        }
    }
}

/// Splits a comma separated list, trimming and lowercasing entries
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Loads configuration from the process environment (and `.env` if present)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| non_empty(key).unwrap_or_else(|| default.to_string());

        let port = or_default("API_PORT", "3001")
            .parse::<u16>()
            .context("API_PORT must be a port number")?;

        let database_url = non_empty("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let max_connections = or_default("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let jwt_secret = non_empty("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if jwt_secret.chars().count() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let max_upload_bytes = match non_empty("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse::<usize>().context("MAX_UPLOAD_BYTES must be a byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let production = matches!(
            non_empty("PRODUCTION").map(|v| v.to_lowercase()).as_deref(),
            Some("true" | "1" | "yes")
        );

        Ok(Self {
            api: ApiConfig {
                host: or_default("API_HOST", "0.0.0.0"),
                port,
                cors_origins: or_default("CORS_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig { secret: jwt_secret },
            storage: StorageConfig {
                upload_dir: PathBuf::from(or_default("UPLOAD_DIR", "./uploads")),
                max_upload_bytes,
            },
            access: AccessConfig {
                admin_emails: non_empty("ADMIN_EMAILS").map(|v| parse_email_list(&v)).unwrap_or_default(),
                initial_whitelist: non_empty("INITIAL_WHITELIST_EMAILS")
                    .map(|v| parse_email_list(&v))
                    .unwrap_or_default(),
            },
            ai: AiConfig {
                dashscope_api_key: non_empty("DASHSCOPE_API_KEY"),
                dashscope_base_url: or_default("DASHSCOPE_BASE_URL", DEFAULT_DASHSCOPE_BASE_URL),
                dashscope_model: or_default("DASHSCOPE_MODEL", DEFAULT_DASHSCOPE_MODEL),
                vision_model: or_default("DASHSCOPE_VISION_MODEL", DEFAULT_VISION_MODEL),
                google_api_key: non_empty("GOOGLE_API_KEY"),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.access.admin_emails.iter().any(|a| *a == email)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/test"), ("JWT_SECRET", SECRET)]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.database.max_connections, 10);
        assert!(config.allows_any_origin());
        assert!(!config.api.production);
        assert_eq!(config.storage.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.ai.dashscope_model, "qwen-plus");
        assert_eq!(config.ai.vision_model, "qwen-vl-plus");
        assert!(config.ai.dashscope_api_key.is_none());
    }

    #[test]
    fn test_required_variables() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = load(&[("DATABASE_URL", "postgresql://localhost/test")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let err = load(&[("DATABASE_URL", "postgresql://localhost/test"), ("JWT_SECRET", "short")]).unwrap_err();
        assert!(err.to_string().contains("32 characters"));
    }

    #[test]
    fn test_lists_and_flags() {
        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/test"),
            ("JWT_SECRET", SECRET),
            ("ADMIN_EMAILS", " Admin@Example.com , ,ops@example.com"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("PRODUCTION", "TRUE"),
            ("DASHSCOPE_API_KEY", "  "),
        ])
        .unwrap();

        assert_eq!(config.access.admin_emails, vec!["admin@example.com", "ops@example.com"]);
        assert!(config.is_admin("ADMIN@example.com"));
        assert!(!config.is_admin("user@example.com"));
        assert!(!config.allows_any_origin());
        assert_eq!(config.api.cors_origins.len(), 2);
        assert!(config.api.production);
        assert!(config.ai.dashscope_api_key.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[
            ("DATABASE_URL", "postgresql://localhost/test"),
            ("JWT_SECRET", SECRET),
            ("API_PORT", "http"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }
}
