use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub permissions: PermissionConfig,
    pub approval: ApprovalConfig,
    pub notifications: NotificationConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string; when absent in development the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub log_unauthorized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub inactivity_days: i64,
    /// Zero disables the in-process sweep loop.
    pub sweep_interval_secs: u64,
    pub review_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub default_page_size: i64,
}

impl PermissionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = env::var("OPS_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(v) = env::var("SECURITY_JWT_SECRET").ok().or_else(|| env::var("JWT_SECRET").ok()) {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_LOG_UNAUTHORIZED") {
            self.security.log_unauthorized = v.parse().unwrap_or(self.security.log_unauthorized);
        }

        // Permission cache overrides
        if let Ok(v) = env::var("PERMISSION_CACHE_TTL_SECS") {
            self.permissions.cache_ttl_secs = v.parse().unwrap_or(self.permissions.cache_ttl_secs);
        }

        // Approval overrides
        if let Ok(v) = env::var("APPROVAL_INACTIVITY_DAYS") {
            self.approval.inactivity_days = v.parse().unwrap_or(self.approval.inactivity_days);
        }
        if let Ok(v) = env::var("APPROVAL_SWEEP_INTERVAL_SECS") {
            self.approval.sweep_interval_secs = v.parse().unwrap_or(self.approval.sweep_interval_secs);
        }
        if let Ok(v) = env::var("APPROVAL_REVIEW_URL") {
            self.approval.review_url = v;
        }

        // Notification overrides
        if let Ok(v) = env::var("NOTIFY_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Ok(v) = env::var("NOTIFY_TIMEOUT_SECS") {
            self.notifications.timeout_secs = v.parse().unwrap_or(self.notifications.timeout_secs);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_DEFAULT_PAGE_SIZE") {
            self.audit.default_page_size = v.parse().unwrap_or(self.audit.default_page_size);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                log_unauthorized: true,
            },
            permissions: PermissionConfig { cache_ttl_secs: 300 },
            approval: ApprovalConfig {
                inactivity_days: 90,
                sweep_interval_secs: 0,
                review_url: "/admin/users?status=pending".to_string(),
            },
            notifications: NotificationConfig {
                webhook_url: None,
                timeout_secs: 10,
            },
            audit: AuditConfig { default_page_size: 100 },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                run_migrations: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                log_unauthorized: true,
            },
            permissions: PermissionConfig { cache_ttl_secs: 300 },
            approval: ApprovalConfig {
                inactivity_days: 90,
                sweep_interval_secs: 6 * 60 * 60,
                review_url: "/admin/users?status=pending".to_string(),
            },
            notifications: NotificationConfig {
                webhook_url: None,
                timeout_secs: 10,
            },
            audit: AuditConfig { default_page_size: 100 },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                run_migrations: false,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 12,
                log_unauthorized: true,
            },
            permissions: PermissionConfig { cache_ttl_secs: 300 },
            approval: ApprovalConfig {
                inactivity_days: 90,
                sweep_interval_secs: 24 * 60 * 60,
                review_url: "/admin/users?status=pending".to_string(),
            },
            notifications: NotificationConfig {
                webhook_url: None,
                timeout_secs: 5,
            },
            audit: AuditConfig { default_page_size: 100 },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
